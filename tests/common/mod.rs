//! Common test utilities for the integration tests
//!
//! Provides `FakeDojo`, an in-memory `DefectDojoApi` with scripted responses
//! that records every call it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use dojo_gate::models::defectdojo::{
    Engagement, Finding, ImportResult, NamedResource, NewTest, Product, ResourceKind, Severity,
    Test,
};
use dojo_gate::services::defectdojo_client::{
    DefectDojoApi, FindingsFilter, UploadFailure, UploadRequest,
};
use dojo_gate::{DojoError, Result};

/// A call received by the fake, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListResource(ResourceKind),
    GetEngagement(i64),
    GetProduct(i64),
    CreateTest(NewTest),
    Upload(UploadRequest),
    ListFindings(FindingsFilter),
    ListScanTypes,
}

#[derive(Default)]
pub struct FakeDojo {
    pub environments: Vec<NamedResource>,
    pub test_types: Vec<NamedResource>,
    pub engagements: HashMap<i64, Engagement>,
    pub products: HashMap<i64, Product>,
    /// Id given to the created test; `None` rejects creation
    pub created_test_id: Option<i64>,
    /// Responses handed out per upload, in order; a successful import once drained
    pub uploads: Mutex<VecDeque<std::result::Result<ImportResult, UploadFailure>>>,
    pub findings: Vec<Finding>,
    pub findings_error: bool,
    pub scan_types: Vec<String>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeDojo {
    /// A server with the usual environments and test types, accepting tests
    pub fn standard() -> Self {
        Self {
            environments: vec![named(1, "Development"), named(2, "Production")],
            test_types: vec![named(10, "ZAP Scan"), named(11, "Trivy Scan")],
            created_test_id: Some(100),
            ..Default::default()
        }
    }

    pub fn with_engagement(mut self, engagement_id: i64, product: Option<(i64, &str)>) -> Self {
        self.engagements.insert(
            engagement_id,
            Engagement {
                id: engagement_id,
                product_id: product.map(|(id, _)| id),
            },
        );
        if let Some((id, name)) = product {
            self.products.insert(
                id,
                Product {
                    id,
                    name: name.to_string(),
                },
            );
        }
        self
    }

    pub fn queue_upload(self, response: std::result::Result<ImportResult, UploadFailure>) -> Self {
        self.uploads.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads_sent(&self) -> Vec<UploadRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::ListResource(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn named(id: i64, name: &str) -> NamedResource {
    NamedResource {
        id,
        name: name.to_string(),
    }
}

pub fn imported(import_id: i64, test_id: i64, finding_count: u64) -> ImportResult {
    ImportResult {
        import_id: Some(import_id),
        test_id: Some(test_id),
        finding_count: Some(finding_count),
    }
}

pub fn missing_product_name() -> UploadFailure {
    UploadFailure {
        status: Some(400),
        message: r#"{"message": "product_name parameter missing"}"#.to_string(),
    }
}

pub fn finding(severity: Severity, false_positive: bool) -> Finding {
    Finding {
        id: None,
        title: None,
        severity: Some(severity),
        is_false_positive: false_positive,
    }
}

/// `n` copies of a finding
pub fn findings(n: usize, severity: Severity, false_positive: bool) -> Vec<Finding> {
    (0..n).map(|_| finding(severity, false_positive)).collect()
}

#[async_trait]
impl DefectDojoApi for FakeDojo {
    async fn list_resource(&self, kind: ResourceKind) -> Vec<NamedResource> {
        self.record(Call::ListResource(kind));
        match kind {
            ResourceKind::Environment => self.environments.clone(),
            ResourceKind::TestType => self.test_types.clone(),
        }
    }

    async fn get_engagement(&self, id: i64) -> Option<Engagement> {
        self.record(Call::GetEngagement(id));
        self.engagements.get(&id).cloned()
    }

    async fn get_product(&self, id: i64) -> Option<Product> {
        self.record(Call::GetProduct(id));
        self.products.get(&id).cloned()
    }

    async fn create_test(&self, fields: &NewTest) -> Option<Test> {
        self.record(Call::CreateTest(fields.clone()));
        self.created_test_id.map(|id| Test {
            id,
            title: Some(fields.title.clone()),
            engagement_id: Some(fields.engagement_id),
            test_type_id: Some(fields.test_type_id),
            environment_id: Some(fields.environment_id),
            start_date: Some(fields.target_start.clone()),
            end_date: Some(fields.target_end.clone()),
        })
    }

    async fn upload_report(
        &self,
        request: &UploadRequest,
    ) -> std::result::Result<ImportResult, UploadFailure> {
        self.record(Call::Upload(request.clone()));
        self.uploads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(imported(1, request.options.test.unwrap_or(0), 0)))
    }

    async fn list_findings(&self, filter: &FindingsFilter) -> Result<Vec<Finding>> {
        self.record(Call::ListFindings(*filter));
        if self.findings_error {
            return Err(DojoError::Api {
                status: 500,
                message: "server error".to_string(),
            });
        }
        Ok(self.findings.clone())
    }

    async fn list_scan_types(&self) -> Vec<String> {
        self.record(Call::ListScanTypes);
        self.scan_types.clone()
    }
}
