//! Scan import workflows.
//!
//! [`ScanImporter::import`] runs the CI flow: resolve the test type and
//! environment, create a test, then upload the report into it. The two
//! remote steps are not atomic; a test created before a failed upload is left
//! in place and reported through `test_id` on the failed outcome.
//!
//! [`ScanImporter::import_direct`] uploads a report straight to the import
//! endpoint and lets DefectDojo place it by engagement id or by names.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::{DojoError, Result};
use crate::models::defectdojo::{ImportResult, NewTest, Reference, ResourceKind};
use crate::services::defectdojo_client::{DefectDojoApi, ImportOptions, UploadRequest};
use crate::services::identifier_resolver::IdentifierResolver;

/// Inputs for a create-test-then-upload import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanImportRequest {
    pub engagement_id: i64,
    /// Test type name or ID, also used in the test title
    pub test_type: String,
    /// Environment name or ID
    pub environment: String,
    pub report_file: PathBuf,
    pub scan_type: String,
    pub build_id: Option<String>,
    pub branch_name: Option<String>,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub close_old_findings: bool,
    pub push_to_jira: bool,
}

impl ScanImportRequest {
    pub fn new(
        engagement_id: i64,
        test_type: impl Into<String>,
        report_file: impl Into<PathBuf>,
        scan_type: impl Into<String>,
    ) -> Self {
        Self {
            engagement_id,
            test_type: test_type.into(),
            environment: "Development".to_string(),
            report_file: report_file.into(),
            scan_type: scan_type.into(),
            build_id: None,
            branch_name: None,
            product_id: None,
            product_name: None,
            close_old_findings: false,
            push_to_jira: false,
        }
    }
}

/// Import progress. Each run starts at `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Init,
    TestCreated,
    Uploaded,
    TestCreationFailed,
    UploadFailed,
}

/// Which step stopped a failed import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFailure {
    Resolution,
    TestCreation,
    Upload,
}

/// Structured result of an import; never an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanImportOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding_count: Option<u64>,
    pub message: String,
    /// Last state reached before completion
    pub state: ImportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ImportFailure>,
}

impl ScanImportOutcome {
    /// The failure expressed as an error, `None` on success
    pub fn error(&self) -> Option<DojoError> {
        let message = self.message.clone();
        match self.failure? {
            ImportFailure::Resolution => Some(DojoError::Resolution(message)),
            ImportFailure::TestCreation => Some(DojoError::Creation(message)),
            ImportFailure::Upload => Some(DojoError::Upload {
                status: None,
                message: match self.test_id {
                    Some(test_id) => format!("{} (test {} was kept)", message, test_id),
                    None => message,
                },
            }),
        }
    }

    fn failed(
        state: ImportState,
        failure: ImportFailure,
        test_id: Option<i64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            test_id,
            import_id: None,
            test_title: None,
            finding_count: None,
            message: message.into(),
            state,
            failure: Some(failure),
        }
    }
}

/// Build a test title: `"<test type> scan"`, then build, then branch.
pub fn compose_title(test_type: &str, build_id: Option<&str>, branch_name: Option<&str>) -> String {
    let mut title = format!("{} scan", test_type);
    if let Some(build_id) = build_id.filter(|b| !b.is_empty()) {
        title.push_str(&format!(" - Build #{}", build_id));
    }
    if let Some(branch) = branch_name.filter(|b| !b.is_empty()) {
        title.push_str(&format!(" - Branch: {}", branch));
    }
    title
}

/// Fail early when a direct import names no destination.
pub fn check_import_target(options: &ImportOptions) -> Result<()> {
    let product_name = non_empty(&options.product_name);
    if options.test.is_none() && options.engagement.is_none() && product_name.is_none() {
        return Err(DojoError::Config(
            "Either an engagement id or a product name must be provided".into(),
        ));
    }
    if options.engagement.is_none()
        && product_name.is_some()
        && non_empty(&options.engagement_name).is_none()
        && !options.auto_create_context
    {
        warn!("When using a product name, also provide an engagement name or enable auto_create_context");
    }
    Ok(())
}

/// Empty strings are never sent, so they count as absent.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub struct ScanImporter<'a, A: DefectDojoApi + ?Sized> {
    api: &'a A,
    resolver: IdentifierResolver<'a, A>,
}

impl<'a, A: DefectDojoApi + ?Sized> ScanImporter<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            resolver: IdentifierResolver::new(api),
        }
    }

    /// Create a test dated today and upload the report into it
    pub async fn import(&self, request: &ScanImportRequest) -> ScanImportOutcome {
        self.import_on(request, Local::now().date_naive()).await
    }

    /// Create a test dated `date` and upload the report into it
    pub async fn import_on(&self, request: &ScanImportRequest, date: NaiveDate) -> ScanImportOutcome {
        let mut state = ImportState::Init;

        let test_type_id = self
            .resolver
            .resolve(ResourceKind::TestType, &Reference::parse(&request.test_type))
            .await;
        let environment_id = self
            .resolver
            .resolve(ResourceKind::Environment, &Reference::parse(&request.environment))
            .await;

        let (test_type_id, environment_id) = match (test_type_id, environment_id) {
            (Some(t), Some(e)) => (t, e),
            (t, e) => {
                error!(
                    test_type = %request.test_type,
                    environment = %request.environment,
                    test_type_found = t.is_some(),
                    environment_found = e.is_some(),
                    "Could not resolve test type or environment"
                );
                return ScanImportOutcome::failed(
                    state,
                    ImportFailure::Resolution,
                    None,
                    "environment/test type not found",
                );
            }
        };

        let day = date.format("%Y-%m-%d").to_string();
        let new_test = NewTest {
            engagement_id: request.engagement_id,
            test_type_id,
            environment_id,
            target_start: day.clone(),
            target_end: day,
            title: compose_title(
                &request.test_type,
                request.build_id.as_deref(),
                request.branch_name.as_deref(),
            ),
        };

        let test = match self.api.create_test(&new_test).await {
            Some(test) => test,
            None => {
                state = advance(state, ImportState::TestCreationFailed);
                return ScanImportOutcome::failed(
                    state,
                    ImportFailure::TestCreation,
                    None,
                    "could not create test",
                );
            }
        };
        state = advance(state, ImportState::TestCreated);

        let (product_id, product_name) = self.product_metadata(request).await;

        let mut upload = UploadRequest {
            report_file: request.report_file.clone(),
            scan_type: request.scan_type.clone(),
            options: ImportOptions {
                test: Some(test.id),
                close_old_findings: request.close_old_findings,
                push_to_jira: request.push_to_jira,
                product_id,
                product_name,
                ..Default::default()
            },
        };

        let mut result = self.api.upload_report(&upload).await;
        if let Err(failure) = &result {
            if failure.is_missing_product_name()
                && non_empty(&upload.options.product_name).is_none()
            {
                info!(scan_type = %request.scan_type, "Retrying upload with scan type as product name");
                upload.options.product_name = Some(request.scan_type.clone());
                result = self.api.upload_report(&upload).await;
            }
        }

        let import = match result {
            Ok(import) if import.import_id.is_some() => import,
            Ok(_) => {
                error!(test_id = test.id, "Import response did not include an id");
                state = advance(state, ImportState::UploadFailed);
                return ScanImportOutcome::failed(
                    state,
                    ImportFailure::Upload,
                    Some(test.id),
                    "Created test but failed to import findings",
                );
            }
            Err(failure) => {
                error!(
                    test_id = test.id,
                    status = ?failure.status,
                    message = %failure.message,
                    "Failed to upload findings"
                );
                state = advance(state, ImportState::UploadFailed);
                return ScanImportOutcome::failed(
                    state,
                    ImportFailure::Upload,
                    Some(test.id),
                    "Created test but failed to import findings",
                );
            }
        };
        state = advance(state, ImportState::Uploaded);

        ScanImportOutcome {
            success: true,
            test_id: Some(test.id),
            import_id: import.import_id,
            test_title: Some(test.title.unwrap_or(new_test.title)),
            finding_count: import.finding_count,
            message: "Successfully created test and imported findings".to_string(),
            state,
            failure: None,
        }
    }

    /// Product id and name sent with the upload. Looked up from the engagement
    /// only when neither was given; lookup failures are ignored.
    async fn product_metadata(&self, request: &ScanImportRequest) -> (Option<i64>, Option<String>) {
        let product_name = non_empty(&request.product_name).map(str::to_string);
        if request.product_id.is_some() || product_name.is_some() {
            return (request.product_id, product_name);
        }

        let Some(engagement) = self.api.get_engagement(request.engagement_id).await else {
            return (None, None);
        };
        let Some(product_id) = engagement.product_id else {
            return (None, None);
        };

        let product_name = self.api.get_product(product_id).await.map(|p| p.name);
        debug!(product_id, product_name = ?product_name, "Product resolved from engagement");
        (Some(product_id), product_name)
    }

    /// Upload a report without creating a test first.
    pub async fn import_direct(
        &self,
        report_file: &Path,
        scan_type: &str,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        check_import_target(&options)?;

        info!(
            file = %report_file.display(),
            scan_type,
            "Importing scan"
        );

        let request = UploadRequest {
            report_file: report_file.to_path_buf(),
            scan_type: scan_type.to_string(),
            options,
        };

        let result = self.api.upload_report(&request).await?;
        info!(test_id = ?result.test_id, "Successfully imported the scan");
        Ok(result)
    }
}

fn advance(from: ImportState, to: ImportState) -> ImportState {
    debug!(from = ?from, to = ?to, "Import state transition");
    to
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_title_plain() {
        assert_eq!(compose_title("ZAP", None, None), "ZAP scan");
    }

    #[test]
    fn test_compose_title_build_then_branch() {
        assert_eq!(
            compose_title("ZAP", Some("42"), Some("main")),
            "ZAP scan - Build #42 - Branch: main"
        );
        assert_eq!(
            compose_title("Trivy", None, Some("feature/x")),
            "Trivy scan - Branch: feature/x"
        );
        assert_eq!(compose_title("Trivy", Some("7"), None), "Trivy scan - Build #7");
    }

    #[test]
    fn test_request_defaults() {
        let request = ScanImportRequest::new(3, "ZAP", "report.xml", "ZAP Scan");
        assert_eq!(request.environment, "Development");
        assert!(!request.close_old_findings);
        assert!(request.product_name.is_none());
    }

    #[test]
    fn test_check_import_target_requires_destination() {
        let err = check_import_target(&ImportOptions::default()).unwrap_err();
        assert!(matches!(err, DojoError::Config(_)));
    }

    #[test]
    fn test_check_import_target_accepts_engagement_or_product() {
        let by_engagement = ImportOptions {
            engagement: Some(1),
            ..Default::default()
        };
        assert!(check_import_target(&by_engagement).is_ok());

        let by_name = ImportOptions {
            product_name: Some("webapp".to_string()),
            auto_create_context: true,
            ..Default::default()
        };
        assert!(check_import_target(&by_name).is_ok());
    }

    #[test]
    fn test_check_import_target_empty_product_name_is_absent() {
        let options = ImportOptions {
            product_name: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            check_import_target(&options),
            Err(DojoError::Config(_))
        ));
    }

    #[test]
    fn test_outcome_serialization_skips_missing_fields() {
        let outcome = ScanImportOutcome::failed(
            ImportState::TestCreationFailed,
            ImportFailure::TestCreation,
            None,
            "could not create test",
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["state"], "test_creation_failed");
        assert_eq!(value["failure"], "test_creation");
        assert!(value.get("test_id").is_none());
    }

    #[test]
    fn test_outcome_error_mapping() {
        let resolution = ScanImportOutcome::failed(
            ImportState::Init,
            ImportFailure::Resolution,
            None,
            "environment/test type not found",
        );
        assert!(matches!(resolution.error(), Some(DojoError::Resolution(_))));

        let upload = ScanImportOutcome::failed(
            ImportState::UploadFailed,
            ImportFailure::Upload,
            Some(12),
            "Created test but failed to import findings",
        );
        let err = upload.error().unwrap();
        assert!(err.to_string().contains("test 12 was kept"));
    }
}
