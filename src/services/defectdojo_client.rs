//! DefectDojo API client.
//!
//! Wraps the DefectDojo v2 REST API with the handful of typed operations the
//! import and gate workflows need: listing environments, test types and scan
//! types, reading engagements and products, creating tests, uploading scan
//! reports and listing findings.
//!
//! Every request carries `Authorization: Token <api key>`. Nothing here is
//! retried; retry decisions belong to the callers.
//!
//! ## API Reference
//!
//! See: https://demo.defectdojo.org/api/v2/oa3/swagger-ui/

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{multipart, Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{DojoError, Result};
use crate::models::defectdojo::{
    Engagement, Finding, ImportResult, Listing, NamedResource, NewTest, Product, ResourceKind,
    Severity, Test,
};

/// Text the import endpoint returns when an installation requires a product name
pub const MISSING_PRODUCT_NAME_MARKER: &str = "product_name parameter missing";

/// Endpoints tried, in order, for the list of supported scan types
const SCAN_TYPE_ENDPOINTS: [&str; 3] = ["import-scan-info/", "scan_type_info/", "test-types/"];

/// Normalize a user-supplied DefectDojo base URL.
///
/// Trims whitespace and trailing slashes and strips a trailing `/api/v2`
/// segment, since endpoint paths are appended by the client.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(DojoError::Config("DefectDojo host is empty".into()));
    }

    if base.to_lowercase().ends_with("/api/v2") {
        base.truncate(base.len() - "/api/v2".len());
        base = base.trim_end_matches('/').to_string();
    }

    let parsed = Url::parse(&base)
        .map_err(|e| DojoError::Config(format!("Invalid DefectDojo host '{}': {}", raw, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(DojoError::Config(format!(
            "DefectDojo host must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(DojoError::Config(format!(
            "DefectDojo host '{}' has no hostname",
            raw
        )));
    }

    Ok(base)
}

/// Rejected upload, with enough detail to pattern-match recoverable causes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// HTTP status, absent for transport or local file errors
    pub status: Option<u16>,
    /// Response body or error text
    pub message: String,
}

impl UploadFailure {
    pub fn is_missing_product_name(&self) -> bool {
        self.message.contains(MISSING_PRODUCT_NAME_MARKER)
    }
}

impl From<UploadFailure> for DojoError {
    fn from(failure: UploadFailure) -> Self {
        DojoError::Upload {
            status: failure.status,
            message: failure.message,
        }
    }
}

/// Every optional field the import endpoint accepts.
///
/// Name-approach fields (`product_name`, `engagement_name`, `product_type_name`,
/// `auto_create_context`, `deduplication_on_engagement`) are only sent when no
/// engagement id is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub test: Option<i64>,
    pub active: bool,
    pub verified: bool,
    pub close_old_findings: bool,
    pub push_to_jira: bool,
    pub engagement: Option<i64>,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub engagement_name: Option<String>,
    pub product_type_name: Option<String>,
    pub auto_create_context: bool,
    pub deduplication_on_engagement: bool,
    pub scan_date: Option<String>,
    pub minimum_severity: Option<Severity>,
    pub endpoint_to_add: Option<i64>,
    pub test_title: Option<String>,
    pub build_id: Option<String>,
    pub branch_tag: Option<String>,
    pub commit_hash: Option<String>,
    pub tags: Vec<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub service: Option<String>,
    pub source_code_management_uri: Option<String>,
    pub engagement_end_date: Option<String>,
    pub lead: Option<i64>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            test: None,
            active: true,
            verified: false,
            close_old_findings: false,
            push_to_jira: false,
            engagement: None,
            product_id: None,
            product_name: None,
            engagement_name: None,
            product_type_name: None,
            auto_create_context: false,
            deduplication_on_engagement: false,
            scan_date: None,
            minimum_severity: None,
            endpoint_to_add: None,
            test_title: None,
            build_id: None,
            branch_tag: None,
            commit_hash: None,
            tags: Vec::new(),
            environment: None,
            version: None,
            service: None,
            source_code_management_uri: None,
            engagement_end_date: None,
            lead: None,
        }
    }
}

impl ImportOptions {
    /// Multipart text fields, excluding the file and scan type.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("active", self.active.to_string()),
            ("verified", self.verified.to_string()),
            ("close_old_findings", self.close_old_findings.to_string()),
            ("push_to_jira", self.push_to_jira.to_string()),
        ];

        if let Some(test) = self.test {
            fields.push(("test", test.to_string()));
        }
        if let Some(product_id) = self.product_id {
            fields.push(("product_id", product_id.to_string()));
        }

        match self.engagement {
            Some(engagement) => fields.push(("engagement", engagement.to_string())),
            None => {
                push_opt(&mut fields, "product_name", &self.product_name);
                push_opt(&mut fields, "engagement_name", &self.engagement_name);
                push_opt(&mut fields, "product_type_name", &self.product_type_name);
                if self.auto_create_context {
                    fields.push(("auto_create_context", "true".to_string()));
                }
                if self.deduplication_on_engagement {
                    fields.push(("deduplication_on_engagement", "true".to_string()));
                }
            }
        }

        push_opt(&mut fields, "scan_date", &self.scan_date);
        if let Some(severity) = self.minimum_severity {
            fields.push(("minimum_severity", severity.as_str().to_string()));
        }
        if let Some(endpoint) = self.endpoint_to_add {
            fields.push(("endpoint_to_add", endpoint.to_string()));
        }
        push_opt(&mut fields, "test_title", &self.test_title);
        push_opt(&mut fields, "build_id", &self.build_id);
        push_opt(&mut fields, "branch_tag", &self.branch_tag);
        push_opt(&mut fields, "commit_hash", &self.commit_hash);
        for tag in &self.tags {
            fields.push(("tags", tag.clone()));
        }
        push_opt(&mut fields, "environment", &self.environment);
        push_opt(&mut fields, "version", &self.version);
        push_opt(&mut fields, "service", &self.service);
        push_opt(
            &mut fields,
            "source_code_management_uri",
            &self.source_code_management_uri,
        );
        push_opt(&mut fields, "engagement_end_date", &self.engagement_end_date);
        if let Some(lead) = self.lead {
            fields.push(("lead", lead.to_string()));
        }

        fields
    }
}

fn push_opt(fields: &mut Vec<(&'static str, String)>, key: &'static str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        fields.push((key, value.to_string()));
    }
}

/// A report upload: the file, its scan type and the accompanying fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub report_file: PathBuf,
    pub scan_type: String,
    pub options: ImportOptions,
}

/// Server-side filter for the findings listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindingsFilter {
    pub product_id: Option<i64>,
    pub exclude_false_positives: bool,
}

impl FindingsFilter {
    pub fn for_product(product_id: Option<i64>) -> Self {
        Self {
            product_id,
            exclude_false_positives: true,
        }
    }
}

/// Typed operations over the DefectDojo API
#[async_trait]
pub trait DefectDojoApi: Send + Sync {
    /// List every resource of a kind. Empty on any failure: callers must read
    /// an empty result as "unknown", not "absent".
    async fn list_resource(&self, kind: ResourceKind) -> Vec<NamedResource>;

    async fn get_engagement(&self, id: i64) -> Option<Engagement>;

    async fn get_product(&self, id: i64) -> Option<Product>;

    /// Create a test. `Some` only on a 201 response.
    async fn create_test(&self, fields: &NewTest) -> Option<Test>;

    /// Upload a report as multipart form data. The file is read on every call.
    async fn upload_report(
        &self,
        request: &UploadRequest,
    ) -> std::result::Result<ImportResult, UploadFailure>;

    async fn list_findings(&self, filter: &FindingsFilter) -> Result<Vec<Finding>>;

    /// Supported scan type names. Empty when no endpoint answers.
    async fn list_scan_types(&self) -> Vec<String>;
}

/// reqwest-backed DefectDojo client
pub struct DefectDojoClient {
    client: Client,
    config: Config,
}

impl DefectDojoClient {
    /// Build the client and verify host reachability and credentials with a
    /// read-only call.
    pub async fn connect(config: Config) -> Result<Self> {
        let client = Self::new(config)?;
        client.authenticate().await?;
        Ok(client)
    }

    /// Build the client without contacting the server
    pub fn new(mut config: Config) -> Result<Self> {
        config.validate()?;
        config.base_url = normalize_base_url(&config.base_url)?;

        if !config.verify_ssl {
            warn!("TLS certificate verification disabled");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| DojoError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn authenticate(&self) -> Result<()> {
        let url = self.api_url("users/");

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| DojoError::Connection(format!("Connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Failed to connect to DefectDojo");
            return Err(DojoError::Connection(format!(
                "Failed to connect to DefectDojo: {}",
                status
            )));
        }

        info!(url = %self.config.base_url, "Successfully connected to DefectDojo");
        Ok(())
    }

    /// Get the normalized base URL of the DefectDojo instance
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.config.base_url, path)
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.config.api_key)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(AUTHORIZATION, self.authorization())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DojoError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(serde_json::from_str::<T>(&body)?)
    }

    /// Rebase a pagination link onto the configured host. Only the path and
    /// query of `next` are kept, so the token never leaves the configured
    /// scheme and host.
    fn next_page_url(&self, next: &str) -> Option<String> {
        let mut url = Url::parse(&self.config.base_url).ok()?;
        let link = match url.join(next) {
            Ok(link) => link,
            Err(e) => {
                warn!(next, error = %e, "Ignoring malformed pagination link");
                return None;
            }
        };

        url.set_path(link.path());
        url.set_query(link.query());
        Some(url.to_string())
    }

    /// Fetch a list endpoint, following `next` links up to `max_pages`.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut url = self.api_url(path);
        let mut first = true;
        let mut pages = 0u32;

        loop {
            let mut request = self.get(&url);
            if first {
                request = request.query(query);
                first = false;
            }

            debug!(url = %url, page = pages + 1, "Fetching list page");
            let listing: Listing<T> = self.send_json(request).await?;
            pages += 1;

            if pages == 1 {
                if let Some(total) = listing.total() {
                    debug!(path, total, "List endpoint reported total count");
                }
            }

            let next = listing.next().and_then(|n| self.next_page_url(n));
            items.extend(listing.into_items());

            match next {
                Some(next) if pages < self.config.max_pages => url = next,
                Some(_) => {
                    warn!(
                        path,
                        pages,
                        fetched = items.len(),
                        "Reached page limit, results may be truncated"
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(items)
    }

    async fn fetch_scan_types(&self, path: &str) -> Result<Vec<String>> {
        let listing: Listing<serde_json::Value> =
            self.send_json(self.get(&self.api_url(path))).await?;

        Ok(listing
            .into_items()
            .iter()
            .filter_map(|item| {
                item.get("scan_type_name")
                    .or_else(|| item.get("name"))
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .collect())
    }
}

#[async_trait]
impl DefectDojoApi for DefectDojoClient {
    async fn list_resource(&self, kind: ResourceKind) -> Vec<NamedResource> {
        match self.collect_pages(&format!("{}/", kind.endpoint()), &[]).await {
            Ok(resources) => resources,
            Err(e) => {
                error!(kind = kind.label(), error = %e, "Failed to retrieve resource list");
                Vec::new()
            }
        }
    }

    async fn get_engagement(&self, id: i64) -> Option<Engagement> {
        info!(engagement_id = id, "Retrieving engagement");
        let url = self.api_url(&format!("engagements/{}/", id));

        match self.send_json::<Engagement>(self.get(&url)).await {
            Ok(engagement) => Some(engagement),
            Err(e) => {
                error!(engagement_id = id, error = %e, "Failed to retrieve engagement");
                None
            }
        }
    }

    async fn get_product(&self, id: i64) -> Option<Product> {
        info!(product_id = id, "Retrieving product");
        let url = self.api_url(&format!("products/{}/", id));

        match self.send_json::<Product>(self.get(&url)).await {
            Ok(product) => Some(product),
            Err(e) => {
                error!(product_id = id, error = %e, "Failed to retrieve product");
                None
            }
        }
    }

    async fn create_test(&self, fields: &NewTest) -> Option<Test> {
        info!(title = %fields.title, "Creating new test");
        debug!(payload = ?fields, "Test creation data");

        let response = self
            .client
            .post(self.api_url("tests/"))
            .header(AUTHORIZATION, self.authorization())
            .json(fields)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Test creation request failed");
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Failed to create test");
            return None;
        }

        match response.json::<Test>().await {
            Ok(test) => {
                info!(test_id = test.id, "Created test");
                Some(test)
            }
            Err(e) => {
                error!(error = %e, "Failed to parse created test");
                None
            }
        }
    }

    async fn upload_report(
        &self,
        request: &UploadRequest,
    ) -> std::result::Result<ImportResult, UploadFailure> {
        let path = &request.report_file;
        info!(
            file = %path.display(),
            scan_type = %request.scan_type,
            "Uploading findings"
        );

        let content = tokio::fs::read(path).await.map_err(|e| {
            error!(file = %path.display(), error = %e, "Report file not readable");
            UploadFailure {
                status: None,
                message: format!("Report file not readable: {}: {}", path.display(), e),
            }
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());

        let mut form = multipart::Form::new()
            .part("file", multipart::Part::bytes(content).file_name(file_name))
            .text("scan_type", request.scan_type.clone());
        for (key, value) in request.options.form_fields() {
            form = form.text(key, value);
        }

        let endpoint = self.api_url("import-scan/");
        debug!(endpoint = %endpoint, fields = ?request.options.form_fields(), "Upload data");

        let response = self
            .client
            .post(&endpoint)
            .header(AUTHORIZATION, self.authorization())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "Error uploading report");
                UploadFailure {
                    status: e.status().map(|s| s.as_u16()),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "Upload response");

        if status != StatusCode::OK && status != StatusCode::CREATED {
            warn!(status = %status, body = %body, "Upload rejected");
            return Err(UploadFailure {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        serde_json::from_str::<ImportResult>(&body).map_err(|e| UploadFailure {
            status: Some(status.as_u16()),
            message: format!("Failed to parse import response: {}", e),
        })
    }

    async fn list_findings(&self, filter: &FindingsFilter) -> Result<Vec<Finding>> {
        let mut query = vec![("limit", self.config.findings_page_size.to_string())];
        if filter.exclude_false_positives {
            query.push(("false_p", "false".to_string()));
        }
        if let Some(product_id) = filter.product_id {
            query.push(("test__engagement__product", product_id.to_string()));
        }

        let findings: Vec<Finding> = self.collect_pages("findings/", &query).await?;
        debug!(
            product_id = ?filter.product_id,
            count = findings.len(),
            "Retrieved findings from DefectDojo"
        );
        Ok(findings)
    }

    async fn list_scan_types(&self) -> Vec<String> {
        for endpoint in SCAN_TYPE_ENDPOINTS {
            info!(endpoint, "Trying to get scan types");
            match self.fetch_scan_types(endpoint).await {
                Ok(scan_types) if !scan_types.is_empty() => {
                    info!(endpoint, count = scan_types.len(), "Retrieved scan types");
                    return scan_types;
                }
                Ok(_) => debug!(endpoint, "Endpoint returned no scan types"),
                Err(e) => warn!(endpoint, error = %e, "Failed to retrieve scan types"),
            }
        }

        error!("Failed to retrieve scan types from all endpoints");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trailing_slashes() {
        assert_eq!(
            normalize_base_url("https://dojo.example.com///").unwrap(),
            "https://dojo.example.com"
        );
    }

    #[test]
    fn test_normalize_strips_api_prefix() {
        assert_eq!(
            normalize_base_url("https://dojo.example.com/api/v2/").unwrap(),
            "https://dojo.example.com"
        );
        assert_eq!(
            normalize_base_url(" http://10.0.0.5:8080/dojo/api/v2 ").unwrap(),
            "http://10.0.0.5:8080/dojo"
        );
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("   /  ").is_err());
        assert!(normalize_base_url("dojo.example.com").is_err());
        assert!(normalize_base_url("ftp://dojo.example.com").is_err());
    }

    #[test]
    fn test_upload_failure_marker() {
        let failure = UploadFailure {
            status: Some(400),
            message: r#"{"message": "product_name parameter missing"}"#.to_string(),
        };
        assert!(failure.is_missing_product_name());

        let other = UploadFailure {
            status: Some(400),
            message: "scan_type is invalid".to_string(),
        };
        assert!(!other.is_missing_product_name());
    }

    #[test]
    fn test_upload_failure_into_error() {
        let err: DojoError = UploadFailure {
            status: Some(500),
            message: "oops".to_string(),
        }
        .into();
        assert!(matches!(err, DojoError::Upload { status: Some(500), .. }));
    }

    #[test]
    fn test_form_fields_defaults() {
        let fields = ImportOptions::default().form_fields();
        assert!(fields.contains(&("active", "true".to_string())));
        assert!(fields.contains(&("verified", "false".to_string())));
        assert!(fields.contains(&("close_old_findings", "false".to_string())));
        assert!(fields.contains(&("push_to_jira", "false".to_string())));
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_form_fields_engagement_suppresses_name_approach() {
        let options = ImportOptions {
            engagement: Some(12),
            product_name: Some("webapp".to_string()),
            engagement_name: Some("ci".to_string()),
            auto_create_context: true,
            ..Default::default()
        };
        let fields = options.form_fields();
        assert!(fields.contains(&("engagement", "12".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "product_name"));
        assert!(!fields.iter().any(|(k, _)| *k == "auto_create_context"));
    }

    #[test]
    fn test_form_fields_test_and_product_metadata() {
        let options = ImportOptions {
            test: Some(5),
            product_id: Some(3),
            product_name: Some("webapp".to_string()),
            minimum_severity: Some(Severity::Medium),
            tags: vec!["ci".to_string(), "nightly".to_string()],
            ..Default::default()
        };
        let fields = options.form_fields();
        assert!(fields.contains(&("test", "5".to_string())));
        assert!(fields.contains(&("product_id", "3".to_string())));
        assert!(fields.contains(&("product_name", "webapp".to_string())));
        assert!(fields.contains(&("minimum_severity", "Medium".to_string())));
        assert_eq!(fields.iter().filter(|(k, _)| *k == "tags").count(), 2);
    }

    #[test]
    fn test_form_fields_skip_empty_strings() {
        let options = ImportOptions {
            build_id: Some(String::new()),
            ..Default::default()
        };
        assert!(!options.form_fields().iter().any(|(k, _)| *k == "build_id"));
    }

    #[test]
    fn test_new_normalizes_base_url() {
        let config = Config {
            base_url: "https://dojo.example.com/api/v2/".to_string(),
            api_key: "key".to_string(),
            ..Default::default()
        };
        let client = DefectDojoClient::new(config).unwrap();
        assert_eq!(client.base_url(), "https://dojo.example.com");
        assert_eq!(
            client.api_url("tests/"),
            "https://dojo.example.com/api/v2/tests/"
        );
    }

    #[test]
    fn test_next_page_url_keeps_configured_origin() {
        let config = Config {
            base_url: "https://dojo.example.com/dojo".to_string(),
            api_key: "key".to_string(),
            ..Default::default()
        };
        let client = DefectDojoClient::new(config).unwrap();

        assert_eq!(
            client
                .next_page_url("http://10.1.2.3:8080/dojo/api/v2/findings/?limit=1000&offset=1000")
                .as_deref(),
            Some("https://dojo.example.com/dojo/api/v2/findings/?limit=1000&offset=1000")
        );
        assert_eq!(
            client
                .next_page_url("/dojo/api/v2/test_types/?offset=25")
                .as_deref(),
            Some("https://dojo.example.com/dojo/api/v2/test_types/?offset=25")
        );
    }

    #[test]
    fn test_new_rejects_missing_key() {
        let config = Config {
            base_url: "https://dojo.example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            DefectDojoClient::new(config),
            Err(DojoError::Config(_))
        ));
    }

    #[test]
    fn test_filter_for_product() {
        let filter = FindingsFilter::for_product(Some(4));
        assert_eq!(filter.product_id, Some(4));
        assert!(filter.exclude_false_positives);
    }
}
