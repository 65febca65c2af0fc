//! Connection configuration for the DefectDojo client.

use crate::error::{DojoError, Result};

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size requested from the findings endpoint
pub const DEFAULT_FINDINGS_PAGE_SIZE: u32 = 1000;

/// Upper bound on pages followed on any list endpoint
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// DefectDojo connection configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the DefectDojo instance (normalized on connect)
    pub base_url: String,

    /// API key sent as `Authorization: Token <key>`
    pub api_key: String,

    /// Whether TLS certificates are verified
    pub verify_ssl: bool,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// `limit` sent to the findings endpoint
    pub findings_page_size: u32,

    /// Maximum number of pages followed on list endpoints
    pub max_pages: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            verify_ssl: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            findings_page_size: DEFAULT_FINDINGS_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl Config {
    /// Check that the values required before any network call are present
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(DojoError::Config(
                "DefectDojo host not set (use --host or DEFECTDOJO_URL)".into(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(DojoError::Config(
                "DefectDojo API key not set (use --api-key or DEFECTDOJO_API_KEY)".into(),
            ));
        }
        if self.findings_page_size == 0 {
            return Err(DojoError::Config(
                "findings_page_size must be greater than zero".into(),
            ));
        }
        if self.max_pages == 0 {
            return Err(DojoError::Config(
                "max_pages must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
