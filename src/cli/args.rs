//! CLI arguments for the DefectDojo CI/CD integration.
//!
//! Connection settings are layered: optional YAML config file, then
//! environment variables, then explicit flags.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::models::defectdojo::Severity;
use crate::models::gate::ThresholdPolicy;

/// DefectDojo integration for CI/CD pipelines
#[derive(Parser, Debug)]
#[command(name = "dojo-gate")]
#[command(
    about = "Import scan reports into DefectDojo and gate builds on findings",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// DefectDojo host URL (can also be set via DEFECTDOJO_URL env var)
    #[arg(long, env = "DEFECTDOJO_URL", global = true)]
    pub host: Option<String>,

    /// DefectDojo API key (can also be set via DEFECTDOJO_API_KEY env var)
    #[arg(long, env = "DEFECTDOJO_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Disable TLS certificate verification
    #[arg(long, global = true)]
    pub no_verify_ssl: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Output format (json, text)
    #[arg(long, default_value = "text", value_parser = ["text", "json"], global = true)]
    pub format: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Test connection to DefectDojo
    Test,

    /// List available environments
    ListEnvironments,

    /// List available test types
    ListTestTypes,

    /// List available scan types
    ListScanTypes,

    /// Create a test in an engagement and import a report into it
    Import {
        /// Path to the scan report file
        #[arg(long)]
        report_file: PathBuf,

        /// Type of security scan (e.g., "ZAP Scan", "Trivy Scan")
        #[arg(long)]
        scan_type: String,

        /// ID of the engagement
        #[arg(long)]
        engagement_id: i64,

        /// Test type name or ID
        #[arg(long)]
        test_type: String,

        /// Environment name or ID
        #[arg(long, default_value = "Development")]
        environment: String,

        /// ID of the product (required by some DefectDojo installations)
        #[arg(long)]
        product_id: Option<i64>,

        /// Name of the product (required by some DefectDojo installations)
        #[arg(long)]
        product_name: Option<String>,

        /// CI/CD build ID
        #[arg(long)]
        build_id: Option<String>,

        /// Git branch name
        #[arg(long)]
        branch_name: Option<String>,

        /// Close findings not present in this report
        #[arg(long)]
        close_old_findings: bool,

        /// Push new findings to JIRA
        #[arg(long)]
        push_to_jira: bool,

        /// Do not validate the scan type against the server's list
        #[arg(long)]
        skip_scan_type_check: bool,
    },

    /// Import a report directly, by engagement ID or by names
    ImportScan(ImportScanArgs),

    /// Fail when findings exceed the severity thresholds
    Check {
        /// Only count findings of this product
        #[arg(long)]
        product: Option<i64>,

        /// Maximum tolerated high findings
        #[arg(long)]
        high_max: Option<u32>,

        /// Maximum tolerated medium findings
        #[arg(long)]
        medium_max: Option<u32>,
    },
}

#[derive(clap::Args, Debug)]
pub struct ImportScanArgs {
    /// Path to the scan report file
    #[arg(long)]
    pub file: PathBuf,

    /// Type of scan report (e.g., "ZAP Scan")
    #[arg(long)]
    pub scan_type: String,

    /// ID of the engagement
    #[arg(long, help_heading = "ID approach")]
    pub engagement: Option<i64>,

    /// Name of the product
    #[arg(long, help_heading = "Name approach")]
    pub product_name: Option<String>,

    /// Name of the engagement
    #[arg(long, help_heading = "Name approach")]
    pub engagement_name: Option<String>,

    /// Name of the product type
    #[arg(long, help_heading = "Name approach")]
    pub product_type_name: Option<String>,

    /// Auto create engagements, products and product types
    #[arg(long, help_heading = "Name approach")]
    pub auto_create_context: bool,

    /// Restrict deduplication to the engagement
    #[arg(long, help_heading = "Name approach")]
    pub deduplication_on_engagement: bool,

    /// Scan completion date (YYYY-MM-DD)
    #[arg(long)]
    pub scan_date: Option<String>,

    /// Minimum severity level to be imported
    #[arg(long)]
    pub minimum_severity: Option<Severity>,

    /// Import findings as inactive
    #[arg(long)]
    pub inactive: bool,

    /// Force findings to be verified
    #[arg(long)]
    pub verified: bool,

    /// ID of an endpoint to associate with findings
    #[arg(long)]
    pub endpoint_to_add: Option<i64>,

    /// Title for the test
    #[arg(long)]
    pub test_title: Option<String>,

    /// ID of the build that was scanned
    #[arg(long)]
    pub build_id: Option<String>,

    /// Branch or tag that was scanned
    #[arg(long)]
    pub branch_tag: Option<String>,

    /// Commit that was scanned
    #[arg(long)]
    pub commit_hash: Option<String>,

    /// Tag to apply to the test (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Environment name
    #[arg(long)]
    pub environment: Option<String>,

    /// Version that was scanned
    #[arg(long)]
    pub version: Option<String>,

    /// Service name
    #[arg(long)]
    pub service: Option<String>,

    /// Source code management URI
    #[arg(long)]
    pub source_code_management_uri: Option<String>,

    /// End date of an auto-created engagement (YYYY-MM-DD)
    #[arg(long)]
    pub engagement_end_date: Option<String>,

    /// User ID of the lead
    #[arg(long)]
    pub lead: Option<i64>,

    /// Close findings not present in this report
    #[arg(long)]
    pub close_old_findings: bool,

    /// Push new findings to JIRA
    #[arg(long)]
    pub push_to_jira: bool,
}

/// Configuration loaded from YAML file
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub defectdojo: Option<ConnectionSection>,
    pub thresholds: Option<ThresholdPolicy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub verify_ssl: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub findings_page_size: Option<u32>,
    pub max_pages: Option<u32>,
}

impl FileConfig {
    /// Load config from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FileConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Merge CLI args (and the env vars clap read for them) over the file
    pub fn merge_with_cli(&mut self, cli: &Cli) {
        let section = self.defectdojo.get_or_insert_with(ConnectionSection::default);

        if let Some(ref host) = cli.host {
            section.url = Some(host.clone());
        }
        if let Some(ref api_key) = cli.api_key {
            section.api_key = Some(api_key.clone());
        }
        if cli.no_verify_ssl {
            section.verify_ssl = Some(false);
        }
        if let Some(timeout) = cli.timeout {
            section.timeout_secs = Some(timeout);
        }
    }

    /// Resolved connection settings, falling back to defaults
    pub fn connection(&self) -> Config {
        let defaults = Config::default();
        let Some(section) = self.defectdojo.as_ref() else {
            return defaults;
        };

        Config {
            base_url: section.url.clone().unwrap_or_default(),
            api_key: section.api_key.clone().unwrap_or_default(),
            verify_ssl: section.verify_ssl.unwrap_or(defaults.verify_ssl),
            timeout_secs: section.timeout_secs.unwrap_or(defaults.timeout_secs),
            findings_page_size: section
                .findings_page_size
                .unwrap_or(defaults.findings_page_size),
            max_pages: section.max_pages.unwrap_or(defaults.max_pages),
        }
    }

    /// Threshold policy from the file, with per-run overrides applied
    pub fn threshold_policy(&self, high_max: Option<u32>, medium_max: Option<u32>) -> ThresholdPolicy {
        let mut policy = self.thresholds.unwrap_or_default();
        if let Some(high_max) = high_max {
            policy.high_max = high_max;
        }
        if let Some(medium_max) = medium_max {
            policy.medium_max = medium_max;
        }
        policy
    }
}

/// Print message based on output format
pub fn output(format: &str, message: &str, json_value: Option<serde_json::Value>) {
    match format {
        "json" => {
            let value = json_value.unwrap_or_else(|| serde_json::json!({ "message": message }));
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_default()
            );
        }
        _ => {
            println!("{}", message);
        }
    }
}

/// Print error message
pub fn error(format: &str, message: &str) {
    eprintln!("{}", error_line(format, message));
}

/// Error message as printed for the given output format
pub fn error_line(format: &str, message: &str) -> String {
    match format {
        "json" => serde_json::json!({ "error": message }).to_string(),
        _ => format!("Error: {}", message),
    }
}

/// Format a `name (ID: n)` listing line
pub fn listing_line(name: &str, id: i64) -> String {
    format!("  - {} (ID: {})", name, id)
}

/// Where to look up the API when a listing comes back empty
pub fn swagger_hint(base_url: &str) -> String {
    format!(
        "You may need to check the API endpoints in the DefectDojo swagger docs. Try visiting: {}/api/v2/oa3/swagger-ui/",
        base_url.trim_end_matches('/')
    )
}
