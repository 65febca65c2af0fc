//! DefectDojo resource models: engagements, products, tests, imports and findings.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Severity of a finding. Ordered from most severe to least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Info = 4,
}

impl Severity {
    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" | "moderate" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" | "informational" => Some(Severity::Info),
            _ => None,
        }
    }

    /// Spelling used by the DefectDojo API.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

/// Enumerable resource sets that name-or-ID references resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Environment,
    TestType,
}

impl ResourceKind {
    /// API path segment under `/api/v2/`.
    pub fn endpoint(self) -> &'static str {
        match self {
            ResourceKind::Environment => "development_environments",
            ResourceKind::TestType => "test_types",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Environment => "environment",
            ResourceKind::TestType => "test type",
        }
    }
}

/// A user-supplied reference to a resource, either by numeric ID or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Numeric(i64),
    Named(String),
}

impl Reference {
    /// Classify raw input. Only plain digit strings count as numeric.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse::<i64>() {
                return Reference::Numeric(id);
            }
        }
        Reference::Named(raw.to_string())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Numeric(id) => write!(f, "{}", id),
            Reference::Named(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Engagement, fetched only to find its owning product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engagement {
    pub id: i64,
    #[serde(rename = "product")]
    pub product_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
}

/// An entry of an enumerable set such as environments or test types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Test record as returned by the service after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    pub id: i64,
    pub title: Option<String>,
    #[serde(rename = "engagement")]
    pub engagement_id: Option<i64>,
    #[serde(rename = "test_type")]
    pub test_type_id: Option<i64>,
    #[serde(rename = "environment")]
    pub environment_id: Option<i64>,
    #[serde(rename = "target_start")]
    pub start_date: Option<String>,
    #[serde(rename = "target_end")]
    pub end_date: Option<String>,
}

/// Payload for `POST /api/v2/tests/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTest {
    #[serde(rename = "engagement")]
    pub engagement_id: i64,
    #[serde(rename = "test_type")]
    pub test_type_id: i64,
    #[serde(rename = "environment")]
    pub environment_id: i64,
    pub target_start: String,
    pub target_end: String,
    pub title: String,
}

/// Outcome of a successful report upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    #[serde(rename = "id", default)]
    pub import_id: Option<i64>,
    #[serde(rename = "test", default)]
    pub test_id: Option<i64>,
    #[serde(default)]
    pub finding_count: Option<u64>,
}

/// A single finding. Only the fields needed for gating are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "severity_loose")]
    pub severity: Option<Severity>,
    #[serde(rename = "false_p", default)]
    pub is_false_positive: bool,
}

/// Unknown severity labels decode to `None` instead of failing the page.
fn severity_loose<'de, D>(deserializer: D) -> Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Severity::from_str_loose))
}

/// A list endpoint body: either a paginated envelope or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page {
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        next: Option<String>,
        results: Vec<T>,
    },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    /// Server-reported total across all pages, when paginated.
    pub fn total(&self) -> Option<u64> {
        match self {
            Listing::Page { count, .. } => *count,
            Listing::Bare(_) => None,
        }
    }

    pub fn next(&self) -> Option<&str> {
        match self {
            Listing::Page { next, .. } => next.as_deref(),
            Listing::Bare(_) => None,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Page { results, .. } => results,
            Listing::Bare(items) => items,
        }
    }
}
