//! dojo-gate - DefectDojo integration for CI/CD pipelines.
//!
//! Imports scan reports into DefectDojo and gates builds on the resulting
//! finding counts.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{DojoError, Result};
