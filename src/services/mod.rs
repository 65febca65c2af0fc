//! DefectDojo services.

pub mod defectdojo_client;
pub mod identifier_resolver;
pub mod scan_import_service;
pub mod threshold_service;
