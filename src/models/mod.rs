//! Data models.

pub mod defectdojo;
pub mod gate;
