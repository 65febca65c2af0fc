//! CLI modules for the DefectDojo integration.

pub mod args;
pub mod runner;

pub use args::{Cli, Command, FileConfig};
pub use runner::run;
