//! Domain layer for the bacpac archiver.
//!
//! This crate contains:
//! - Domain models (RunParameters, ExportJob, BlobRecord, RunSummary)
//! - The archive error taxonomy
//! - Service traits for the cloud collaborators and the components that
//!   sequence them (identity resolution, provisioning, export, retention)

pub mod error;
pub mod models;
pub mod services;

pub use error::ArchiveError;
