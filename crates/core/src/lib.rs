//! Core domain types and shared configuration for tusvault.
//!
//! This crate defines the data model used by every other crate:
//! - Upload identifiers
//! - The upload record (declared size, offset, metadata, concatenation flags)
//! - Application configuration for the blob and record stores

pub mod config;
pub mod error;
pub mod upload;

pub use error::{Error, Result};
pub use upload::{NewUpload, UploadId, UploadInfo};
