//! Adapters behind the engine's collaborator traits.
//!
//! - [`CommandDeidentifier`] runs an external de-identification tool
//! - [`S3Uploader`] stores artifacts with the AWS SDK, retrying with
//!   exponential backoff

mod command;
mod error;
mod retry;
mod s3;

pub use command::{CommandDeidentifier, DESTINATION_PLACEHOLDER, SOURCE_PLACEHOLDER};
pub use error::ExternalError;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use s3::{MULTIPART_THRESHOLD, S3Uploader};
