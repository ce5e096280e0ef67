//! Manifest ingestion.
//!
//! # Features
//!
//! - **Manifest Reader**: parse and validate the slide manifest CSV, reporting
//!   every invalid row at once
//! - **Destination Naming**: pluggable, explicitly specified file naming
//! - **Derived Builder**: map rows to `source`/`destination` pairs and reject
//!   collisions
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use deid_ingest::{HashedNaming, plan_work_items, read_manifest};
//!
//! let rows = read_manifest(Path::new("manifest.csv"))?;
//! let items = plan_work_items(&rows, Path::new("out"), &HashedNaming::default())?;
//! ```

mod derived;
mod error;
mod manifest;
mod naming;

pub use derived::{SLIDE_DIR, SourceDestination, build_source_destinations, plan_work_items};
pub use error::{Collision, CollisionError, ManifestError, RowIssue};
pub use manifest::{read_manifest, read_manifest_from, resolve_location};
pub use naming::{DestinationNaming, HashedNaming};
