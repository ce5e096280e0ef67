//! Destination file naming.

use deid_model::ManifestRow;
use sha2::{Digest, Sha256};

/// Produces the de-identified file name for a manifest row.
///
/// Implementations must be deterministic: the same row always yields the
/// same name, across runs and machines. Distinct `(rid, specnum, stain)`
/// triples should yield distinct names; collisions are still detected by
/// the derived builder.
pub trait DestinationNaming: Send + Sync {
    fn file_name(&self, row: &ManifestRow) -> String;
}

/// Default naming: `svs_` followed by the first 16 hex digits of
/// `sha256("rid|specnum|stain")`, with an `.svs` extension.
///
/// Neither the original file name nor any identifier appears in the
/// result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedNaming {
    prefix: String,
    digest_len: usize,
    extension: String,
}

impl HashedNaming {
    pub fn new(prefix: impl Into<String>, digest_len: usize, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            digest_len: digest_len.clamp(8, 64),
            extension: extension.into(),
        }
    }

    fn digest(&self, row: &ManifestRow) -> String {
        let key = format!("{}|{}|{}", row.rid, row.specnum_formatted, row.stain_or_empty());
        let mut digest = hex::encode(Sha256::digest(key.as_bytes()));
        digest.truncate(self.digest_len);
        digest
    }
}

impl Default for HashedNaming {
    fn default() -> Self {
        Self::new("svs_", 16, "svs")
    }
}

impl DestinationNaming for HashedNaming {
    fn file_name(&self, row: &ManifestRow) -> String {
        format!("{}{}.{}", self.prefix, self.digest(row), self.extension)
    }
}
