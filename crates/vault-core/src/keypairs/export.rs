//! Public key export types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::KeypairStatus;

/// One entry of the exported JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    /// Key id
    pub kid: u32,
    /// X25519 public key, base64
    pub public_key: String,
    /// Status at export time
    pub status: KeypairStatus,
    /// Version label
    pub version: String,
}

/// What to do when the export destination already exists.
pub enum ExportPolicy<'a> {
    /// Replace the file
    Overwrite,
    /// Leave the file alone and report [`ExportOutcome::Skipped`]
    SkipIfExists,
    /// Ask the callback; `false` leaves the file alone
    Confirm(Box<dyn FnOnce(&Path) -> bool + 'a>),
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// File written with this many records
    Written {
        /// Destination path
        path: PathBuf,
        /// Number of exported keys
        count: usize,
    },
    /// Destination existed and policy said skip
    Skipped,
    /// Destination existed and the confirmation was declined
    Declined,
}
