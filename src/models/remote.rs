//! Directory entries reported by the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a remote directory entry, rendered the way FTP `LIST` output marks it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    #[serde(rename = "d")]
    Directory,
    #[serde(rename = "-")]
    File,
    #[serde(rename = "l")]
    Symlink,
}

/// A single entry of a remote directory listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    #[serde(rename = "date")]
    pub modified: Option<DateTime<Utc>>,
}
