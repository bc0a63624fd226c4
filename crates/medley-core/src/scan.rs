//! Scan types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::record::FieldPolicy;

/// How much of the collection a scan covers, which decides whether the
/// reconciler may infer deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ScanType {
    /// Whole collection, every file re-read.
    Full,
    /// Incremental, but covering every collection folder.
    UpdateScan,
    /// Incremental over a subset of the collection.
    PartialUpdateScan,
}

impl ScanType {
    /// Whether the scan covers the whole known tree, so that directories
    /// it did not confirm can be deleted.
    pub fn covers_whole_tree(self) -> bool {
        matches!(self, Self::Full | Self::UpdateScan)
    }

    /// Whether the worker should run in incremental mode.
    pub fn is_incremental(self) -> bool {
        self != Self::Full
    }

    /// How track fields are merged for this scan.
    pub fn field_policy(self) -> FieldPolicy {
        match self {
            Self::Full => FieldPolicy::Replace,
            Self::UpdateScan | Self::PartialUpdateScan => FieldPolicy::Merge,
        }
    }
}
