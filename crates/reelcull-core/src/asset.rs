//! Clip assets as the review pass sees them.
//!
//! An asset is one clip in the batch: where it lives (an opaque
//! locator the media layer resolves), the reviewer's trim window, and
//! the keep/delete flag. Scanning directories into assets happens
//! upstream of this crate.

use crate::trim::TrimBounds;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a clip across the review session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(Uuid);

impl AssetId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a clip's bytes. The media layer decides what it
/// means (an in-memory fixture, a file path, later a sidecar stream);
/// nothing else may look inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocator(String);

impl SourceLocator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a stored colour transform in the look catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformId(String);

impl TransformId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One clip in the review batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: AssetId,
    /// Display name in the clip list
    pub label: String,
    pub locator: SourceLocator,
    pub trim: TrimBounds,
    /// Marked for the post-review action (delete or import)
    pub flagged: bool,
}

impl MediaAsset {
    /// A fresh asset covering the whole clip, unflagged.
    pub fn new(label: impl Into<String>, locator: SourceLocator) -> Self {
        Self {
            id: AssetId::new(),
            label: label.into(),
            locator,
            trim: TrimBounds::FULL,
            flagged: false,
        }
    }
}
