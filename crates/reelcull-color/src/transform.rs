//! Colour transform values and their resolution.
//!
//! A session never holds a bare transform id at runtime: the id is
//! resolved once (at bind, or per preview request) into a tagged
//! `ColorTransform` value, so the render path has no ambient grading
//! state to consult and nothing to race against.

use crate::lut::Lut3D;
use reelcull_core::TransformId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A resolved, shareable look.
pub type LutResource = Arc<Lut3D>;

/// The grading applied to a stream or still. `None` is the common case
/// and means bit-exact passthrough.
#[derive(Debug, Clone, Default)]
pub enum ColorTransform {
    #[default]
    None,
    Resolved(LutResource),
}

impl ColorTransform {
    /// True when no grading is applied.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The resolved LUT, if any.
    pub fn lut(&self) -> Option<&LutResource> {
        match self {
            Self::None => None,
            Self::Resolved(lut) => Some(lut),
        }
    }
}

/// Where looks come from. Lookups that fail resolve to `None` and the
/// caller degrades to passthrough; resolution is never an error.
pub trait TransformResolver: Send + Sync {
    fn resolve(&self, id: &TransformId) -> Option<LutResource>;
}

/// Resolve an optional id against a resolver, with the degrade-to-
/// passthrough logging every caller wants.
pub fn resolve_transform(
    resolver: &dyn TransformResolver,
    id: Option<&TransformId>,
) -> ColorTransform {
    match id {
        None => ColorTransform::None,
        Some(id) => match resolver.resolve(id) {
            Some(lut) => ColorTransform::Resolved(lut),
            None => {
                debug!(transform = %id, "transform unresolved, using passthrough");
                ColorTransform::None
            }
        },
    }
}

/// In-memory look catalog. Built once at startup, shared read-only.
#[derive(Default)]
pub struct LutCatalog {
    looks: HashMap<TransformId, LutResource>,
}

impl LutCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a look under a name.
    pub fn insert(&mut self, id: TransformId, lut: Lut3D) {
        self.looks.insert(id, Arc::new(lut));
    }

    pub fn len(&self) -> usize {
        self.looks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.looks.is_empty()
    }
}

impl TransformResolver for LutCatalog {
    fn resolve(&self, id: &TransformId) -> Option<LutResource> {
        self.looks.get(id).cloned()
    }
}
