//! ReelCull Color - LUT looks and the per-frame render path.

pub mod error;
pub mod graph;
pub mod lut;
pub mod transform;

pub use error::ColorError;
pub use graph::{
    apply_to_still, build_render_graph, Extent, RenderGraph, RenderStage, StreamGeometry,
    StreamGeometrySource,
};
pub use lut::Lut3D;
pub use transform::{resolve_transform, ColorTransform, LutCatalog, LutResource, TransformResolver};
