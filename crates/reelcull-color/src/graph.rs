//! Render graph construction and the per-frame CPU render path.
//!
//! The graph is a short stage chain: clamp the working region to the
//! stream extent, remap every pixel through the LUT, crop back to the
//! extent so nothing outside the stream's own pixels is ever written.
//! For a per-pixel remap the clamp and crop stages only bound the
//! region, but keeping them explicit keeps the chain uniform with any
//! spatially padded stage added later.

use crate::lut::Lut3D;
use crate::transform::{ColorTransform, LutResource};
use rayon::prelude::*;
use reelcull_core::frame::{FrameBuffer, BYTES_PER_PIXEL};
use reelcull_core::{defaults, Color, FrameRate};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pixel dimensions of a stream or working region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn of(frame: &FrameBuffer) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self {
            width: self.width.min(other.width),
            height: self.height.min(other.height),
        }
    }
}

/// What the video track reports about itself. Loading this is the slow
/// part of graph construction and runs off the async runtime.
#[derive(Debug, Clone, Copy)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

/// Source of stream geometry, implemented over a decoder by the
/// playback layer and by fixtures in tests.
pub trait StreamGeometrySource: Send + Sync {
    fn geometry(&self) -> reelcull_core::Result<StreamGeometry>;
}

/// One stage of the render chain.
#[derive(Debug, Clone)]
pub enum RenderStage {
    ClampToExtent(Extent),
    ApplyLut(LutResource),
    CropToExtent(Extent),
}

/// The resolved per-frame render path for one stream.
#[derive(Debug, Clone)]
pub struct RenderGraph {
    stages: SmallVec<[RenderStage; 3]>,
    extent: Extent,
    /// Presentation cadence, fixed regardless of the source rate.
    pub output_rate: FrameRate,
}

impl RenderGraph {
    /// The stream extent the graph was built for.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn stages(&self) -> &[RenderStage] {
        &self.stages
    }

    /// Run the stage chain over one frame in place. Pixels outside the
    /// stream extent are never written.
    pub fn process(&self, frame: &mut FrameBuffer) {
        let mut region = Extent::of(frame);
        for stage in &self.stages {
            match stage {
                RenderStage::ClampToExtent(extent) => region = region.intersect(*extent),
                RenderStage::ApplyLut(lut) => remap_region(frame, region, lut),
                RenderStage::CropToExtent(extent) => region = region.intersect(*extent),
            }
        }
    }
}

/// Build the render path for one stream, or `None` for untouched
/// passthrough. `None` is the answer, not a failure: an absent or
/// unresolved transform and an unreadable video track all degrade the
/// same way.
pub async fn build_render_graph(
    source: Arc<dyn StreamGeometrySource>,
    transform: &ColorTransform,
) -> Option<RenderGraph> {
    let lut = match transform {
        ColorTransform::None => {
            debug!("no transform selected, stream renders untouched");
            return None;
        }
        ColorTransform::Resolved(lut) => Arc::clone(lut),
    };

    // First suspension point. A superseding bind drops the future here
    // and the half-built graph simply never exists.
    let geometry = match tokio::task::spawn_blocking(move || source.geometry()).await {
        Ok(Ok(geometry)) => geometry,
        Ok(Err(err)) => {
            warn!(error = %err, "stream geometry unavailable, rendering untouched");
            return None;
        }
        Err(err) => {
            debug!(error = %err, "render graph build interrupted");
            return None;
        }
    };

    let extent = Extent {
        width: geometry.width,
        height: geometry.height,
    };
    let mut stages = SmallVec::new();
    stages.push(RenderStage::ClampToExtent(extent));
    stages.push(RenderStage::ApplyLut(lut));
    stages.push(RenderStage::CropToExtent(extent));

    debug!(
        width = extent.width,
        height = extent.height,
        source_rate = %geometry.frame_rate,
        output_rate = %defaults::OUTPUT_RATE,
        "render graph built"
    );

    Some(RenderGraph {
        stages,
        extent,
        output_rate: defaults::OUTPUT_RATE,
    })
}

/// Grade a still frame. With no transform the input comes back
/// bit-identical; with a resolved LUT every pixel is remapped and
/// alpha is preserved.
pub fn apply_to_still(frame: &FrameBuffer, transform: &ColorTransform) -> FrameBuffer {
    match transform {
        ColorTransform::None => frame.clone(),
        ColorTransform::Resolved(lut) => {
            let mut out = frame.clone();
            let region = Extent::of(&out);
            remap_region(&mut out, region, lut);
            out
        }
    }
}

fn remap_region(frame: &mut FrameBuffer, region: Extent, lut: &Lut3D) {
    let stride = frame.stride();
    let rows = region.height.min(frame.height) as usize;
    let row_bytes = region.width.min(frame.width) as usize * BYTES_PER_PIXEL;
    if stride == 0 || rows == 0 || row_bytes == 0 {
        return;
    }

    frame
        .data_mut()
        .par_chunks_mut(stride)
        .take(rows)
        .for_each(|row| {
            for px in row[..row_bytes].chunks_exact_mut(BYTES_PER_PIXEL) {
                let color = Color::from_rgba8(px[0], px[1], px[2], px[3]);
                px.copy_from_slice(&lut.remap(color).to_rgba8());
            }
        });
}
