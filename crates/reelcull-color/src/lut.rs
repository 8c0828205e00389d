//! 3D colour look-up tables.
//!
//! Looks arrive as already-parsed tables (the catalog owns whatever
//! import produced them); this module only stores and samples them. A
//! LUT is a pure per-pixel remap with no temporal state.

use crate::error::ColorError;
use glam::Vec3;
use reelcull_core::Color;

/// 3D Look-Up Table over the unit RGB cube.
#[derive(Debug, Clone)]
pub struct Lut3D {
    size: usize,
    data: Vec<Vec3>,
    domain_min: Vec3,
    domain_max: Vec3,
}

impl Lut3D {
    /// Smallest lattice that can interpolate.
    pub const MIN_SIZE: usize = 2;

    /// Build from a flat table in red-fastest order (`r + g*s + b*s*s`),
    /// the layout .cube files use.
    pub fn from_table(size: usize, table: Vec<[f32; 3]>) -> Result<Self, ColorError> {
        if size < Self::MIN_SIZE {
            return Err(ColorError::InvalidLut(format!(
                "lattice size {size} below minimum {}",
                Self::MIN_SIZE
            )));
        }
        let expected = size * size * size;
        if table.len() != expected {
            return Err(ColorError::DimensionMismatch {
                expected,
                got: table.len(),
            });
        }
        Ok(Self {
            size,
            data: table.into_iter().map(Vec3::from_array).collect(),
            domain_min: Vec3::ZERO,
            domain_max: Vec3::ONE,
        })
    }

    /// Build by evaluating `f` at every lattice point. This is how the
    /// demo catalog defines its looks.
    pub fn from_fn(size: usize, f: impl Fn(Vec3) -> Vec3) -> Result<Self, ColorError> {
        if size < Self::MIN_SIZE {
            return Err(ColorError::InvalidLut(format!(
                "lattice size {size} below minimum {}",
                Self::MIN_SIZE
            )));
        }
        let n = (size - 1) as f32;
        let mut data = Vec::with_capacity(size * size * size);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    let input = Vec3::new(r as f32 / n, g as f32 / n, b as f32 / n);
                    data.push(f(input));
                }
            }
        }
        Ok(Self {
            size,
            data,
            domain_min: Vec3::ZERO,
            domain_max: Vec3::ONE,
        })
    }

    /// The identity lattice.
    pub fn identity(size: usize) -> Result<Self, ColorError> {
        Self::from_fn(size, |rgb| rgb)
    }

    /// Lattice points per axis.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sample with trilinear interpolation. Inputs outside the domain
    /// clamp to the lattice edge.
    pub fn sample(&self, rgb: Vec3) -> Vec3 {
        let s = self.size;
        let n = (s - 1) as f32;

        let range = self.domain_max - self.domain_min;
        let t = ((rgb - self.domain_min) / range.max(Vec3::splat(1e-10)))
            .clamp(Vec3::ZERO, Vec3::ONE);
        let coords = t * n;

        let r0 = (coords.x as usize).min(s - 2);
        let g0 = (coords.y as usize).min(s - 2);
        let b0 = (coords.z as usize).min(s - 2);
        let fr = coords.x - r0 as f32;
        let fg = coords.y - g0 as f32;
        let fb = coords.z - b0 as f32;

        let idx = |r: usize, g: usize, b: usize| -> usize { r + g * s + b * s * s };

        let c000 = self.data[idx(r0, g0, b0)];
        let c100 = self.data[idx(r0 + 1, g0, b0)];
        let c010 = self.data[idx(r0, g0 + 1, b0)];
        let c110 = self.data[idx(r0 + 1, g0 + 1, b0)];
        let c001 = self.data[idx(r0, g0, b0 + 1)];
        let c101 = self.data[idx(r0 + 1, g0, b0 + 1)];
        let c011 = self.data[idx(r0, g0 + 1, b0 + 1)];
        let c111 = self.data[idx(r0 + 1, g0 + 1, b0 + 1)];

        let c00 = c000.lerp(c100, fr);
        let c10 = c010.lerp(c110, fr);
        let c01 = c001.lerp(c101, fr);
        let c11 = c011.lerp(c111, fr);
        let c0 = c00.lerp(c10, fg);
        let c1 = c01.lerp(c11, fg);
        c0.lerp(c1, fb)
    }

    /// Remap one pixel, preserving alpha.
    #[inline]
    pub fn remap(&self, color: Color) -> Color {
        let out = self.sample(Vec3::new(color.r, color.g, color.b));
        Color::new(out.x, out.y, out.z, color.a)
    }
}
