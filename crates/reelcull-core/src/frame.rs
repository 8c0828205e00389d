//! Display-ready RGBA frame buffers.
//!
//! Everything past the decoder works on tightly packed 8-bit RGBA: the
//! render path, the preview cache, and the capture surfaces used in
//! tests. Planar decode formats stay inside the media layer.

use crate::color::Color;
use std::sync::Arc;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A single decoded frame, 8-bit RGBA, tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a zeroed (transparent black) frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// Create a frame filled with a single color.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let mut frame = Self::new(width, height);
        let px = color.to_rgba8();
        for chunk in frame.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&px);
        }
        frame
    }

    /// An opaque black frame.
    pub fn black(width: u32, height: u32) -> Self {
        Self::solid(width, height, Color::BLACK)
    }

    /// The frame shown when a source cannot be opened: a dark slate
    /// with a one-pixel border so it reads as "missing", not "black".
    pub fn poster(width: u32, height: u32) -> Self {
        let mut frame = Self::solid(width, height, Color::rgb(0.09, 0.09, 0.11));
        let border = Color::rgb(0.35, 0.35, 0.4);
        for x in 0..width {
            frame.set_pixel(x, 0, border);
            frame.set_pixel(x, height.saturating_sub(1), border);
        }
        for y in 0..height {
            frame.set_pixel(0, y, border);
            frame.set_pixel(width.saturating_sub(1), y, border);
        }
        frame
    }

    /// Row stride in bytes.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Raw pixel data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw pixel data.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One row of pixels.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let offset = y as usize * stride;
        &self.data[offset..offset + stride]
    }

    /// One mutable row of pixels.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let offset = y as usize * stride;
        &mut self.data[offset..offset + stride]
    }

    /// Read a pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Color::from_rgba8(px[0], px[1], px[2], px[3])
    }

    /// Write a pixel.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&color.to_rgba8());
    }

    /// Bytes held by this frame.
    #[inline]
    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Frames are shared immutably once decoded.
pub type SharedFrame = Arc<FrameBuffer>;
