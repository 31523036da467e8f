//! Chunk stitching
//!
//! Chunks are drawn top to bottom at their recorded offsets, left-aligned.
//! A chunk narrower than the widest one leaves the rest of its rows
//! transparent.

use crate::capture::sections::Chunk;
use crate::error::CaptureError;
use image::{imageops, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// The final composed screenshot
#[derive(Debug, Clone)]
pub struct StitchedImage {
    /// Width of the widest chunk
    pub width: u32,
    /// Sum of chunk heights
    pub height: u32,
    /// PNG-encoded pixels
    pub png: Vec<u8>,
}

/// Composes chunks into one image
pub struct Stitcher;

impl Stitcher {
    /// Draw `chunks` onto a single canvas
    pub fn compose(chunks: &[Chunk]) -> Result<RgbaImage, CaptureError> {
        if chunks.is_empty() {
            return Err(CaptureError::NoChunksCaptured);
        }

        let width = chunks.iter().map(Chunk::width).max().unwrap_or(0);
        let height = chunks
            .iter()
            .map(|c| c.vertical_offset + c.height())
            .max()
            .unwrap_or(0);

        let mut canvas = RgbaImage::new(width, height);
        for chunk in chunks {
            imageops::replace(&mut canvas, &chunk.pixels, 0, chunk.vertical_offset as i64);
        }
        Ok(canvas)
    }

    /// Encode a canvas as PNG
    pub fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, CaptureError> {
        let mut buffer = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        Ok(buffer)
    }

    /// Compose and encode `chunks`
    pub fn stitch(chunks: &[Chunk]) -> Result<StitchedImage, CaptureError> {
        let canvas = Self::compose(chunks)?;
        let png = Self::encode_png(&canvas)?;
        debug!(
            "Stitched {} chunks into {}x{} ({} bytes)",
            chunks.len(),
            canvas.width(),
            canvas.height(),
            png.len()
        );
        Ok(StitchedImage {
            width: canvas.width(),
            height: canvas.height(),
            png,
        })
    }
}
