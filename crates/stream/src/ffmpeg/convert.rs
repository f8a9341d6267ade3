//! Native-format to packed-pixel conversion.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::frame::{Geometry, PackedFormat};

pub fn pixel_for(format: PackedFormat) -> Pixel {
    match format {
        PackedFormat::Bgra => Pixel::BGRA,
        PackedFormat::Rgba => Pixel::RGBA,
        PackedFormat::Rgb24 => Pixel::RGB24,
    }
}

/// Allocate a zeroed buffer of exactly `len` bytes, reporting failure
/// instead of aborting.
pub fn alloc_scratch(len: usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Err(EngineError::BufferAllocFailed("zero-sized frame".into()));
    }
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| EngineError::BufferAllocFailed(format!("{len} bytes: {e}")))?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Copy `height` rows of `row_bytes` each out of a strided plane into a
/// tightly packed buffer.
pub fn pack_rows(src: &[u8], stride: usize, row_bytes: usize, height: usize, dst: &mut [u8]) {
    if stride == row_bytes {
        dst[..row_bytes * height].copy_from_slice(&src[..row_bytes * height]);
        return;
    }
    for (y, out) in dst.chunks_exact_mut(row_bytes).take(height).enumerate() {
        let start = y * stride;
        out.copy_from_slice(&src[start..start + row_bytes]);
    }
}

/// Scaler plus its output frame and the packed scratch buffer.
///
/// All three are reused for every frame of the session.
pub struct PixelConverter {
    packed: Option<Vec<u8>>,
    scaler: Option<ScalingContext>,
    converted: Option<VideoFrame>,
    geometry: Geometry,
    format: PackedFormat,
}

impl PixelConverter {
    pub fn new(source: Pixel, geometry: Geometry, format: PackedFormat) -> Result<Self> {
        if geometry.is_empty() {
            return Err(EngineError::ConversionContextFailed(format!(
                "invalid geometry {}x{}",
                geometry.width, geometry.height
            )));
        }
        if source == Pixel::None {
            return Err(EngineError::ConversionContextFailed(
                "decoder reported no pixel format".into(),
            ));
        }

        let target = pixel_for(format);
        let scaler = ScalingContext::get(
            source,
            geometry.width,
            geometry.height,
            target,
            geometry.width,
            geometry.height,
            ScalingFlags::FAST_BILINEAR,
        )
        .map_err(|e| EngineError::ConversionContextFailed(e.to_string()))?;

        let converted = VideoFrame::new(target, geometry.width, geometry.height);
        let packed = alloc_scratch(geometry.byte_len(format))?;

        debug!(?source, ?target, width = geometry.width, height = geometry.height, "converter ready");
        Ok(Self {
            packed: Some(packed),
            scaler: Some(scaler),
            converted: Some(converted),
            geometry,
            format,
        })
    }

    /// Convert `frame` and return the packed pixels. The slice is only valid
    /// until the next call.
    pub fn convert(&mut self, frame: &VideoFrame) -> Result<&[u8]> {
        let (Some(scaler), Some(converted), Some(packed)) =
            (self.scaler.as_mut(), self.converted.as_mut(), self.packed.as_mut())
        else {
            return Err(EngineError::DecodeFailed("converter already released".into()));
        };

        scaler
            .run(frame, converted)
            .map_err(|e| EngineError::DecodeFailed(format!("conversion failed: {e}")))?;

        let row_bytes = self.geometry.width as usize * self.format.bytes_per_pixel();
        pack_rows(
            converted.data(0),
            converted.stride(0),
            row_bytes,
            self.geometry.height as usize,
            packed,
        );
        Ok(packed.as_slice())
    }

    /// Release the scratch buffer, then the scaler, then its output frame.
    pub fn release(&mut self) {
        if self.packed.take().is_some() {
            debug!("released packed buffer");
        }
        if self.scaler.take().is_some() {
            debug!("released conversion context");
        }
        self.converted = None;
    }
}

impl Drop for PixelConverter {
    fn drop(&mut self) {
        self.release();
    }
}
