//! Decoder setup for the selected video stream.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::threading;
use ffmpeg_next::ffi;
use ffmpeg_next::format::stream::Stream;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::frame::Geometry;

/// Open a low-latency, frame-threaded decoder for `stream`.
///
/// Returns the decoder together with the geometry it reports.
pub fn open_decoder(stream: &Stream<'_>, threads: usize) -> Result<(ffmpeg::decoder::Video, Geometry)> {
    let parameters = stream.parameters();
    let codec_id = parameters.id();
    let codec = ffmpeg::decoder::find(codec_id)
        .ok_or_else(|| EngineError::UnsupportedCodec(format!("{codec_id:?}")))?;

    let mut context = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|e| EngineError::CodecInitFailed(e.to_string()))?;

    context.set_threading(threading::Config {
        kind: threading::Type::Frame,
        count: threads,
        ..Default::default()
    });
    context.set_flags(ffmpeg::codec::Flags::LOW_DELAY);
    // SAFETY: the context is exclusively owned here and not yet opened.
    unsafe {
        (*context.as_mut_ptr()).flags2 |= ffi::AV_CODEC_FLAG2_FAST as i32;
    }

    let decoder = context
        .decoder()
        .open_as(codec)
        .and_then(|opened| opened.video())
        .map_err(|e| EngineError::CodecInitFailed(e.to_string()))?;

    let geometry = Geometry::new(decoder.width(), decoder.height());
    debug!(
        codec = codec.name(),
        width = geometry.width,
        height = geometry.height,
        pixel_format = ?decoder.format(),
        threads,
        "decoder opened"
    );
    Ok((decoder, geometry))
}
