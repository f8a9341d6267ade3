//! Transport and container probing.

use std::ffi::CString;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::media::Type as MediaType;
use ffmpeg_next::Dictionary;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Demuxer/protocol options for a low-latency live open.
pub fn low_latency_options(config: &EngineConfig) -> Vec<(&'static str, String)> {
    let timeout_us = config.connect_timeout().as_micros();
    vec![
        ("rtsp_transport", config.transport.as_str().to_string()),
        ("timeout", timeout_us.to_string()),
        ("max_delay", config.max_delay_us.to_string()),
        ("fflags", "nobuffer".to_string()),
        ("flags", "low_delay".to_string()),
        ("analyzeduration", config.analyze_duration_us.to_string()),
        ("skip_frame", "default".to_string()),
    ]
}

/// Normalize a caller-supplied URL; blank input is rejected.
pub fn normalize_url(url: &str) -> Result<&str> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(EngineError::open_failed(url, "URL is empty"));
    }
    Ok(trimmed)
}

/// Open `url`, read its stream info and pick the video stream.
///
/// Returns the container and the index of the best video stream. The
/// container is closed again on every failure path.
pub fn open_input(url: &str, config: &EngineConfig) -> Result<(Input, usize)> {
    let c_url = CString::new(url)
        .map_err(|_| EngineError::open_failed(url, "URL contains an interior NUL byte"))?;

    let mut options = Dictionary::new();
    for (key, value) in low_latency_options(config) {
        options.set(key, &value);
    }

    let input = unsafe {
        let mut ps = ptr::null_mut();
        let mut opts = options.disown();
        let res = ffi::avformat_open_input(&mut ps, c_url.as_ptr(), ptr::null_mut(), &mut opts);
        // Options the demuxer did not consume come back here.
        let leftover = Dictionary::own(opts);
        let unused: Vec<&str> = leftover.iter().map(|(k, _)| k).collect();
        if !unused.is_empty() {
            debug!(?unused, "options not consumed by demuxer");
        }
        if res < 0 {
            // avformat_open_input frees the context on failure.
            return Err(EngineError::open_failed(url, ffmpeg::Error::from(res).to_string()));
        }

        let res = ffi::avformat_find_stream_info(ps, ptr::null_mut());
        if res < 0 {
            ffi::avformat_close_input(&mut ps);
            return Err(EngineError::StreamInfoUnavailable(
                ffmpeg::Error::from(res).to_string(),
            ));
        }

        Input::wrap(ps)
    };

    let stream_index = match input.streams().best(MediaType::Video) {
        Some(stream) => stream.index(),
        None => {
            warn!(url, streams = input.streams().count(), "source has no video stream");
            return Err(EngineError::NoVideoStream);
        }
    };

    debug!(url, stream_index, format = input.format().name(), "probed source");
    Ok((input, stream_index))
}
