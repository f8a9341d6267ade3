//! The native session aggregate: container, decoder, converter and scratch
//! state for one open source.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::Packet;
use tracing::{debug, info, trace};

use super::codec::open_decoder;
use super::convert::PixelConverter;
use super::probe::{normalize_url, open_input};
use crate::backend::{MediaSession, PacketRead};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::frame::{Frame, Geometry, PackedFormat};

/// Everything needed to turn one network source into packed frames.
///
/// Either fully open or fully closed: [`StreamSession::establish`] tears down
/// whatever it managed to build before returning an error.
pub struct StreamSession {
    url: String,
    converter: Option<PixelConverter>,
    decoded: Option<VideoFrame>,
    packet: Option<Packet>,
    decoder: Option<ffmpeg::decoder::Video>,
    input: Option<Input>,
    stream_index: Option<usize>,
    geometry: Geometry,
    format: PackedFormat,
    next_sequence: u64,
}

// SAFETY: the scaling context and the raw FFmpeg handles are only touched by
// whichever thread currently owns the session; none of them are shared.
unsafe impl Send for StreamSession {}

impl StreamSession {
    fn closed(url: &str, format: PackedFormat) -> Self {
        Self {
            url: url.to_string(),
            converter: None,
            decoded: None,
            packet: None,
            decoder: None,
            input: None,
            stream_index: None,
            geometry: Geometry::default(),
            format,
            next_sequence: 0,
        }
    }

    /// Probe `url`, open its video decoder and set up conversion.
    pub fn establish(url: &str, config: &EngineConfig) -> Result<Self> {
        let url = normalize_url(url)?;
        let mut session = Self::closed(url, config.output_format);

        // Each step stores its product before the next can fail, so an early
        // return drops (and tears down) exactly what was built.
        let (input, stream_index) = open_input(url, config)?;
        session.input = Some(input);
        session.stream_index = Some(stream_index);

        let (decoder, geometry) = {
            let stream = session
                .input
                .as_ref()
                .and_then(|input| input.stream(stream_index))
                .ok_or(EngineError::NoVideoStream)?;
            open_decoder(&stream, config.decoder_threads)?
        };
        let source_format = decoder.format();
        session.decoder = Some(decoder);
        session.packet = Some(Packet::empty());
        session.decoded = Some(VideoFrame::empty());

        session.converter = Some(PixelConverter::new(source_format, geometry, config.output_format)?);
        session.geometry = geometry;

        info!(
            url,
            width = geometry.width,
            height = geometry.height,
            format = config.output_format.name(),
            "stream session established"
        );
        Ok(session)
    }

    /// Release everything in dependency order. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut converter) = self.converter.take() {
            converter.release();
        }
        self.decoded = None;
        self.packet = None;
        if self.decoder.take().is_some() {
            debug!(url = %self.url, "released codec context");
        }
        if self.input.take().is_some() {
            debug!(url = %self.url, "released container context");
        }
        self.geometry = Geometry::default();
        self.stream_index = None;
    }

    /// Receive every frame the decoder has ready and push it to `sink`.
    fn receive_frames(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize> {
        let (Some(decoder), Some(decoded), Some(converter)) =
            (self.decoder.as_mut(), self.decoded.as_mut(), self.converter.as_mut())
        else {
            return Ok(0);
        };

        let mut count = 0;
        loop {
            match decoder.receive_frame(decoded) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => break,
                Err(ref e) if is_again(e) => break,
                Err(e) => return Err(EngineError::DecodeFailed(e.to_string())),
            }
            count += 1;

            // The converter is sized for the open-time geometry.
            ensure_geometry(self.geometry, decoded)?;
            let pixels = converter.convert(decoded)?;
            let frame = Frame::copy_from(
                self.geometry,
                self.format,
                self.next_sequence,
                decoded.pts(),
                pixels,
            );
            self.next_sequence += 1;
            trace!(sequence = frame.sequence(), pts = ?frame.pts(), "frame decoded");
            if !sink(frame) {
                break;
            }
        }
        Ok(count)
    }
}

fn ensure_geometry(expected: Geometry, frame: &VideoFrame) -> Result<()> {
    let actual = Geometry::new(frame.width(), frame.height());
    if actual != expected {
        return Err(EngineError::GeometryChanged {
            from: expected,
            to: actual,
        });
    }
    Ok(())
}

fn is_again(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Other { errno } if *errno == EAGAIN)
}

impl MediaSession for StreamSession {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read_packet(&mut self) -> PacketRead {
        let (Some(input), Some(packet)) = (self.input.as_mut(), self.packet.as_mut()) else {
            return PacketRead::EndOfStream;
        };

        // SAFETY: the packet is owned by this session; unref leaves it blank.
        unsafe { ffi::av_packet_unref(packet.as_mut_ptr()) };

        match packet.read(input) {
            Ok(()) if Some(packet.stream()) == self.stream_index => PacketRead::Video,
            Ok(()) => PacketRead::Skipped,
            Err(ffmpeg::Error::Eof) => PacketRead::EndOfStream,
            Err(e) => PacketRead::Retry(e.to_string()),
        }
    }

    fn decode_pending(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize> {
        let (Some(decoder), Some(packet)) = (self.decoder.as_mut(), self.packet.as_ref()) else {
            return Ok(0);
        };
        if let Err(e) = decoder.send_packet(packet) {
            if !is_again(&e) {
                return Err(EngineError::DecodeFailed(e.to_string()));
            }
        }
        self.receive_frames(sink)
    }

    fn drain(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(0);
        };
        decoder
            .send_eof()
            .map_err(|e| EngineError::DecodeFailed(e.to_string()))?;
        self.receive_frames(sink)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;
    use crate::controller::StreamEngine;
    use crate::ffmpeg::{init, FfmpegBackend};
    use crate::state::{EngineEvent, EngineState};

    /// 0.1 s of 8 kHz mono silence as a PCM WAV file.
    fn write_silent_wav(file: &mut impl Write) {
        let samples: u32 = 800;
        let data_len = samples * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&8_000u32.to_le_bytes());
        bytes.extend_from_slice(&16_000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        file.write_all(&bytes).unwrap();
    }

    /// `frames` frames of a 4:2:0 YUV4MPEG2 clip with a moving luma ramp.
    fn write_y4m(file: &mut impl Write, width: usize, height: usize, frames: usize) {
        let mut bytes = format!("YUV4MPEG2 W{width} H{height} F25:1 Ip A1:1 C420jpeg\n").into_bytes();
        let chroma = (width / 2) * (height / 2);
        for i in 0..frames {
            bytes.extend_from_slice(b"FRAME\n");
            bytes.extend((0..width * height).map(|p| (16 + (p + i * 8) % 200) as u8));
            bytes.resize(bytes.len() + 2 * chroma, 128);
        }
        file.write_all(&bytes).unwrap();
    }

    fn y4m_clip(width: usize, height: usize, frames: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".y4m").tempfile().unwrap();
        write_y4m(file.as_file_mut(), width, height, frames);
        file.flush().unwrap();
        file
    }

    #[test]
    fn decodes_raw_clip_to_packed_frames() {
        init().unwrap();
        let clip = y4m_clip(64, 48, 3);
        let mut session =
            StreamSession::establish(clip.path().to_str().unwrap(), &EngineConfig::default()).unwrap();
        assert_eq!(session.geometry(), Geometry::new(64, 48));

        let mut frames = Vec::new();
        let mut sink = |frame: Frame| {
            frames.push(frame);
            true
        };
        loop {
            match session.read_packet() {
                PacketRead::Video => {
                    session.decode_pending(&mut sink).unwrap();
                }
                PacketRead::Skipped => {}
                PacketRead::EndOfStream => {
                    session.drain(&mut sink).unwrap();
                    break;
                }
                PacketRead::Retry(reason) => panic!("unexpected read failure: {reason}"),
            }
        }

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.sequence(), i as u64);
            assert_eq!(frame.geometry(), Geometry::new(64, 48));
            assert_eq!(frame.format(), PackedFormat::Bgra);
            assert_eq!(frame.data().len(), 64 * 48 * 4);
        }
        assert_ne!(frames[0].data(), frames[1].data());

        session.teardown();
        assert_eq!(session.geometry(), Geometry::default());
    }

    #[test]
    fn engine_plays_raw_clip_to_end() {
        let clip = y4m_clip(32, 16, 5);
        let config = EngineConfig {
            frame_queue_depth: 8,
            ..Default::default()
        };
        let (engine, outputs) = StreamEngine::new(FfmpegBackend::new().unwrap(), config).unwrap();

        engine.open(clip.path().to_str().unwrap()).unwrap();
        assert!(engine.wait_until_stopped(Duration::from_secs(5)));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.last_error(), None);

        let frames: Vec<Frame> = outputs.frames.try_iter().collect();
        assert_eq!(frames.len(), 5);
        let stats = engine.stats();
        assert_eq!(stats.frames_decoded, 5);
        assert_eq!(stats.frames_delivered, 5);
        assert_eq!(stats.frames_dropped, 0);
        for frame in &frames {
            assert_eq!((frame.width(), frame.height()), (32, 16));
            assert_eq!(frame.data().len(), 32 * 16 * 4);
        }

        let states: Vec<EngineState> = outputs
            .events
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::StateChanged(s) => Some(s),
                EngineEvent::Error(_) => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![EngineState::Connecting, EngineState::Playing, EngineState::Stopped]
        );
    }

    #[test]
    fn frame_geometry_must_match_open_time() {
        let frame = VideoFrame::new(ffmpeg::format::Pixel::YUV420P, 32, 16);
        assert!(ensure_geometry(Geometry::new(32, 16), &frame).is_ok());
        assert_eq!(
            ensure_geometry(Geometry::new(64, 48), &frame),
            Err(EngineError::GeometryChanged {
                from: Geometry::new(64, 48),
                to: Geometry::new(32, 16),
            })
        );
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut session = StreamSession::closed("rtsp://nowhere/cam", PackedFormat::Bgra);
        session.teardown();
        session.teardown();
        assert!(session.input.is_none());
        assert_eq!(session.geometry(), Geometry::default());
        assert_eq!(session.read_packet(), PacketRead::EndOfStream);
        assert_eq!(session.decode_pending(&mut |_| true).unwrap(), 0);
    }

    #[test]
    fn blank_url_fails_before_io() {
        let err = StreamSession::establish("   ", &EngineConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::OpenFailed { .. }));
    }

    #[test]
    fn missing_file_is_open_failure() {
        init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mp4");
        let err = StreamSession::establish(path.to_str().unwrap(), &EngineConfig::default())
            .err()
            .unwrap();
        match err {
            EngineError::OpenFailed { url, .. } => assert!(url.ends_with("missing.mp4")),
            other => panic!("expected OpenFailed, got {other:?}"),
        }
    }

    #[test]
    fn audio_only_source_has_no_video_stream() {
        init().unwrap();
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        write_silent_wav(file.as_file_mut());
        file.flush().unwrap();

        let err = StreamSession::establish(file.path().to_str().unwrap(), &EngineConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, EngineError::NoVideoStream);
    }
}
