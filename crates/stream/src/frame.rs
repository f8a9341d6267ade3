//! Display-ready frames handed to the consumer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Packed pixel layouts the converter can produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackedFormat {
    /// B, G, R, A byte order (32-bit native RGB on little-endian hosts).
    #[default]
    Bgra,
    /// R, G, B, A byte order.
    Rgba,
    /// R, G, B, no alpha.
    Rgb24,
}

impl PackedFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra | Self::Rgba => 4,
            Self::Rgb24 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bgra => "bgra",
            Self::Rgba => "rgba",
            Self::Rgb24 => "rgb24",
        }
    }
}

/// Frame dimensions negotiated at open time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes needed for one tightly packed frame in `format`.
    pub fn byte_len(&self, format: PackedFormat) -> usize {
        self.width as usize * self.height as usize * format.bytes_per_pixel()
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An immutable, fully copied, display-ready image.
///
/// The pixel buffer is owned by the frame; nothing in the engine keeps a
/// reference to it once it has been delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    geometry: Geometry,
    format: PackedFormat,
    sequence: u64,
    pts: Option<i64>,
    data: Vec<u8>,
}

impl Frame {
    /// Build a frame by copying `pixels` (tightly packed rows).
    pub fn copy_from(
        geometry: Geometry,
        format: PackedFormat,
        sequence: u64,
        pts: Option<i64>,
        pixels: &[u8],
    ) -> Self {
        debug_assert_eq!(pixels.len(), geometry.byte_len(format));
        Self {
            geometry,
            format,
            sequence,
            pts,
            data: pixels.to_vec(),
        }
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn format(&self) -> PackedFormat {
        self.format
    }

    /// Bytes per row (no padding).
    pub fn stride(&self) -> usize {
        self.geometry.width as usize * self.format.bytes_per_pixel()
    }

    /// Position of this frame within its session, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Presentation timestamp in stream time base, when the source has one.
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the pixel buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
