//! Canonical animation model shared by every container
//!
//! Readers translate GIF, APNG and WebP metadata into these types, and writers
//! translate back. Nothing between the two knows which container a frame came from.

pub use imgref::{ImgRef, ImgVec};
pub use rgb::RGBA8;

use crate::error::{AnimResult, Error};
use std::fmt;

/// Animated container families the crate reads and writes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ContainerFormat {
    Gif,
    Apng,
    Webp,
}

impl ContainerFormat {
    /// Lowercase name used in responses
    pub fn name(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Apng => "apng",
            Self::Webp => "webp",
        }
    }

    /// Accepts container names and common file extensions
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "gif" => Some(Self::Gif),
            "apng" | "png" => Some(Self::Apng),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happens to a frame's area before the next one is drawn
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Disposal {
    #[default]
    None = 0,
    Background = 1,
    Previous = 2,
}

impl Disposal {
    /// Values above 2 clamp to `Previous`
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Background,
            _ => Self::Previous,
        }
    }
}

/// Palette form of a quantized frame.
///
/// The palette always has exactly 256 entries, and `transparent_index`
/// is never used by an opaque color.
#[derive(Clone, Debug)]
pub struct IndexedPixels {
    pub indices: ImgVec<u8>,
    pub palette: Vec<RGBA8>,
    pub transparent_index: u8,
}

#[derive(Clone, Debug)]
pub struct Frame {
    /// Full-canvas pixels
    pub pixels: ImgVec<RGBA8>,
    /// Display time in milliseconds, at least 1
    pub duration_ms: u32,
    pub disposal: Disposal,
    /// Set once the frame has been quantized
    pub indexed: Option<IndexedPixels>,
}

impl Frame {
    pub fn new(pixels: ImgVec<RGBA8>, duration_ms: u32, disposal: Disposal) -> Self {
        Self {
            pixels,
            duration_ms: duration_ms.max(1),
            disposal,
            indexed: None,
        }
    }

    pub fn with_duration(&self, duration_ms: u32) -> Self {
        Self {
            duration_ms: duration_ms.max(1),
            ..self.clone()
        }
    }
}

/// A decoded animation. Every frame has the same canvas size.
#[derive(Clone, Debug)]
pub struct AnimatedImage {
    frames: Vec<Frame>,
    width: usize,
    height: usize,
    /// 0 means forever
    pub loop_count: u32,
    pub format: ContainerFormat,
}

impl AnimatedImage {
    /// Fails if the frames don't share one canvas size
    pub fn new(frames: Vec<Frame>, loop_count: u32, format: ContainerFormat) -> AnimResult<Self> {
        let (width, height) = frames.first().map_or((0, 0), |f| (f.pixels.width(), f.pixels.height()));
        if let Some((i, f)) = frames.iter().enumerate().find(|(_, f)| f.pixels.width() != width || f.pixels.height() != height) {
            return Err(Error::WrongSize(format!("Frame {} has wrong size ({}×{}, expected {}×{})", i + 1,
                f.pixels.width(), f.pixels.height(), width, height)));
        }
        Ok(Self {
            frames,
            width,
            height,
            loop_count,
            format,
        })
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn durations(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.duration_ms).collect()
    }

    pub fn disposals(&self) -> Vec<Disposal> {
        self.frames.iter().map(|f| f.disposal).collect()
    }

    /// Same metadata, new frames
    pub(crate) fn with_frames(&self, frames: Vec<Frame>) -> AnimResult<Self> {
        Self::new(frames, self.loop_count, self.format)
    }
}
