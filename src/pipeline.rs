//! Transforms over a decoded animation.
//!
//! Every stage takes the animation by reference and returns a new one.

use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, ContainerFormat, Disposal, Frame, ImgVec, RGBA8};
use crate::quantize::{contiguous, Quantizer};
use crate::reader;
use std::path::Path;
use tracing::debug;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 2.0;
pub const DEFAULT_FPS: f64 = 10.;

/// Palette size used after resampling
const RESIZE_QUALITY: u8 = 100;

/// Plays the frames backwards. Disposal methods move with their frames unchanged.
pub fn reverse(image: &AnimatedImage) -> AnimResult<AnimatedImage> {
    image.with_frames(image.frames().iter().rev().cloned().collect())
}

/// Non-finite or non-positive factors mean "unchanged", the rest is clamped to 0.1–2.0
pub fn sanitize_speed(factor: Option<f64>) -> f64 {
    match factor {
        Some(f) if f.is_finite() && f > 0. => f.clamp(MIN_SPEED, MAX_SPEED),
        _ => 1.,
    }
}

/// Divides every duration by the factor, rounding down to at least 1ms
pub fn change_speed(image: &AnimatedImage, factor: f64) -> AnimResult<AnimatedImage> {
    let factor = sanitize_speed(Some(factor));
    let frames = image.frames().iter()
        .map(|f| f.with_duration(((f64::from(f.duration_ms) / factor).floor() as u32).max(1)))
        .collect();
    image.with_frames(frames)
}

/// Output canvas for a resize request. 0 means "not given".
pub fn target_size(src_width: usize, src_height: usize, width: usize, height: usize, keep_aspect: bool) -> AnimResult<(usize, usize)> {
    if width == 0 && height == 0 {
        return Err(Error::InvalidSize);
    }
    let (sw, sh) = (src_width.max(1) as f64, src_height.max(1) as f64);
    let scaled = |v: f64| (v.round() as usize).max(1);

    Ok(if !keep_aspect {
        (if width > 0 { width } else { src_width }, if height > 0 { height } else { src_height })
    } else if width > 0 && height > 0 {
        let scale = (width as f64 / sw).min(height as f64 / sh);
        (scaled(sw * scale), scaled(sh * scale))
    } else if width > 0 {
        (width, scaled(width as f64 * sh / sw))
    } else {
        (scaled(height as f64 * sw / sh), height)
    })
}

/// Resamples every frame with Lanczos3, then re-quantizes it.
///
/// The frame-pixel budget must have been checked by the caller.
pub fn resize(image: &AnimatedImage, width: usize, height: usize, quantizer: &Quantizer) -> AnimResult<AnimatedImage> {
    debug!(from_width = image.width(), from_height = image.height(), width, height, "resizing");
    let frames = image.frames().iter().map(|frame| {
        let pixels = resample(frame, width, height)?;
        quantizer.quantize(&Frame::new(pixels, frame.duration_ms, frame.disposal), RESIZE_QUALITY)
    }).collect::<AnimResult<Vec<_>>>()?;
    image.with_frames(frames)
}

fn resample(frame: &Frame, width: usize, height: usize) -> AnimResult<ImgVec<RGBA8>> {
    let src = frame.pixels.as_ref();
    if src.width() == width && src.height() == height {
        return Ok(frame.pixels.clone());
    }
    let mut r = resize::new(src.width(), src.height(), width, height, resize::Pixel::RGBA8, resize::Type::Lanczos3)?;
    let mut dst = Vec::new();
    dst.try_reserve_exact(width * height)?;
    dst.resize(width * height, RGBA8::new(0, 0, 0, 0));
    r.resize(&contiguous(src), &mut dst)?;
    Ok(ImgVec::new(dst, width, height))
}

/// Non-finite or non-positive rates fall back to 10 fps
pub fn sanitize_fps(fps: Option<f64>) -> f64 {
    match fps {
        Some(f) if f.is_finite() && f > 0. => f,
        _ => DEFAULT_FPS,
    }
}

/// Frame duration for a frame rate, in whole milliseconds
pub fn fps_duration_ms(fps: f64) -> u32 {
    ((1000. / sanitize_fps(Some(fps))).round() as u32).max(1)
}

/// Makes an animation out of still images, one frame each.
///
/// Stills are placed at the top-left of a canvas as large as the largest of
/// them, and the uncovered area is transparent. Each frame is cleared before
/// the next is drawn, so padding never shows the previous still.
pub fn build_from_stills<P: AsRef<Path>>(paths: &[P], fps: f64, loop_count: u32) -> AnimResult<AnimatedImage> {
    if paths.is_empty() {
        return Err(Error::NoInput);
    }
    let stills = paths.iter()
        .map(|p| reader::load_still(p.as_ref()))
        .collect::<AnimResult<Vec<_>>>()?;

    let width = stills.iter().map(|s| s.width()).max().unwrap_or(0);
    let height = stills.iter().map(|s| s.height()).max().unwrap_or(0);
    let duration_ms = fps_duration_ms(fps);
    debug!(stills = stills.len(), width, height, duration_ms, "building animation");

    let frames = stills.into_iter().map(|still| {
        let pixels = if still.width() == width && still.height() == height {
            still
        } else {
            pad_top_left(&still, width, height)
        };
        Frame::new(pixels, duration_ms, Disposal::Background)
    }).collect();
    AnimatedImage::new(frames, loop_count, ContainerFormat::Gif)
}

fn pad_top_left(still: &ImgVec<RGBA8>, width: usize, height: usize) -> ImgVec<RGBA8> {
    let mut canvas = ImgVec::new(vec![RGBA8::new(0, 0, 0, 0); width * height], width, height);
    for (dst, src) in canvas.rows_mut().zip(still.rows()) {
        dst[..src.len()].copy_from_slice(src);
    }
    canvas
}
