//! Opens GIF, APNG and WebP files into an [`AnimatedImage`]
//!
//! GIFs are decoded with `gif` and composited with `gif-dispose`, so disposal is
//! already applied to the pixels. APNG and WebP go through `image`'s animation
//! decoders, and their timing, disposal and loop count are then taken from
//! the raw chunks when those agree with the decoded frame count.

use crate::chunks::{self, ContainerTiming};
use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, ContainerFormat, Disposal, Frame, ImgVec, RGBA8};
use crate::Capabilities;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, RgbaImage};
use std::io::{self, Cursor};
use std::path::Path;
use tracing::debug;

/// Used when a frame has no usable duration of its own
pub const DEFAULT_DURATION_MS: u32 = 100;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Single-frame files are fine
    Any,
    /// Fail with `NotAnimated` unless there are at least 2 frames
    Animated,
}

/// Header-level facts about an input
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Probe {
    pub format: ContainerFormat,
    pub frame_count: usize,
    pub width: usize,
    pub height: usize,
}

pub fn sniff(data: &[u8]) -> Option<ContainerFormat> {
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(ContainerFormat::Gif)
    } else if data.starts_with(PNG_SIGNATURE) {
        Some(ContainerFormat::Apng)
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(ContainerFormat::Webp)
    } else {
        None
    }
}

pub(crate) fn read_input(path: &Path) -> AnimResult<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::InputNotFound(path.into())),
        Err(e) => Err(e.into()),
    }
}

fn container_of(data: &[u8], path: &Path, caps: Capabilities) -> AnimResult<ContainerFormat> {
    match sniff(data) {
        Some(ContainerFormat::Webp) if !caps.webp => {
            Err(Error::UnsupportedContainer(format!("WebP support is disabled, can't read {}", path.display())))
        },
        Some(format) => Ok(format),
        None => Err(Error::UnsupportedContainer(format!("Unsupported image format: {} is not a GIF, APNG or WebP file", path.display()))),
    }
}

/// Decodes every frame of `path` to full-canvas RGBA
pub fn open(path: &Path, mode: OpenMode, caps: Capabilities) -> AnimResult<AnimatedImage> {
    let data = read_input(path)?;
    let format = container_of(&data, path, caps)?;
    let image = match format {
        ContainerFormat::Gif => decode_gif(&data)?,
        ContainerFormat::Apng => decode_apng(&data)?,
        ContainerFormat::Webp => decode_webp(&data)?,
    };
    debug!(path = %path.display(), %format, frames = image.len(), width = image.width(), height = image.height(), loop_count = image.loop_count, "opened");

    if mode == OpenMode::Animated && image.len() <= 1 {
        return Err(Error::NotAnimated(image.len()));
    }
    if image.is_empty() {
        return Err(Error::UnsupportedContainer(format!("{} contains no frames", path.display())));
    }
    Ok(image)
}

/// Counts frames without compositing them where the container allows it
pub fn probe(path: &Path, caps: Capabilities) -> AnimResult<Probe> {
    let data = read_input(path)?;
    let format = container_of(&data, path, caps)?;
    let (frame_count, width, height) = match format {
        ContainerFormat::Gif => {
            let mut gif_opts = gif::DecodeOptions::new();
            gif_opts.set_color_output(gif::ColorOutput::Indexed);
            let mut decoder = gif_opts.read_info(&data[..])?;
            let (width, height) = (usize::from(decoder.width()), usize::from(decoder.height()));
            let mut n = 0_usize;
            while decoder.read_next_frame()?.is_some() {
                n += 1;
            }
            (n, width, height)
        },
        ContainerFormat::Apng => {
            let decoder = PngDecoder::new(Cursor::new(&data[..]))?;
            let (w, h) = decoder.dimensions();
            let n = if decoder.is_apng()? {
                match chunks::apng_timing(&data) {
                    Some(t) => t.frames.len(),
                    None => decode_apng(&data)?.len(),
                }
            } else {
                1
            };
            (n, w as usize, h as usize)
        },
        ContainerFormat::Webp => {
            let animated = if chunks::webp_is_animated(&data) {
                chunks::webp_timing(&data).zip(chunks::webp_canvas(&data))
            } else {
                None
            };
            match animated {
                Some((timing, (w, h))) => (timing.frames.len(), w, h),
                None => {
                    let (w, h) = webp_dimensions(&data)?;
                    (1, w, h)
                },
            }
        },
    };
    Ok(Probe { format, frame_count, width, height })
}

fn decode_gif(data: &[u8]) -> AnimResult<AnimatedImage> {
    let mut gif_opts = gif::DecodeOptions::new();
    // Important:
    gif_opts.set_color_output(gif::ColorOutput::Indexed);

    let mut decoder = gif_opts.read_info(data)?;
    let mut screen = gif_dispose::Screen::new_decoder(&decoder);

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame()? {
        let duration_ms = match u32::from(frame.delay) * 10 {
            0 => DEFAULT_DURATION_MS,
            ms => ms,
        };
        let disposal = match frame.dispose {
            gif::DisposalMethod::Any | gif::DisposalMethod::Keep => Disposal::None,
            gif::DisposalMethod::Background => Disposal::Background,
            gif::DisposalMethod::Previous => Disposal::Previous,
        };
        screen.blit_frame(frame)?;
        let (buf, width, height) = screen.pixels_rgba().map_buf(|b| b.to_owned()).into_contiguous_buf();
        frames.push(Frame::new(ImgVec::new(buf, width, height), duration_ms, disposal));
    }

    let loop_count = match decoder.repeat() {
        gif::Repeat::Infinite => 0,
        gif::Repeat::Finite(n) => u32::from(n),
    };
    AnimatedImage::new(frames, loop_count, ContainerFormat::Gif)
}

fn decode_apng(data: &[u8]) -> AnimResult<AnimatedImage> {
    let decoder = PngDecoder::new(Cursor::new(data))?;
    let decoded = if decoder.is_apng()? {
        decoded_frames(decoder.apng()?)?
    } else {
        vec![(rgba_image_to_img(DynamicImage::from_decoder(decoder)?.into_rgba8()), 0)]
    };
    with_container_timing(decoded, chunks::apng_timing(data), ContainerFormat::Apng)
}

#[cfg(feature = "webp")]
fn decode_webp(data: &[u8]) -> AnimResult<AnimatedImage> {
    use image::codecs::webp::WebPDecoder;

    let decoder = WebPDecoder::new(Cursor::new(data))?;
    let decoded = if chunks::webp_is_animated(data) {
        decoded_frames(decoder)?
    } else {
        vec![(rgba_image_to_img(DynamicImage::from_decoder(decoder)?.into_rgba8()), 0)]
    };
    with_container_timing(decoded, chunks::webp_timing(data), ContainerFormat::Webp)
}

#[cfg(feature = "webp")]
fn webp_dimensions(data: &[u8]) -> AnimResult<(usize, usize)> {
    let (w, h) = image::codecs::webp::WebPDecoder::new(Cursor::new(data))?.dimensions();
    Ok((w as usize, h as usize))
}

#[cfg(not(feature = "webp"))]
#[cold]
fn webp_dimensions(_: &[u8]) -> AnimResult<(usize, usize)> {
    Err(Error::UnsupportedContainer("WebP support was not compiled in".into()))
}

#[cfg(not(feature = "webp"))]
#[cold]
fn decode_webp(_: &[u8]) -> AnimResult<AnimatedImage> {
    Err(Error::UnsupportedContainer("WebP support was not compiled in".into()))
}

fn decoded_frames<'a>(decoder: impl AnimationDecoder<'a>) -> AnimResult<Vec<(ImgVec<RGBA8>, u32)>> {
    decoder.into_frames().map(|frame| {
        let frame = frame?;
        let (num, den) = frame.delay().numer_denom_ms();
        let ms = if den == 0 { 0 } else { (f64::from(num) / f64::from(den)).round() as u32 };
        Ok((rgba_image_to_img(frame.into_buffer()), ms))
    }).collect()
}

/// Prefers container timing when it describes exactly the decoded frames
fn with_container_timing(decoded: Vec<(ImgVec<RGBA8>, u32)>, timing: Option<ContainerTiming>, format: ContainerFormat) -> AnimResult<AnimatedImage> {
    let resolve = |ms: u32| if ms > 0 { ms } else { DEFAULT_DURATION_MS };
    let mut frames: Vec<_> = decoded.into_iter()
        .map(|(pixels, ms)| Frame::new(pixels, resolve(ms), Disposal::None))
        .collect();

    let mut loop_count = 0;
    match timing {
        Some(timing) if timing.frames.len() == frames.len() => {
            for (frame, t) in frames.iter_mut().zip(&timing.frames) {
                frame.duration_ms = resolve(t.duration_ms);
                frame.disposal = t.disposal;
            }
            loop_count = timing.loop_count.unwrap_or(0);
            debug!(%format, frames = frames.len(), "using container frame timing");
        },
        Some(timing) => {
            loop_count = timing.loop_count.unwrap_or(0);
            debug!(%format, decoded = frames.len(), parsed = timing.frames.len(), "container timing doesn't match frame count, keeping decoded durations");
        },
        None => debug!(%format, "no container timing available"),
    }
    AnimatedImage::new(frames, loop_count, format)
}

pub(crate) fn rgba_image_to_img(image: RgbaImage) -> ImgVec<RGBA8> {
    let (width, height) = image.dimensions();
    let pixels = rgb::bytemuck::cast_slice::<u8, RGBA8>(image.as_raw()).to_vec();
    ImgVec::new(pixels, width as usize, height as usize)
}

/// Loads any still image as one RGBA frame
pub fn load_still(path: &Path) -> AnimResult<ImgVec<RGBA8>> {
    let data = read_input(path)?;
    if data.starts_with(PNG_SIGNATURE) {
        let image = lodepng::decode32(&data)?;
        return Ok(ImgVec::new(image.buffer, image.width, image.height));
    }
    let image = image::load_from_memory(&data)?;
    Ok(rgba_image_to_img(image.into_rgba8()))
}
