//! Animated WebP muxing.
//!
//! Each frame is encoded as a lossless still by `image`, and its bitstream
//! chunk is wrapped in an `ANMF` frame of an extended-format RIFF container.

use crate::chunks;
use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, Disposal, RGBA8};
use crate::quantize::contiguous;
use std::io::Write;
use tracing::debug;

const ALPHA_FLAG: u8 = 0x10;
const ANIMATION_FLAG: u8 = 0x02;
const ANMF_NO_BLEND: u8 = 0x02;
const ANMF_DISPOSE_BACKGROUND: u8 = 0x01;
const MAX_U24: u32 = 0xFF_FFFF;

#[derive(Default)]
struct WebPMux {
    frame_data: Vec<u8>,
}

impl WebPMux {
    /// `bitstream` is a complete `VP8L` (or `VP8 `) chunk, header included
    fn add_frame(&mut self, bitstream: &[u8], width: u32, height: u32, duration_ms: u32, disposal: Disposal) {
        let mut flags = ANMF_NO_BLEND;
        if disposal == Disposal::Background {
            flags |= ANMF_DISPOSE_BACKGROUND;
        }
        push_chunk_header(&mut self.frame_data, b"ANMF", 16 + bitstream.len());
        self.frame_data.extend_from_slice(&u24_bytes(0));
        self.frame_data.extend_from_slice(&u24_bytes(0));
        self.frame_data.extend_from_slice(&u24_bytes(width - 1));
        self.frame_data.extend_from_slice(&u24_bytes(height - 1));
        self.frame_data.extend_from_slice(&u24_bytes(duration_ms.min(MAX_U24)));
        self.frame_data.push(flags);
        self.frame_data.extend_from_slice(bitstream);
        if bitstream.len() & 1 == 1 {
            self.frame_data.push(0);
        }
    }

    fn write<W: Write>(&self, mut writer: W, width: u32, height: u32, loop_count: u16) -> AnimResult<()> {
        let mut header = Vec::with_capacity(12 + 18 + 14);
        header.extend_from_slice(b"WEBP");
        push_chunk_header(&mut header, b"VP8X", 10);
        header.extend_from_slice(&[ALPHA_FLAG | ANIMATION_FLAG, 0, 0, 0]);
        header.extend_from_slice(&u24_bytes(width - 1));
        header.extend_from_slice(&u24_bytes(height - 1));
        push_chunk_header(&mut header, b"ANIM", 6);
        // transparent background, BGRA
        header.extend_from_slice(&[0, 0, 0, 0]);
        header.extend_from_slice(&loop_count.to_le_bytes());

        let riff_size = u32::try_from(header.len() + self.frame_data.len())
            .map_err(|_| Error::Encode("WebP output would exceed 4GB".into()))?;
        writer.write_all(b"RIFF")?;
        writer.write_all(&riff_size.to_le_bytes())?;
        writer.write_all(&header)?;
        writer.write_all(&self.frame_data)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(feature = "webp")]
pub(crate) fn write_webp<W: Write>(writer: W, image: &AnimatedImage, loop_count: u32, quality: Option<u8>) -> AnimResult<()> {
    if image.is_empty() {
        return Err(Error::NoFrames);
    }
    if let Some(quality) = quality {
        debug!(quality, "WebP output is always lossless, quality ignored");
    }
    let width = webp_dimension(image.width())?;
    let height = webp_dimension(image.height())?;

    let mut mux = WebPMux::default();
    for frame in image.frames() {
        let still = encode_lossless(&contiguous(frame.pixels.as_ref()), width, height)?;
        let bitstream = bitstream_chunk(&still)
            .ok_or_else(|| Error::Encode("WebP encoder produced no image chunk".into()))?;
        mux.add_frame(&bitstream, width, height, frame.duration_ms, frame.disposal);
    }
    mux.write(writer, width, height, loop_count.min(u32::from(u16::MAX)) as u16)
}

#[cfg(not(feature = "webp"))]
#[cold]
pub(crate) fn write_webp<W: Write>(_: W, _: &AnimatedImage, _: u32, _: Option<u8>) -> AnimResult<()> {
    Err(Error::UnsupportedOutputFormat("webp".into()))
}

#[cfg(feature = "webp")]
fn encode_lossless(pixels: &[RGBA8], width: u32, height: u32) -> AnimResult<Vec<u8>> {
    use image::codecs::webp::WebPEncoder;

    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out).encode(rgb::bytemuck::cast_slice::<RGBA8, u8>(pixels), width, height, image::ExtendedColorType::Rgba8)?;
    Ok(out)
}

/// Re-serializes the `VP8L`/`VP8 ` chunk of a still WebP, padded to an even length
fn bitstream_chunk(still: &[u8]) -> Option<Vec<u8>> {
    let (fourcc, payload) = chunks::webp_chunks(still)?
        .into_iter()
        .find(|(fourcc, _)| fourcc == b"VP8L" || fourcc == b"VP8 ")?;
    let mut chunk = Vec::with_capacity(8 + payload.len());
    push_chunk_header(&mut chunk, &fourcc, payload.len());
    chunk.extend_from_slice(payload);
    if payload.len() & 1 == 1 {
        chunk.push(0);
    }
    Some(chunk)
}

fn webp_dimension(size: usize) -> AnimResult<u32> {
    match u32::try_from(size) {
        Ok(s @ 1..=MAX_U24) => Ok(s),
        _ => Err(Error::Encode(format!("{} px can't be stored in a WebP canvas", size))),
    }
}

fn push_chunk_header(out: &mut Vec<u8>, fourcc: &[u8; 4], len: usize) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

fn u24_bytes(x: u32) -> [u8; 3] {
    debug_assert!(x <= MAX_U24);
    let b = x.to_le_bytes();
    [b[0], b[1], b[2]]
}
