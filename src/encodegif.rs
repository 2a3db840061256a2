use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, Disposal, IndexedPixels};
use crate::quantize::{contiguous, Quantizer};
use std::borrow::Cow;
use std::io::Write;
use tracing::debug;

/// Quality used for frames that reach the GIF encoder without a palette
const FULL_QUALITY: u8 = 100;

pub(crate) struct GifEncoder<'q> {
    quantizer: &'q Quantizer,
    /// Share one global palette when every frame uses the same colors
    optimize: bool,
}

impl<'q> GifEncoder<'q> {
    pub fn new(quantizer: &'q Quantizer, optimize: bool) -> Self {
        Self { quantizer, optimize }
    }

    pub fn write<W: Write>(&self, writer: W, image: &AnimatedImage, loop_count: u32) -> AnimResult<()> {
        if image.is_empty() {
            return Err(Error::NoFrames);
        }
        let screen_width = gif_dimension(image.width())?;
        let screen_height = gif_dimension(image.height())?;

        let palettes = image.frames().iter().map(|f| match &f.indexed {
            Some(indexed) => Ok(Cow::Borrowed(indexed)),
            None => self.quantizer.palettize(f.pixels.as_ref(), FULL_QUALITY).map(Cow::Owned),
        }).collect::<AnimResult<Vec<Cow<'_, IndexedPixels>>>>()?;

        let shared = self.optimize && palettes.windows(2).all(|w| w[0].palette == w[1].palette);
        let global_palette = if shared { palette_rgb(&palettes[0]) } else { Vec::new() };
        debug!(frames = palettes.len(), global_palette = shared, "writing GIF");

        let mut enc = gif::Encoder::new(writer, screen_width, screen_height, &global_palette)?;
        enc.set_repeat(match loop_count {
            0 => gif::Repeat::Infinite,
            n => gif::Repeat::Finite(n.min(u32::from(u16::MAX)) as u16),
        })?;

        for (frame, indexed) in image.frames().iter().zip(&palettes) {
            let mut gif_frame = Self::compress_frame(indexed, !shared)?;
            gif_frame.delay = delay_centis(frame.duration_ms);
            gif_frame.dispose = match frame.disposal {
                Disposal::None => gif::DisposalMethod::Keep,
                Disposal::Background => gif::DisposalMethod::Background,
                Disposal::Previous => gif::DisposalMethod::Previous,
            };
            enc.write_lzw_pre_encoded_frame(&gif_frame)?;
        }
        enc.into_inner()?.flush()?;
        Ok(())
    }

    #[inline(never)]
    fn compress_frame(indexed: &IndexedPixels, local_palette: bool) -> AnimResult<gif::Frame<'static>> {
        let width = gif_dimension(indexed.indices.width())?;
        let height = gif_dimension(indexed.indices.height())?;
        let buffer = contiguous(indexed.indices.as_ref()).into_owned();

        let mut frame = gif::Frame {
            delay: 1, // TBD
            dispose: gif::DisposalMethod::Keep,
            transparent: Some(indexed.transparent_index),
            needs_user_input: false,
            top: 0,
            left: 0,
            width,
            height,
            interlaced: false,
            palette: local_palette.then(|| palette_rgb(indexed)),
            buffer: buffer.into(),
        };
        frame.make_lzw_pre_encoded();
        Ok(frame)
    }
}

/// Milliseconds to GIF centiseconds, rounded, never 0
pub(crate) fn delay_centis(duration_ms: u32) -> u16 {
    ((u64::from(duration_ms) + 5) / 10).clamp(1, u64::from(u16::MAX)) as u16
}

fn gif_dimension(size: usize) -> AnimResult<u16> {
    u16::try_from(size).map_err(|_| Error::Encode(format!("{} px is too large for a GIF", size)))
}

fn palette_rgb(indexed: &IndexedPixels) -> Vec<u8> {
    indexed.palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect()
}

#[test]
fn delays_round_to_centiseconds() {
    assert_eq!(delay_centis(1), 1);
    assert_eq!(delay_centis(100), 10);
    assert_eq!(delay_centis(104), 10);
    assert_eq!(delay_centis(105), 11);
    assert_eq!(delay_centis(u32::MAX), u16::MAX);
}
