use crate::error::AnimResult;
use crate::frame::{AnimatedImage, Frame, ImgRef, ImgVec, IndexedPixels, RGBA8};
use crate::Capabilities;
use imagequant::Attributes;
use std::borrow::Cow;
use std::collections::HashMap;

/// Palette slot reserved for fully transparent pixels
pub const TRANSPARENT_INDEX: u8 = 255;

/// Alpha at or below this is treated as fully transparent
pub const ALPHA_THRESHOLD: u8 = 127;

/// Number of opaque colors for a 1-100 quality.
///
/// Never more than 255, so that index 255 stays free for transparency.
pub fn color_count(quality: u8) -> usize {
    let q = usize::from(quality.clamp(1, 100));
    ((q * 255 + 50) / 100).clamp(16, 255)
}

/// Reduces frames to a 256-entry palette with a reserved transparent index
pub struct Quantizer {
    dither: bool,
}

impl Quantizer {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            dither: capabilities.dither,
        }
    }

    pub fn quantize_all(&self, image: &AnimatedImage, quality: u8) -> AnimResult<AnimatedImage> {
        let frames = image.frames().iter()
            .map(|f| self.quantize(f, quality))
            .collect::<AnimResult<Vec<_>>>()?;
        image.with_frames(frames)
    }

    /// Returns a new frame whose pixels are exactly its palette colors
    pub fn quantize(&self, frame: &Frame, quality: u8) -> AnimResult<Frame> {
        let indexed = self.palettize(frame.pixels.as_ref(), quality)?;
        let pixels = indexed.indices.buf().iter().map(|&i| indexed.palette[usize::from(i)]).collect();
        Ok(Frame {
            pixels: ImgVec::new(pixels, indexed.indices.width(), indexed.indices.height()),
            duration_ms: frame.duration_ms,
            disposal: frame.disposal,
            indexed: Some(indexed),
        })
    }

    /// Maps pixels to a 256-entry palette.
    ///
    /// The transparency mask comes from the pixels as given, before any color
    /// reduction, and masked pixels get no say in which colors are picked.
    pub fn palettize(&self, image: ImgRef<'_, RGBA8>, quality: u8) -> AnimResult<IndexedPixels> {
        let max_colors = color_count(quality);
        let width = image.width();
        let height = image.height();
        let src = contiguous(image);

        let mask: Vec<bool> = src.iter().map(|px| px.a <= ALPHA_THRESHOLD).collect();
        let opaque: Vec<RGBA8> = src.iter().map(|px| RGBA8::new(px.r, px.g, px.b, 255)).collect();

        let (mut palette, mut indices) = match exact_palette(&opaque, &mask, max_colors) {
            Some(exact) => exact,
            None => self.reduce(&opaque, &mask, width, height, max_colors)?,
        };
        debug_assert!(palette.len() <= max_colors);

        palette.resize(256, RGBA8::new(0, 0, 0, 255));
        palette[usize::from(TRANSPARENT_INDEX)] = RGBA8::new(0, 0, 0, 0);
        for (idx, &transparent) in indices.iter_mut().zip(&mask) {
            if transparent {
                *idx = TRANSPARENT_INDEX;
            }
        }

        Ok(IndexedPixels {
            indices: ImgVec::new(indices, width, height),
            palette,
            transparent_index: TRANSPARENT_INDEX,
        })
    }

    fn reduce(&self, opaque: &[RGBA8], mask: &[bool], width: usize, height: usize, max_colors: usize) -> AnimResult<(Vec<RGBA8>, Vec<u8>)> {
        let mut liq = Attributes::new();
        liq.set_max_colors(max_colors as u32)?;
        liq.set_quality(0, 100)?;

        let mut img = liq.new_image_borrowed(opaque, width, height, 0.)?;
        // transparent pixels are overwritten later, so they must not pull the palette
        let importance_map: Vec<u8> = mask.iter().map(|&t| if t { 0 } else { 255 }).collect();
        img.set_importance_map(importance_map)?;

        let mut res = liq.quantize(&mut img)?;
        res.set_dithering_level(if self.dither { 1. } else { 0. })?;
        let (pal, pal_img) = res.remapped(&mut img)?;
        debug_assert_eq!(width * height, pal_img.len());
        Ok((pal, pal_img))
    }
}

/// Frames with few enough colors keep them all, unchanged
fn exact_palette(opaque: &[RGBA8], mask: &[bool], max_colors: usize) -> Option<(Vec<RGBA8>, Vec<u8>)> {
    let mut lookup = HashMap::new();
    let mut palette = Vec::new();
    let mut indices = Vec::with_capacity(opaque.len());
    for (&px, &transparent) in opaque.iter().zip(mask) {
        if transparent {
            indices.push(TRANSPARENT_INDEX);
            continue;
        }
        let idx = match lookup.get(&px) {
            Some(&idx) => idx,
            None => {
                if palette.len() == max_colors {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push(px);
                lookup.insert(px, idx);
                idx
            },
        };
        indices.push(idx);
    }
    Some((palette, indices))
}

pub(crate) fn contiguous<T: Copy>(img: ImgRef<'_, T>) -> Cow<'_, [T]> {
    if img.width() == img.stride() {
        Cow::Borrowed(&img.buf()[..img.width() * img.height()])
    } else {
        Cow::Owned(img.rows().flat_map(|r| r.iter().copied()).collect())
    }
}
