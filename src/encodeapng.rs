use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, Disposal, RGBA8};
use crate::quantize::contiguous;
use std::io::Write;

/// Full-canvas RGBA8 frames, each replacing the canvas outright
pub(crate) fn write_apng<W: Write>(writer: W, image: &AnimatedImage, loop_count: u32) -> AnimResult<()> {
    if image.is_empty() {
        return Err(Error::NoFrames);
    }
    let width = u32::try_from(image.width()).map_err(|_| Error::Encode("canvas too wide".into()))?;
    let height = u32::try_from(image.height()).map_err(|_| Error::Encode("canvas too tall".into()))?;

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_animated(image.len() as u32, loop_count)?;
    let mut writer = encoder.write_header()?;

    for frame in image.frames() {
        let (num, den) = frame_delay(frame.duration_ms);
        writer.set_frame_delay(num, den)?;
        writer.set_dispose_op(match frame.disposal {
            Disposal::None => png::DisposeOp::None,
            Disposal::Background => png::DisposeOp::Background,
            Disposal::Previous => png::DisposeOp::Previous,
        })?;
        writer.set_blend_op(png::BlendOp::Source)?;
        let pixels = contiguous(frame.pixels.as_ref());
        writer.write_image_data(rgb::bytemuck::cast_slice::<RGBA8, u8>(&pixels))?;
    }
    writer.finish()?;
    Ok(())
}

/// fcTL delay fraction; millisecond precision while it fits in u16
fn frame_delay(duration_ms: u32) -> (u16, u16) {
    match u16::try_from(duration_ms) {
        Ok(ms) => (ms, 1000),
        Err(_) => (((u64::from(duration_ms) + 5) / 10).min(u64::from(u16::MAX)) as u16, 100),
    }
}

#[test]
fn delay_fractions() {
    assert_eq!(frame_delay(40), (40, 1000));
    assert_eq!(frame_delay(65535), (65535, 1000));
    assert_eq!(frame_delay(70_000), (7000, 100));
    assert_eq!(frame_delay(u32::MAX), (u16::MAX, 100));
}
