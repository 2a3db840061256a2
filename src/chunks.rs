//! Direct chunk-level reading of WebP and APNG animation metadata.
//!
//! Generic decoders round or drop frame timing, and don't expose disposal or
//! loop count at all, so this walks the container bytes itself. Every read is
//! bounds-checked; anything malformed yields `None` and callers keep what they decoded.

use crate::frame::Disposal;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Per-frame metadata recovered from the container
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameTiming {
    pub duration_ms: u32,
    pub disposal: Disposal,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContainerTiming {
    /// `None` if the container had no loop chunk
    pub loop_count: Option<u32>,
    pub frames: Vec<FrameTiming>,
}

/// Bounds-checked cursor over a byte slice
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn fourcc(&mut self) -> Option<[u8; 4]> {
        self.take(4)?.try_into().ok()
    }

    fn u32_le(&mut self) -> Option<u32> {
        self.fourcc().map(u32::from_le_bytes)
    }

    fn u32_be(&mut self) -> Option<u32> {
        self.fourcc().map(u32::from_be_bytes)
    }
}

#[inline]
fn u16_be(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

#[inline]
fn u24_le(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 3)?;
    Some(u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16)
}

/// Splits a WebP file into its top-level RIFF chunks
pub(crate) fn webp_chunks(data: &[u8]) -> Option<Vec<([u8; 4], &[u8])>> {
    let mut r = ByteReader::new(data, 0);
    if &r.fourcc()? != b"RIFF" {
        return None;
    }
    let _riff_size = r.u32_le()?;
    if &r.fourcc()? != b"WEBP" {
        return None;
    }

    let mut chunks = Vec::new();
    while r.remaining() >= 8 {
        let fourcc = r.fourcc()?;
        let size = r.u32_le()? as usize;
        let payload = r.take(size)?;
        // chunks are padded to even sizes; a missing pad byte at EOF is tolerated
        if size & 1 == 1 && r.take(1).is_none() {
            r.pos = data.len();
        }
        chunks.push((fourcc, payload));
    }
    Some(chunks)
}

/// Walks RIFF sub-chunks, reading `ANIM` loop count and each `ANMF` duration and dispose flag
pub fn webp_timing(data: &[u8]) -> Option<ContainerTiming> {
    let mut timing = ContainerTiming::default();
    for (fourcc, payload) in webp_chunks(data)? {
        match &fourcc {
            b"ANIM" => {
                let loops = u16::from_le_bytes(payload.get(4..6)?.try_into().ok()?);
                timing.loop_count = Some(u32::from(loops));
            },
            b"ANMF" => {
                // x(3) y(3) w-1(3) h-1(3) duration(3) flags(1)
                let duration_ms = u24_le(payload, 12)?;
                let flags = *payload.get(15)?;
                timing.frames.push(FrameTiming {
                    duration_ms,
                    disposal: if flags & 1 != 0 { Disposal::Background } else { Disposal::None },
                });
            },
            _ => {},
        }
    }

    if timing.frames.is_empty() {
        return None;
    }
    Some(timing)
}

/// Converts an fcTL delay fraction to milliseconds
pub fn apng_delay_ms(num: u16, den: u16) -> u32 {
    let num = if num == 0 { 1 } else { num };
    let den = if den == 0 { 100 } else { den };
    (f64::from(num) / f64::from(den) * 1000.).round() as u32
}

/// Walks PNG chunks, reading `acTL` play count and each `fcTL` delay and dispose op
pub fn apng_timing(data: &[u8]) -> Option<ContainerTiming> {
    let mut r = ByteReader::new(data, 0);
    if r.take(8)? != PNG_SIGNATURE {
        return None;
    }

    let mut timing = ContainerTiming::default();
    while r.remaining() >= 12 {
        let len = r.u32_be()? as usize;
        let kind = r.fourcc()?;
        let payload = r.take(len)?;
        let _crc = r.u32_be()?;
        match &kind {
            b"acTL" => {
                let plays = payload.get(4..8)?;
                timing.loop_count = Some(u32::from_be_bytes(plays.try_into().ok()?));
            },
            b"fcTL" => {
                // seq(4) w(4) h(4) x(4) y(4) delay_num(2) delay_den(2) dispose(1) blend(1)
                let num = u16_be(payload, 20)?;
                let den = u16_be(payload, 22)?;
                let dispose = *payload.get(24)?;
                timing.frames.push(FrameTiming {
                    duration_ms: apng_delay_ms(num, den),
                    disposal: Disposal::from_code(dispose),
                });
            },
            b"IEND" => break,
            _ => {},
        }
    }

    if timing.frames.is_empty() {
        return None;
    }
    Some(timing)
}

/// Canvas size from the `VP8X` header, if the file has one
pub fn webp_canvas(data: &[u8]) -> Option<(usize, usize)> {
    let (_, vp8x) = webp_chunks(data)?.into_iter().find(|(fourcc, _)| fourcc == b"VP8X")?;
    // flags(1) reserved(3) width-1(3) height-1(3)
    let width = u24_le(vp8x, 4)? as usize + 1;
    let height = u24_le(vp8x, 7)? as usize + 1;
    Some((width, height))
}

/// True if the WebP has the VP8X animation flag
pub fn webp_is_animated(data: &[u8]) -> bool {
    data.len() > 20 && &data[12..16] == b"VP8X" && data[20] & 0x02 != 0
}
