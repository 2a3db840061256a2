//! Serializes an [`AnimatedImage`] to disk.
//!
//! Output goes to a temporary file next to the destination and is renamed
//! over it only after the encoder has finished, so the destination is either
//! the old file or the complete new one.

use crate::encodeapng::write_apng;
use crate::encodegif::GifEncoder;
use crate::encodewebp::write_webp;
use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, ContainerFormat, ImgRef, RGBA8};
use crate::quantize::{contiguous, Quantizer};
use crate::Capabilities;
use std::cell::Cell;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

struct CountingWriter<W> {
    writer: W,
    written: Rc<Cell<u64>>,
}

impl<W: Write> Write for CountingWriter<W> {
    #[inline(always)]
    fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        let len = self.writer.write(buf)?;
        self.written.set(self.written.get() + len as u64);
        Ok(len)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<(), std::io::Error> {
        self.writer.flush()
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct WriteOptions {
    /// 0 means forever
    pub loop_count: u32,
    /// Only consulted by lossy-capable writers
    pub quality: Option<u8>,
    /// Let the GIF writer share a global palette
    pub optimize: bool,
}

/// Explicit choice first, then the destination's extension, then the source container
pub fn select_format(explicit: Option<ContainerFormat>, path: &Path, source: ContainerFormat) -> ContainerFormat {
    explicit
        .or_else(|| path.extension().and_then(|e| e.to_str()).and_then(ContainerFormat::from_name))
        .unwrap_or(source)
}

pub struct Writer {
    quantizer: Quantizer,
    capabilities: Capabilities,
}

impl Writer {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            quantizer: Quantizer::new(capabilities),
            capabilities,
        }
    }

    /// Fails early if this build can't produce `format`
    pub fn check_format(&self, format: ContainerFormat) -> AnimResult<()> {
        let supported = match format {
            ContainerFormat::Gif => true,
            ContainerFormat::Apng => self.capabilities.apng,
            ContainerFormat::Webp => self.capabilities.webp,
        };
        if supported {
            Ok(())
        } else {
            Err(Error::UnsupportedOutputFormat(format.name().into()))
        }
    }

    /// Encodes and atomically replaces `path`. Returns bytes written.
    pub fn write(&self, image: &AnimatedImage, path: &Path, format: ContainerFormat, options: &WriteOptions) -> AnimResult<u64> {
        self.check_format(format)?;
        if image.is_empty() {
            return Err(Error::NoFrames);
        }

        let bytes = persist_with(path, |out| match format {
            ContainerFormat::Gif => GifEncoder::new(&self.quantizer, options.optimize).write(out, image, options.loop_count),
            ContainerFormat::Apng => write_apng(out, image, options.loop_count),
            ContainerFormat::Webp => write_webp(out, image, options.loop_count, options.quality),
        })?;
        info!(path = %path.display(), %format, frames = image.len(), bytes, "written");
        Ok(bytes)
    }
}

type TempOut<'a> = CountingWriter<BufWriter<&'a mut fs::File>>;

/// Runs `encode` into a temporary file beside `path`, then renames it over `path`
fn persist_with(path: &Path, encode: impl FnOnce(&mut TempOut<'_>) -> AnimResult<()>) -> AnimResult<u64> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;
    let mut tmp = temp_file_for(&dir, path)?;

    let written = Rc::new(Cell::new(0));
    {
        let mut out = CountingWriter {
            writer: BufWriter::new(tmp.as_file_mut()),
            written: written.clone(),
        };
        encode(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(written.get())
}

/// Replacements keep the old file's mode, new files get the usual 0644 minus umask
fn temp_file_for(dir: &Path, path: &Path) -> io::Result<tempfile::NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let tmp = builder.tempfile_in(dir)?;
    if let Ok(meta) = fs::metadata(path) {
        if meta.is_file() {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
    }
    Ok(tmp)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Formats a single exported frame can be saved as
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StillFormat {
    Png,
    Bmp,
}

impl StillFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Bmp => "bmp",
        }
    }
}

/// Saves one RGBA canvas as a still image, replacing `path` atomically
pub fn write_still(pixels: ImgRef<'_, RGBA8>, path: &Path, format: StillFormat) -> AnimResult<u64> {
    let buf = contiguous(pixels);
    let (width, height) = (pixels.width(), pixels.height());
    let encoded = match format {
        StillFormat::Png => lodepng::encode32(&buf[..], width, height)
            .map_err(|e| Error::Encode(format!("PNG encoding error: {}", e)))?,
        StillFormat::Bmp => {
            let mut cursor = io::Cursor::new(Vec::new());
            image::write_buffer_with_format(&mut cursor, rgb::bytemuck::cast_slice::<RGBA8, u8>(&buf),
                width as u32, height as u32, image::ExtendedColorType::Rgba8, image::ImageFormat::Bmp)?;
            cursor.into_inner()
        },
    };
    persist_with(path, |out| Ok(out.write_all(&encoded)?))
}
