//! One function per action: open, transform, write.
//!
//! Requests here are already validated and typed. The [`Router`](crate::Router)
//! is responsible for turning loose JSON into them.

use crate::budget::assert_budget;
use crate::error::{AnimResult, Error};
use crate::frame::{AnimatedImage, ContainerFormat};
use crate::frame_range;
use crate::pipeline;
use crate::quantize::Quantizer;
use crate::reader::{self, OpenMode};
use crate::writer::{self, StillFormat, WriteOptions, Writer};
use crate::Settings;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct FrameCountRequest {
    pub input_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ExportFramesRequest {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub output_format: String,
    pub frame_range: String,
}

#[derive(Clone, Debug)]
pub struct ReverseRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub loop_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ChangeSpeedRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub speed_factor: f64,
    pub loop_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct CompressRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 1–100
    pub quality: u8,
    pub loop_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ResizeRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 0 if not given
    pub width: usize,
    /// 0 if not given
    pub height: usize,
    pub maintain_aspect: bool,
    pub loop_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct BuildGifRequest {
    pub input_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub fps: f64,
    pub loop_count: u32,
}

#[derive(Clone, Debug)]
pub struct ConvertRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub output_format: ContainerFormat,
    pub quality: Option<u8>,
    pub loop_count: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FrameCountResult {
    pub frame_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExportFramesResult {
    pub frame_count: usize,
    pub export_count: usize,
    pub frame_paths: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChangeSpeedResult {
    pub frame_count: usize,
    pub speed_factor: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompressResult {
    pub frame_count: usize,
    pub quality: u8,
    pub input_size: u64,
    pub output_size: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResizeResult {
    pub frame_count: usize,
    pub width: usize,
    pub height: usize,
    pub original_width: usize,
    pub original_height: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct BuildGifResult {
    pub frame_count: usize,
    pub fps: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConvertResult {
    pub frame_count: usize,
    pub output_format: &'static str,
    pub source_format: &'static str,
}

/// Runs typed requests against the filesystem
pub struct Operations {
    settings: Settings,
    quantizer: Quantizer,
    writer: Writer,
}

impl Operations {
    pub fn new(settings: Settings) -> Self {
        Self {
            quantizer: Quantizer::new(settings.capabilities),
            writer: Writer::new(settings.capabilities),
            settings,
        }
    }

    pub fn get_frame_count(&self, req: &FrameCountRequest) -> AnimResult<FrameCountResult> {
        let probe = reader::probe(&req.input_path, self.settings.capabilities)?;
        Ok(FrameCountResult { frame_count: probe.frame_count })
    }

    pub fn export_frames(&self, req: &ExportFramesRequest) -> AnimResult<ExportFramesResult> {
        let format = StillFormat::from_name(&req.output_format)
            .ok_or_else(|| Error::UnsupportedOutputFormat(req.output_format.to_ascii_lowercase()))?;
        let image = reader::open(&req.input_path, OpenMode::Any, self.settings.capabilities)?;

        let indices = frame_range::select(&req.frame_range, image.len());
        if indices.is_empty() {
            return Err(Error::BadRequest("No frames selected for export".into()));
        }

        fs::create_dir_all(&req.output_dir)?;
        let stem = req.input_path.file_stem().map_or_else(|| "frame".into(), |s| s.to_string_lossy());
        let mut written = Vec::with_capacity(indices.len());
        for idx in indices {
            let path = req.output_dir.join(format!("{}_frame_{:04}.{}", stem, idx, format.extension()));
            if let Err(err) = writer::write_still(image.frames()[idx].pixels.as_ref(), &path, format) {
                warn!(%err, path = %path.display(), removing = written.len(), "frame export failed");
                for done in &written {
                    let _ = fs::remove_file(done);
                }
                return Err(err);
            }
            written.push(path);
        }
        let frame_paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
        debug!(exported = frame_paths.len(), dir = %req.output_dir.display(), "frames exported");

        Ok(ExportFramesResult {
            frame_count: image.len(),
            export_count: frame_paths.len(),
            frame_paths,
        })
    }

    pub fn reverse(&self, req: &ReverseRequest) -> AnimResult<FrameCountResult> {
        let image = reader::open(&req.input_path, OpenMode::Any, self.settings.capabilities)?;
        let reversed = pipeline::reverse(&image)?;
        self.write(&reversed, &req.output_path, None, req.loop_count, None, false)?;
        Ok(FrameCountResult { frame_count: reversed.len() })
    }

    pub fn change_speed(&self, req: &ChangeSpeedRequest) -> AnimResult<ChangeSpeedResult> {
        let speed_factor = pipeline::sanitize_speed(Some(req.speed_factor));
        let image = reader::open(&req.input_path, OpenMode::Any, self.settings.capabilities)?;
        let retimed = pipeline::change_speed(&image, speed_factor)?;
        self.write(&retimed, &req.output_path, None, req.loop_count, None, false)?;
        Ok(ChangeSpeedResult { frame_count: retimed.len(), speed_factor })
    }

    pub fn compress(&self, req: &CompressRequest) -> AnimResult<CompressResult> {
        let quality = req.quality.clamp(1, 100);
        let probe = reader::probe(&req.input_path, self.settings.capabilities)?;
        assert_budget(probe.frame_count, probe.width, probe.height, "compress", self.settings.max_frame_pixels)?;

        let input_size = fs::metadata(&req.input_path)?.len();
        let image = reader::open(&req.input_path, OpenMode::Any, self.settings.capabilities)?;
        let quantized = self.quantizer.quantize_all(&image, quality)?;
        let output_size = self.write(&quantized, &req.output_path, None, req.loop_count, Some(quality), true)?;

        Ok(CompressResult {
            frame_count: quantized.len(),
            quality,
            input_size,
            output_size,
        })
    }

    pub fn resize(&self, req: &ResizeRequest) -> AnimResult<ResizeResult> {
        let probe = reader::probe(&req.input_path, self.settings.capabilities)?;
        let (width, height) = pipeline::target_size(probe.width, probe.height, req.width, req.height, req.maintain_aspect)?;
        let limit = self.settings.max_frame_pixels;
        assert_budget(probe.frame_count, probe.width, probe.height, "resize", limit)?;
        assert_budget(probe.frame_count, width, height, "resize", limit)?;

        let image = reader::open(&req.input_path, OpenMode::Any, self.settings.capabilities)?;
        let resized = pipeline::resize(&image, width, height, &self.quantizer)?;
        self.write(&resized, &req.output_path, None, req.loop_count, None, false)?;

        Ok(ResizeResult {
            frame_count: resized.len(),
            width,
            height,
            original_width: image.width(),
            original_height: image.height(),
        })
    }

    pub fn build_gif(&self, req: &BuildGifRequest) -> AnimResult<BuildGifResult> {
        let fps = pipeline::sanitize_fps(Some(req.fps));
        let image = pipeline::build_from_stills(&req.input_paths, fps, req.loop_count)?;
        self.write(&image, &req.output_path, None, Some(req.loop_count), None, false)?;
        Ok(BuildGifResult { frame_count: image.len(), fps })
    }

    pub fn convert_animation(&self, req: &ConvertRequest) -> AnimResult<ConvertResult> {
        self.writer.check_format(req.output_format)?;
        let image = reader::open(&req.input_path, OpenMode::Animated, self.settings.capabilities)?;
        self.write(&image, &req.output_path, Some(req.output_format), req.loop_count, req.quality, false)?;
        Ok(ConvertResult {
            frame_count: image.len(),
            output_format: req.output_format.name(),
            source_format: image.format.name(),
        })
    }

    fn write(&self, image: &AnimatedImage, path: &Path, explicit: Option<ContainerFormat>, loop_count: Option<u32>, quality: Option<u8>, optimize: bool) -> AnimResult<u64> {
        let format = writer::select_format(explicit, path, image.format);
        let options = WriteOptions {
            loop_count: loop_count.unwrap_or(image.loop_count),
            quality,
            optimize,
        };
        self.writer.write(image, path, format, &options)
    }
}
