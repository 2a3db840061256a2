//! Turns loosely-typed JSON requests into typed operations, and their outcome
//! into a `{success, ...}` response.

use crate::error::{AnimResult, Error};
use crate::frame::ContainerFormat;
use crate::frame_range::FrameRange;
use crate::ops::*;
use crate::Settings;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_QUALITY: u8 = 90;

/// The closed set of operations behind all accepted action names
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Action {
    GetFrameCount,
    ExportFrames,
    Reverse,
    ChangeSpeed,
    Compress,
    Resize,
    BuildGif,
    ConvertAnimation,
}

impl Action {
    /// Case-insensitive, and a missing action means export
    pub fn normalize(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "" | "split" | "export" | "export_frames" => Self::ExportFrames,
            "reverse" | "reverse_gif" => Self::Reverse,
            "change_speed" | "change_frame_rate" | "speed" => Self::ChangeSpeed,
            "compress" | "compress_gif" => Self::Compress,
            "build" | "compose" | "combine" | "build_gif" | "make_gif" => Self::BuildGif,
            "get_frame_count" | "frame_count" => Self::GetFrameCount,
            "resize" | "resize_gif" => Self::Resize,
            "convert_animation" | "convert" => Self::ConvertAnimation,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetFrameCount => "get_frame_count",
            Self::ExportFrames => "export_frames",
            Self::Reverse => "reverse",
            Self::ChangeSpeed => "change_speed",
            Self::Compress => "compress",
            Self::Resize => "resize",
            Self::BuildGif => "build_gif",
            Self::ConvertAnimation => "convert_animation",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated request, one variant per operation
#[derive(Clone, Debug)]
pub enum Request {
    GetFrameCount(FrameCountRequest),
    ExportFrames(ExportFramesRequest),
    Reverse(ReverseRequest),
    ChangeSpeed(ChangeSpeedRequest),
    Compress(CompressRequest),
    Resize(ResizeRequest),
    BuildGif(BuildGifRequest),
    ConvertAnimation(ConvertRequest),
}

impl Request {
    /// Validates the fields `action` needs. No files are touched.
    pub fn from_json(action: Action, req: &Map<String, Value>) -> AnimResult<Self> {
        Ok(match action {
            Action::GetFrameCount => Self::GetFrameCount(FrameCountRequest {
                input_path: required_path(req, "input_path")?,
            }),
            Action::ExportFrames => {
                let (input_path, output_dir) = match (path_field(req, "input_path"), path_field(req, "output_dir")) {
                    (Some(i), Some(o)) => (i, o),
                    _ => return Err(Error::BadRequest("Missing input_path or output_dir".into())),
                };
                let frame_range = str_field(req, "frame_range").unwrap_or_else(|| {
                    bounds_range(int_field(req, "start_frame"), int_field(req, "end_frame"))
                });
                Self::ExportFrames(ExportFramesRequest {
                    input_path,
                    output_dir,
                    output_format: str_field(req, "output_format").or_else(|| str_field(req, "format")).unwrap_or_else(|| "png".into()),
                    frame_range,
                })
            },
            Action::Reverse => {
                let (input_path, output_path) = in_out_paths(req)?;
                Self::Reverse(ReverseRequest { input_path, output_path, loop_count: loop_field(req) })
            },
            Action::ChangeSpeed => {
                let (input_path, output_path) = in_out_paths(req)?;
                Self::ChangeSpeed(ChangeSpeedRequest {
                    input_path,
                    output_path,
                    speed_factor: crate::pipeline::sanitize_speed(float_field(req, "speed_factor")),
                    loop_count: loop_field(req),
                })
            },
            Action::Compress => {
                let (input_path, output_path) = in_out_paths(req)?;
                Self::Compress(CompressRequest {
                    input_path,
                    output_path,
                    quality: sanitize_quality(float_field(req, "quality")),
                    loop_count: loop_field(req),
                })
            },
            Action::Resize => {
                let (input_path, output_path) = in_out_paths(req)?;
                Self::Resize(ResizeRequest {
                    input_path,
                    output_path,
                    width: dimension_field(req, "width"),
                    height: dimension_field(req, "height"),
                    maintain_aspect: bool_field(req, "maintain_aspect").unwrap_or(true),
                    loop_count: loop_field(req),
                })
            },
            Action::BuildGif => {
                let output_path = required_path(req, "output_path")?;
                let input_paths = input_paths(req);
                if input_paths.is_empty() {
                    return Err(Error::NoInput);
                }
                Self::BuildGif(BuildGifRequest {
                    input_paths,
                    output_path,
                    fps: crate::pipeline::sanitize_fps(float_field(req, "fps")),
                    loop_count: loop_field(req).unwrap_or(0),
                })
            },
            Action::ConvertAnimation => {
                let (input_path, output_path) = in_out_paths(req)?;
                let name = str_field(req, "output_format")
                    .ok_or_else(|| Error::BadRequest("Missing output_format".into()))?;
                let output_format = ContainerFormat::from_name(&name)
                    .ok_or_else(|| Error::ConvertBadFormat(name.to_ascii_lowercase()))?;
                Self::ConvertAnimation(ConvertRequest {
                    input_path,
                    output_path,
                    output_format,
                    quality: float_field(req, "quality").map(|q| sanitize_quality(Some(q))),
                    loop_count: loop_field(req),
                })
            },
        })
    }
}

/// Request dispatcher. Handles one request at a time, on the calling thread.
pub struct Router {
    ops: Operations,
}

impl Router {
    pub fn new(settings: Settings) -> Self {
        Self { ops: Operations::new(settings) }
    }

    /// Parses a JSON request and serializes the response
    pub fn handle_json(&self, input: &str) -> String {
        let response = match serde_json::from_str::<Value>(input) {
            Ok(request) => self.handle(&request),
            Err(err) => failure(&Error::from(err)),
        };
        response.to_string()
    }

    /// Always returns exactly one response object, never panics on bad input
    pub fn handle(&self, request: &Value) -> Value {
        let Some(req) = request.as_object() else {
            return failure(&Error::BadRequest("Request must be a JSON object".into()));
        };
        let raw_action = req.get("action").and_then(Value::as_str).unwrap_or("");
        let Some(action) = Action::normalize(raw_action) else {
            warn!(action = raw_action, "unsupported action");
            return failure(&Error::UnsupportedAction(raw_action.trim().to_string()));
        };
        info!(action = raw_action, %action, "handling request");

        match self.dispatch(action, req) {
            Ok(mut response) => {
                for key in ["input_path", "input_paths", "output_path", "output_dir"] {
                    if let Some(v) = req.get(key).filter(|v| !v.is_null()) {
                        response.entry(key).or_insert_with(|| v.clone());
                    }
                }
                info!(%action, "request completed");
                Value::Object(response)
            },
            Err(err) => {
                warn!(%action, code = err.code().as_str(), %err, "request failed");
                failure(&err)
            },
        }
    }

    fn dispatch(&self, action: Action, req: &Map<String, Value>) -> AnimResult<Map<String, Value>> {
        match Request::from_json(action, req)? {
            Request::GetFrameCount(r) => success(self.ops.get_frame_count(&r)?),
            Request::ExportFrames(r) => success(self.ops.export_frames(&r)?),
            Request::Reverse(r) => success(self.ops.reverse(&r)?),
            Request::ChangeSpeed(r) => success(self.ops.change_speed(&r)?),
            Request::Compress(r) => success(self.ops.compress(&r)?),
            Request::Resize(r) => success(self.ops.resize(&r)?),
            Request::BuildGif(r) => success(self.ops.build_gif(&r)?),
            Request::ConvertAnimation(r) => success(self.ops.convert_animation(&r)?),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

fn success(result: impl Serialize) -> AnimResult<Map<String, Value>> {
    let mut out = Map::new();
    out.insert("success".into(), Value::Bool(true));
    match serde_json::to_value(result)? {
        Value::Object(fields) => out.extend(fields),
        other => return Err(Error::BadRequest(format!("unexpected result {}", other))),
    }
    Ok(out)
}

fn failure(err: &Error) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "error_code": err.code(),
    })
}

/// `round(value)` clamped to 1–100, 90 when absent
pub fn sanitize_quality(value: Option<f64>) -> u8 {
    match value {
        Some(q) if q.is_finite() => q.round().clamp(1., 100.) as u8,
        _ => DEFAULT_QUALITY,
    }
}

fn bounds_range(start: Option<i64>, end: Option<i64>) -> String {
    match FrameRange::from_bounds(start, end) {
        FrameRange::All => "all".into(),
        FrameRange::Single(i) => i.to_string(),
        FrameRange::Span { start, end } => format!("{}-{}", start, end),
        FrameRange::Stride { start, step } => format!("{}:{}", start, step),
    }
}

/// Non-empty string, trimmed
fn str_field(req: &Map<String, Value>, key: &str) -> Option<String> {
    req.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

fn path_field(req: &Map<String, Value>, key: &str) -> Option<PathBuf> {
    str_field(req, key).map(PathBuf::from)
}

fn required_path(req: &Map<String, Value>, key: &str) -> AnimResult<PathBuf> {
    path_field(req, key).ok_or_else(|| Error::BadRequest(format!("Missing {}", key)))
}

fn in_out_paths(req: &Map<String, Value>) -> AnimResult<(PathBuf, PathBuf)> {
    match (path_field(req, "input_path"), path_field(req, "output_path")) {
        (Some(i), Some(o)) => Ok((i, o)),
        _ => Err(Error::BadRequest("Missing input_path or output_path".into())),
    }
}

/// `input_paths` without empty entries, or the single `input_path`
fn input_paths(req: &Map<String, Value>) -> Vec<PathBuf> {
    match req.get("input_paths").and_then(Value::as_array) {
        Some(list) => list.iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        None => path_field(req, "input_path").into_iter().collect(),
    }
}

/// Numbers and numeric strings
fn float_field(req: &Map<String, Value>, key: &str) -> Option<f64> {
    match req.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whole numbers only
fn int_field(req: &Map<String, Value>, key: &str) -> Option<i64> {
    match req.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loop_field(req: &Map<String, Value>) -> Option<u32> {
    int_field(req, "loop").and_then(|l| u32::try_from(l).ok())
}

/// Negative or missing is 0
fn dimension_field(req: &Map<String, Value>, key: &str) -> usize {
    match float_field(req, key) {
        Some(v) if v.is_finite() && v > 0. => v.round() as usize,
        _ => 0,
    }
}

fn bool_field(req: &Map<String, Value>, key: &str) -> Option<bool> {
    match req.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
