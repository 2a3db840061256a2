use std::io;
use std::path::PathBuf;
use quick_error::quick_error;
use serde::Serialize;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        BadRequest(msg: String) {
            display("{}", msg)
            from(err: serde_json::Error) -> (format!("Invalid request: {}", err))
        }
        NoInput {
            display("No input images provided")
        }
        InputNotFound(path: PathBuf) {
            display("Input file not found: {}", path.display())
        }
        UnsupportedContainer(msg: String) {
            display("{}", msg)
        }
        NotAnimated(frames: usize) {
            display("Input is not animated ({} frame)", frames)
        }
        MemoryLimit(op: &'static str, cost: u64, limit: u64) {
            display("{} would process {} frame-pixels, the limit is {}", op, cost, limit)
        }
        UnsupportedOutputFormat(format: String) {
            display("Unsupported output format: {}", format)
        }
        ConvertBadFormat(format: String) {
            display("Cannot convert animation to '{}'; use gif, apng or webp", format)
        }
        InvalidSize {
            display("Width or height must be set")
        }
        UnsupportedAction(action: String) {
            display("Unsupported action: {}", action)
        }
        NoFrames {
            display("Found no frames to encode")
        }
        Gif(err: gif::EncodingError) {
            display("GIF encoding error: {}", err)
        }
        Encode(msg: String) {
            display("{}", msg)
        }
        Quant(liq: imagequant::Error) {
            from()
            display("pngquant error: {}", liq)
        }
        Pal(gif: gif_dispose::Error) {
            from()
            display("gif dispose error: {}", gif)
        }
        WrongSize(msg: String) {
            display("{}", msg)
            from(e: resize::Error) -> (e.to_string())
        }
        Io(err: io::Error) {
            from()
            from(e: tempfile::PersistError) -> (e.error)
            from(_oom: std::collections::TryReserveError) -> (io::ErrorKind::OutOfMemory.into())
            display("I/O: {}", err)
        }
    }
}

pub type AnimResult<T, E = Error> = Result<T, E>;

/// Stable error codes reported in failed responses
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    InputNotFound,
    UnsupportedContainer,
    NotAnimated,
    MemoryLimit,
    UnsupportedOutputFormat,
    InvalidSize,
    UnsupportedAction,
    ConvertBadFormat,
    EncodeFailure,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::InputNotFound => "INPUT_NOT_FOUND",
            Self::UnsupportedContainer => "UNSUPPORTED_CONTAINER",
            Self::NotAnimated => "NOT_ANIMATED",
            Self::MemoryLimit => "MEMORY_LIMIT",
            Self::UnsupportedOutputFormat => "UNSUPPORTED_OUTPUT_FORMAT",
            Self::InvalidSize => "INVALID_SIZE",
            Self::UnsupportedAction => "UNSUPPORTED_ACTION",
            Self::ConvertBadFormat => "CONVERT_BAD_FORMAT",
            Self::EncodeFailure => "ENCODE_FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) | Self::NoInput => ErrorCode::BadRequest,
            Self::InputNotFound(_) => ErrorCode::InputNotFound,
            Self::UnsupportedContainer(_) | Self::Pal(_) => ErrorCode::UnsupportedContainer,
            Self::NotAnimated(_) => ErrorCode::NotAnimated,
            Self::MemoryLimit(..) => ErrorCode::MemoryLimit,
            Self::UnsupportedOutputFormat(_) => ErrorCode::UnsupportedOutputFormat,
            Self::ConvertBadFormat(_) => ErrorCode::ConvertBadFormat,
            Self::InvalidSize => ErrorCode::InvalidSize,
            Self::UnsupportedAction(_) => ErrorCode::UnsupportedAction,
            Self::NoFrames | Self::Gif(_) | Self::Encode(_) | Self::Quant(_) => ErrorCode::EncodeFailure,
            Self::WrongSize(_) | Self::Io(_) => ErrorCode::InternalError,
        }
    }
}

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Self {
        match err {
            gif::EncodingError::Io(err) => err.into(),
            other => Error::Gif(other),
        }
    }
}

impl From<gif::DecodingError> for Error {
    #[cold]
    fn from(err: gif::DecodingError) -> Self {
        match err {
            gif::DecodingError::Io(err) => err.into(),
            other => Error::UnsupportedContainer(format!("Malformed GIF: {}", other)),
        }
    }
}

impl From<png::EncodingError> for Error {
    #[cold]
    fn from(err: png::EncodingError) -> Self {
        match err {
            png::EncodingError::IoError(err) => err.into(),
            other => Error::Encode(format!("APNG encoding error: {}", other)),
        }
    }
}

impl From<image::ImageError> for Error {
    #[cold]
    fn from(err: image::ImageError) -> Self {
        use image::ImageError as IE;
        match err {
            IE::IoError(err) => err.into(),
            IE::Encoding(e) => Error::Encode(e.to_string()),
            IE::Parameter(e) => Error::Encode(e.to_string()),
            other => Error::UnsupportedContainer(format!("Unsupported image format: {}", other)),
        }
    }
}

impl From<lodepng::Error> for Error {
    #[cold]
    fn from(err: lodepng::Error) -> Self {
        Error::UnsupportedContainer(format!("PNG error: {}", err))
    }
}

#[test]
fn codes_are_screaming_snake_case() {
    let code = Error::MemoryLimit("compress", 10, 5).code();
    assert_eq!(serde_json::to_value(code).unwrap(), serde_json::json!("MEMORY_LIMIT"));
    assert_eq!(code.as_str(), "MEMORY_LIMIT");
    assert_eq!(Error::InvalidSize.code().as_str(), "INVALID_SIZE");
    assert_eq!(Error::NoInput.code(), ErrorCode::BadRequest);
}
