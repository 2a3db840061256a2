/*
 animtool animated GIF, APNG and WebP transformer

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
//! Frame-level transforms for animated images.
//!
//! A request goes through the [`Router`], which opens the input with the
//! [`reader`], runs it through [`pipeline`] stages and the [`Quantizer`],
//! and hands the result to the [`writer`]. Everything runs on the calling
//! thread, one request at a time.

#[macro_use] extern crate quick_error;

mod error;
pub use crate::error::*;
pub mod budget;
pub mod chunks;
mod encodeapng;
mod encodegif;
mod encodewebp;
pub mod frame;
pub use crate::frame::*;
pub mod frame_range;
pub mod ops;
pub mod pipeline;
mod quantize;
pub use crate::quantize::*;
pub mod reader;
mod router;
pub use crate::router::*;
pub mod writer;

/// What this build is able to do.
///
/// Passed explicitly to the quantizer and writer instead of being probed
/// globally, so tests can turn features off.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Capabilities {
    /// APNG output
    pub apng: bool,
    /// WebP input and output
    pub webp: bool,
    /// Floyd–Steinberg dithering while remapping to a palette
    pub dither: bool,
}

impl Capabilities {
    /// Everything compiled into this build
    pub fn detect() -> Self {
        Self {
            apng: true,
            webp: cfg!(feature = "webp"),
            dither: true,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Largest `frames × width × height` that compress and resize will accept
    pub max_frame_pixels: u64,
    pub capabilities: Capabilities,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_frame_pixels: budget::MAX_FRAME_PIXELS,
            capabilities: Capabilities::detect(),
        }
    }
}
