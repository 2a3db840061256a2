//! Frame selection for exports: `all`, `start-end`, `start:step` or a single index

use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameRange {
    All,
    /// Inclusive on both ends
    Span { start: i64, end: i64 },
    Stride { start: i64, step: i64 },
    Single(i64),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidRange(String);

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid frame range '{}'", self.0)
    }
}

impl FromStr for FrameRange {
    type Err = InvalidRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let int = |part: &str| part.trim().parse::<i64>().map_err(|_| InvalidRange(s.into()));

        if s.contains('-') {
            let mut parts = s.split('-');
            return match (parts.next(), parts.next(), parts.next()) {
                (Some(start), Some(end), None) => Ok(Self::Span { start: int(start)?, end: int(end)? }),
                _ => Err(InvalidRange(s.into())),
            };
        }
        if let Some((start, step)) = s.split_once(':') {
            let step = int(step)?;
            if step <= 0 {
                return Err(InvalidRange(s.into()));
            }
            return Ok(Self::Stride { start: int(start)?, step });
        }
        Ok(Self::Single(int(s)?))
    }
}

impl FrameRange {
    /// Indices into a `total`-frame animation. Out-of-bounds ones are dropped.
    pub fn indices(self, total: usize) -> Vec<usize> {
        let total = total as i64;
        let in_bounds = |i: &i64| (0..total).contains(i);
        let selected: Vec<i64> = match self {
            Self::All => (0..total).collect(),
            Self::Span { start, end } => (start..end.saturating_add(1).min(total)).filter(in_bounds).collect(),
            Self::Stride { start, step } => (start..total).step_by(step as usize).filter(in_bounds).collect(),
            Self::Single(i) => Some(i).filter(in_bounds).into_iter().collect(),
        };
        selected.into_iter().map(|i| i as usize).collect()
    }

    /// Builds a range from `start_frame`/`end_frame` request fields
    pub fn from_bounds(start: Option<i64>, end: Option<i64>) -> Self {
        match (start.unwrap_or(0), end.unwrap_or(0)) {
            (0, 0) => Self::All,
            (start, end) if end <= 0 => Self::Single(start),
            (start, end) => Self::Span { start, end },
        }
    }
}

/// Parses `range`, falling back to every frame when it can't be understood
pub fn select(range: &str, total: usize) -> Vec<usize> {
    let range = range.parse::<FrameRange>().unwrap_or_else(|err: InvalidRange| {
        warn!(%err, "using all frames");
        FrameRange::All
    });
    range.indices(total)
}
