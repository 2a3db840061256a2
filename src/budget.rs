use crate::error::{AnimResult, Error};

/// Default ceiling on `frames × width × height` for quantize/resize work
pub const MAX_FRAME_PIXELS: u64 = 120_000_000;

/// Rejects work whose frame-pixel cost exceeds `limit`.
///
/// Must be called before any per-frame buffers are allocated.
pub fn assert_budget(frame_count: usize, width: usize, height: usize, op: &'static str, limit: u64) -> AnimResult<()> {
    let cost = (frame_count as u64)
        .saturating_mul(width as u64)
        .saturating_mul(height as u64);
    if cost > limit {
        tracing::warn!(op, frame_count, width, height, cost, limit, "frame-pixel budget exceeded");
        return Err(Error::MemoryLimit(op, cost, limit));
    }
    Ok(())
}

#[test]
fn budget_boundary() {
    assert!(assert_budget(10, 100, 100, "compress", 100_000).is_ok());
    assert!(matches!(assert_budget(10, 100, 101, "compress", 100_000), Err(Error::MemoryLimit("compress", 101_000, 100_000))));
    assert!(assert_budget(usize::MAX, usize::MAX, 2, "resize", MAX_FRAME_PIXELS).is_err());
}
