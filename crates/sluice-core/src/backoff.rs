//! Backoff policy: decides retry delays.

use std::time::Duration;

use rand::Rng;

/// Full-jitter exponential backoff.
///
/// Returns a delay in `[0, min(cap, base * 2^attempt)]`.
///
/// - a zero `base` is treated as 1ns
/// - a `cap` below `base` is raised to `base`
/// - without a random source the delay is zero ("no backoff configured");
///   the worker pool always passes one
pub fn delay<R: Rng + ?Sized>(
    attempt: u32,
    base: Duration,
    cap: Duration,
    rng: Option<&mut R>,
) -> Duration {
    let base = base.max(Duration::from_nanos(1));
    let cap = cap.max(base);

    let capped = saturating_envelope(base, attempt, cap);

    let Some(rng) = rng else {
        return Duration::ZERO;
    };

    let max = capped.as_nanos() as f64;
    let x = rng.gen_range(0.0..1.0) * max;
    if x >= max {
        return capped;
    }
    Duration::from_nanos(x as u64)
}

/// `min(cap, base * 2^attempt)` without overflowing.
fn saturating_envelope(base: Duration, attempt: u32, cap: Duration) -> Duration {
    if base >= cap {
        return cap;
    }

    let mut cur = base;
    for _ in 0..attempt {
        if cur > cap / 2 {
            return cap;
        }
        cur = match cur.checked_mul(2) {
            Some(next) => next,
            None => return cap,
        };
        if cur >= cap {
            return cap;
        }
    }
    cur
}

/// Backoff bounds for the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Envelope for the first retry.
    pub base: Duration,

    /// Upper bound for any single delay.
    pub cap: Duration,
}

impl BackoffPolicy {
    pub const DEFAULT_BASE: Duration = Duration::from_millis(50);
    pub const DEFAULT_CAP: Duration = Duration::from_secs(2);

    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Pre-jitter envelope for `attempt`, after the same clamping `delay` applies.
    pub fn envelope(&self, attempt: u32) -> Duration {
        let base = self.base.max(Duration::from_nanos(1));
        saturating_envelope(base, attempt, self.cap.max(base))
    }

    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        delay(attempt, self.base, self.cap, Some(rng))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP)
    }
}
