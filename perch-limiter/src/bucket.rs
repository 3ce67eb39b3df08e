use std::time::Instant;

/// Reset hint returned when the bucket never refills.
pub const STATIC_RESET_SECS: u64 = 60;

/// Outcome of one quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Whole tokens left after this check.
    pub remaining: u64,
    /// Seconds until the caller should expect capacity again.
    pub reset_in: u64,
}

/// A single token bucket.
///
/// `tokens` stays within `[0, max_tokens]` and `last_refill` only moves
/// forward.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    /// Tokens per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket holding `burst` tokens.
    pub fn new(requests_per_minute: u32, burst: u32, now: Instant) -> Self {
        let max_tokens = f64::from(burst);
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: f64::from(requests_per_minute) / 60.0,
            last_refill: now,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Adopt a changed policy, clamping stored tokens to the new capacity.
    pub fn retune(&mut self, requests_per_minute: u32, burst: u32) {
        let max_tokens = f64::from(burst);
        let refill_rate = f64::from(requests_per_minute) / 60.0;
        if max_tokens != self.max_tokens || refill_rate != self.refill_rate {
            self.max_tokens = max_tokens;
            self.refill_rate = refill_rate;
            self.tokens = self.tokens.min(max_tokens);
        }
    }

    /// Credit tokens for the time elapsed since the last refill.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 && self.refill_rate > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
            self.last_refill = now;
        }
    }

    /// Refill, then take one token if available.
    pub fn check(&mut self, now: Instant) -> Decision {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            let reset_in = if self.refill_rate > 0.0 {
                ((self.max_tokens - self.tokens) / self.refill_rate).ceil() as u64
            } else {
                0
            };
            return Decision {
                allowed: true,
                remaining: self.tokens.floor() as u64,
                reset_in,
            };
        }

        let reset_in = if self.refill_rate > 0.0 {
            (1.0 / self.refill_rate).ceil() as u64
        } else {
            STATIC_RESET_SECS
        };
        Decision {
            allowed: false,
            remaining: 0,
            reset_in,
        }
    }
}
