use std::time::{Duration, Instant};

/// Longest lock a host may hold, in seconds.
pub const MAX_LOCK_SECONDS: u8 = 10;

/// An exclusive claim on the device by one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLock {
    pub cid: u32,
    pub expires_at: Instant,
}

/// Tracks the single optional channel lock.
///
/// Expiry is checked lazily: an expired lock is cleared by the first
/// permission check that sees it.
#[derive(Debug, Default)]
pub struct LockManager {
    current: Option<ChannelLock>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when frames on `cid` may be processed at `now`.
    pub fn is_permitted(&mut self, cid: u32, now: Instant) -> bool {
        match self.current {
            None => true,
            Some(lock) if now >= lock.expires_at => {
                tracing::info!(cid = format_args!("{:#010x}", lock.cid), "channel lock expired");
                self.current = None;
                true
            }
            Some(lock) => lock.cid == cid,
        }
    }

    /// Install, replace or clear the lock for `cid`.
    ///
    /// `seconds` is clamped to [`MAX_LOCK_SECONDS`]; zero releases any lock.
    /// Returns the effective duration.
    pub fn apply(&mut self, cid: u32, seconds: u8, now: Instant) -> Duration {
        let seconds = seconds.min(MAX_LOCK_SECONDS);
        if seconds == 0 {
            if let Some(lock) = self.current.take() {
                tracing::info!(
                    cid = format_args!("{:#010x}", lock.cid),
                    by = format_args!("{cid:#010x}"),
                    "channel lock released"
                );
            }
            return Duration::ZERO;
        }

        let duration = Duration::from_secs(u64::from(seconds));
        self.current = Some(ChannelLock {
            cid,
            expires_at: now + duration,
        });
        tracing::info!(
            cid = format_args!("{cid:#010x}"),
            seconds,
            "channel lock installed"
        );
        duration
    }

    /// The current lock, expired or not.
    pub fn holder(&self) -> Option<ChannelLock> {
        self.current
    }
}
