//! Per-user cooldown between accepted messages.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Time left before `now` is outside the window, or `None` if the message is allowed.
///
/// A clock that went backwards counts as zero elapsed time.
pub fn remaining(now: DateTime<Utc>, last_seen: Option<DateTime<Utc>>, window: Duration) -> Option<Duration> {
    let last = last_seen?;
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    if elapsed < window {
        Some(window - elapsed)
    } else {
        None
    }
}

/// Tracks the last accepted message time per user.
pub struct CooldownGate {
    window: Duration,
    last_seen: Mutex<HashMap<u64, DateTime<Utc>>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Accept and stamp the message, or return how long the user still has to wait.
    pub async fn admit(&self, user_id: u64, now: DateTime<Utc>) -> Result<(), Duration> {
        let mut last_seen = self.last_seen.lock().await;
        if let Some(left) = remaining(now, last_seen.get(&user_id).copied(), self.window) {
            return Err(left);
        }
        last_seen.insert(user_id, now);
        Ok(())
    }

    pub async fn last_seen(&self, user_id: u64) -> Option<DateTime<Utc>> {
        self.last_seen.lock().await.get(&user_id).copied()
    }
}
