use std::time::Instant;

/// Correlates a system time with a monotonic instant.
///
/// Event headers carry monotonic nanoseconds relative to `instant`;
/// consumers use `system_time` to turn them back into wall-clock time.
#[derive(Debug, Clone)]
pub struct TimeAnchor {
    /// The system time.
    pub system_time: chrono::DateTime<chrono::Utc>,

    /// The monotonic instant captured together with `system_time`.
    pub instant: Instant,
}

impl Default for TimeAnchor {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeAnchor {
    pub fn new() -> Self {
        TimeAnchor {
            system_time: chrono::Utc::now(),
            instant: Instant::now(),
        }
    }

    /// Nanoseconds elapsed between the anchor and `ts`.
    /// Instants before the anchor yield negative values.
    pub fn nanotime(&self, ts: Instant) -> i64 {
        match ts.checked_duration_since(self.instant) {
            Some(d) => clamp_nanos(d.as_nanos()),
            None => -clamp_nanos(self.instant.duration_since(ts).as_nanos()),
        }
    }
}

fn clamp_nanos(nanos: u128) -> i64 {
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
