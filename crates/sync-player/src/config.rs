/// Sync tuning parameters shared by the controller and drift monitor.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    /// Time divergence (seconds) above which a sample counts as an excursion.
    pub drift_tolerance_secs: f64,
    /// Rate at which the host calls `tick()`.
    pub tick_hz: u32,
}

impl Default for SyncConfig {
    /// One frame at 60 Hz of tolerance, ticked once per rendered frame.
    fn default() -> Self {
        Self {
            drift_tolerance_secs: 1.0 / 60.0,
            tick_hz: 60,
        }
    }
}

impl SyncConfig {
    /// Tick period derived from `tick_hz` (clamped to at least 1 Hz).
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    /// Tolerance with non-finite or negative values replaced by the default.
    pub fn effective_tolerance(&self) -> f64 {
        if self.drift_tolerance_secs.is_finite() && self.drift_tolerance_secs >= 0.0 {
            self.drift_tolerance_secs
        } else {
            Self::default().drift_tolerance_secs
        }
    }
}
