//! Read/write configuration.
//!
//! A [`MefConfig`] value is passed into every entry point. Nothing in the
//! crate keeps process-wide state.

/// Default target ratio between the mean residual and the mean absolute
/// deviation of a block in lossy mode.
pub const DEFAULT_GOAL_MEAN_RESIDUAL_RATIO: f64 = 0.10;

/// Default tolerance around [`DEFAULT_GOAL_MEAN_RESIDUAL_RATIO`].
pub const DEFAULT_GOAL_TOLERANCE: f64 = 0.01;

/// How loudly per-block validation failures are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailBehavior {
    /// Report every failure as a `warn!` event.
    #[default]
    Return,
    /// Downgrade per-block failure events to `debug!`.
    Suppress,
}

/// Whether block CRCs are checked when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcMode {
    /// Verify every block CRC before decoding.
    #[default]
    Validate,
    /// Skip block CRC verification.
    Ignore,
}

/// Lossy compression targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossyConfig {
    /// Target mean residual ratio.
    pub goal_mean_residual_ratio: f64,
    /// Accepted distance from the target.
    pub goal_tolerance: f64,
}

impl Default for LossyConfig {
    fn default() -> Self {
        Self {
            goal_mean_residual_ratio: DEFAULT_GOAL_MEAN_RESIDUAL_RATIO,
            goal_tolerance: DEFAULT_GOAL_TOLERANCE,
        }
    }
}

impl LossyConfig {
    /// Creates a lossy configuration with custom targets.
    pub fn new(goal_mean_residual_ratio: f64, goal_tolerance: f64) -> Self {
        Self {
            goal_mean_residual_ratio,
            goal_tolerance,
        }
    }
}

/// Configuration shared by readers and writers.
#[derive(Debug, Clone, PartialEq)]
pub struct MefConfig {
    /// Reporting level for per-block failures.
    pub behavior_on_fail: FailBehavior,
    /// Block CRC policy on read.
    pub crc_mode: CrcMode,
    /// Maximum deviation (µs) between a block start and the predicted end of
    /// the previous block before the table of contents reports a gap.
    /// `None` uses one sample interval.
    pub discontinuity_epsilon_us: Option<i64>,
    /// Keep segment data files open between reads.
    pub keep_files_open: bool,
    /// Lossy compression targets.
    pub lossy: LossyConfig,
}

impl Default for MefConfig {
    fn default() -> Self {
        Self {
            behavior_on_fail: FailBehavior::default(),
            crc_mode: CrcMode::default(),
            discontinuity_epsilon_us: None,
            keep_files_open: true,
            lossy: LossyConfig::default(),
        }
    }
}

impl MefConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure reporting behavior.
    pub fn with_behavior_on_fail(mut self, behavior: FailBehavior) -> Self {
        self.behavior_on_fail = behavior;
        self
    }

    /// Sets the block CRC policy.
    pub fn with_crc_mode(mut self, mode: CrcMode) -> Self {
        self.crc_mode = mode;
        self
    }

    /// Sets a fixed discontinuity epsilon in microseconds.
    pub fn with_discontinuity_epsilon_us(mut self, epsilon: i64) -> Self {
        self.discontinuity_epsilon_us = Some(epsilon);
        self
    }

    /// Sets whether data files stay open between reads.
    pub fn with_keep_files_open(mut self, keep: bool) -> Self {
        self.keep_files_open = keep;
        self
    }

    /// Sets the lossy compression targets.
    pub fn with_lossy(mut self, lossy: LossyConfig) -> Self {
        self.lossy = lossy;
        self
    }

    /// Discontinuity epsilon for a channel sampled at `sampling_frequency`.
    pub fn epsilon_us(&self, sampling_frequency: f64) -> i64 {
        match self.discontinuity_epsilon_us {
            Some(epsilon) => epsilon,
            None if sampling_frequency > 0.0 => (1e6 / sampling_frequency).round() as i64,
            None => 0,
        }
    }
}
