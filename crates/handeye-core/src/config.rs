//! Collection-loop configuration.

use std::time::Duration;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::Pose3D;

/// Configuration validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("target_sample_count must be > 0")]
    ZeroSampleCount,
    #[error("grid_spacing must be finite and > 0 (got {0})")]
    InvalidGridSpacing(f64),
    #[error("min_radius must be finite and > 0 (got {0})")]
    InvalidMinRadius(f64),
    #[error("{name} must be finite and >= 0 (got {value})")]
    InvalidDelay { name: &'static str, value: f64 },
    #[error("capture.max_attempts must be > 0")]
    ZeroCaptureAttempts,
    #[error("capture.min_observations must be > 0")]
    ZeroMinObservations,
}

/// Per-iteration capture retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePolicy {
    /// Upper bound on capture attempts in one iteration.
    pub max_attempts: usize,
    /// Buffered observations needed before a pattern pose is estimated.
    pub min_observations: usize,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_observations: 3,
        }
    }
}

fn default_settle_delay_s() -> f64 {
    0.5
}

fn default_pre_solve_delay_s() -> f64 {
    1.0
}

/// Parameters of one data-collection run.
///
/// Supplied once when the collector is built and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Number of pose pairs to collect before solving.
    pub target_sample_count: usize,
    /// Physical size of one pattern cell (same unit as the grabber expects).
    pub grid_spacing: f64,
    /// Minimum radius of the random robot moves around the pattern.
    pub min_radius: f64,
    /// Prior for the pattern pose in the robot frame, used to aim motion requests.
    pub estimated_pattern_pose: Pose3D,
    /// Ask the motion service to pass through its init pose before each move.
    #[serde(default)]
    pub go_to_init_pose: bool,
    /// Pause after a successful move so the robot is at rest before imaging.
    #[serde(default = "default_settle_delay_s")]
    pub settle_delay_s: f64,
    /// Pause between the end of collection and the solver call.
    #[serde(default = "default_pre_solve_delay_s")]
    pub pre_solve_delay_s: f64,
    #[serde(default)]
    pub capture: CapturePolicy,
}

impl CalibrationConfig {
    /// Build a config with the default delays and capture policy.
    pub fn new(
        target_sample_count: usize,
        grid_spacing: f64,
        min_radius: f64,
        estimated_pattern_pose: Pose3D,
    ) -> Self {
        Self {
            target_sample_count,
            grid_spacing,
            min_radius,
            estimated_pattern_pose,
            go_to_init_pose: false,
            settle_delay_s: default_settle_delay_s(),
            pre_solve_delay_s: default_pre_solve_delay_s(),
            capture: CapturePolicy::default(),
        }
    }

    /// Disable both delays (useful for simulation and tests).
    pub fn without_delays(mut self) -> Self {
        self.settle_delay_s = 0.0;
        self.pre_solve_delay_s = 0.0;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_sample_count == 0 {
            return Err(ConfigError::ZeroSampleCount);
        }
        if !self.grid_spacing.is_finite() || self.grid_spacing <= 0.0 {
            return Err(ConfigError::InvalidGridSpacing(self.grid_spacing));
        }
        if !self.min_radius.is_finite() || self.min_radius <= 0.0 {
            return Err(ConfigError::InvalidMinRadius(self.min_radius));
        }
        for (name, value) in [
            ("settle_delay_s", self.settle_delay_s),
            ("pre_solve_delay_s", self.pre_solve_delay_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDelay { name, value });
            }
        }
        if self.capture.max_attempts == 0 {
            return Err(ConfigError::ZeroCaptureAttempts);
        }
        if self.capture.min_observations == 0 {
            return Err(ConfigError::ZeroMinObservations);
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.settle_delay_s).unwrap_or(Duration::ZERO)
    }

    pub fn pre_solve_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.pre_solve_delay_s).unwrap_or(Duration::ZERO)
    }
}

impl Default for CalibrationConfig {
    /// 150 samples on a 12.5 mm grid, pattern roughly one metre in front of the robot base.
    fn default() -> Self {
        Self::new(150, 12.5, 0.5, default_pattern_prior())
    }
}

fn default_pattern_prior() -> Pose3D {
    let rotation = Matrix3::new(
        0.0, 0.0, 1.0, //
        0.0, 1.0, 0.0, //
        -1.0, 0.0, 0.0,
    );
    Pose3D::from_rotation_translation(&rotation, Vector3::new(-1.0, 0.0, 0.8))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = CalibrationConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.capture, CapturePolicy::default());
        assert_eq!(cfg.settle_delay(), Duration::from_millis(500));
        assert_eq!(cfg.estimated_pattern_pose.translation(), Vector3::new(-1.0, 0.0, 0.8));
    }

    #[test]
    fn rejects_bad_values() {
        let base = CalibrationConfig::default();

        let mut cfg = base.clone();
        cfg.target_sample_count = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSampleCount));

        let mut cfg = base.clone();
        cfg.grid_spacing = -1.0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidGridSpacing(-1.0)));

        let mut cfg = base.clone();
        cfg.min_radius = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidMinRadius(_))));

        let mut cfg = base.clone();
        cfg.settle_delay_s = -0.1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidDelay { name: "settle_delay_s", .. })
        ));

        let mut cfg = base;
        cfg.capture.max_attempts = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCaptureAttempts));
    }

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let json = r#"{
            "target_sample_count": 10,
            "grid_spacing": 12.5,
            "min_radius": 0.5,
            "estimated_pattern_pose": { "translation": [0, 0, 1], "rotation": [0, 0, 0, 1] }
        }"#;
        let cfg: CalibrationConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.go_to_init_pose);
        assert_eq!(cfg.settle_delay_s, 0.5);
        assert_eq!(cfg.pre_solve_delay_s, 1.0);
        assert_eq!(cfg.capture.max_attempts, 5);
        assert_eq!(cfg.capture.min_observations, 3);
    }
}
