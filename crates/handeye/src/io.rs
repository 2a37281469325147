//! JSON configuration and report helpers for a collection run.

use std::fs;
use std::path::{Path, PathBuf};

use handeye_collect::{CaptureParams, CollectError, CollectionStats};
use handeye_core::{CalibrationConfig, CalibrationResult, Pose3D, SampleSet};
use serde::{Deserialize, Serialize};

use crate::sim::SimParams;

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Serial number of the default stereo head.
pub const DEFAULT_DEVICE_ID: &str = "150534";

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}

/// Everything a run needs, as read from a JSON file.
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub capture: CaptureParams,
    #[serde(default)]
    pub sim: SimParams,
    #[serde(default)]
    pub report_path: Option<String>,
    /// Store the collected pose pairs in the report.
    #[serde(default)]
    pub include_samples: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            calibration: CalibrationConfig::default(),
            capture: CaptureParams::default(),
            sim: SimParams::default(),
            report_path: None,
            include_samples: false,
        }
    }
}

impl RunConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("handeye_report.json"))
    }
}

/// Outcome of one run, written as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default)]
    pub config_path: Option<String>,
    pub device_id: String,
    pub target_sample_count: usize,
    pub stats: CollectionStats,
    /// Present when the solver was called.
    #[serde(default)]
    pub result: Option<CalibrationResult>,
    #[serde(default)]
    pub samples: Option<SampleSet>,
    /// Known hand-eye transform, when the rig is simulated.
    #[serde(default)]
    pub ground_truth: Option<Pose3D>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunReport {
    /// Build an empty report for `cfg`.
    pub fn new(cfg: &RunConfig, config_path: Option<&Path>) -> Self {
        Self {
            config_path: config_path.map(|p| p.to_string_lossy().into_owned()),
            device_id: cfg.device_id.clone(),
            target_sample_count: cfg.calibration.target_sample_count,
            stats: CollectionStats::default(),
            result: None,
            samples: None,
            ground_truth: None,
            error: None,
        }
    }

    pub fn set_result(&mut self, result: CalibrationResult) {
        self.result = Some(result);
        self.error = if result.is_success() {
            None
        } else {
            Some("solver did not return a transform".to_string())
        };
    }

    /// Record why the run was aborted.
    pub fn set_error(&mut self, err: &CollectError) {
        self.result = None;
        self.error = Some(err.to_string());
    }

    /// Whether the run produced a hand-eye transform.
    pub fn is_success(&self) -> bool {
        self.result.is_some_and(|r| r.is_success())
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
