//! Device-level stereo grabber contract and the [`PatternCapture`] adapter on top of it.

use std::fmt;
use std::time::SystemTime;

use handeye_core::Pose3D;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureError, PatternCapture};
use crate::publish::{publish_stereo, FramePublisher};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors reported by a [`Grabber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GrabberError {
    #[error("device is not open")]
    DeviceNotOpen,
    #[error("capture channel is not open")]
    ChannelNotOpen,
    #[error("device error: {0}")]
    Device(String),
    #[error("extrinsic calibration mode not initialized")]
    NotCalibrating,
    #[error("pattern buffer is empty")]
    EmptyPatternBuffer,
    #[error("stream error: {0}")]
    Stream(String),
}

/// Pixel layout of published images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelEncoding {
    Mono8,
    Bgr8,
}

impl PixelEncoding {
    /// Map a driver encoding string; three-channel 8-bit data is BGR, anything else mono.
    pub fn from_raw(raw: &str) -> Self {
        if raw == "CV_8UC3" {
            Self::Bgr8
        } else {
            Self::Mono8
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Mono8 => 1,
            Self::Bgr8 => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mono8 => "mono8",
            Self::Bgr8 => "bgr8",
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivered stereo pair.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoFrame {
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
    pub timestamp: SystemTime,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

/// Called from the grabber's delivery thread for every stereo pair.
pub type FrameCallback = Box<dyn FnMut(&StereoFrame) + Send>;

/// Camera capture settings applied once after the channel is opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureParams {
    pub auto_exposure: bool,
    pub auto_gain: bool,
    pub binning: u32,
    /// Exposure time in milliseconds (used when auto exposure is off).
    pub exposure_ms: f64,
    pub front_light: bool,
    pub gain: u32,
    pub gain_boost: bool,
    pub hardware_gamma: bool,
    pub hdr: bool,
    pub pixel_clock_mhz: u32,
    pub projector: bool,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            auto_exposure: true,
            auto_gain: true,
            binning: 1,
            exposure_ms: 0.32,
            front_light: true,
            gain: 1,
            gain_boost: false,
            hardware_gamma: false,
            hdr: false,
            pixel_clock_mhz: 10,
            projector: false,
        }
    }
}

/// Stereo camera session.
///
/// Frame delivery is asynchronous: once started, the device pushes frames into
/// the registered callback and detected patterns into a buffer it owns.
pub trait Grabber {
    fn open_device(&mut self, device_id: &str) -> Result<(), GrabberError>;
    fn close_device(&mut self) -> Result<(), GrabberError>;
    fn open_channel(&mut self) -> Result<(), GrabberError>;
    fn close_channel(&mut self) -> Result<(), GrabberError>;
    fn configure_capture(&mut self, params: &CaptureParams) -> Result<(), GrabberError>;
    fn register_frame_callback(&mut self, callback: FrameCallback) -> Result<(), GrabberError>;
    fn start(&mut self) -> Result<(), GrabberError>;
    fn stop(&mut self) -> Result<(), GrabberError>;
    fn is_running(&self) -> bool;
    fn clear_pattern_buffer(&mut self) -> Result<(), GrabberError>;
    fn init_extrinsic_calibration(&mut self, grid_spacing: f64) -> Result<(), GrabberError>;
    /// Try to detect the pattern in the current images; returns the buffered count.
    fn capture_pattern(&mut self) -> Result<usize, GrabberError>;
    /// Pattern-to-camera pose from all buffered observations.
    fn estimate_pattern_pose(&mut self) -> Result<Pose3D, GrabberError>;
}

/// [`PatternCapture`] over an opened [`Grabber`].
///
/// Owns the device and channel: they are released in reverse acquisition
/// order exactly once, by [`PatternCapture::shutdown`] or on drop.
pub struct GrabberCaptureAdapter<G: Grabber> {
    grabber: G,
    device_open: bool,
    channel_open: bool,
}

impl<G: Grabber> GrabberCaptureAdapter<G> {
    /// Open `device_id`, configure it and start streaming, republishing frames to `publisher`.
    ///
    /// Anything acquired before a failing step is released before the error is returned.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(grabber, params, publisher)))]
    pub fn open<P>(
        grabber: G,
        device_id: &str,
        params: &CaptureParams,
        mut publisher: P,
    ) -> Result<Self, GrabberError>
    where
        P: FramePublisher + 'static,
    {
        let mut adapter = Self {
            grabber,
            device_open: false,
            channel_open: false,
        };

        adapter.grabber.open_device(device_id)?;
        adapter.device_open = true;
        adapter.grabber.open_channel()?;
        adapter.channel_open = true;
        adapter.grabber.configure_capture(params)?;
        adapter
            .grabber
            .register_frame_callback(Box::new(move |frame: &StereoFrame| {
                publish_stereo(&mut publisher, frame)
            }))?;
        adapter.grabber.start()?;

        info!("opened stereo device {device_id}");
        Ok(adapter)
    }

    pub fn grabber(&self) -> &G {
        &self.grabber
    }

    fn release(&mut self) -> Result<(), GrabberError> {
        let mut first_err = None;
        let mut note = |res: Result<(), GrabberError>| {
            if let Err(err) = res {
                warn!("grabber release step failed: {err}");
                first_err.get_or_insert(err);
            }
        };

        if (self.device_open || self.channel_open) && self.grabber.is_running() {
            note(self.grabber.stop());
        }
        if std::mem::replace(&mut self.channel_open, false) {
            note(self.grabber.close_channel());
        }
        if std::mem::replace(&mut self.device_open, false) {
            note(self.grabber.close_device());
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl<G: Grabber> Drop for GrabberCaptureAdapter<G> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl<G: Grabber> PatternCapture for GrabberCaptureAdapter<G> {
    fn begin_calibration_session(&mut self, grid_spacing: f64) -> Result<(), CaptureError> {
        self.stop_streaming()?;
        self.grabber.clear_pattern_buffer()?;
        self.grabber.init_extrinsic_calibration(grid_spacing)?;
        self.grabber.start()?;
        debug!("extrinsic calibration session started (grid spacing {grid_spacing})");
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<(), CaptureError> {
        if !self.grabber.is_running() {
            self.grabber.start()?;
        }
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), CaptureError> {
        if self.grabber.is_running() {
            self.grabber.stop()?;
        }
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), CaptureError> {
        Ok(self.grabber.clear_pattern_buffer()?)
    }

    fn capture_attempt(&mut self) -> Result<usize, CaptureError> {
        self.grabber
            .capture_pattern()
            .map_err(|err| CaptureError::CaptureFailed {
                reason: err.to_string(),
            })
    }

    fn estimate_pattern_pose(&mut self) -> Result<Pose3D, CaptureError> {
        match self.grabber.estimate_pattern_pose() {
            Ok(pose) => Ok(pose),
            Err(GrabberError::EmptyPatternBuffer) => Err(CaptureError::EmptyBuffer),
            Err(err) => Err(err.into()),
        }
    }

    fn shutdown(&mut self) -> Result<(), CaptureError> {
        Ok(self.release()?)
    }
}
