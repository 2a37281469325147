use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use handeye_collect::{
    CaptureParams, FrameCallback, Grabber, GrabberError, PixelEncoding, StereoFrame,
};
use handeye_core::Pose3D;
use log::{debug, trace};
use nalgebra::{Quaternion, UnitQuaternion, Vector3, Vector4};
use rand::rngs::StdRng;
use rand::Rng;

use super::{lock, SharedWorld, SimParams};

struct Producer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Simulated stereo head.
///
/// While streaming, a producer thread delivers synthetic frames to the
/// registered callback. Pattern captures observe the true pattern pose from
/// the current robot pose, with optional noise and random misses.
pub struct SimGrabber {
    world: SharedWorld,
    rng: StdRng,
    detection_probability: f64,
    translation_noise: f64,
    rotation_noise: f64,
    frame_interval: Duration,
    frame_size: (u32, u32),
    device: Option<String>,
    channel_open: bool,
    params: Option<CaptureParams>,
    grid_spacing: Option<f64>,
    observations: Vec<Pose3D>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    producer: Option<Producer>,
}

impl SimGrabber {
    pub fn new(world: SharedWorld, params: &SimParams, rng: StdRng) -> Self {
        Self {
            world,
            rng,
            detection_probability: params.detection_probability,
            translation_noise: params.translation_noise,
            rotation_noise: params.rotation_noise_deg.to_radians(),
            frame_interval: Duration::from_millis(params.frame_interval_ms.max(1)),
            frame_size: (params.frame_width.max(1), params.frame_height.max(1)),
            device: None,
            channel_open: false,
            params: None,
            grid_spacing: None,
            observations: Vec::new(),
            callback: Arc::new(Mutex::new(None)),
            producer: None,
        }
    }

    /// Capture settings applied by the last `configure_capture`.
    pub fn capture_params(&self) -> Option<&CaptureParams> {
        self.params.as_ref()
    }

    pub fn buffered(&self) -> usize {
        self.observations.len()
    }

    fn require_device(&self) -> Result<(), GrabberError> {
        if self.device.is_none() {
            return Err(GrabberError::DeviceNotOpen);
        }
        Ok(())
    }

    fn require_channel(&self) -> Result<(), GrabberError> {
        self.require_device()?;
        if !self.channel_open {
            return Err(GrabberError::ChannelNotOpen);
        }
        Ok(())
    }

    fn observe(&mut self) -> Pose3D {
        let truth = lock(&self.world).pattern_in_camera();
        let tn = self.translation_noise;
        let rn = self.rotation_noise;
        if tn == 0.0 && rn == 0.0 {
            return truth;
        }
        let dt = Vector3::from_fn(|_, _| self.rng.random_range(-tn..=tn));
        let dr = Vector3::from_fn(|_, _| self.rng.random_range(-rn..=rn));
        Pose3D::from_parts(
            truth.translation() + dt,
            UnitQuaternion::from_scaled_axis(dr) * truth.rotation(),
        )
    }
}

/// Mean translation and sign-aligned mean quaternion.
fn average_pose(poses: &[Pose3D]) -> Option<Pose3D> {
    let first = poses.first()?;
    let reference = first.rotation().into_inner().coords;
    let mut translation = Vector3::zeros();
    let mut coords = Vector4::zeros();
    for pose in poses {
        translation += pose.translation();
        let q = pose.rotation().into_inner().coords;
        coords += if q.dot(&reference) < 0.0 { -q } else { q };
    }
    let n = poses.len() as f64;
    let rotation = UnitQuaternion::new_normalize(Quaternion::from(coords / n));
    Some(Pose3D::from_parts(translation / n, rotation))
}

fn synthetic_frame(width: u32, height: u32, seq: u8) -> StereoFrame {
    let pixels = (width * height) as usize;
    let left: Vec<u8> = (0..pixels).map(|i| (i as u8).wrapping_add(seq)).collect();
    let right: Vec<u8> = left.iter().map(|v| v.wrapping_add(8)).collect();
    StereoFrame {
        width,
        height,
        encoding: PixelEncoding::from_raw("CV_8UC1"),
        timestamp: SystemTime::now(),
        left,
        right,
    }
}

impl Grabber for SimGrabber {
    fn open_device(&mut self, device_id: &str) -> Result<(), GrabberError> {
        if let Some(open) = &self.device {
            return Err(GrabberError::Device(format!("device {open} already open")));
        }
        debug!("simulated stereo head {device_id} opened");
        self.device = Some(device_id.to_string());
        Ok(())
    }

    fn close_device(&mut self) -> Result<(), GrabberError> {
        self.require_device()?;
        self.device = None;
        self.grid_spacing = None;
        self.observations.clear();
        Ok(())
    }

    fn open_channel(&mut self) -> Result<(), GrabberError> {
        self.require_device()?;
        self.channel_open = true;
        Ok(())
    }

    fn close_channel(&mut self) -> Result<(), GrabberError> {
        self.require_channel()?;
        self.stop()?;
        self.channel_open = false;
        Ok(())
    }

    fn configure_capture(&mut self, params: &CaptureParams) -> Result<(), GrabberError> {
        self.require_channel()?;
        debug!("capture configured: {params:?}");
        self.params = Some(params.clone());
        Ok(())
    }

    fn register_frame_callback(&mut self, callback: FrameCallback) -> Result<(), GrabberError> {
        *lock(&self.callback) = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<(), GrabberError> {
        self.require_channel()?;
        if self.producer.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let callback = Arc::clone(&self.callback);
        let (width, height) = self.frame_size;
        let interval = self.frame_interval;
        let handle = thread::Builder::new()
            .name("sim-grabber".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || {
                    let mut seq: u8 = 0;
                    while !stop.load(Ordering::Relaxed) {
                        let frame = synthetic_frame(width, height, seq);
                        seq = seq.wrapping_add(1);
                        if let Some(cb) = lock(&callback).as_mut() {
                            cb(&frame);
                        }
                        thread::sleep(interval);
                    }
                }
            })
            .map_err(|err| GrabberError::Stream(err.to_string()))?;

        trace!("frame producer started");
        self.producer = Some(Producer { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), GrabberError> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };
        producer.stop.store(true, Ordering::Relaxed);
        producer
            .handle
            .join()
            .map_err(|_| GrabberError::Stream("frame producer panicked".to_string()))?;
        trace!("frame producer stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.producer.is_some()
    }

    fn clear_pattern_buffer(&mut self) -> Result<(), GrabberError> {
        self.require_device()?;
        self.observations.clear();
        Ok(())
    }

    fn init_extrinsic_calibration(&mut self, grid_spacing: f64) -> Result<(), GrabberError> {
        self.require_device()?;
        if !grid_spacing.is_finite() || grid_spacing <= 0.0 {
            return Err(GrabberError::Device(format!(
                "invalid grid spacing {grid_spacing}"
            )));
        }
        self.grid_spacing = Some(grid_spacing);
        Ok(())
    }

    fn capture_pattern(&mut self) -> Result<usize, GrabberError> {
        self.require_device()?;
        if self.grid_spacing.is_none() {
            return Err(GrabberError::NotCalibrating);
        }
        if self.rng.random_bool(self.detection_probability) {
            let observation = self.observe();
            self.observations.push(observation);
        }
        Ok(self.observations.len())
    }

    fn estimate_pattern_pose(&mut self) -> Result<Pose3D, GrabberError> {
        let pose = average_pose(&self.observations).ok_or(GrabberError::EmptyPatternBuffer)?;
        self.observations.clear();
        Ok(pose)
    }
}

impl Drop for SimGrabber {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
