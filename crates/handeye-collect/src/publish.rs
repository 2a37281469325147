//! Republishing of raw stereo frames.
//!
//! Frames are a side channel for visualization; nothing here affects
//! calibration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use log::trace;

use crate::grabber::{PixelEncoding, StereoFrame};

pub const LEFT_CHANNEL: &str = "left/image_raw";
pub const RIGHT_CHANNEL: &str = "right/image_raw";
/// Frame-of-reference label attached to every published image.
pub const IMAGE_FRAME_ID: &str = "world";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader<'a> {
    pub frame_id: &'a str,
    pub stamp: SystemTime,
}

/// One image of a stereo pair, borrowed from the frame it came from.
#[derive(Clone, Copy, Debug)]
pub struct ImageMessage<'a> {
    pub header: ImageHeader<'a>,
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
    /// Row length in bytes.
    pub step: u32,
    pub data: &'a [u8],
}

/// Sink for republished images.
///
/// Runs on the grabber's delivery thread, so implementations must be `Send`
/// and should not block.
pub trait FramePublisher: Send {
    fn publish(&mut self, channel: &str, image: &ImageMessage<'_>);
}

/// Publish both halves of `frame` on the left/right channels.
pub fn publish_stereo<P: FramePublisher + ?Sized>(publisher: &mut P, frame: &StereoFrame) {
    let header = ImageHeader {
        frame_id: IMAGE_FRAME_ID,
        stamp: frame.timestamp,
    };
    let step = frame.width * frame.encoding.bytes_per_pixel();
    for (channel, data) in [(LEFT_CHANNEL, &frame.left), (RIGHT_CHANNEL, &frame.right)] {
        publisher.publish(
            channel,
            &ImageMessage {
                header,
                width: frame.width,
                height: frame.height,
                encoding: frame.encoding,
                step,
                data,
            },
        );
    }
}

/// Logs image metadata at `trace` level and counts published images.
#[derive(Clone, Debug, Default)]
pub struct LogFramePublisher {
    published: Arc<AtomicU64>,
}

impl LogFramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter that stays readable after the publisher is moved into a callback.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.published)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl FramePublisher for LogFramePublisher {
    fn publish(&mut self, channel: &str, image: &ImageMessage<'_>) {
        let n = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(
            "{channel} #{n}: {}x{} {} ({} bytes, frame `{}`)",
            image.width,
            image.height,
            image.encoding,
            image.data.len(),
            image.header.frame_id
        );
    }
}

/// Drops every image.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullFramePublisher;

impl FramePublisher for NullFramePublisher {
    fn publish(&mut self, _channel: &str, _image: &ImageMessage<'_>) {}
}
