//! Messages flowing between graph nodes.
//!
//! Every message carries the same envelope (device timestamp and sequence
//! number) regardless of payload. Payload kinds form a small hierarchy rooted
//! at [`DatatypeKind::Buffer`], which ports use to decide what they accept.
//!
//! Messages are shared as [`SharedMessage`] (`Arc<Message>`) so an output
//! fanning out to several inputs never copies the payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Message kinds known to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatatypeKind {
    /// Raw bytes. Root of the hierarchy.
    Buffer,
    /// Image frame with geometry and pixel format.
    ImgFrame,
    /// Compressed frame produced by an encoder.
    EncodedFrame,
    /// Neural network tensors.
    NNData,
    /// Detections decoded from a network.
    ImgDetections,
    /// Runtime crop/resize configuration.
    ImageManipConfig,
    /// Runtime camera control (exposure, focus, still capture).
    CameraControl,
}

impl DatatypeKind {
    /// Direct parent in the hierarchy, `None` for the root.
    pub fn parent(self) -> Option<DatatypeKind> {
        match self {
            DatatypeKind::Buffer => None,
            DatatypeKind::ImgDetections => Some(DatatypeKind::NNData),
            _ => Some(DatatypeKind::Buffer),
        }
    }

    /// Whether `self` is `base` or one of its descendants.
    pub fn is_derived_from(self, base: DatatypeKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == base {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    pub fn all() -> &'static [DatatypeKind] {
        &[
            DatatypeKind::Buffer,
            DatatypeKind::ImgFrame,
            DatatypeKind::EncodedFrame,
            DatatypeKind::NNData,
            DatatypeKind::ImgDetections,
            DatatypeKind::ImageManipConfig,
            DatatypeKind::CameraControl,
        ]
    }
}

impl fmt::Display for DatatypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Hardware camera socket a frame originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraBoardSocket {
    #[default]
    Auto,
    CamA,
    CamB,
    CamC,
    CamD,
}

impl CameraBoardSocket {
    /// Native sensor resolution assumed for a socket when none is configured.
    pub fn default_sensor_size(self) -> (u32, u32) {
        match self {
            CameraBoardSocket::Auto | CameraBoardSocket::CamA => (1920, 1080),
            CameraBoardSocket::CamB | CameraBoardSocket::CamC | CameraBoardSocket::CamD => {
                (1280, 800)
            }
        }
    }
}

/// Pixel layout of an [`ImgFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Nv12,
    Yuv420p,
    Bgr888i,
    Bgr888p,
    Gray8,
    Raw10,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImgFrame {
    pub width: u32,
    pub height: u32,
    pub frame_type: FrameType,
    pub instance: CameraBoardSocket,
    /// Pixel data; empty for metadata-only frames.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NNData {
    pub layers: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageManipConfig {
    /// Normalized crop rectangle `(xmin, ymin, xmax, ymax)`.
    pub crop: Option<(f32, f32, f32, f32)>,
    pub resize: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraControl {
    pub capture_still: bool,
    pub manual_exposure_us: Option<u32>,
    pub lens_position: Option<u8>,
}

/// Message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Buffer(Vec<u8>),
    ImgFrame(ImgFrame),
    EncodedFrame(Vec<u8>),
    NNData(NNData),
    ImgDetections(NNData),
    ImageManipConfig(ImageManipConfig),
    CameraControl(CameraControl),
}

impl Payload {
    pub fn kind(&self) -> DatatypeKind {
        match self {
            Payload::Buffer(_) => DatatypeKind::Buffer,
            Payload::ImgFrame(_) => DatatypeKind::ImgFrame,
            Payload::EncodedFrame(_) => DatatypeKind::EncodedFrame,
            Payload::NNData(_) => DatatypeKind::NNData,
            Payload::ImgDetections(_) => DatatypeKind::ImgDetections,
            Payload::ImageManipConfig(_) => DatatypeKind::ImageManipConfig,
            Payload::CameraControl(_) => DatatypeKind::CameraControl,
        }
    }
}

/// Envelope + payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Device clock time the message was produced at.
    pub timestamp: Duration,
    pub sequence_num: u64,
    pub payload: Payload,
}

pub type SharedMessage = Arc<Message>;

impl Message {
    pub fn new(timestamp: Duration, sequence_num: u64, payload: Payload) -> Self {
        Self {
            timestamp,
            sequence_num,
            payload,
        }
    }

    pub fn buffer(timestamp: Duration, sequence_num: u64, data: Vec<u8>) -> Self {
        Self::new(timestamp, sequence_num, Payload::Buffer(data))
    }

    pub fn kind(&self) -> DatatypeKind {
        self.payload.kind()
    }

    pub fn as_img_frame(&self) -> Option<&ImgFrame> {
        match &self.payload {
            Payload::ImgFrame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_camera_control(&self) -> Option<&CameraControl> {
        match &self.payload {
            Payload::CameraControl(ctrl) => Some(ctrl),
            _ => None,
        }
    }

    pub fn as_image_manip_config(&self) -> Option<&ImageManipConfig> {
        match &self.payload {
            Payload::ImageManipConfig(cfg) => Some(cfg),
            _ => None,
        }
    }
}

/// Anything carrying a device timestamp, used by the stream synchronizer.
pub trait Timestamped {
    fn timestamp(&self) -> Duration;
}

impl Timestamped for Message {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

impl<T: Timestamped + ?Sized> Timestamped for Arc<T> {
    fn timestamp(&self) -> Duration {
        (**self).timestamp()
    }
}
