//! CameraNode: simulated color/mono camera source.
//!
//! Emits geometry-only frames at the configured rate on every linked output.
//! When `mockIsp` is linked, frames are paced by its messages (and carry their
//! timestamps) instead of the node's own clock. `still` fires once per
//! capture-still control received on `inputControl`.
//!
//! The camera is also a capability source: consumers request scaled outputs,
//! which land in the `dynamicOutputs` map.

use crate::pipeline::capability::{scaled_size, CapabilitySource, OutputSpec, Residency};
use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::{
    CameraBoardSocket, CameraControl, DatatypeKind, FrameType, ImgFrame, Message, Payload,
};
use crate::pipeline::node::{NodeContext, NodePlugin};
use crate::pipeline::port::{DatatypeHierarchy, PortDescriptor, PortMapDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAME: DatatypeHierarchy = DatatypeHierarchy::exact(DatatypeKind::ImgFrame);
const PRODUCIBLE: &[DatatypeKind] = &[DatatypeKind::ImgFrame];

/// Sensor readout orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageOrientation {
    #[default]
    Auto,
    Normal,
    HorizontalMirror,
    VerticalFlip,
    Rotate180,
}

/// Source of the undistortion warp mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeshSource {
    #[default]
    None,
    Uniform,
    Calibration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub board_socket: CameraBoardSocket,
    /// Selects the sensor by name instead of socket.
    pub camera_name: Option<String>,
    pub orientation: ImageOrientation,
    /// Native resolution; the socket default when unset.
    pub sensor_size: Option<(u32, u32)>,
    pub preview_size: (u32, u32),
    pub video_size: Option<(u32, u32)>,
    pub still_size: Option<(u32, u32)>,
    pub fps: f32,
    /// Auto-exposure/white-balance/focus rate, 0 to follow `fps`.
    pub isp_3a_fps: u32,
    pub mesh_source: MeshSource,
    /// Opaque warp mesh blob.
    #[serde(skip)]
    pub mesh_data: Vec<u8>,
    pub mesh_step: (u32, u32),
    pub calibration_alpha: Option<f32>,
    pub raw_packed: Option<bool>,
    #[serde(skip)]
    pub initial_control: CameraControl,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            board_socket: CameraBoardSocket::Auto,
            camera_name: None,
            orientation: ImageOrientation::Auto,
            sensor_size: None,
            preview_size: (300, 300),
            video_size: None,
            still_size: None,
            fps: 30.0,
            isp_3a_fps: 0,
            mesh_source: MeshSource::None,
            mesh_data: Vec::new(),
            mesh_step: (32, 32),
            calibration_alpha: None,
            raw_packed: None,
            initial_control: CameraControl::default(),
        }
    }
}

impl CameraConfig {
    pub fn for_socket(board_socket: CameraBoardSocket) -> Self {
        Self {
            board_socket,
            ..Self::default()
        }
    }
}

struct DynamicOutput {
    key: String,
    spec: OutputSpec,
    /// Emit every `decimation`-th frame.
    decimation: u64,
}

pub struct CameraNode {
    config: CameraConfig,
    dynamic: Vec<DynamicOutput>,
}

impl CameraNode {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            dynamic: Vec::new(),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// `floor(input * num / denom)`, the size the scaler produces.
    pub fn scaled_size(input: u32, num: u32, denom: u32) -> u32 {
        scaled_size(input, num, denom)
    }

    pub fn set_board_socket(&mut self, socket: CameraBoardSocket) {
        self.config.board_socket = socket;
    }

    pub fn set_camera_name(&mut self, name: impl Into<String>) {
        self.config.camera_name = Some(name.into());
    }

    pub fn set_orientation(&mut self, orientation: ImageOrientation) {
        self.config.orientation = orientation;
    }

    pub fn set_sensor_size(&mut self, width: u32, height: u32) {
        self.config.sensor_size = Some((width, height));
    }

    pub fn set_preview_size(&mut self, width: u32, height: u32) {
        self.config.preview_size = (width, height);
    }

    pub fn set_video_size(&mut self, width: u32, height: u32) {
        self.config.video_size = Some((width, height));
    }

    pub fn set_still_size(&mut self, width: u32, height: u32) {
        self.config.still_size = Some((width, height));
    }

    pub fn set_fps(&mut self, fps: f32) {
        self.config.fps = fps;
    }

    pub fn set_isp_3a_fps(&mut self, fps: u32) {
        self.config.isp_3a_fps = fps;
    }

    pub fn set_mesh_source(&mut self, source: MeshSource) {
        self.config.mesh_source = source;
    }

    pub fn load_mesh_data(&mut self, data: Vec<u8>) {
        self.config.mesh_data = data;
        self.config.mesh_source = MeshSource::Calibration;
    }

    pub fn set_mesh_step(&mut self, width: u32, height: u32) {
        self.config.mesh_step = (width, height);
    }

    pub fn set_calibration_alpha(&mut self, alpha: f32) {
        self.config.calibration_alpha = Some(alpha);
    }

    pub fn set_raw_output_packed(&mut self, packed: bool) {
        self.config.raw_packed = Some(packed);
    }

    pub fn set_initial_control(&mut self, control: CameraControl) {
        self.config.initial_control = control;
    }

    pub fn sensor_size(&self) -> (u32, u32) {
        self.config
            .sensor_size
            .unwrap_or_else(|| self.config.board_socket.default_sensor_size())
    }

    fn frame(&self, size: (u32, u32), frame_type: FrameType) -> Payload {
        Payload::ImgFrame(ImgFrame {
            width: size.0,
            height: size.1,
            frame_type,
            instance: self.config.board_socket,
            data: Vec::new(),
        })
    }

    fn emit(
        &self,
        ctx: &NodeContext,
        key: &str,
        timestamp: Duration,
        seq: u64,
        payload: impl FnOnce() -> Payload,
    ) -> Result<(), RuntimeError> {
        if ctx.is_linked(key) {
            ctx.send(key, Arc::new(Message::new(timestamp, seq, payload())))?;
        }
        Ok(())
    }

    /// Apply pending controls. Returns whether a still capture was requested.
    fn poll_inputs(&mut self, ctx: &NodeContext, preview: &mut (u32, u32)) -> Result<bool, RuntimeError> {
        let mut capture = false;
        if let Some(queue) = ctx.input("inputControl") {
            while let Some(msg) = queue.try_get()? {
                if let Some(control) = msg.as_camera_control() {
                    capture |= control.capture_still;
                    if control.manual_exposure_us.is_some() || control.lens_position.is_some() {
                        tracing::debug!("{}: applied control {:?}", ctx.node_name(), control);
                    }
                }
            }
        }
        if let Some(queue) = ctx.input("inputConfig") {
            while let Some(msg) = queue.try_get()? {
                if let Some((w, h)) = msg.as_image_manip_config().and_then(|c| c.resize) {
                    *preview = (w, h);
                }
            }
        }
        Ok(capture)
    }
}

impl CapabilitySource for CameraNode {
    fn producible_kinds(&self) -> &[DatatypeKind] {
        PRODUCIBLE
    }

    fn output_residency(&self) -> Residency {
        Residency::Device
    }

    fn source_size(&self) -> (u32, u32) {
        self.sensor_size()
    }

    fn source_fps(&self) -> f32 {
        self.config.fps
    }
}

impl NodePlugin for CameraNode {
    fn name(&self) -> &str {
        "Camera"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input(
                "inputConfig",
                &[DatatypeHierarchy::exact(DatatypeKind::ImageManipConfig)],
            )
            .blocking(false),
            PortDescriptor::input(
                "inputControl",
                &[DatatypeHierarchy::exact(DatatypeKind::CameraControl)],
            ),
            PortDescriptor::input("mockIsp", &[FRAME]).queue_size(8),
            PortDescriptor::output("video", &[FRAME]),
            PortDescriptor::output("preview", &[FRAME]),
            PortDescriptor::output("still", &[FRAME]),
            PortDescriptor::output("isp", &[FRAME]),
            PortDescriptor::output("raw", &[FRAME]),
            PortDescriptor::output("frameEvent", &[FRAME]),
        ]
    }

    fn port_maps(&self) -> Vec<PortMapDescriptor> {
        vec![PortMapDescriptor::new(
            "dynamicOutputs",
            PortDescriptor::output("", &[FRAME]),
        )]
    }

    fn residency(&self) -> Residency {
        Residency::Device
    }

    fn capability_source(&self) -> Option<&dyn CapabilitySource> {
        Some(self)
    }

    fn register_dynamic_output(&mut self, key: &str, spec: &OutputSpec) {
        let ratio = if spec.fps > 0.0 {
            (self.config.fps / spec.fps).round() as u64
        } else {
            1
        };
        self.dynamic.push(DynamicOutput {
            key: format!("dynamicOutputs.{}", key),
            spec: spec.clone(),
            decimation: ratio.max(1),
        });
    }

    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        let fps = if self.config.fps > 0.0 { self.config.fps } else { 1.0 };
        let period = Duration::from_secs_f32(1.0 / fps);
        let sensor = self.sensor_size();
        let video = self.config.video_size.unwrap_or(sensor);
        let still = self.config.still_size.unwrap_or(sensor);
        let mut preview = self.config.preview_size;
        let mut pending_still = self.config.initial_control.capture_still;
        let mut next_frame = Instant::now();
        let mut seq: u64 = 0;

        tracing::info!(
            "{}: streaming {}x{} @ {} fps from {:?}",
            ctx.node_name(),
            sensor.0,
            sensor.1,
            fps,
            self.config.board_socket
        );

        while ctx.is_running() {
            pending_still |= self.poll_inputs(ctx, &mut preview)?;

            let timestamp = match ctx.input("mockIsp") {
                Some(isp) => match isp.get_timeout(ctx.poll_interval())? {
                    Some(msg) => msg.timestamp,
                    None => continue,
                },
                None => {
                    let now = Instant::now();
                    if now < next_frame {
                        std::thread::sleep((next_frame - now).min(ctx.poll_interval()));
                        continue;
                    }
                    next_frame += period;
                    ctx.timestamp()
                }
            };

            self.emit(ctx, "preview", timestamp, seq, || self.frame(preview, FrameType::Bgr888i))?;
            self.emit(ctx, "video", timestamp, seq, || self.frame(video, FrameType::Nv12))?;
            self.emit(ctx, "isp", timestamp, seq, || self.frame(sensor, FrameType::Yuv420p))?;
            self.emit(ctx, "raw", timestamp, seq, || self.frame(sensor, FrameType::Raw10))?;
            self.emit(ctx, "frameEvent", timestamp, seq, || self.frame((0, 0), FrameType::Raw10))?;
            if pending_still && ctx.is_linked("still") {
                self.emit(ctx, "still", timestamp, seq, || self.frame(still, FrameType::Nv12))?;
                pending_still = false;
            }
            for output in &self.dynamic {
                if seq % output.decimation == 0 {
                    let size = (output.spec.width, output.spec.height);
                    self.emit(ctx, &output.key, timestamp, seq, || {
                        self.frame(size, FrameType::Bgr888i)
                    })?;
                }
            }
            seq += 1;
        }
        Ok(())
    }
}
