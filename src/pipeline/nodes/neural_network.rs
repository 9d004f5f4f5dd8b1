//! NeuralNetworkNode: simulated inference stage.
//!
//! Every message taken from `in` (or an entry of the `inputs` map) yields one
//! `NNData` result on `out`, stamped with the input's timestamp and sequence
//! number so downstream nodes can pair results with frames. The input itself
//! is forwarded on `passthrough` (or the matching `passthroughs` entry).

use crate::pipeline::capability::Residency;
use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::{DatatypeKind, Message, NNData, Payload, SharedMessage};
use crate::pipeline::node::{NodeContext, NodePlugin};
use crate::pipeline::port::{DatatypeHierarchy, PortDescriptor, PortMapDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralNetworkConfig {
    /// Compiled network blob. Opaque to the pipeline.
    pub blob_path: Option<PathBuf>,
    pub num_inference_threads: u32,
    pub num_pool_frames: u32,
    pub backend: Option<String>,
    /// Name of the single output layer the simulation fills.
    pub output_layer: String,
}

impl Default for NeuralNetworkConfig {
    fn default() -> Self {
        Self {
            blob_path: None,
            num_inference_threads: 2,
            num_pool_frames: 4,
            backend: None,
            output_layer: "output".to_string(),
        }
    }
}

pub struct NeuralNetworkNode {
    config: NeuralNetworkConfig,
    inferences: u64,
}

impl NeuralNetworkNode {
    pub fn new(config: NeuralNetworkConfig) -> Self {
        Self {
            config,
            inferences: 0,
        }
    }

    pub fn config(&self) -> &NeuralNetworkConfig {
        &self.config
    }

    pub fn set_blob_path(&mut self, path: impl Into<PathBuf>) {
        self.config.blob_path = Some(path.into());
    }

    pub fn set_num_inference_threads(&mut self, threads: u32) {
        self.config.num_inference_threads = threads;
    }

    pub fn set_num_pool_frames(&mut self, frames: u32) {
        self.config.num_pool_frames = frames;
    }

    pub fn set_backend(&mut self, backend: impl Into<String>) {
        self.config.backend = Some(backend.into());
    }

    /// Build the result for one input message.
    pub fn infer(&mut self, input: &Message) -> Message {
        self.inferences += 1;
        let size = match &input.payload {
            Payload::ImgFrame(frame) => frame.width as f32 * frame.height as f32,
            Payload::Buffer(data) | Payload::EncodedFrame(data) => data.len() as f32,
            _ => 0.0,
        };
        let mut layers = BTreeMap::new();
        layers.insert(self.config.output_layer.clone(), vec![size]);
        Message::new(
            input.timestamp,
            input.sequence_num,
            Payload::NNData(NNData { layers }),
        )
    }

    fn process(
        &mut self,
        ctx: &NodeContext,
        msg: SharedMessage,
        passthrough: &str,
    ) -> Result<(), RuntimeError> {
        let result = self.infer(&msg);
        ctx.send("out", Arc::new(result))?;
        ctx.send(passthrough, msg)
    }
}

impl NodePlugin for NeuralNetworkNode {
    fn name(&self) -> &str {
        "NeuralNetwork"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("in", &[DatatypeHierarchy::any()]).queue_size(5),
            PortDescriptor::output("out", &[DatatypeHierarchy::exact(DatatypeKind::NNData)]),
            PortDescriptor::output("passthrough", &[DatatypeHierarchy::any()]),
        ]
    }

    fn port_maps(&self) -> Vec<PortMapDescriptor> {
        vec![
            PortMapDescriptor::new(
                "inputs",
                PortDescriptor::input("", &[DatatypeHierarchy::any()])
                    .queue_size(1)
                    .blocking(false),
            ),
            PortMapDescriptor::new(
                "passthroughs",
                PortDescriptor::output("", &[DatatypeHierarchy::any()]),
            ),
        ]
    }

    fn residency(&self) -> Residency {
        Residency::Device
    }

    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        let mapped: Vec<(String, String)> = ctx
            .inputs()
            .filter_map(|(key, _)| key.strip_prefix("inputs."))
            .map(|name| (format!("inputs.{}", name), format!("passthroughs.{}", name)))
            .collect();

        while ctx.is_running() {
            let mut idle = true;

            if let Some(queue) = ctx.input("in").cloned() {
                let timeout = if mapped.is_empty() {
                    ctx.poll_interval()
                } else {
                    std::time::Duration::ZERO
                };
                if let Some(msg) = queue.get_timeout(timeout)? {
                    self.process(ctx, msg, "passthrough")?;
                    idle = false;
                }
            }

            for (input, passthrough) in &mapped {
                if let Some(queue) = ctx.input(input).cloned() {
                    if let Some(msg) = queue.try_get()? {
                        self.process(ctx, msg, passthrough)?;
                        idle = false;
                    }
                }
            }

            if idle && (ctx.input("in").is_none() || !mapped.is_empty()) {
                ctx.idle();
            }
        }

        tracing::debug!("{}: {} inferences", ctx.node_name(), self.inferences);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::message::{CameraBoardSocket, FrameType, ImgFrame};
    use std::time::Duration;

    #[test]
    fn test_infer_keeps_envelope() {
        let mut nn = NeuralNetworkNode::new(NeuralNetworkConfig::default());
        let frame = Message::new(
            Duration::from_millis(33),
            4,
            Payload::ImgFrame(ImgFrame {
                width: 10,
                height: 20,
                frame_type: FrameType::Bgr888p,
                instance: CameraBoardSocket::CamA,
                data: Vec::new(),
            }),
        );
        let result = nn.infer(&frame);
        assert_eq!(result.timestamp, frame.timestamp);
        assert_eq!(result.sequence_num, 4);
        match result.payload {
            Payload::NNData(data) => assert_eq!(data.layers["output"], vec![200.0]),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_input_map_is_non_blocking() {
        let nn = NeuralNetworkNode::new(NeuralNetworkConfig::default());
        let maps = nn.port_maps();
        let inputs = maps.iter().find(|m| m.name == "inputs").unwrap();
        assert_eq!(inputs.template.queue_size, 1);
        assert!(!inputs.template.blocking);
    }

    #[test]
    fn test_passthrough_forwards_any_kind() {
        let nn = NeuralNetworkNode::new(NeuralNetworkConfig::default());
        let buffer_sink = PortDescriptor::input("in", &[DatatypeHierarchy::exact(DatatypeKind::Buffer)]);
        let ports = nn.ports();
        let passthrough = ports.iter().find(|p| p.name == "passthrough").unwrap();
        assert_eq!(passthrough.types, vec![DatatypeHierarchy::any()]);
        assert!(buffer_sink.accepts_from(passthrough));

        let maps = nn.port_maps();
        let passthroughs = maps.iter().find(|m| m.name == "passthroughs").unwrap();
        assert!(buffer_sink.accepts_from(&passthroughs.entry("cam")));
    }

    #[test]
    fn test_infer_large_frame_does_not_overflow() {
        let mut nn = NeuralNetworkNode::new(NeuralNetworkConfig::default());
        let frame = Message::new(
            Duration::ZERO,
            0,
            Payload::ImgFrame(ImgFrame {
                width: 70_000,
                height: 70_000,
                frame_type: FrameType::Gray8,
                instance: CameraBoardSocket::CamA,
                data: Vec::new(),
            }),
        );
        match nn.infer(&frame).payload {
            Payload::NNData(data) => assert_eq!(data.layers["output"], vec![4.9e9]),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
