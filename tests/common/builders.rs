//! Test data builders for creating test objects

use camflow::pipeline::nodes::{XLinkInConfig, XLinkInNode, XLinkOutConfig, XLinkOutNode};
use camflow::pipeline::{
    CameraBoardSocket, FrameType, ImgFrame, Message, Payload, Pipeline, SharedMessage,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for test messages
pub struct MessageBuilder {
    timestamp: Duration,
    sequence_num: u64,
    payload: Payload,
}

impl MessageBuilder {
    pub fn at_ms(ms: u64) -> Self {
        Self {
            timestamp: Duration::from_millis(ms),
            sequence_num: ms,
            payload: Payload::Buffer(Vec::new()),
        }
    }

    pub fn seq(mut self, sequence_num: u64) -> Self {
        self.sequence_num = sequence_num;
        self
    }

    pub fn bytes(mut self, len: usize) -> Self {
        self.payload = Payload::Buffer(vec![0; len]);
        self
    }

    pub fn frame(mut self, width: u32, height: u32) -> Self {
        self.payload = Payload::ImgFrame(ImgFrame {
            width,
            height,
            frame_type: FrameType::Nv12,
            instance: CameraBoardSocket::CamA,
            data: Vec::new(),
        });
        self
    }

    pub fn build(self) -> SharedMessage {
        Arc::new(Message::new(self.timestamp, self.sequence_num, self.payload))
    }
}

/// `XLinkIn(input) -> XLinkOut(output)`: whatever the host pushes comes back.
pub fn loopback_pipeline(input: &str, output: &str) -> Pipeline {
    let mut pipeline = Pipeline::new();
    let xin = pipeline
        .create::<XLinkInNode>(XLinkInConfig::new(input))
        .unwrap();
    let xout = pipeline
        .create::<XLinkOutNode>(XLinkOutConfig::new(output))
        .unwrap();
    pipeline
        .link(
            pipeline.output(xin.id(), "out").unwrap(),
            pipeline.input(xout.id(), "in").unwrap(),
        )
        .unwrap();
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use camflow::DatatypeKind;

    #[test]
    fn test_message_builder() {
        let msg = MessageBuilder::at_ms(33).seq(7).frame(640, 400).build();
        assert_eq!(msg.timestamp, Duration::from_millis(33));
        assert_eq!(msg.sequence_num, 7);
        assert_eq!(msg.kind(), DatatypeKind::ImgFrame);
    }
}
