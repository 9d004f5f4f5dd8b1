//! ProducerNode: host-side source of sequential `Buffer` messages.

use crate::pipeline::capability::Residency;
use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::{DatatypeKind, Message};
use crate::pipeline::node::{NodeContext, NodePlugin};
use crate::pipeline::port::{DatatypeHierarchy, PortDescriptor};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    /// Stop after this many messages; run until shutdown when `None`.
    pub count: Option<u64>,
    pub interval: Duration,
    pub payload_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            count: None,
            interval: Duration::from_millis(10),
            payload_size: 0,
        }
    }
}

pub struct ProducerNode {
    config: ProducerConfig,
}

impl ProducerNode {
    pub fn new(config: ProducerConfig) -> Self {
        Self { config }
    }

    pub fn set_count(&mut self, count: u64) {
        self.config.count = Some(count);
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.config.interval = interval;
    }
}

impl NodePlugin for ProducerNode {
    fn name(&self) -> &str {
        "Producer"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::output(
            "out",
            &[DatatypeHierarchy::exact(DatatypeKind::Buffer)],
        )]
    }

    fn residency(&self) -> Residency {
        Residency::Host
    }

    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        let mut seq = 0u64;
        let mut next = Instant::now();
        while ctx.is_running() && self.config.count.map_or(true, |c| seq < c) {
            let now = Instant::now();
            if now < next {
                std::thread::sleep((next - now).min(ctx.poll_interval()));
                continue;
            }
            next += self.config.interval;
            let data = vec![(seq & 0xff) as u8; self.config.payload_size];
            ctx.send("out", Arc::new(Message::buffer(ctx.timestamp(), seq, data)))?;
            seq += 1;
        }
        tracing::debug!("{}: produced {} messages", ctx.node_name(), seq);
        Ok(())
    }
}
