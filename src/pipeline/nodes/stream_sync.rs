//! StreamSyncNode: aligns several streams by timestamp.
//!
//! Each stream `x` enters on the `inputs` map entry `x_in` and, once matched
//! with every other stream, leaves on the `outputs` entry `x_out`. Matching is
//! done by a [`StreamSynchronizer`].

use crate::pipeline::capability::Residency;
use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::SharedMessage;
use crate::pipeline::node::{NodeContext, NodePlugin};
use crate::pipeline::port::{DatatypeHierarchy, PortDescriptor, PortMapDescriptor};
use crate::pipeline::synchronizer::{StreamSynchronizer, SyncConfig};
use std::time::Duration;

const INPUT_SUFFIX: &str = "_in";
const OUTPUT_SUFFIX: &str = "_out";

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSyncConfig {
    /// Streams whose `_in`/`_out` entries exist from the start. More can be
    /// added through the port maps until the pipeline is built.
    pub streams: Vec<String>,
    pub sync: SyncConfig,
}

impl Default for StreamSyncConfig {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            sync: SyncConfig::from_fps(500, 30.0),
        }
    }
}

impl StreamSyncConfig {
    pub fn new(sync: SyncConfig) -> Self {
        Self {
            streams: Vec::new(),
            sync,
        }
    }

    pub fn with_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }
}

pub struct StreamSyncNode {
    config: StreamSyncConfig,
}

impl StreamSyncNode {
    pub fn new(config: StreamSyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamSyncConfig {
        &self.config
    }

    pub fn set_tolerance(&mut self, tolerance: Duration) {
        self.config.sync.tolerance = tolerance;
    }

    pub fn set_max_backlog(&mut self, max_backlog: usize) {
        self.config.sync = self.config.sync.with_max_backlog(max_backlog);
    }

    /// Input map key for stream `name`.
    pub fn input_key(name: &str) -> String {
        format!("{}{}", name, INPUT_SUFFIX)
    }

    /// Output map key for stream `name`.
    pub fn output_key(name: &str) -> String {
        format!("{}{}", name, OUTPUT_SUFFIX)
    }
}

impl NodePlugin for StreamSyncNode {
    fn name(&self) -> &str {
        "StreamSync"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        Vec::new()
    }

    fn port_maps(&self) -> Vec<PortMapDescriptor> {
        vec![
            PortMapDescriptor::new(
                "inputs",
                PortDescriptor::input("", &[DatatypeHierarchy::any()]).blocking(false),
            )
            .with_keys(self.config.streams.iter().map(|s| Self::input_key(s))),
            PortMapDescriptor::new("outputs", PortDescriptor::output("", &[DatatypeHierarchy::any()]))
                .with_keys(self.config.streams.iter().map(|s| Self::output_key(s))),
        ]
    }

    fn residency(&self) -> Residency {
        Residency::Device
    }

    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        let mut streams: Vec<String> = ctx
            .inputs()
            .filter_map(|(key, _)| key.strip_prefix("inputs.")?.strip_suffix(INPUT_SUFFIX))
            .map(str::to_string)
            .collect();
        streams.sort();
        for configured in &self.config.streams {
            if !streams.contains(configured) {
                tracing::warn!("{}: stream '{}' has no upstream link", ctx.node_name(), configured);
            }
        }

        let queues: Vec<_> = streams
            .iter()
            .filter_map(|s| {
                let queue = ctx.input(&format!("inputs.{}{}", s, INPUT_SUFFIX))?.clone();
                Some((s.clone(), queue, format!("outputs.{}{}", s, OUTPUT_SUFFIX)))
            })
            .collect();
        let mut sync: StreamSynchronizer<SharedMessage> =
            StreamSynchronizer::new(streams.iter().cloned(), self.config.sync);

        tracing::info!(
            "{}: synchronizing {:?} with tolerance {:?}",
            ctx.node_name(),
            streams,
            self.config.sync.tolerance
        );

        while ctx.is_running() {
            let mut received = false;
            // One message per stream per pass keeps a burst on one input from
            // overflowing its backlog before the others are read.
            for (stream, queue, _) in &queues {
                if let Some(msg) = queue.try_get()? {
                    received = true;
                    let Ok(Some(set)) = sync.push(stream, msg) else {
                        continue;
                    };
                    for (name, msg) in set.entries {
                        if let Some((_, _, output)) = queues.iter().find(|(s, _, _)| *s == name) {
                            ctx.send(output, msg)?;
                        }
                    }
                }
            }
            if !received {
                ctx.idle();
            }
        }

        let stats = sync.stats();
        tracing::debug!(
            "{}: {} sets emitted, {} stale, {} overflow drops",
            ctx.node_name(),
            stats.emitted_sets,
            stats.discarded_stale,
            stats.overflow_drops
        );
        Ok(())
    }
}
