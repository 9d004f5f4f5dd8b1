//! In-process device: one OS thread per node.

use super::{Device, DeviceEvent};
use crate::config::{AppConfig, QueueSettings};
use crate::pipeline::error::RuntimeError;
use crate::pipeline::graph::Pipeline;
use crate::pipeline::id::{NodeId, PortId};
use crate::pipeline::node::{AnyNode, HostStream, NodeContext, NodeState};
use crate::pipeline::queue::MessageQueue;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

fn rejected(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::GraphRejected(e.to_string())
}

fn publish(events: &Sender<DeviceEvent>, event: DeviceEvent) {
    // Nobody listening, or the listener fell behind: drop the event.
    let _ = events.try_send(event);
}

/// Runs a pipeline on local threads.
///
/// Stream names are checked when the pipeline starts, after
/// [`Pipeline::build`] has accepted the graph. A start that fails there drops
/// the pipeline with the rest of the wiring.
pub struct HostDevice {
    name: String,
    queue_defaults: QueueSettings,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    closed: bool,
    pipeline: Option<Arc<Pipeline>>,
    output_streams: HashMap<String, Arc<MessageQueue>>,
    input_streams: HashMap<String, Arc<MessageQueue>>,
    link_queues: Vec<Arc<MessageQueue>>,
    workers: Vec<JoinHandle<()>>,
    event_tx: Sender<DeviceEvent>,
    event_rx: Receiver<DeviceEvent>,
}

impl HostDevice {
    pub fn new(config: &AppConfig) -> Self {
        let (event_tx, event_rx) = bounded(config.device.event_capacity.max(1));
        Self {
            name: config.device.name.clone(),
            queue_defaults: config.queues.clone(),
            poll_interval: config.device.poll_interval(),
            running: Arc::new(AtomicBool::new(false)),
            closed: false,
            pipeline: None,
            output_streams: HashMap::new(),
            input_streams: HashMap::new(),
            link_queues: Vec::new(),
            workers: Vec::new(),
            event_tx,
            event_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver for node lifecycle events.
    pub fn events(&self) -> Receiver<DeviceEvent> {
        self.event_rx.clone()
    }

    /// The pipeline being executed, for state inspection.
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_deref()
    }

    pub fn output_stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.output_streams.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn input_stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.input_streams.keys().cloned().collect();
        names.sort();
        names
    }

    fn all_queues(&self) -> impl Iterator<Item = &Arc<MessageQueue>> {
        self.link_queues
            .iter()
            .chain(self.output_streams.values())
            .chain(self.input_streams.values())
    }

    /// Node contexts with one queue behind every linked input.
    fn wire_links(
        &mut self,
        pipeline: &Pipeline,
        clock: Instant,
    ) -> Result<HashMap<NodeId, NodeContext>, RuntimeError> {
        let mut contexts = HashMap::new();
        for id in pipeline.node_ids() {
            let name = pipeline.node_name(id).map_err(rejected)?;
            contexts.insert(
                id,
                NodeContext::new(id, name, self.running.clone(), clock, self.poll_interval),
            );
        }

        // Fan-in links share the destination's queue.
        let mut input_queues: HashMap<PortId, Arc<MessageQueue>> = HashMap::new();
        for link in pipeline.links() {
            let from = pipeline.descriptor(link.from).map_err(rejected)?;
            let queue = match input_queues.get(&link.to) {
                Some(queue) => queue.clone(),
                None => {
                    let to = pipeline.descriptor(link.to).map_err(rejected)?;
                    let owner = pipeline.node_name(link.to.node()).map_err(rejected)?;
                    let queue = Arc::new(MessageQueue::new(
                        format!("{}.{}", owner, to.key()),
                        to.queue_size,
                        to.blocking,
                    ));
                    if let Some(ctx) = contexts.get_mut(&link.to.node()) {
                        ctx.attach_input(to.key(), queue.clone());
                    }
                    input_queues.insert(link.to, queue.clone());
                    self.link_queues.push(queue.clone());
                    queue
                }
            };
            if let Some(ctx) = contexts.get_mut(&link.from.node()) {
                ctx.attach_output(from.key(), queue);
            }
        }
        Ok(contexts)
    }

    /// Create the host queue a bridge node serves.
    fn open_stream(&mut self, stream: HostStream) -> Result<Arc<MessageQueue>, RuntimeError> {
        let name = stream.name().to_string();
        if self.output_streams.contains_key(&name) || self.input_streams.contains_key(&name) {
            return Err(RuntimeError::GraphRejected(format!(
                "stream name '{}' is used twice",
                name
            )));
        }
        let queue = match stream {
            HostStream::Output { .. } => {
                let queue = Arc::new(MessageQueue::new(
                    name.clone(),
                    self.queue_defaults.host_queue_size,
                    self.queue_defaults.host_queue_blocking,
                ));
                self.output_streams.insert(name, queue.clone());
                queue
            }
            HostStream::Input {
                max_size, blocking, ..
            } => {
                let queue = Arc::new(MessageQueue::new(name.clone(), max_size, blocking));
                self.input_streams.insert(name, queue.clone());
                queue
            }
        };
        Ok(queue)
    }

    fn reset_wiring(&mut self) {
        self.link_queues.clear();
        self.output_streams.clear();
        self.input_streams.clear();
    }
}

impl Device for HostDevice {
    fn start_running(&mut self, mut pipeline: Pipeline) -> Result<(), RuntimeError> {
        if self.closed {
            return Err(RuntimeError::DeviceUnavailable(format!(
                "device '{}' is closed",
                self.name
            )));
        }
        if self.is_running() {
            return Err(RuntimeError::DeviceUnavailable(format!(
                "device '{}' is already running a pipeline",
                self.name
            )));
        }

        let order = pipeline.build().map_err(rejected)?.execution_order.clone();

        let clock = Instant::now();
        let wired = self.wire_links(&pipeline, clock);
        let mut contexts = match wired {
            Ok(contexts) => contexts,
            Err(e) => {
                self.reset_wiring();
                return Err(e);
            }
        };

        let mut nodes: Vec<(NodeId, AnyNode, NodeContext)> = Vec::with_capacity(order.len());
        for idx in order {
            let id = NodeId(idx as u32);
            let (Some(node), Some(mut ctx)) = (pipeline.take_node(id), contexts.remove(&id)) else {
                self.reset_wiring();
                return Err(RuntimeError::GraphRejected(format!("{} cannot be started", id)));
            };
            if let Some(stream) = node.host_stream() {
                match self.open_stream(stream) {
                    Ok(queue) => ctx.set_host_queue(queue),
                    Err(e) => {
                        self.reset_wiring();
                        return Err(e);
                    }
                }
            }
            nodes.push((id, node, ctx));
        }

        let pipeline = Arc::new(pipeline);
        self.pipeline = Some(pipeline.clone());
        self.running.store(true, Ordering::Release);
        tracing::info!(
            "Device '{}' starting {} nodes ({} link queues, streams out {:?}, in {:?})",
            self.name,
            nodes.len(),
            self.link_queues.len(),
            self.output_stream_names(),
            self.input_stream_names()
        );

        for (id, mut node, mut ctx) in nodes {
            let pipeline = pipeline.clone();
            let events = self.event_tx.clone();
            let running = self.running.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("camflow-{}", ctx.node_name()))
                .spawn(move || run_node(id, &mut node, &mut ctx, &pipeline, &events, &running));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    self.close();
                    return Err(RuntimeError::DeviceUnavailable(format!(
                        "failed to spawn node thread: {}",
                        e
                    )));
                }
            }
        }
        Ok(())
    }

    fn get_output_queue(
        &self,
        name: &str,
        max_size: usize,
        blocking: bool,
    ) -> Result<Arc<MessageQueue>, RuntimeError> {
        let queue = self
            .output_streams
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownStream(name.to_string()))?;
        queue.set_max_size(max_size)?;
        queue.set_blocking(blocking);
        Ok(queue.clone())
    }

    fn get_input_queue(&self, name: &str) -> Result<Arc<MessageQueue>, RuntimeError> {
        self.input_streams
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownStream(name.to_string()))
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let was_running = self.running.swap(false, Ordering::AcqRel);

        for queue in self.all_queues() {
            queue.close();
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("A node thread of device '{}' panicked", self.name);
            }
        }
        if let Some(pipeline) = &self.pipeline {
            for id in pipeline.node_ids() {
                pipeline.set_node_state(id, NodeState::Stopped);
            }
        }
        publish(&self.event_tx, DeviceEvent::Closed);
        if was_running {
            tracing::info!("Device '{}' closed", self.name);
        }
    }
}

impl Drop for HostDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_node(
    id: NodeId,
    node: &mut AnyNode,
    ctx: &mut NodeContext,
    pipeline: &Pipeline,
    events: &Sender<DeviceEvent>,
    running: &AtomicBool,
) {
    let name = ctx.node_name().to_string();
    pipeline.set_node_state(id, NodeState::Running);
    publish(
        events,
        DeviceEvent::NodeStarted {
            node: id,
            name: name.clone(),
        },
    );
    tracing::debug!("Node '{}' ({}) running", name, node.name());

    match node.run(ctx) {
        Ok(()) => {}
        // Queues close during shutdown; that is how blocked nodes are woken.
        Err(e) if e.is_closed() && !running.load(Ordering::Acquire) => {}
        Err(error) => {
            tracing::error!("Node '{}' failed: {}", name, error);
            publish(
                events,
                DeviceEvent::NodeFailed {
                    node: id,
                    name: name.clone(),
                    error,
                },
            );
        }
    }

    pipeline.set_node_state(id, NodeState::Stopped);
    tracing::debug!("Node '{}' stopped", name);
    publish(events, DeviceEvent::NodeStopped { node: id, name });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::message::Message;
    use crate::pipeline::node::NodePlugin;
    use crate::pipeline::nodes::{
        NeuralNetworkConfig, NeuralNetworkNode, ProducerConfig, ProducerNode, XLinkInConfig,
        XLinkInNode, XLinkOutConfig, XLinkOutNode,
    };
    use crate::pipeline::port::{DatatypeHierarchy, PortDescriptor};
    use std::thread;

    struct Failing;

    impl NodePlugin for Failing {
        fn name(&self) -> &str {
            "Failing"
        }
        fn ports(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::output("out", &[DatatypeHierarchy::any()])]
        }
        fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
            Err(RuntimeError::NodeFailed {
                node: ctx.node_name().to_string(),
                message: "sensor not found".to_string(),
            })
        }
    }

    fn loopback() -> Pipeline {
        let mut p = Pipeline::new();
        let input = p.create::<XLinkInNode>(XLinkInConfig::new("in")).unwrap();
        let output = p.create::<XLinkOutNode>(XLinkOutConfig::new("out")).unwrap();
        p.link(
            p.output(input.id(), "out").unwrap(),
            p.input(output.id(), "in").unwrap(),
        )
        .unwrap();
        p
    }

    #[test]
    fn test_loopback_round_trip() {
        let mut device = HostDevice::new(&AppConfig::default());
        device.start_running(loopback()).unwrap();
        assert!(device.is_running());

        let input = device.get_input_queue("in").unwrap();
        let output = device.get_output_queue("out", 4, true).unwrap();
        input
            .send(Arc::new(Message::buffer(Duration::from_millis(5), 42, vec![7])))
            .unwrap();
        let msg = output.get().unwrap();
        assert_eq!(msg.sequence_num, 42);

        device.close();
        assert!(!device.is_running());
        let pipeline = device.pipeline().unwrap();
        assert!(pipeline
            .node_ids()
            .all(|id| pipeline.node_state(id).unwrap() == NodeState::Stopped));
    }

    #[test]
    fn test_start_twice_is_unavailable() {
        let mut device = HostDevice::new(&AppConfig::default());
        device.start_running(loopback()).unwrap();
        assert!(matches!(
            device.start_running(Pipeline::new()),
            Err(RuntimeError::DeviceUnavailable(_))
        ));
        device.close();
        assert!(matches!(
            device.start_running(Pipeline::new()),
            Err(RuntimeError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let mut p = Pipeline::new();
        let a = p.create::<NeuralNetworkNode>(NeuralNetworkConfig::default()).unwrap();
        let b = p.create::<NeuralNetworkNode>(NeuralNetworkConfig::default()).unwrap();
        p.link(p.output(a.id(), "out").unwrap(), p.input(b.id(), "in").unwrap())
            .unwrap();
        p.link(p.output(b.id(), "out").unwrap(), p.input(a.id(), "in").unwrap())
            .unwrap();

        let mut device = HostDevice::new(&AppConfig::default());
        assert!(matches!(
            device.start_running(p),
            Err(RuntimeError::GraphRejected(_))
        ));
        assert!(!device.is_running());
    }

    #[test]
    fn test_duplicate_stream_names_rejected() {
        let mut p = Pipeline::new();
        p.create::<XLinkOutNode>(XLinkOutConfig::new("rgb")).unwrap();
        p.create::<XLinkOutNode>(XLinkOutConfig::new("rgb")).unwrap();
        let mut device = HostDevice::new(&AppConfig::default());
        assert!(matches!(
            device.start_running(p),
            Err(RuntimeError::GraphRejected(_))
        ));
        assert!(device.output_stream_names().is_empty());
    }

    #[test]
    fn test_unknown_stream() {
        let mut device = HostDevice::new(&AppConfig::default());
        device.start_running(loopback()).unwrap();
        assert_eq!(
            device.get_output_queue("depth", 4, false).unwrap_err(),
            RuntimeError::UnknownStream("depth".into())
        );
        assert!(device.get_output_queue("out", 0, false).is_err());
    }

    #[test]
    fn test_close_wakes_blocked_host_get() {
        let mut device = HostDevice::new(&AppConfig::default());
        device.start_running(loopback()).unwrap();
        let output = device.get_output_queue("out", 4, true).unwrap();
        let waiter = thread::spawn(move || output.get());
        thread::sleep(Duration::from_millis(50));
        device.close();
        assert!(waiter.join().unwrap().unwrap_err().is_closed());
    }

    #[test]
    fn test_node_failure_is_reported() {
        let mut p = Pipeline::new();
        p.add_plugin("broken", Box::new(Failing)).unwrap();
        p.create::<ProducerNode>(ProducerConfig {
            count: Some(1),
            ..ProducerConfig::default()
        })
        .unwrap();

        let mut device = HostDevice::new(&AppConfig::default());
        let events = device.events();
        device.start_running(p).unwrap();

        let failure = events
            .iter()
            .find(|e| matches!(e, DeviceEvent::NodeFailed { .. }))
            .unwrap();
        match failure {
            DeviceEvent::NodeFailed { name, error, .. } => {
                assert_eq!(name, "broken");
                assert!(matches!(error, RuntimeError::NodeFailed { .. }));
            }
            other => panic!("unexpected event {:?}", other),
        }
        device.close();
    }
}
