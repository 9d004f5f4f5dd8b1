//! Mock construction helpers

use camflow::device::Device;
use camflow::pipeline::{MessageQueue, Pipeline, RuntimeError};
use mockall::mock;
use std::collections::HashMap;
use std::sync::Arc;

mock! {
    pub Backend {}
    impl Device for Backend {
        fn start_running(&mut self, pipeline: Pipeline) -> Result<(), RuntimeError>;
        fn get_output_queue(
            &self,
            name: &str,
            max_size: usize,
            blocking: bool,
        ) -> Result<Arc<MessageQueue>, RuntimeError>;
        fn get_input_queue(&self, name: &str) -> Result<Arc<MessageQueue>, RuntimeError>;
        fn is_running(&self) -> bool;
        fn close(&mut self);
    }
}

/// A mock device serving the given queues as output streams. Unknown names
/// fail with `UnknownStream`.
pub fn device_with_outputs(queues: &[Arc<MessageQueue>]) -> MockBackend {
    let by_name: HashMap<String, Arc<MessageQueue>> = queues
        .iter()
        .map(|q| (q.name().to_string(), q.clone()))
        .collect();
    let mut device = MockBackend::new();
    device
        .expect_get_output_queue()
        .returning(move |name, max_size, blocking| {
            let queue = by_name
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UnknownStream(name.to_string()))?;
            queue.set_max_size(max_size)?;
            queue.set_blocking(blocking);
            Ok(queue)
        });
    device.expect_is_running().return_const(true);
    device
}
