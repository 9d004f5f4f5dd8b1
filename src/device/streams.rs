//! Host-side view over a set of device output streams.

use super::Device;
use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::SharedMessage;
use crate::pipeline::queue::MessageQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One message per stream, in the order the streams were opened.
pub type StreamSet = Vec<(String, SharedMessage)>;

/// Named output queues opened with a common size and overflow policy.
///
/// A set interrupted by a timeout stays parked here, one slot per stream,
/// and the next call only waits on the streams that are still missing.
pub struct HostStreams {
    queues: Vec<(String, Arc<MessageQueue>)>,
    pending: Mutex<Vec<Option<SharedMessage>>>,
}

impl HostStreams {
    /// Open every stream in `names` on `device`.
    pub fn open<D: Device + ?Sized>(
        device: &D,
        names: &[&str],
        max_size: usize,
        blocking: bool,
    ) -> Result<Self, RuntimeError> {
        let queues = names
            .iter()
            .map(|&name| {
                device
                    .get_output_queue(name, max_size, blocking)
                    .map(|q| (name.to_string(), q))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let pending = Mutex::new(vec![None; queues.len()]);
        Ok(Self { queues, pending })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(|(name, _)| name.as_str())
    }

    pub fn queue(&self, name: &str) -> Option<&Arc<MessageQueue>> {
        self.queues
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, q)| q)
    }

    /// Everything currently buffered, stream by stream, parked messages
    /// first.
    pub fn try_get_all(&self) -> Result<StreamSet, RuntimeError> {
        let mut pending = self.pending.lock();
        let mut ready = Vec::new();
        for ((name, queue), slot) in self.queues.iter().zip(pending.iter_mut()) {
            if let Some(msg) = slot.take() {
                ready.push((name.clone(), msg));
            }
            for msg in queue.try_get_all()? {
                ready.push((name.clone(), msg));
            }
        }
        Ok(ready)
    }

    /// Block until every stream yielded one message.
    pub fn get_set(&self) -> Result<StreamSet, RuntimeError> {
        let mut pending = self.pending.lock();
        for ((_, queue), slot) in self.queues.iter().zip(pending.iter_mut()) {
            if slot.is_none() {
                *slot = Some(queue.get()?);
            }
        }
        Ok(self.take_set(&mut pending))
    }

    /// Like [`get_set`](Self::get_set) but gives up after `timeout` per
    /// stream. Messages taken before the timeout are kept for the next call.
    pub fn get_set_timeout(&self, timeout: Duration) -> Result<Option<StreamSet>, RuntimeError> {
        let mut pending = self.pending.lock();
        for ((_, queue), slot) in self.queues.iter().zip(pending.iter_mut()) {
            if slot.is_none() {
                match queue.get_timeout(timeout)? {
                    Some(msg) => *slot = Some(msg),
                    None => return Ok(None),
                }
            }
        }
        Ok(Some(self.take_set(&mut pending)))
    }

    /// Streams holding a parked message from an incomplete set.
    pub fn parked(&self) -> usize {
        self.pending.lock().iter().filter(|slot| slot.is_some()).count()
    }

    fn take_set(&self, pending: &mut [Option<SharedMessage>]) -> StreamSet {
        self.queues
            .iter()
            .zip(pending.iter_mut())
            .filter_map(|((name, _), slot)| slot.take().map(|msg| (name.clone(), msg)))
            .collect()
    }
}

/// Largest timestamp difference within a set.
pub fn spread(set: &[(String, SharedMessage)]) -> Duration {
    let stamps = set.iter().map(|(_, msg)| msg.timestamp);
    match (stamps.clone().min(), stamps.max()) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => Duration::ZERO,
    }
}
