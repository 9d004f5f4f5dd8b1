//! Built-in pipeline node implementations.

pub mod camera;
pub mod neural_network;
pub mod producer;
pub mod stream_sync;
pub mod xlink;

pub use camera::{CameraConfig, CameraNode, ImageOrientation, MeshSource};
pub use neural_network::{NeuralNetworkConfig, NeuralNetworkNode};
pub use producer::{ProducerConfig, ProducerNode};
pub use stream_sync::{StreamSyncConfig, StreamSyncNode};
pub use xlink::{XLinkInConfig, XLinkInNode, XLinkOutConfig, XLinkOutNode};
