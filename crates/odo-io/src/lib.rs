pub mod bridge;
pub mod metrics;
pub mod protocol;
pub mod serial;

pub use bridge::{spawn_bridge, BridgeConfig, BridgeError, BridgeHandle};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{OutgoingMessage, SpeedDataMsg, SpeedUpdateMsg};
pub use serial::ReaderLineSource;
#[cfg(feature = "hardware-serial")]
pub use serial::SerialLineSource;
