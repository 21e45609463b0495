//! Direct peer-to-peer file and text exchange over WebRTC data channels,
//! with peers found and introduced through a polling HTTP relay.

pub mod core;
pub mod utils;
pub mod workers;
