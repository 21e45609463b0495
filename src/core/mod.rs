pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod peer;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod transfer;
