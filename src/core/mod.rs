pub mod chat_stream;
pub mod config;
pub mod error;
pub mod events;
pub mod http_transport;
pub mod message;
pub mod orchestrator;
pub mod store;
pub mod transport;
