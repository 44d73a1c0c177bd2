//! Parley is a terminal client for document-grounded answering services that
//! stream their replies.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the chunk vocabulary of a reply stream and the request
//!   payloads sent to the service.
//! - [`core`] owns the conversation log, reads reply streams into it, and
//!   exposes the [`core::orchestrator::ChatOrchestrator`] that sends, stops and
//!   regenerates answers.
//! - [`cli`] parses arguments and runs the one-shot and interactive front-ends.
//! - [`utils`] holds URL helpers and logging setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
