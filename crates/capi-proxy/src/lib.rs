//! Capi Proxy - OpenAI-compatible gateway for a binary streaming chat service.
//!
//! Clients speak the OpenAI `/v1/chat/completions` API. This crate flattens
//! the conversation into a transcript, encodes it as a length-prefixed binary
//! request frame (see `capi-protocol`), and turns the upstream byte stream
//! back into OpenAI responses.
//!
//! Design goals:
//! - Accept OpenAI chat traffic, streaming and non-streaming.
//! - Forward the client's bearer token to the upstream service unchanged.
//! - Emit SSE `chat.completion.chunk` frames as upstream chunks arrive.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod streaming;
pub mod telemetry;
pub mod types;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use server::serve;
