//! oji-ai: OpenAI-compatible provider layer
//!
//! This crate provides the HTTP transport, the server-sent event decoder and
//! the wire types used to talk to any OpenAI-compatible chat endpoint.

pub mod client;
pub mod error;
pub mod sse;
pub mod transport;
pub mod types;

pub use client::ChatClient;
pub use error::{ClassifiedError, Error, ErrorKind, Result};
pub use sse::{ContentDelta, DeltaStream, SseDecoder};
pub use transport::{BufferedBody, ByteStream, HttpRequest, HttpTransport, Response, Transport};
pub use types::*;
