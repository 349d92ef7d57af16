//! Streaming conversion (SSE).
//!
//! Assembled deltas are emitted as OpenAI `chat.completion.chunk` frames:
//!
//! ```text
//! data: {"id":"chatcmpl-…","object":"chat.completion.chunk",…}
//!
//! data: [DONE]
//!
//! ```
//!
//! If the upstream body fails mid-stream the response status is already
//! sent, so an error frame is written instead and the stream ends.

use async_stream::stream;
use bytes::Bytes;
use capi_protocol::AssemblerEvent;
use futures::{pin_mut, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Display;
use tracing::{debug, error};

use crate::types::ChatCompletionChunk;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Envelope fields shared by every chunk of one response.
#[derive(Debug, Clone)]
pub struct ChunkEnvelope {
    pub id: String,
    pub created: i64,
    pub model: String,
}

/// Convert assembler events into SSE frames.
pub fn sse_frames<S, E>(
    events: S,
    envelope: ChunkEnvelope,
) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    S: Stream<Item = Result<AssemblerEvent, E>>,
    E: Display,
{
    stream! {
        pin_mut!(events);
        let mut deltas = 0usize;
        while let Some(event) = events.next().await {
            match event {
                Ok(AssemblerEvent::Delta(text)) => {
                    deltas += 1;
                    let chunk = ChatCompletionChunk::delta(
                        &envelope.id,
                        envelope.created,
                        &envelope.model,
                        text,
                    );
                    match serde_json::to_string(&chunk) {
                        Ok(data) => yield Ok(data_frame(&data)),
                        Err(e) => error!(error = %e, "failed to serialize chunk"),
                    }
                }
                Ok(AssemblerEvent::Done) => {
                    debug!(response_id = %envelope.id, deltas, "stream complete");
                    yield Ok(Bytes::from_static(DONE_FRAME));
                    break;
                }
                Err(e) => {
                    error!(error = %e, response_id = %envelope.id, "upstream stream failed");
                    yield Ok(error_frame());
                    break;
                }
            }
        }
    }
}

fn data_frame(data: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", data))
}

fn error_frame() -> Bytes {
    data_frame(&json!({ "error": "Internal server error" }).to_string())
}
