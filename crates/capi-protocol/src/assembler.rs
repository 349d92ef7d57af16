//! Turning filtered chunks into answer text.
//!
//! The upstream echoes injected context before the model's answer and marks
//! the boundary with [`END_USER_SENTINEL`]. One character of framing noise
//! tends to follow the sentinel; it is dropped if alphabetic.
//!
//! Two modes are supported:
//! - streaming: each chunk becomes at most one delta, followed by a single
//!   [`AssemblerEvent::Done`];
//! - complete: all chunks are concatenated and cleaned once.

use chrono::Utc;
use futures::{pin_mut, Stream, StreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::filter::ChunkFilter;

/// Boundary between injected context and the visible answer.
pub const END_USER_SENTINEL: &str = "<|END_USER|>";

/// Apply the cleanup rule to one text segment.
///
/// Keeps only the text after the last sentinel (dropping a leading
/// alphabetic boundary artifact), then removes ASCII control characters and
/// trims. Applying it twice yields the same result as applying it once.
pub fn clean_segment(text: &str) -> String {
    match after_last_sentinel(text) {
        Some(rest) => strip_and_trim(drop_boundary_artifact(rest)),
        None => strip_and_trim(text),
    }
}

/// Remove control characters and trim. Removing controls can join a split
/// sentinel, which is cut again so the result never contains one.
fn strip_and_trim(text: &str) -> String {
    let stripped = strip_controls(text);
    match after_last_sentinel(&stripped) {
        Some(rest) => drop_boundary_artifact(rest).trim().to_string(),
        None => stripped.trim().to_string(),
    }
}

fn strip_controls(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_control()).collect()
}

fn after_last_sentinel(text: &str) -> Option<&str> {
    text.rfind(END_USER_SENTINEL)
        .map(|idx| &text[idx + END_USER_SENTINEL.len()..])
}

fn drop_boundary_artifact(text: &str) -> &str {
    let text = text.trim_start();
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() => chars.as_str(),
        _ => text,
    }
}

/// Per-request assembly state.
#[derive(Debug, Clone)]
pub struct StreamState {
    response_id: String,
    created: i64,
    boundary_pending: bool,
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            response_id: format!("chatcmpl-{}", Uuid::new_v4()),
            created: Utc::now().timestamp(),
            boundary_pending: false,
        }
    }

    /// Identifier shared by every event of this request.
    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// Creation time in unix seconds.
    pub fn created(&self) -> i64 {
        self.created
    }

    /// Clean one streamed fragment.
    ///
    /// A sentinel that ends a fragment leaves its boundary artifact at the
    /// start of the next non-empty fragment, so the drop is deferred.
    fn clean_fragment(&mut self, fragment: &str) -> Option<String> {
        let (rest, at_boundary) = match after_last_sentinel(fragment) {
            Some(rest) => (rest, true),
            None => (fragment, self.boundary_pending),
        };

        let cleaned = strip_and_trim(rest);
        if cleaned.is_empty() {
            self.boundary_pending = at_boundary;
            return None;
        }
        self.boundary_pending = false;
        if !at_boundary {
            return Some(cleaned);
        }

        let cleaned = strip_and_trim(drop_boundary_artifact(rest));
        (!cleaned.is_empty()).then_some(cleaned)
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of streaming assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// A cleaned, non-empty piece of the answer.
    Delta(String),
    /// End of the answer; always the last event.
    Done,
}

/// Streaming assembler: one optional delta per chunk.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    filter: ChunkFilter,
    state: StreamState,
    deltas: usize,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StreamState) -> Self {
        Self {
            filter: ChunkFilter::new(),
            state,
            deltas: 0,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Number of deltas produced so far.
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    /// Feed one raw chunk, returning the delta it produced, if any.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        let fragment = self.filter.filter(chunk);
        if fragment.is_empty() {
            return None;
        }
        let delta = self.state.clean_fragment(&fragment)?;
        self.deltas += 1;
        Some(delta)
    }

    /// Assemble a synchronous sequence of chunks.
    pub fn events<I>(self, chunks: I) -> Events<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        Events {
            assembler: self,
            chunks: chunks.into_iter(),
            done: false,
        }
    }

    /// Assemble an asynchronous chunk source, e.g. an HTTP body stream.
    ///
    /// A source error is yielded as-is and ends the stream without a
    /// [`AssemblerEvent::Done`].
    pub fn into_stream<S, B, E>(self, chunks: S) -> impl Stream<Item = Result<AssemblerEvent, E>>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
    {
        let mut assembler = self;
        async_stream::try_stream! {
            pin_mut!(chunks);
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if let Some(delta) = assembler.push(chunk.as_ref()) {
                    yield AssemblerEvent::Delta(delta);
                }
            }
            debug!(
                response_id = %assembler.state.response_id,
                deltas = assembler.deltas,
                "stream assembled"
            );
            yield AssemblerEvent::Done;
        }
    }
}

/// Iterator returned by [`StreamAssembler::events`].
#[derive(Debug)]
pub struct Events<I> {
    assembler: StreamAssembler,
    chunks: I,
    done: bool,
}

impl<I> Iterator for Events<I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    type Item = AssemblerEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for chunk in self.chunks.by_ref() {
            if let Some(delta) = self.assembler.push(chunk.as_ref()) {
                return Some(AssemblerEvent::Delta(delta));
            }
        }
        self.done = true;
        Some(AssemblerEvent::Done)
    }
}

/// Non-streaming assembler: concatenates every fragment and cleans once.
#[derive(Debug, Default)]
pub struct AnswerCollector {
    filter: ChunkFilter,
    buffer: String,
}

impl AnswerCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let fragment = self.filter.filter(chunk);
        self.buffer.push_str(&fragment);
    }

    pub fn finish(self) -> String {
        clean_segment(&self.buffer)
    }
}

/// Drain an asynchronous chunk source into the complete answer.
pub async fn collect_answer<S, B, E>(chunks: S) -> Result<String, E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    pin_mut!(chunks);
    let mut collector = AnswerCollector::new();
    while let Some(chunk) = chunks.next().await {
        collector.push(chunk?.as_ref());
    }
    Ok(collector.finish())
}
