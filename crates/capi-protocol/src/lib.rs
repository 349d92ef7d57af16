//! capi protocol - binary codec for the upstream chat stream
//!
//! The upstream speaks a connect-style binary protocol. This crate covers the
//! two directions the gateway needs:
//! - building the request frame for a transcript and model ([`FrameEncoder`])
//! - recovering answer text from raw response chunks ([`ChunkFilter`],
//!   [`StreamAssembler`], [`AnswerCollector`])

pub mod assembler;
pub mod error;
pub mod filter;
pub mod frame;
pub mod varint;

pub use assembler::{
    clean_segment, collect_answer, AnswerCollector, AssemblerEvent, StreamAssembler, StreamState,
    END_USER_SENTINEL,
};
pub use error::{ProtocolError, Result};
pub use filter::{filter_chunk, ChunkFilter, FilterState};
pub use frame::{encode_request, FrameEncoder, SessionIdentifiers};
