//! Reader/Writer abstraction: a framed, possibly concurrent, bidirectional
//! duplex channel with selective buffered read (spec.md §4.2).

mod line_delimited;

pub use line_delimited::{LineDelimitedReader, LineDelimitedWriter};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ReaderError, WriterError};
use crate::message::Message;

/// A predicate used by `Reader::read_matching` to select the next message
/// that should be delivered to this caller; non-matching messages are
/// buffered in arrival order for other readers.
pub type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Produces an unordered-arrival stream of `Message` values from a framed
/// byte source. Safe to call from multiple tasks concurrently; messages not
/// matching a given predicate are retained for future reads rather than
/// dropped.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn read(&self, cancel: &CancellationToken) -> Result<Message, ReaderError>;

    async fn read_matching(
        &self,
        predicate: Predicate,
        cancel: &CancellationToken,
    ) -> Result<Message, ReaderError>;
}

/// Consumes `Message` values, guaranteeing that no two writes interleave on
/// the wire. A successful return means the transport accepted the message,
/// not that the peer has received it.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, message: &Message, cancel: &CancellationToken) -> Result<(), WriterError>;
}

pub fn match_any() -> Predicate {
    Arc::new(|_| true)
}
