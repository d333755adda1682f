//! Reference transport: newline-delimited JSON over any `AsyncRead`/`AsyncWrite`.
//! Bundled the same way the teacher inlines its own stdio framing directly
//! inside `codex::mcp::jsonrpc` rather than depending on a transport crate;
//! concrete framings remain collaborators per spec.md §1/§6.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Predicate, Reader, Writer};
use crate::error::{ReaderError, WriterError};
use crate::message::Message;

/// Reads one JSON message per line. Internally a single pump task owns the
/// byte source and fans decoded messages out to any number of concurrent
/// `read`/`read_matching` callers through a shared, order-preserving buffer.
pub struct LineDelimitedReader {
    buffer: Arc<Mutex<VecDeque<Message>>>,
    closed: Arc<AtomicBool>,
    failure: Arc<StdMutex<Option<String>>>,
    notify: Arc<Notify>,
    _pump: JoinHandle<()>,
}

impl LineDelimitedReader {
    pub fn spawn<R>(source: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(StdMutex::new(None));
        let notify = Arc::new(Notify::new());

        let pump = tokio::spawn(pump_task(
            source,
            buffer.clone(),
            closed.clone(),
            failure.clone(),
            notify.clone(),
        ));

        Self {
            buffer,
            closed,
            failure,
            notify,
            _pump: pump,
        }
    }

    async fn wait_for_match(
        &self,
        predicate: &Predicate,
        cancel: &CancellationToken,
    ) -> Result<Message, ReaderError> {
        loop {
            // Register interest before checking state so a notification fired
            // between the check and the await is never missed.
            let notified = self.notify.notified();

            {
                let mut buffer = self.buffer.lock().await;
                if let Some(pos) = buffer.iter().position(|msg| predicate(msg)) {
                    return Ok(buffer.remove(pos).expect("position was just found"));
                }
            }

            if self.closed.load(Ordering::SeqCst) {
                if let Some(reason) = self.failure.lock().expect("failure mutex poisoned").take() {
                    return Err(ReaderError::Framing(reason));
                }
                return Err(ReaderError::Closed);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ReaderError::Closed),
                _ = notified => {}
            }
        }
    }
}

#[async_trait]
impl Reader for LineDelimitedReader {
    async fn read(&self, cancel: &CancellationToken) -> Result<Message, ReaderError> {
        self.wait_for_match(&super::match_any(), cancel).await
    }

    async fn read_matching(
        &self,
        predicate: Predicate,
        cancel: &CancellationToken,
    ) -> Result<Message, ReaderError> {
        self.wait_for_match(&predicate, cancel).await
    }
}

async fn pump_task<R>(
    mut source: R,
    buffer: Arc<Mutex<VecDeque<Message>>>,
    closed: Arc<AtomicBool>,
    failure: Arc<StdMutex<Option<String>>>,
    notify: Arc<Notify>,
) where
    R: AsyncBufRead + Send + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match source.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() {
                    continue;
                }
                match Message::decode(trimmed.as_bytes()) {
                    Ok(message) => {
                        buffer.lock().await.push_back(message);
                        notify.notify_waiters();
                    }
                    Err(err) => {
                        warn!("malformed frame, closing reader: {err}");
                        *failure.lock().expect("failure mutex poisoned") = Some(err.to_string());
                        closed.store(true, Ordering::SeqCst);
                        notify.notify_waiters();
                        return;
                    }
                }
            }
            Err(err) => {
                debug!("reader transport closed: {err}");
                *failure.lock().expect("failure mutex poisoned") = Some(err.to_string());
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    notify.notify_waiters();
}

type WriteJob = (Vec<u8>, oneshot::Sender<Result<(), WriterError>>);

/// Serializes writes through a single background task so framed messages
/// never interleave on the wire (spec.md §5).
pub struct LineDelimitedWriter {
    tx: mpsc::UnboundedSender<WriteJob>,
    _task: JoinHandle<()>,
}

impl LineDelimitedWriter {
    pub fn spawn<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(writer_task(sink, rx));
        Self { tx, _task: task }
    }
}

async fn writer_task<W>(mut sink: W, mut rx: mpsc::UnboundedReceiver<WriteJob>)
where
    W: AsyncWrite + Send + Unpin,
{
    while let Some((bytes, ack)) = rx.recv().await {
        let outcome = async {
            sink.write_all(&bytes).await?;
            sink.write_all(b"\n").await?;
            sink.flush().await
        }
        .await
        .map_err(WriterError::from);
        let _ = ack.send(outcome);
    }
}

#[async_trait]
impl Writer for LineDelimitedWriter {
    async fn write(&self, message: &Message, _cancel: &CancellationToken) -> Result<(), WriterError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((message.encode(), ack_tx))
            .map_err(|_| WriterError::Closed)?;
        ack_rx.await.map_err(|_| WriterError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageId, Params};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_one_message_per_line() {
        let data = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\",\"params\":{}}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\",\"params\":{}}\n".to_vec();
        let reader = LineDelimitedReader::spawn(BufReader::new(std::io::Cursor::new(data)));
        let cancel = CancellationToken::new();
        let first = reader.read(&cancel).await.unwrap();
        assert_eq!(first.id(), Some(&MessageId::Number(1)));
        let second = reader.read(&cancel).await.unwrap();
        assert_eq!(second.id(), Some(&MessageId::Number(2)));
        assert!(matches!(
            reader.read(&cancel).await,
            Err(ReaderError::Closed)
        ));
    }

    #[tokio::test]
    async fn selective_read_buffers_non_matching_messages() {
        let data = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\",\"params\":{}}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\",\"params\":{}}\n".to_vec();
        let reader = LineDelimitedReader::spawn(BufReader::new(std::io::Cursor::new(data)));
        let cancel = CancellationToken::new();

        let only_b: Predicate = Arc::new(|msg| {
            matches!(msg, Message::Request { method, .. } if method == "b")
        });
        let second = reader.read_matching(only_b, &cancel).await.unwrap();
        assert_eq!(second.id(), Some(&MessageId::Number(2)));

        // "a" was buffered, not lost, and is delivered to the next plain read.
        let first = reader.read(&cancel).await.unwrap();
        assert_eq!(first.id(), Some(&MessageId::Number(1)));
    }

    #[tokio::test]
    async fn writer_serializes_without_interleaving() {
        let (client, mut server) = tokio::io::duplex(4096);
        let writer = LineDelimitedWriter::spawn(client);
        let cancel = CancellationToken::new();

        let a = Message::notification("a", Params::None);
        let b = Message::success(MessageId::Number(1), serde_json::Value::from(1));
        writer.write(&a, &cancel).await.unwrap();
        writer.write(&b, &cancel).await.unwrap();

        drop(writer);
        let mut collected = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut collected)
            .await
            .unwrap();
        let text = String::from_utf8(collected).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
    }
}
