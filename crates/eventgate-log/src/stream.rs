//! Live tail handles.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::LogError;

/// Buffered items between a backend pump and the tail reader.
const TAIL_BUFFER: usize = 256;

/// A record read from a tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// One step of a tail: a record, or a consumer fault that does not end it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailItem {
    Message(RawMessage),
    Fault(LogError),
}

/// A lazy, non-restartable sequence of [`TailItem`]s for one topic.
///
/// Backends feed the stream from a pump task. Dropping the stream stops
/// the pump.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<TailItem>,
    pump: Option<JoinHandle<()>>,
}

impl MessageStream {
    /// Creates a stream and the sender a backend pump writes into.
    pub fn channel() -> (mpsc::Sender<TailItem>, Self) {
        let (tx, rx) = mpsc::channel(TAIL_BUFFER);
        (tx, Self { rx, pump: None })
    }

    /// Ties the lifetime of `pump` to this stream.
    pub(crate) fn attach(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Waits for the next item.
    ///
    /// Returns `None` only if the backend side has gone away.
    pub async fn recv(&mut self) -> Option<TailItem> {
        self.rx.recv().await
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_items_in_send_order() {
        let (tx, mut stream) = MessageStream::channel();

        let message = RawMessage {
            topic: "movie-events".to_string(),
            partition: 0,
            offset: 0,
            payload: b"{}".to_vec(),
        };
        let fault = LogError::Consume {
            topic: "movie-events".to_string(),
            detail: "broker transport failure".to_string(),
        };
        tx.send(TailItem::Message(message.clone())).await.unwrap();
        tx.send(TailItem::Fault(fault.clone())).await.unwrap();
        drop(tx);

        assert_eq!(stream.recv().await, Some(TailItem::Message(message)));
        assert_eq!(stream.recv().await, Some(TailItem::Fault(fault)));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_the_pump() {
        let (tx, stream) = MessageStream::channel();
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let pump = tokio::spawn(async move {
            let _held = (tx, alive_tx);
            std::future::pending::<()>().await;
        });
        let stream = stream.attach(pump);

        drop(stream);
        // The sender half is dropped together with the aborted pump.
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), alive_rx)
            .await
            .expect("pump should stop");
        assert!(outcome.is_err());
    }
}
