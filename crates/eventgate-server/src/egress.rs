//! Egress dispatcher: one tail loop per topic, each feeding its handler.
//!
//! Loops are isolated tasks. They share nothing except the log handle, so
//! a slow handler or a faulty consumer on one topic never delays another.
//! Within a topic, records are dispatched one at a time in log order.
//!
//! Per-loop states:
//!
//! ```text
//! Starting ──open ok──▶ Running ──(backend closed / aborted)──▶ Closed
//!     └──open failed──▶ FailedToStart
//! ```
//!
//! `FailedToStart` is final for that topic and is not retried. A `Running`
//! loop normally lives as long as the process.

use std::sync::Arc;

use async_trait::async_trait;
use eventgate_log::{EventLog, RawMessage, TailItem};
use eventgate_types::{Envelope, EventKind, EventPayload};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of a tail loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Starting,
    Running,
    FailedToStart,
    /// The loop stopped after running: the backend ended the stream (only
    /// in-process logs do this once dropped), or the loop was aborted.
    Closed,
}

/// Processing step for envelopes read from one topic.
///
/// This is the extension point for business logic. Implementations must not
/// assume exactly-once delivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope);
}

/// Logs movie events.
pub struct MovieHandler;

/// Logs user events.
pub struct UserHandler;

/// Logs payment events.
pub struct PaymentHandler;

#[async_trait]
impl EventHandler for MovieHandler {
    async fn handle(&self, envelope: Envelope) {
        match &envelope.payload {
            EventPayload::Movie(movie) => tracing::info!(
                id = %envelope.id,
                movie_id = movie.movie_id,
                action = %movie.action,
                user_id = ?movie.user_id,
                rating = ?movie.rating,
                "processing movie event"
            ),
            other => tracing::info!(id = %envelope.id, payload = ?other, "processing movie event"),
        }
    }
}

#[async_trait]
impl EventHandler for UserHandler {
    async fn handle(&self, envelope: Envelope) {
        match &envelope.payload {
            EventPayload::User(user) => tracing::info!(
                id = %envelope.id,
                user_id = user.user_id,
                action = %user.action,
                occurred_at = %user.timestamp,
                "processing user event"
            ),
            other => tracing::info!(id = %envelope.id, payload = ?other, "processing user event"),
        }
    }
}

#[async_trait]
impl EventHandler for PaymentHandler {
    async fn handle(&self, envelope: Envelope) {
        match &envelope.payload {
            EventPayload::Payment(payment) => tracing::info!(
                id = %envelope.id,
                payment_id = payment.payment_id,
                user_id = payment.user_id,
                amount = payment.amount,
                status = %payment.status,
                "processing payment event"
            ),
            other => tracing::info!(id = %envelope.id, payload = ?other, "processing payment event"),
        }
    }
}

/// The handler for each topic.
#[derive(Clone)]
pub struct Handlers {
    movie: Arc<dyn EventHandler>,
    user: Arc<dyn EventHandler>,
    payment: Arc<dyn EventHandler>,
}

impl Handlers {
    /// The logging-only handlers.
    pub fn observers() -> Self {
        Self {
            movie: Arc::new(MovieHandler),
            user: Arc::new(UserHandler),
            payment: Arc::new(PaymentHandler),
        }
    }

    /// Replaces the handler for `kind`'s topic.
    pub fn with(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        match kind {
            EventKind::Movie => self.movie = handler,
            EventKind::User => self.user = handler,
            EventKind::Payment => self.payment = handler,
        }
        self
    }

    /// The handler for `kind`'s topic.
    pub fn get(&self, kind: EventKind) -> Arc<dyn EventHandler> {
        match kind {
            EventKind::Movie => self.movie.clone(),
            EventKind::User => self.user.clone(),
            EventKind::Payment => self.payment.clone(),
        }
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Self::observers()
    }
}

/// A running tail loop.
pub struct TailHandle {
    kind: EventKind,
    state: watch::Receiver<TailState>,
    task: JoinHandle<()>,
}

impl TailHandle {
    /// The kind whose topic this loop tails.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The loop's current state.
    ///
    /// A loop whose task has stopped without reaching a final state, such
    /// as after [`abort`](Self::abort), reports `Closed`.
    pub fn state(&self) -> TailState {
        let reported = *self.state.borrow();
        match reported {
            TailState::Starting | TailState::Running if self.task.is_finished() => {
                TailState::Closed
            }
            other => other,
        }
    }

    /// Waits until the loop has left `Starting`, and returns the new state.
    pub async fn started(&mut self) -> TailState {
        let outcome = self
            .state
            .wait_for(|state| *state != TailState::Starting)
            .await
            .map(|state| *state);
        outcome.unwrap_or_else(|_| *self.state.borrow())
    }

    /// Stops the loop.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Starts and owns the per-topic tail loops.
pub struct Dispatcher {
    log: Arc<dyn EventLog>,
    handlers: Handlers,
}

impl Dispatcher {
    pub fn new(log: Arc<dyn EventLog>, handlers: Handlers) -> Self {
        Self { log, handlers }
    }

    /// Spawns one loop for each of the fixed topics.
    pub fn spawn(self) -> Vec<TailHandle> {
        EventKind::ALL
            .into_iter()
            .map(|kind| {
                let (state_tx, state_rx) = watch::channel(TailState::Starting);
                let task = tokio::spawn(run_tail(
                    self.log.clone(),
                    kind,
                    self.handlers.get(kind),
                    state_tx,
                ));
                TailHandle {
                    kind,
                    state: state_rx,
                    task,
                }
            })
            .collect()
    }
}

/// Tails `kind`'s topic and dispatches every record to `handler`.
///
/// Open failures end the loop. Consumer faults and undecodable records are
/// logged, and the loop moves on.
pub async fn run_tail(
    log: Arc<dyn EventLog>,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
    state: watch::Sender<TailState>,
) {
    let topic = kind.topic();

    let mut stream = match log.open_tail(topic).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(topic, error = %e, "failed to open tail, egress for this topic is stopped");
            state.send_replace(TailState::FailedToStart);
            return;
        }
    };

    // An in-process backend ends the stream once its last owner drops it.
    drop(log);

    state.send_replace(TailState::Running);
    tracing::info!(topic, "started consuming messages");

    while let Some(item) = stream.recv().await {
        match item {
            TailItem::Message(message) => dispatch(kind, handler.as_ref(), &message).await,
            TailItem::Fault(e) => {
                tracing::warn!(topic, error = %e, "error consuming from topic");
            }
        }
    }

    tracing::warn!(topic, "tail closed by the log backend");
    state.send_replace(TailState::Closed);
}

/// Decodes one record and hands it to `handler`. Undecodable records are
/// dropped.
async fn dispatch(kind: EventKind, handler: &dyn EventHandler, message: &RawMessage) {
    tracing::debug!(
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        value = %String::from_utf8_lossy(&message.payload),
        "received message"
    );

    let envelope = match Envelope::decode(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                topic = %message.topic,
                offset = message.offset,
                error = %e,
                "dropping undecodable message"
            );
            return;
        }
    };

    if envelope.kind() != kind {
        tracing::warn!(
            topic = %message.topic,
            id = %envelope.id,
            event_type = %envelope.kind(),
            "envelope type does not match its topic"
        );
    }

    handler.handle(envelope).await;
}
