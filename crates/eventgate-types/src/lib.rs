//! Shared event types for the eventgate workspace.
//!
//! This crate defines the generic [`Envelope`] that travels over the durable
//! log, the three domain payload shapes it can carry, and the fixed mapping
//! from event kinds to log topics.
//!
//! # Wire format
//!
//! Envelopes are encoded as JSON:
//!
//! ```json
//! {
//!   "id": "payment-42-completed",
//!   "timestamp": "2026-10-19T09:30:00.123456789Z",
//!   "type": "payment",
//!   "payload": { "payment_id": 42, "user_id": 7, "amount": 19.99, "status": "completed" }
//! }
//! ```
//!
//! `type` and `payload` are a single tagged value ([`EventPayload`]), so an
//! envelope whose `type` disagrees with its payload shape cannot be built or
//! decoded.

mod envelope;
mod error;
mod kind;
mod payload;

pub use envelope::Envelope;
pub use error::CodecError;
pub use kind::{EventKind, ParseEventKindError};
pub use payload::{EventPayload, MovieEvent, PaymentEvent, UserEvent};
