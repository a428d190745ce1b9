//! Domain payload shapes carried inside an [`Envelope`](crate::Envelope).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CodecError, EventKind};

/// A movie-related event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieEvent {
    pub movie_id: i64,
    #[serde(default)]
    pub title: String,
    /// Open set: `viewed`, `rated`, `added`, ...
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A user-related event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Open set: `registered`, `logged_in`, `updated_profile`, ...
    pub action: String,
    /// When the client says the action happened.
    pub timestamp: DateTime<Utc>,
}

/// A payment-related event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: i64,
    pub user_id: i64,
    pub amount: f64,
    /// Open set: `completed`, `failed`, `refunded`, ...
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_type: Option<String>,
}

/// One of the three domain payloads, tagged by its [`EventKind`].
///
/// Serialized adjacently: the kind goes to `"type"` and the fields go to
/// `"payload"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum EventPayload {
    Movie(MovieEvent),
    User(UserEvent),
    Payment(PaymentEvent),
}

impl EventPayload {
    /// Decodes a bare request body into the payload shape for `kind`.
    ///
    /// Only structure is checked: required fields must be present and typed
    /// correctly. Unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if `bytes` is not valid JSON for the
    /// shape.
    pub fn decode(kind: EventKind, bytes: &[u8]) -> Result<Self, CodecError> {
        let decoded = match kind {
            EventKind::Movie => serde_json::from_slice(bytes).map(Self::Movie),
            EventKind::User => serde_json::from_slice(bytes).map(Self::User),
            EventKind::Payment => serde_json::from_slice(bytes).map(Self::Payment),
        };
        decoded.map_err(CodecError::Decode)
    }

    /// Returns the kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Movie(_) => EventKind::Movie,
            Self::User(_) => EventKind::User,
            Self::Payment(_) => EventKind::Payment,
        }
    }

    /// Derives the envelope id: `"<kind>-<key>-<action or status>"`.
    ///
    /// The id repeats for identical inputs.
    pub fn event_id(&self) -> String {
        let kind = self.kind();
        match self {
            Self::Movie(event) => format!("{kind}-{}-{}", event.movie_id, event.action),
            Self::User(event) => format!("{kind}-{}-{}", event.user_id, event.action),
            Self::Payment(event) => format!("{kind}-{}-{}", event.payment_id, event.status),
        }
    }
}

impl From<MovieEvent> for EventPayload {
    fn from(event: MovieEvent) -> Self {
        Self::Movie(event)
    }
}

impl From<UserEvent> for EventPayload {
    fn from(event: UserEvent) -> Self {
        Self::User(event)
    }
}

impl From<PaymentEvent> for EventPayload {
    fn from(event: PaymentEvent) -> Self {
        Self::Payment(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_movie_with_only_required_fields() {
        let payload =
            EventPayload::decode(EventKind::Movie, br#"{"movie_id":3,"action":"viewed"}"#)
                .expect("should decode");

        let EventPayload::Movie(movie) = payload else {
            panic!("expected movie payload");
        };
        assert_eq!(movie.movie_id, 3);
        assert_eq!(movie.title, "");
        assert_eq!(movie.rating, None);
        assert_eq!(movie.genres, None);
    }

    #[test]
    fn decode_requires_action() {
        let err = EventPayload::decode(EventKind::Movie, br#"{"movie_id":3,"title":"Heat"}"#)
            .expect_err("action is required");
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(err.to_string().contains("action"));
    }

    #[test]
    fn decode_rejects_wrong_field_type() {
        let err = EventPayload::decode(
            EventKind::Payment,
            br#"{"payment_id":"abc","user_id":7,"amount":1.0,"status":"failed"}"#,
        )
        .expect_err("payment_id must be an integer");
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn user_event_requires_timestamp() {
        let err = EventPayload::decode(EventKind::User, br#"{"user_id":1,"action":"registered"}"#)
            .expect_err("timestamp is required");
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn payment_timestamp_is_optional() {
        let payload = EventPayload::decode(
            EventKind::Payment,
            br#"{"payment_id":42,"user_id":7,"amount":19.99,"status":"completed"}"#,
        )
        .expect("should decode");
        assert_eq!(payload.kind(), EventKind::Payment);
        assert_eq!(payload.event_id(), "payment-42-completed");
    }

    #[test]
    fn semantic_constraints_are_not_checked() {
        let payload = EventPayload::decode(
            EventKind::Movie,
            br#"{"movie_id":-1,"action":"rated","rating":42.5}"#,
        )
        .expect("out-of-range rating still decodes");
        assert_eq!(payload.event_id(), "movie--1-rated");
    }

    #[test]
    fn event_ids_follow_kind_key_action() {
        let movie = EventPayload::Movie(MovieEvent {
            movie_id: 7,
            title: "Alien".to_string(),
            action: "rated".to_string(),
            user_id: Some(1),
            rating: Some(4.5),
            genres: None,
            description: None,
        });
        assert_eq!(movie.event_id(), "movie-7-rated");

        let user = EventPayload::User(UserEvent {
            user_id: 12,
            username: None,
            email: None,
            action: "logged_in".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(user.event_id(), "user-12-logged_in");
    }

    #[test]
    fn absent_optionals_are_omitted_on_output() {
        let payload = EventPayload::Payment(PaymentEvent {
            payment_id: 1,
            user_id: 2,
            amount: 3.5,
            status: "refunded".to_string(),
            timestamp: None,
            method_type: None,
        });
        let value = serde_json::to_value(&payload).expect("should serialize");

        assert_eq!(value["type"], "payment");
        let fields = value["payload"].as_object().expect("payload object");
        assert!(!fields.contains_key("timestamp"));
        assert!(!fields.contains_key("method_type"));
        assert_eq!(fields["payment_id"], 1);
    }
}
