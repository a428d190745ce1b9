//! Event kinds and their log topics.

use serde::{Deserialize, Serialize};

/// The domain an event belongs to.
///
/// Each kind maps to exactly one log topic. Topic names are fixed and are
/// used both as publish targets and as tail sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Catalogue activity: views, ratings, additions.
    Movie,
    /// Account activity: registrations, logins, profile updates.
    User,
    /// Payment lifecycle: completed, failed, refunded.
    Payment,
}

impl EventKind {
    /// Every kind, in topic start-up order.
    pub const ALL: [EventKind; 3] = [Self::Movie, Self::User, Self::Payment];

    /// Returns the envelope `type` label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::User => "user",
            Self::Payment => "payment",
        }
    }

    /// Returns the log topic events of this kind are published to.
    pub fn topic(self) -> &'static str {
        match self {
            Self::Movie => "movie-events",
            Self::User => "user-events",
            Self::Payment => "payment-events",
        }
    }

    /// Looks up the kind whose topic is `topic`.
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == topic)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "user" => Ok(Self::User),
            "payment" => Ok(Self::Payment),
            _ => Err(ParseEventKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventKindError(pub String);

impl std::fmt::Display for ParseEventKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for ParseEventKindError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_fixed() {
        assert_eq!(EventKind::Movie.topic(), "movie-events");
        assert_eq!(EventKind::User.topic(), "user-events");
        assert_eq!(EventKind::Payment.topic(), "payment-events");
    }

    #[test]
    fn from_topic_inverts_topic() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_topic(kind.topic()), Some(kind));
        }
        assert_eq!(EventKind::from_topic("orders-events"), None);
    }

    #[test]
    fn parses_labels() {
        assert_eq!("payment".parse::<EventKind>(), Ok(EventKind::Payment));
        assert_eq!(
            "Payment".parse::<EventKind>(),
            Err(ParseEventKindError("Payment".to_string()))
        );
    }
}
