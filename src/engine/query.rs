//! Private conversation projection.

use chrono::{DateTime, Utc};

/// One private conversation, keyed by peer nick.
///
/// Born on the first inbound message from a peer or when the caller opens
/// one explicitly; holds only the latest message, not scrollback.
#[derive(Clone, Debug, PartialEq)]
pub struct PrivateMessage {
    /// Peer nick.
    pub peer: String,
    /// Latest message text, if any has arrived.
    pub last_text: Option<String>,
    /// When the latest message arrived.
    pub last_at: Option<DateTime<Utc>>,
}

impl PrivateMessage {
    /// Open a conversation with `peer`.
    pub fn new(peer: &str) -> PrivateMessage {
        PrivateMessage {
            peer: peer.to_string(),
            last_text: None,
            last_at: None,
        }
    }

    /// Record an inbound message.
    pub fn record(&mut self, text: &str, at: DateTime<Utc>) {
        self.last_text = Some(text.to_string());
        self.last_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_overwrites_latest() {
        let mut pm = PrivateMessage::new("bob");
        assert!(pm.last_text.is_none());
        pm.record("hi", Utc::now());
        pm.record("newer", Utc::now());
        assert_eq!(pm.last_text.as_deref(), Some("newer"));
        assert!(pm.last_at.is_some());
    }
}
