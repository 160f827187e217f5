//! Message types
//!
//! A message pairs a subject with an opaque payload and, for requests, the
//! inbox subject a reply should be published to. Messages are immutable once
//! received.

use crate::subject::Subject;

/// A message delivered over the transport.
#[derive(Debug, Clone)]
pub struct Message {
    /// Subject the message was published to.
    pub subject: Subject,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Inbox subject a reply should be published to, if any.
    pub reply_to: Option<Subject>,
}

impl Message {
    /// Create a message with no reply-to subject.
    pub fn new(subject: Subject, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            reply_to: None,
        }
    }

    /// Create a request message carrying a reply-to inbox.
    pub fn with_reply_to(subject: Subject, payload: Vec<u8>, reply_to: Subject) -> Self {
        Self {
            subject,
            payload,
            reply_to: Some(reply_to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_new() {
        let subject = Subject::parse("order.process").unwrap();
        let msg = Message::new(subject.clone(), b"Order-1".to_vec());

        assert_eq!(msg.subject, subject);
        assert_eq!(msg.payload, b"Order-1");
        assert!(msg.reply_to.is_none());
    }

    #[test]
    fn test_message_with_reply_to() {
        let subject = Subject::parse("order.process").unwrap();
        let inbox = Subject::parse("_INBOX.abc123").unwrap();
        let msg = Message::with_reply_to(subject.clone(), b"Order-1".to_vec(), inbox.clone());

        assert_eq!(msg.subject, subject);
        assert_eq!(msg.reply_to, Some(inbox));
    }

    #[test]
    fn test_message_clone_is_independent() {
        let subject = Subject::parse("foo").unwrap();
        let msg = Message::new(subject, vec![1, 2, 3]);
        let copy = msg.clone();

        assert_eq!(msg.payload, copy.payload);
        assert_eq!(msg.subject, copy.subject);
    }
}
