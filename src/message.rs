//! Message definitions for the scaleout transport
//!
//! `Message` is the unit of data the scaleout bus hands to the transport.
//! The transport only ever looks at `source` (the partitioning key); every
//! other field is carried opaquely to the receiving side.
//!
//! Notes on fields:
//! - `source`: logical stream identity, usually a connection id
//! - `key`: application-level topic/group label
//! - `value`: payload
//! - `command_id`: set when the message is a control command rather than data
//! - `wait_for_ack` / `is_ack`: acknowledgement flags used by the bus
//! - `filter`: routing hint consumed upstream

use serde::{Deserialize, Serialize};

/// Represents one message exchanged between scaleout nodes.
///
/// The serde field names match the compact JSON form used by the bus.
///
/// # Example
///
/// ```rust
/// use scaleout_transport::Message;
///
/// let msg = Message::new("connection-1", "chat", "hello").with_filter("room-7");
/// assert_eq!(msg.source, "connection-1");
/// assert!(!msg.is_command());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "S")]
    pub source: String,
    #[serde(rename = "K")]
    pub key: String,
    #[serde(rename = "V")]
    pub value: String,
    #[serde(rename = "C", default)]
    pub command_id: Option<String>,
    #[serde(rename = "W", default)]
    pub wait_for_ack: bool,
    #[serde(rename = "A", default)]
    pub is_ack: bool,
    #[serde(rename = "F", default)]
    pub filter: Option<String>,
}

impl Message {
    /// Create a data message with no command id, flags or filter.
    pub fn new(
        source: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = Some(command_id.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_wait_for_ack(mut self, wait_for_ack: bool) -> Self {
        self.wait_for_ack = wait_for_ack;
        self
    }

    pub fn with_is_ack(mut self, is_ack: bool) -> Self {
        self.is_ack = is_ack;
        self
    }

    /// A message carrying a command id is a control command, not data.
    pub fn is_command(&self) -> bool {
        self.command_id.is_some()
    }
}
