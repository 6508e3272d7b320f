//! Binary framing for batches of [`Message`](crate::Message) values.
//!
//! The codec knows nothing about topics or partitions; it turns an ordered
//! sequence of messages into an opaque byte stream and back.
//!
//! Wire layout (all integers are signed 32-bit little-endian):
//!
//! ```text
//! repeat {
//!   i32 marker              0 = message record follows
//!   field source
//!   field key
//!   field value
//!   field command_id
//!   field wait_for_ack      "True" / "False"
//!   field is_ack            "True" / "False"
//!   field filter
//! }
//! i32 marker = -1           end of stream
//!
//! field := i32 length ++ length bytes of UTF-8   (-1 = null, 0 = empty)
//! ```

mod decoder;
mod encoder;

pub use decoder::{decode, decode_slice};
pub use encoder::{MessageStream, encode};

/// Marker preceding every message record.
pub const MESSAGE_MARKER: i32 = 0;

/// Marker terminating the stream.
pub const END_OF_STREAM_MARKER: i32 = -1;

/// Length written for a null field.
pub const NULL_FIELD_LENGTH: i32 = -1;

/// Upper bound (exclusive) on a single field's encoded length.
pub const MAX_FIELD_SIZE: i32 = 256 * 1024;

const TRUE_TEXT: &str = "True";
const FALSE_TEXT: &str = "False";
