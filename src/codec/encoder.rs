use std::borrow::Borrow;
use std::io::{self, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    END_OF_STREAM_MARKER, FALSE_TEXT, MAX_FIELD_SIZE, MESSAGE_MARKER, NULL_FIELD_LENGTH, TRUE_TEXT,
};
use crate::message::Message;
use crate::utils::error::FramingError;

/// Encode `messages` into a lazy byte stream.
///
/// Nothing is serialized until the stream is pulled. The stream is
/// single-pass: once exhausted it stays exhausted, so re-encoding a batch
/// requires another call.
pub fn encode<I>(messages: I) -> MessageStream<I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<Message>,
{
    MessageStream {
        messages: messages.into_iter(),
        current: Bytes::new(),
        finished: false,
    }
}

/// Forward-only producer of encoded chunks.
///
/// Yields one chunk per message record followed by the end-of-stream
/// marker. A record with a field the decoder would reject yields
/// `FieldTooLarge` and ends the stream. Also implements [`Read`] so it can
/// be handed to anything that consumes a byte reader.
#[derive(Debug)]
pub struct MessageStream<I> {
    messages: I,
    current: Bytes,
    finished: bool,
}

impl<I> MessageStream<I>
where
    I: Iterator,
    I::Item: Borrow<Message>,
{
    /// Drain the remaining chunks into one contiguous buffer.
    pub fn into_bytes(self) -> Result<Bytes, FramingError> {
        let mut buf = BytesMut::new();
        for chunk in self {
            buf.put(chunk?);
        }
        Ok(buf.freeze())
    }
}

impl<I> Iterator for MessageStream<I>
where
    I: Iterator,
    I::Item: Borrow<Message>,
{
    type Item = Result<Bytes, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.current.is_empty() {
            return Some(Ok(std::mem::take(&mut self.current)));
        }

        if self.finished {
            return None;
        }

        if let Some(message) = self.messages.next() {
            let record = encode_record(message.borrow());
            if record.is_err() {
                self.finished = true;
            }
            return Some(record);
        }

        self.finished = true;
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i32_le(END_OF_STREAM_MARKER);
        Some(Ok(buf.freeze()))
    }
}

impl<I> Read for MessageStream<I>
where
    I: Iterator,
    I::Item: Borrow<Message>,
{
    fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;

        while copied < dest.len() {
            if self.current.is_empty() {
                match self.next() {
                    Some(Ok(chunk)) => self.current = chunk,
                    Some(Err(e)) => return Err(io::Error::new(io::ErrorKind::InvalidInput, e)),
                    None => break,
                }
            }

            let count = (dest.len() - copied).min(self.current.len());
            self.current.copy_to_slice(&mut dest[copied..copied + count]);
            copied += count;
        }

        Ok(copied)
    }
}

fn encode_record(message: &Message) -> Result<Bytes, FramingError> {
    let fields = [
        Some(message.source.as_str()),
        Some(message.key.as_str()),
        Some(message.value.as_str()),
        message.command_id.as_deref(),
        Some(bool_text(message.wait_for_ack)),
        Some(bool_text(message.is_ack)),
        message.filter.as_deref(),
    ];

    let mut size = 4;
    for text in fields.iter().flatten() {
        // lengths are checked before anything is buffered
        if text.len() >= MAX_FIELD_SIZE as usize {
            return Err(FramingError::FieldTooLarge(
                i32::try_from(text.len()).unwrap_or(i32::MAX),
            ));
        }
        size += 4 + text.len();
    }
    size += 4 * fields.iter().filter(|f| f.is_none()).count();

    let mut buf = BytesMut::with_capacity(size);
    buf.put_i32_le(MESSAGE_MARKER);
    for field in fields {
        put_field(&mut buf, field);
    }

    Ok(buf.freeze())
}

fn put_field(buf: &mut BytesMut, field: Option<&str>) {
    match field {
        None => buf.put_i32_le(NULL_FIELD_LENGTH),
        Some(text) => {
            buf.put_i32_le(text.len() as i32);
            buf.put_slice(text.as_bytes());
        }
    }
}

fn bool_text(value: bool) -> &'static str {
    if value { TRUE_TEXT } else { FALSE_TEXT }
}
