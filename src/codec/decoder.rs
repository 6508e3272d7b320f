use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use super::{
    END_OF_STREAM_MARKER, FALSE_TEXT, MAX_FIELD_SIZE, MESSAGE_MARKER, NULL_FIELD_LENGTH, TRUE_TEXT,
};
use crate::message::Message;
use crate::utils::error::FramingError;

/// Decode every message in `reader` up to the end-of-stream marker.
///
/// Bytes after the end marker are left unread.
pub fn decode<R: Read>(mut reader: R) -> Result<Vec<Message>, FramingError> {
    let mut messages = Vec::new();

    loop {
        match reader.read_i32::<LittleEndian>()? {
            MESSAGE_MARKER => messages.push(read_record(&mut reader)?),
            END_OF_STREAM_MARKER => break,
            marker => return Err(FramingError::InvalidMarker(marker)),
        }
    }

    Ok(messages)
}

/// Decode a fully buffered body.
pub fn decode_slice(body: &[u8]) -> Result<Vec<Message>, FramingError> {
    decode(body)
}

fn read_record<R: Read>(reader: &mut R) -> Result<Message, FramingError> {
    let source = read_field(reader)?;
    let key = read_field(reader)?;
    let value = read_field(reader)?;
    let command_id = read_field(reader)?;
    let wait_for_ack = read_field(reader)?;
    let is_ack = read_field(reader)?;
    let filter = read_field(reader)?;

    Ok(Message {
        source: source.unwrap_or_default(),
        key: key.unwrap_or_default(),
        value: value.unwrap_or_default(),
        command_id,
        wait_for_ack: parse_bool(wait_for_ack)?,
        is_ack: parse_bool(is_ack)?,
        filter,
    })
}

fn read_field<R: Read>(reader: &mut R) -> Result<Option<String>, FramingError> {
    let len = reader.read_i32::<LittleEndian>()?;

    if len < NULL_FIELD_LENGTH {
        return Err(FramingError::InvalidLength(len));
    }
    if len >= MAX_FIELD_SIZE {
        return Err(FramingError::FieldTooLarge(len));
    }

    match len {
        NULL_FIELD_LENGTH => Ok(None),
        0 => Ok(Some(String::new())),
        len => {
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf)?;
            Ok(Some(String::from_utf8(buf)?))
        }
    }
}

fn parse_bool(text: Option<String>) -> Result<bool, FramingError> {
    let parsed = match text.as_deref().map(str::trim) {
        Some(t) if t.eq_ignore_ascii_case(TRUE_TEXT) => Some(true),
        Some(t) if t.eq_ignore_ascii_case(FALSE_TEXT) => Some(false),
        _ => None,
    };
    parsed.ok_or(FramingError::InvalidBool(text))
}
