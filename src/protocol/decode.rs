//! Protocol message decoding

use super::constants::{auth, tags};
use super::message::{
    AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription, TransactionStatus,
};
use bytes::{Buf, Bytes, BytesMut};
use std::io;

/// Maximum message length (1 GB), matching PostgreSQL's own `PQ_LARGE_MESSAGE_LIMIT`.
///
/// Any message whose length field exceeds this value is rejected before allocation.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Decode one backend message from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame; the
/// caller should read more bytes and try again. On success the frame is
/// removed from `buf`. Malformed frames are reported as `InvalidData`; the
/// stream is out of sync after that and the connection must be dropped.
pub fn decode_message(buf: &mut BytesMut) -> io::Result<Option<BackendMessage>> {
    if buf.len() < 5 {
        return Ok(None);
    }

    let tag = buf[0];
    let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if len < 4 {
        return Err(invalid(format!("invalid message length {}", len)));
    }
    let len = len as usize;
    if len > MAX_MESSAGE_LENGTH {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }
    if buf.len() < len + 1 {
        buf.reserve(len + 1 - buf.len());
        return Ok(None);
    }

    let mut frame = buf.split_to(len + 1).freeze();
    frame.advance(5);
    let mut body = Body(frame);

    let msg = match tag {
        tags::AUTHENTICATION => decode_authentication(&mut body)?,
        tags::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: body.i32()?,
            secret_key: body.i32()?,
        },
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(body.cstr()?),
        tags::DATA_ROW => decode_data_row(&mut body)?,
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(&mut body)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(&mut body)?),
        tags::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: body.cstr()?,
            value: body.cstr()?,
        },
        tags::READY_FOR_QUERY => {
            let status = body.u8()?;
            let status = TransactionStatus::try_from(status)
                .map_err(|b| invalid(format!("unknown transaction status 0x{:02X}", b)))?;
            BackendMessage::ReadyForQuery(status)
        }
        tags::ROW_DESCRIPTION => decode_row_description(&mut body)?,
        other => {
            return Err(invalid(format!(
                "unknown message tag: {:?}",
                char::from(other)
            )))
        }
    };

    Ok(Some(msg))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Bounds-checked reader over a single message body
struct Body(Bytes);

impl Body {
    fn need(&self, n: usize, what: &str) -> io::Result<()> {
        if self.0.remaining() < n {
            return Err(invalid(format!("truncated message: missing {}", what)));
        }
        Ok(())
    }

    fn u8(&mut self) -> io::Result<u8> {
        self.need(1, "byte")?;
        Ok(self.0.get_u8())
    }

    fn i16(&mut self) -> io::Result<i16> {
        self.need(2, "int16")?;
        Ok(self.0.get_i16())
    }

    fn i32(&mut self) -> io::Result<i32> {
        self.need(4, "int32")?;
        Ok(self.0.get_i32())
    }

    fn take(&mut self, n: usize) -> io::Result<Bytes> {
        self.need(n, "field data")?;
        Ok(self.0.split_to(n))
    }

    fn rest(&mut self) -> Bytes {
        self.0.split_off(0)
    }

    fn is_empty(&self) -> bool {
        !self.0.has_remaining()
    }

    fn cstr(&mut self) -> io::Result<String> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid("missing null terminator in string"))?;
        let raw = self.0.split_to(end);
        self.0.advance(1);
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

fn decode_authentication(body: &mut Body) -> io::Result<BackendMessage> {
    let code = body.i32()?;

    let auth_msg = match code {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            let mut salt = [0u8; 4];
            salt.copy_from_slice(&body.take(4)?);
            AuthenticationMessage::Md5Password { salt }
        }
        auth::SASL => {
            // Mechanism list: null-terminated names, closed by an empty name
            let mut mechanisms = Vec::new();
            while !body.is_empty() {
                let mechanism = body.cstr()?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: body.rest().to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: body.rest().to_vec(),
        },
        code => AuthenticationMessage::Unsupported { code },
    };

    Ok(BackendMessage::Authentication(auth_msg))
}

fn decode_data_row(body: &mut Body) -> io::Result<BackendMessage> {
    let count = body.i16()?;
    let mut fields = Vec::with_capacity(count.max(0) as usize);

    for _ in 0..count {
        let len = body.i32()?;
        let field = match len {
            -1 => None,
            n if n < 0 => return Err(invalid(format!("invalid field length {}", n))),
            n => Some(body.take(n as usize)?),
        };
        fields.push(field);
    }

    Ok(BackendMessage::DataRow(fields))
}

fn decode_error_fields(body: &mut Body) -> io::Result<ErrorFields> {
    let mut fields = ErrorFields::default();

    while !body.is_empty() {
        let field_type = body.u8()?;
        if field_type == 0 {
            break;
        }
        let value = body.cstr()?;
        match field_type {
            b'S' => fields.severity = Some(value),
            // Non-localized severity (9.6+); only used when 'S' is absent
            b'V' => {
                fields.severity.get_or_insert(value);
            }
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            b'P' => fields.position = Some(value),
            _ => {}
        }
    }

    Ok(fields)
}

fn decode_row_description(body: &mut Body) -> io::Result<BackendMessage> {
    let count = body.i16()?;
    let mut fields = Vec::with_capacity(count.max(0) as usize);

    for _ in 0..count {
        fields.push(FieldDescription {
            name: body.cstr()?,
            table_oid: body.i32()?,
            column_attr: body.i16()?,
            type_oid: body.i32()? as u32,
            type_size: body.i16()?,
            type_modifier: body.i32()?,
            format_code: body.i16()?,
        });
    }

    Ok(BackendMessage::RowDescription(fields))
}
