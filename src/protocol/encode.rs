//! Protocol message encoding

use super::constants::{frontend, SSL_REQUEST_CODE};
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage) -> io::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(64);

    match msg {
        FrontendMessage::Startup { version, params } => {
            // Startup messages don't have a type byte
            framed(&mut buf, None, |body| {
                body.put_i32(*version);
                for (key, value) in params {
                    put_cstr(body, key)?;
                    put_cstr(body, value)?;
                }
                body.put_u8(0);
                Ok(())
            })?;
        }
        FrontendMessage::SslRequest => {
            framed(&mut buf, None, |body| {
                body.put_i32(SSL_REQUEST_CODE);
                Ok(())
            })?;
        }
        FrontendMessage::Password(password) => {
            framed(&mut buf, Some(frontend::PASSWORD), |body| {
                put_cstr(body, password)
            })?;
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            framed(&mut buf, Some(frontend::PASSWORD), |body| {
                put_cstr(body, mechanism)?;
                body.put_i32(frame_len(data.len())?);
                body.put_slice(data);
                Ok(())
            })?;
        }
        FrontendMessage::SaslResponse { data } => {
            framed(&mut buf, Some(frontend::PASSWORD), |body| {
                body.put_slice(data);
                Ok(())
            })?;
        }
        FrontendMessage::Query(query) => {
            framed(&mut buf, Some(frontend::QUERY), |body| put_cstr(body, query))?;
        }
        FrontendMessage::Terminate => {
            framed(&mut buf, Some(frontend::TERMINATE), |_| Ok(()))?;
        }
    }

    Ok(buf)
}

/// Write `[tag] length body`, where length counts itself but not the tag.
fn framed<F>(buf: &mut BytesMut, tag: Option<u8>, body: F) -> io::Result<()>
where
    F: FnOnce(&mut BytesMut) -> io::Result<()>,
{
    if let Some(tag) = tag {
        buf.put_u8(tag);
    }
    let len_pos = buf.len();
    buf.put_i32(0);
    body(buf)?;
    let len = frame_len(buf.len() - len_pos)?;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

fn frame_len(len: usize) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message of {} bytes is too large", len),
        )
    })
}

fn put_cstr(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "string contains an embedded NUL byte",
        ));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}
