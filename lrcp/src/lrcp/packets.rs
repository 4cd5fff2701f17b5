//! Wire format for LRCP: `/type/field/field/.../`.
//!
//! Frames are ASCII, delimited by a literal `/` at both ends, with
//! unescaped `/` separating fields. `DATA` payloads escape `/` and `\`
//! as `\/` and `\\`.

use std::io;

/// Largest datagram LRCP will ever emit or accept.
pub const MAX_DATAGRAM: usize = 1000;

/// `SID`/`POS`/`LENGTH` are decimal integers in `[0, 2^31]`.
pub const MAX_NUMERIC_FIELD: u32 = 1 << 31;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect { session: u32 },
    Data { session: u32, pos: u32, data: Vec<u8> },
    Ack { session: u32, length: u32 },
    Close { session: u32 },
}

impl Packet {
    #[must_use]
    pub fn session(&self) -> u32 {
        match self {
            Packet::Connect { session }
            | Packet::Data { session, .. }
            | Packet::Ack { session, .. }
            | Packet::Close { session } => *session,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Connect { session } => format!("/connect/{session}/").into_bytes(),
            Packet::Ack { session, length } => format!("/ack/{session}/{length}/").into_bytes(),
            Packet::Close { session } => format!("/close/{session}/").into_bytes(),
            Packet::Data { session, pos, data } => {
                let mut buf = format!("/data/{session}/{pos}/").into_bytes();
                buf.extend(escape(data));
                buf.push(b'/');
                buf
            }
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame is not delimited by slashes")]
    NotDelimited,
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    #[error("missing required field")]
    MissingField,
    #[error("field is not a valid decimal integer: {0}")]
    NotADecimal(String),
    #[error("numeric field out of range: {0}")]
    OutOfRange(u64),
    #[error("unescaped slash inside data field")]
    UnescapedSlash,
    #[error("frame exceeds {MAX_DATAGRAM} bytes")]
    TooLarge,
}

impl TryFrom<&[u8]> for Packet {
    type Error = ParseError;

    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() > MAX_DATAGRAM {
            return Err(ParseError::TooLarge);
        }

        if buf.len() < 2 || buf[0] != b'/' || buf[buf.len() - 1] != b'/' {
            return Err(ParseError::NotDelimited);
        }

        let body = &buf[1..buf.len() - 1];
        let fields = split_unescaped(body)?;

        let mut fields = fields.into_iter();
        let kind = fields.next().ok_or(ParseError::MissingField)?;
        let session = fields
            .next()
            .ok_or(ParseError::MissingField)
            .and_then(|f| parse_u32(&f))?;

        match kind.as_slice() {
            b"connect" => {
                if fields.next().is_some() {
                    return Err(ParseError::MissingField);
                }
                Ok(Packet::Connect { session })
            }
            b"close" => {
                if fields.next().is_some() {
                    return Err(ParseError::MissingField);
                }
                Ok(Packet::Close { session })
            }
            b"ack" => {
                let length = fields.next().ok_or(ParseError::MissingField).and_then(|f| parse_u32(&f))?;
                if fields.next().is_some() {
                    return Err(ParseError::MissingField);
                }
                Ok(Packet::Ack { session, length })
            }
            b"data" => {
                let pos = fields.next().ok_or(ParseError::MissingField).and_then(|f| parse_u32(&f))?;
                let data = fields.next().ok_or(ParseError::MissingField)?;
                if fields.next().is_some() {
                    return Err(ParseError::MissingField);
                }
                Ok(Packet::Data { session, pos, data: unescape(&data) })
            }
            other => Err(ParseError::UnknownType(String::from_utf8_lossy(other).into_owned())),
        }
    }
}

fn parse_u32(field: &[u8]) -> Result<u32, ParseError> {
    let text = std::str::from_utf8(field).map_err(|_| ParseError::NotADecimal(String::from_utf8_lossy(field).into_owned()))?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::NotADecimal(text.to_owned()));
    }
    let value: u64 = text.parse().map_err(|_| ParseError::NotADecimal(text.to_owned()))?;
    if value > u64::from(MAX_NUMERIC_FIELD) {
        return Err(ParseError::OutOfRange(value));
    }
    Ok(value as u32)
}

/// Splits `body` on unescaped `/`, leaving escape sequences (`\/`, `\\`)
/// intact in each field. The last field produced (the `data` field of a
/// `data` frame, if present) is allowed to contain any escaped bytes; an
/// unescaped `/` anywhere is a parse error, since the frame grammar has
/// no way to know it was meant literally.
fn split_unescaped(body: &[u8]) -> Result<Vec<Vec<u8>>, ParseError> {
    let mut fields = Vec::new();
    let mut current = Vec::new();
    let mut escaped = false;

    for &b in body {
        if escaped {
            current.push(b);
            escaped = false;
        } else if b == b'\\' {
            current.push(b);
            escaped = true;
        } else if b == b'/' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(b);
        }
    }

    if escaped {
        return Err(ParseError::UnescapedSlash);
    }

    fields.push(current);
    Ok(fields)
}

fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        match b {
            b'/' => out.extend_from_slice(b"\\/"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
    out
}

fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().copied();
    while let Some(b) = iter.next() {
        if b == b'\\' {
            match iter.next() {
                Some(next) => out.push(next),
                None => out.push(b'\\'),
            }
        } else {
            out.push(b);
        }
    }
    out
}

/// Writes an encoded [`Packet`] into a byte sink, for callers that hold
/// a raw buffer rather than a `BytesMut`/`Vec`-backed transport.
pub trait SyncWrite {
    /// Returns the number of bytes written, or an error if the
    /// destination has no room for the encoded frame.
    fn write_value(&mut self, packet: &Packet) -> io::Result<usize>;
}

impl SyncWrite for &mut [u8] {
    fn write_value(&mut self, packet: &Packet) -> io::Result<usize> {
        let encoded = packet.encode();
        if encoded.len() > self.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "buffer too small for frame"));
        }
        self[..encoded.len()].copy_from_slice(&encoded);
        Ok(encoded.len())
    }
}

impl SyncWrite for Vec<u8> {
    fn write_value(&mut self, packet: &Packet) -> io::Result<usize> {
        let encoded = packet.encode();
        self.extend_from_slice(&encoded);
        Ok(encoded.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect() {
        assert_eq!(Packet::try_from(b"/connect/12345/".as_slice()).unwrap(), Packet::Connect { session: 12345 });
    }

    #[test]
    fn parses_ack() {
        assert_eq!(Packet::try_from(b"/ack/12345/6/".as_slice()).unwrap(), Packet::Ack { session: 12345, length: 6 });
    }

    #[test]
    fn parses_close() {
        assert_eq!(Packet::try_from(b"/close/12345/".as_slice()).unwrap(), Packet::Close { session: 12345 });
    }

    #[test]
    fn parses_data_with_escapes() {
        let packet = Packet::try_from(b"/data/12345/0/foo\\/bar\\\\baz/".as_slice()).unwrap();
        assert_eq!(packet, Packet::Data { session: 12345, pos: 0, data: b"foo/bar\\baz".to_vec() });
    }

    #[test]
    fn rejects_unescaped_slash_in_data() {
        assert!(Packet::try_from(b"/data/12345/0/foo/bar/".as_slice()).is_err());
    }

    #[test]
    fn rejects_missing_delimiters() {
        assert!(Packet::try_from(b"connect/12345/".as_slice()).is_err());
        assert!(Packet::try_from(b"/connect/12345".as_slice()).is_err());
    }

    #[test]
    fn rejects_non_decimal_sid() {
        assert!(Packet::try_from(b"/connect/abc/".as_slice()).is_err());
    }

    #[test]
    fn rejects_out_of_range_sid() {
        assert!(Packet::try_from(b"/connect/99999999999/".as_slice()).is_err());
    }

    #[test]
    fn escape_round_trip() {
        for sample in [&b""[..], b"plain", b"with/slash", b"with\\backslash", b"/\\//\\\\"] {
            let escaped = escape(sample);
            assert_eq!(unescape(&escaped), sample);
        }
    }

    #[test]
    fn encodes_data_frame() {
        let packet = Packet::Data { session: 1, pos: 0, data: b"a/b".to_vec() };
        let mut buf = vec![0_u8; 64];
        let mut slice = buf.as_mut_slice();
        let len = slice.write_value(&packet).unwrap();
        assert_eq!(&buf[..len], b"/data/1/0/a\\/b/");
    }

    #[test]
    fn rejects_oversize_frame() {
        let huge = vec![b'x'; MAX_DATAGRAM];
        assert_eq!(Packet::try_from(huge.as_slice()), Err(ParseError::TooLarge));
    }
}
