//! Remote store wire protocol (RESP2).
//!
//! Requests are arrays of bulk strings. Replies are one of:
//! - Status (`+OK\r\n`)
//! - Error (`-ERR message\r\n`)
//! - Integer (`:1\r\n`)
//! - Bulk (`$3\r\nfoo\r\n`, null as `$-1\r\n`)
//! - Array (`*2\r\n...`, null as `*-1\r\n`)
//!
//! This is the only place framing knowledge lives.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Maximum bulk payload accepted from the store (16MB).
pub const MAX_BULK_SIZE: usize = 16 * 1024 * 1024;

/// Maximum elements in a single array reply.
pub const MAX_ELEMENTS: usize = 1_000_000;

/// Maximum array nesting depth.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a status/error/integer/header line.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A single decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Textual payload of a status or non-null bulk reply.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Status(s) => Some(s),
            Self::Bulk(Some(data)) => String::from_utf8(data).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Bulk(None) | Self::Array(None))
    }
}

/// Reply decoding failure.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown reply marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encode one command as an array of bulk strings.
#[cfg(test)]
pub fn encode<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
    encode_into(args, &mut buf);
    buf
}

/// Encode one command, appending to `buf` (pipelining).
pub fn encode_into<A: AsRef<[u8]>>(args: &[A], buf: &mut Vec<u8>) {
    buf.push(b'*');
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Decode exactly one reply, leaving `reader` at the next reply boundary.
///
/// Arrays are assembled with an explicit stack rather than recursion so the
/// returned future stays `Send` and bounded.
pub async fn decode<R>(reader: &mut R) -> Result<Reply, DecodeError>
where
    R: AsyncBufRead + Unpin,
{
    // (expected element count, elements collected so far)
    let mut open: Vec<(usize, Vec<Reply>)> = Vec::new();

    loop {
        let mut value = match read_frame(reader).await? {
            Frame::Value(v) => v,
            Frame::ArrayHeader(len) => {
                if open.len() >= MAX_NESTING_DEPTH {
                    return Err(DecodeError::Malformed(
                        "maximum nesting depth exceeded".to_string(),
                    ));
                }
                open.push((len, Vec::with_capacity(len.min(1024))));
                continue;
            }
        };

        // Fold completed values into their parent arrays
        loop {
            match open.last_mut() {
                None => return Ok(value),
                Some((len, items)) => {
                    items.push(value);
                    if items.len() < *len {
                        break;
                    }
                    let (_, items) = open.pop().unwrap_or_default();
                    value = Reply::Array(Some(items));
                }
            }
        }
    }
}

enum Frame {
    Value(Reply),
    /// Non-empty array whose elements follow
    ArrayHeader(usize),
}

async fn read_frame<R>(reader: &mut R) -> Result<Frame, DecodeError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    let (&marker, body) = line
        .split_first()
        .ok_or_else(|| DecodeError::Malformed("empty reply line".to_string()))?;

    match marker {
        b'+' => Ok(Frame::Value(Reply::Status(lossy(body)))),
        b'-' => Ok(Frame::Value(Reply::Error(lossy(body)))),
        b':' => Ok(Frame::Value(Reply::Integer(parse_integer(body)?))),
        b'$' => {
            let len = parse_integer(body)?;
            if len < 0 {
                return Ok(Frame::Value(Reply::Bulk(None)));
            }
            let len = len as usize;
            if len > MAX_BULK_SIZE {
                return Err(DecodeError::Malformed(format!(
                    "bulk length {} exceeds limit",
                    len
                )));
            }
            let mut data = vec![0u8; len + 2];
            reader.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(DecodeError::Malformed(
                    "bulk payload not terminated by CRLF".to_string(),
                ));
            }
            data.truncate(len);
            Ok(Frame::Value(Reply::Bulk(Some(data))))
        }
        b'*' => {
            let len = parse_integer(body)?;
            if len < 0 {
                return Ok(Frame::Value(Reply::Array(None)));
            }
            let len = len as usize;
            if len > MAX_ELEMENTS {
                return Err(DecodeError::Malformed(format!(
                    "array length {} exceeds limit",
                    len
                )));
            }
            if len == 0 {
                Ok(Frame::Value(Reply::Array(Some(Vec::new()))))
            } else {
                Ok(Frame::ArrayHeader(len))
            }
        }
        other => Err(DecodeError::UnknownMarker(other)),
    }
}

/// Read one CRLF-terminated line, returning it without the terminator.
async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>, DecodeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Err(DecodeError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before reply",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(DecodeError::Malformed(
            "reply line not terminated by CRLF".to_string(),
        ));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_integer(body: &[u8]) -> Result<i64, DecodeError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| DecodeError::Malformed(format!("invalid integer {:?}", lossy(body))))
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Encode a reply (used by the in-process fake store in tests).
#[cfg(test)]
pub fn encode_reply(reply: &Reply, buf: &mut Vec<u8>) {
    match reply {
        Reply::Status(s) => {
            buf.push(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Reply::Error(e) => {
            buf.push(b'-');
            buf.extend_from_slice(e.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Reply::Integer(n) => {
            buf.push(b':');
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Reply::Bulk(None) => buf.extend_from_slice(b"$-1\r\n"),
        Reply::Bulk(Some(data)) => {
            buf.push(b'$');
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(data);
            buf.extend_from_slice(b"\r\n");
        }
        Reply::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
        Reply::Array(Some(items)) => {
            buf.push(b'*');
            buf.extend_from_slice(items.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            for item in items {
                encode_reply(item, buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn decode_bytes(data: &[u8]) -> Result<Reply, DecodeError> {
        let mut reader = data;
        decode(&mut reader).await
    }

    #[test]
    fn test_encode_command() {
        let bytes = encode(&["SET", "k", "value"]);
        assert_eq!(bytes, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nvalue\r\n");
    }

    #[test]
    fn test_encode_binary_and_empty_args() {
        let args: [&[u8]; 2] = [b"a\r\nb", b""];
        let bytes = encode(&args);
        assert_eq!(bytes, b"*2\r\n$4\r\na\r\nb\r\n$0\r\n\r\n");
    }

    #[tokio::test]
    async fn test_decode_scalars() {
        assert_eq!(
            decode_bytes(b"+OK\r\n").await.unwrap(),
            Reply::Status("OK".to_string())
        );
        assert_eq!(
            decode_bytes(b"-ERR unknown command\r\n").await.unwrap(),
            Reply::Error("ERR unknown command".to_string())
        );
        assert_eq!(decode_bytes(b":-42\r\n").await.unwrap(), Reply::Integer(-42));
    }

    #[tokio::test]
    async fn test_decode_bulk() {
        assert_eq!(
            decode_bytes(b"$5\r\nhello\r\n").await.unwrap(),
            Reply::Bulk(Some(b"hello".to_vec()))
        );
        assert_eq!(decode_bytes(b"$-1\r\n").await.unwrap(), Reply::Bulk(None));
        assert_eq!(
            decode_bytes(b"$0\r\n\r\n").await.unwrap(),
            Reply::Bulk(Some(Vec::new()))
        );
        // CRLF inside payload is data, not framing
        assert_eq!(
            decode_bytes(b"$4\r\na\r\nb\r\n").await.unwrap(),
            Reply::Bulk(Some(b"a\r\nb".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_decode_nested_array() {
        let reply = decode_bytes(b"*3\r\n$6\r\nmaster\r\n:100\r\n*2\r\n*0\r\n$-1\r\n")
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(b"master".to_vec())),
                Reply::Integer(100),
                Reply::Array(Some(vec![Reply::Array(Some(vec![])), Reply::Bulk(None)])),
            ]))
        );
        assert_eq!(decode_bytes(b"*-1\r\n").await.unwrap(), Reply::Array(None));
    }

    #[tokio::test]
    async fn test_canned_replies_match_their_encoding() {
        let canned = vec![
            Reply::Status("OK".to_string()),
            Reply::Integer(1),
            Reply::Bulk(Some(b"{\"id\":\"x\"}".to_vec())),
            Reply::Array(Some(vec![Reply::Bulk(None), Reply::Integer(0)])),
        ];

        for reply in canned {
            let mut wire = Vec::new();
            encode_reply(&reply, &mut wire);
            assert_eq!(decode_bytes(&wire).await.unwrap(), reply);
        }
    }

    #[tokio::test]
    async fn test_decode_pipelined_leaves_next_reply() {
        let mut reader: &[u8] = b"+OK\r\n$3\r\nbar\r\n:1\r\n";
        assert_eq!(
            decode(&mut reader).await.unwrap(),
            Reply::Status("OK".to_string())
        );
        assert_eq!(
            decode(&mut reader).await.unwrap(),
            Reply::Bulk(Some(b"bar".to_vec()))
        );
        assert_eq!(decode(&mut reader).await.unwrap(), Reply::Integer(1));
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_decode_across_partial_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"*2\r\n$3\r")
            .read(b"\nfoo\r\n:")
            .read(b"7\r\n+PONG\r\n")
            .build();
        let mut reader = BufReader::new(mock);

        assert_eq!(
            decode(&mut reader).await.unwrap(),
            Reply::Array(Some(vec![Reply::Bulk(Some(b"foo".to_vec())), Reply::Integer(7)]))
        );
        assert_eq!(
            decode(&mut reader).await.unwrap(),
            Reply::Status("PONG".to_string())
        );
    }

    #[tokio::test]
    async fn test_decode_rejects_malformed() {
        assert!(matches!(
            decode_bytes(b"?what\r\n").await,
            Err(DecodeError::UnknownMarker(b'?'))
        ));
        assert!(matches!(
            decode_bytes(b":abc\r\n").await,
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_bytes(b"+OK\n").await,
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_bytes(b"$3\r\nfoobar\r\n").await,
            Err(DecodeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_truncated_is_io_error() {
        assert!(matches!(decode_bytes(b"").await, Err(DecodeError::Io(_))));
        assert!(matches!(
            decode_bytes(b"$10\r\nshort").await,
            Err(DecodeError::Io(_))
        ));
        assert!(matches!(
            decode_bytes(b"*2\r\n:1\r\n").await,
            Err(DecodeError::Io(_))
        ));
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(
            Reply::Bulk(Some(b"abc".to_vec())).into_text(),
            Some("abc".to_string())
        );
        assert_eq!(Reply::Integer(1).into_text(), None);
        assert!(Reply::Bulk(None).is_null());
    }
}
