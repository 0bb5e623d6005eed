use std::io;

use thiserror::Error;
use tidepool_core::identity;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The routing key of a connection and every byte read to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingHeader {
    /// The routing key taken from the `Host` line.
    pub key: String,

    /// The header bytes consumed up to and including the `Host` line.
    pub consumed: Vec<u8>,
}

/// Why no routing key could be read.
#[derive(pretty_error_debug::Debug, Error)]
pub enum HeaderError {
    /// A blank or truncated line came before the `Host` line, or the `Host` value was empty.
    #[error("malformed header")]
    Malformed,

    /// The header buffer filled up before a `Host` line was seen.
    #[error("header exceeds {0} bytes")]
    TooLarge(usize),

    /// The client closed the connection before sending a `Host` line.
    #[error("connection closed before the host line")]
    Closed,

    /// Reading from the client failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reads header lines until a `Host` line, reading at most `limit` bytes.
///
/// The `Host` header name is matched case-insensitively. Reading stops right after the `Host`
/// line; bytes following it stay in `reader`.
pub async fn read_routing_header<R>(reader: &mut R, limit: usize) -> Result<RoutingHeader, HeaderError>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = Vec::with_capacity(limit.min(1024));

    loop {
        let budget = limit - consumed.len();
        if budget == 0 {
            return Err(HeaderError::TooLarge(limit));
        }

        let start = consumed.len();
        let read = (&mut *reader)
            .take(budget as u64)
            .read_until(b'\n', &mut consumed)
            .await?;

        if read == 0 {
            return Err(HeaderError::Closed);
        }

        let line = &consumed[start..];
        if !line.ends_with(b"\n") {
            return Err(if consumed.len() >= limit {
                HeaderError::TooLarge(limit)
            } else {
                HeaderError::Closed
            });
        }

        if line.len() < 2 || line.trim_ascii().is_empty() {
            return Err(HeaderError::Malformed);
        }

        if let Some(value) = host_value(line) {
            let key = identity::routing_key_from_host(&value).ok_or(HeaderError::Malformed)?;
            return Ok(RoutingHeader { key, consumed });
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// The value of a `Host:` header line, if `line` is one.
fn host_value(line: &[u8]) -> Option<String> {
    let colon = line.iter().position(|b| *b == b':')?;
    let (name, value) = line.split_at(colon);
    if !name.trim_ascii().eq_ignore_ascii_case(b"host") {
        return None;
    }

    Some(String::from_utf8_lossy(&value[1..]).trim().to_string())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
