use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::http::Request;
use crate::status::StatusCode;

/// Restrictive request-line grammar: method, URI-safe target (no spaces),
/// `<word>/<digits>.<digits>` version. Anything else is a 400.
static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<method>\w+)\s+(?P<target>[A-Za-z!#-;=?@\[\]_~]+)\s+(?P<version>\w+/\d+\.\d+)$")
        .unwrap()
});

/// A framing failure.
///
/// `Invalid` carries the status and message that become the HTTP error
/// response; `Io` means the socket itself failed and the connection is
/// abandoned without a response.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{message}")]
    Invalid { status: StatusCode, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    fn bad_request(message: impl Into<String>) -> Self {
        FrameError::Invalid {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Read exactly one request off the stream.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line_lossy(reader).await?.unwrap_or_default();

    let captures = REQUEST_LINE
        .captures(line.trim_end_matches(['\r', '\n']))
        .ok_or_else(|| FrameError::bad_request("Invalid HTTP Request Line"))?;

    let method = captures["method"].to_string();
    let target = captures["target"].to_string();
    let version = captures["version"].to_string();

    let mut headers: FxHashMap<String, String> = FxHashMap::default();

    loop {
        let line = match read_line_lossy(reader).await? {
            Some(line) => line,
            None => break, // stream ended before the blank line
        };

        let line = line.trim();
        if line.is_empty() {
            break;
        }

        let index = line.find(':').ok_or_else(|| {
            FrameError::bad_request(format!("Invalid header line '{line}', must contain colon"))
        })?;

        // Last write wins on duplicate keys.
        headers.insert(
            line[..index].trim().to_string(),
            line[index + 1..].trim().to_string(),
        );
    }

    let body = match headers.get("Content-Length") {
        Some(value) => {
            let length: usize = value.parse().map_err(|_| {
                FrameError::bad_request(format!("Invalid Content-Length '{value}'"))
            })?;
            read_chars(reader, length).await?
        }
        None => String::new(),
    };

    Ok(Request::new(method, target, version, headers, body))
}

/// Read one line as raw bytes and decode it lossily, so undecodable input
/// surfaces as replacement characters instead of an I/O error. `None`
/// means the stream ended before any byte arrived.
async fn read_line_lossy<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Read up to `count` characters, decoding UTF-8 incrementally. A stream
/// that ends early yields the short body rather than an error.
async fn read_chars<R>(reader: &mut R, count: usize) -> std::io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = String::with_capacity(count);
    let mut pending = [0u8; 4];
    let mut pending_len = 0;
    let mut remaining = count;

    while remaining > 0 {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            break;
        }
        pending[pending_len] = byte[0];
        pending_len += 1;

        while remaining > 0 && pending_len > 0 {
            match std::str::from_utf8(&pending[..pending_len]) {
                Ok(s) => {
                    body.push_str(s);
                    remaining -= s.chars().count();
                    pending_len = 0;
                }
                Err(e) => match e.error_len() {
                    // The leading bytes can never become a valid sequence
                    // no matter what follows; substitute them and
                    // re-examine the rest.
                    Some(bad) => {
                        body.push(char::REPLACEMENT_CHARACTER);
                        remaining -= 1;
                        pending.copy_within(bad..pending_len, 0);
                        pending_len -= bad;
                    }
                    None => break, // incomplete sequence, keep reading
                },
            }
        }
    }

    Ok(body)
}
