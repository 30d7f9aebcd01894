//! The one-shot upgrade negotiation that turns a plain byte stream into a
//! framed connection.
//!
//! The negotiator consumes the client's HTTP-style opening request in a
//! single bounded read, locates the `Sec-WebSocket-Key` header and answers
//! with the fixed `101 Switching Protocols` response. Nothing else about
//! the request is validated: the `Upgrade`, `Connection` and
//! `Sec-WebSocket-Version` headers are deliberately ignored. There is no
//! retry; any I/O error or a missing key rejects the upgrade and leaves
//! the transport for the caller to drop.

use std::collections::HashMap;

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Options, Result};

/// GUID appended to the client key before hashing, fixed by RFC 6455.
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` value for a client-supplied key.
///
/// The accept value is `base64(sha1(key ++ GUID))`; it proves to the
/// client that the server understood the upgrade request.
pub fn accept_key(key: &[u8]) -> String {
    use base64::prelude::*;
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WS_GUID);
    let digest = sha1.finalize();
    BASE64_STANDARD.encode(&digest[..])
}

/// Negotiates the server side of the upgrade on a fresh transport.
///
/// Reads at most `options.max_handshake_bytes` of the opening request,
/// parses the header lines (split on CRLF, the request line skipped, each
/// header split on the first `": "` into a case-insensitive map) and
/// writes the `101` response.
///
/// On success the transport speaks frames from the next byte onward. On
/// failure no connection exists; the caller closes the transport. The
/// listener treats every failure here as local to the one transport, so a
/// bad client never affects its ability to accept others.
pub async fn accept<T>(io: &mut T, options: &Options) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; options.max_handshake_bytes];
    let n = io.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let mut headers = HashMap::new();
    for line in request.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(": ") {
            headers.insert(name.to_ascii_lowercase(), value);
        }
    }

    let key = headers
        .get("sec-websocket-key")
        .ok_or(Error::MissingSecWebSocketKey)?;

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key.as_bytes())
    );
    io.write_all(response.as_bytes()).await?;
    io.flush().await?;

    Ok(())
}
