//! The accept loop that turns raw TCP connections into served
//! [`Connection`]s.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::{close::CloseCode, handshake, Connection, Options, Result};

/// Bind address and protocol limits for a [`Listener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind, e.g. `"0.0.0.0"`.
    pub addr: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Limits applied to the handshake and every accepted connection.
    pub options: Options,
}

/// Accepts transports indefinitely and runs the upgrade on each.
///
/// Every accepted transport is handled on its own task: a failed
/// handshake logs and drops that one transport, a successful one produces
/// a [`Connection`] handed to the serve function. When the serve future
/// returns the connection is closed and the listener keeps accepting;
/// other connections are never affected.
pub struct Listener {
    inner: TcpListener,
    options: Options,
}

impl Listener {
    /// Binds the listening socket.
    pub async fn bind(config: &ListenerConfig) -> Result<Self> {
        let inner = TcpListener::bind((config.addr.as_str(), config.port)).await?;
        log::info!("listening on {}", inner.local_addr()?);
        Ok(Self {
            inner,
            options: config.options.clone(),
        })
    }

    /// The bound address, useful when the configured port was `0`.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept loop. `serve` is invoked once per upgraded connection,
    /// typically spawning this connection's set of producer tasks.
    pub async fn serve<F, Fut>(self, serve: F) -> Result<()>
    where
        F: Fn(Connection<TcpStream>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let (mut stream, peer) = self.inner.accept().await?;
            log::debug!("accepted transport from {peer}");

            let options = self.options.clone();
            let serve = serve.clone();
            tokio::spawn(async move {
                match handshake::accept(&mut stream, &options).await {
                    Ok(()) => {
                        log::info!("client {peer} upgraded");
                        let conn = Connection::server(stream, &options);
                        serve(conn.clone()).await;
                        conn.close(CloseCode::Normal, "");
                        log::info!("client {peer} finished");
                    }
                    Err(err) => {
                        // The transport is dropped here; the listener keeps
                        // accepting others.
                        log::warn!("handshake with {peer} failed: {err}");
                    }
                }
            });
        }
    }
}
