//! Administrative socket server
//!
//! Listens on a Unix domain socket or a TCP address and answers JSON-lines
//! commands through a [`CommandDispatcher`]. Each client connection runs in
//! its own task; the server stops accepting once the pipeline's shutdown
//! signal is raised.

mod dispatcher;
mod protocol;

pub use dispatcher::{CommandDispatcher, CommandHandler, PingHandler, StatsHandler};
pub use protocol::{
    default_socket_path, parse_request, Reply, Request, DEFAULT_TCP_PORT, MAX_LINE_BYTES,
    OK_REPLY,
};

use crate::crawler::ShutdownSignal;
use crate::MirrorError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

/// Where the admin server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(SocketAddr),
}

enum Listener {
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
    Tcp(TcpListener),
}

/// Bound admin server, ready to run
pub struct AdminServer {
    listener: Listener,
    dispatcher: Arc<CommandDispatcher>,
}

impl AdminServer {
    /// Binds the listening socket
    ///
    /// A stale Unix socket file at the path is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Server`] if the socket cannot be bound.
    pub async fn bind(endpoint: Endpoint, dispatcher: CommandDispatcher) -> Result<Self, MirrorError> {
        let listener = match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(&path).map_err(|e| {
                        MirrorError::Server(format!(
                            "Failed to remove stale socket {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                }
                let listener = UnixListener::bind(&path).map_err(|e| {
                    MirrorError::Server(format!("Failed to bind {}: {}", path.display(), e))
                })?;
                info!("Admin server listening on {}", path.display());
                Listener::Unix(listener, path)
            }
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|e| MirrorError::Server(format!("Failed to bind {}: {}", addr, e)))?;
                if let Ok(local) = listener.local_addr() {
                    info!("Admin server listening on {}", local);
                }
                Listener::Tcp(listener)
            }
        };

        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// The bound TCP address, if listening on TCP
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(..) => None,
        }
    }

    /// Accepts connections until `shutdown` is raised
    pub async fn run(self, shutdown: ShutdownSignal) {
        match self.listener {
            Listener::Tcp(listener) => loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("Admin client connected from {}", peer);
                            spawn_connection(stream, Arc::clone(&self.dispatcher));
                        }
                        Err(e) => error!("Accept error: {}", e),
                    },
                    _ = shutdown.wait() => break,
                }
            },
            #[cfg(unix)]
            Listener::Unix(listener, path) => {
                loop {
                    tokio::select! {
                        accepted = listener.accept() => match accepted {
                            Ok((stream, _)) => {
                                debug!("Admin client connected");
                                spawn_connection(stream, Arc::clone(&self.dispatcher));
                            }
                            Err(e) => error!("Accept error: {}", e),
                        },
                        _ = shutdown.wait() => break,
                    }
                }
                if let Err(e) = std::fs::remove_file(&path) {
                    debug!("Failed to remove socket {}: {}", path.display(), e);
                }
            }
        }
        info!("Admin server stopped");
    }
}

fn spawn_connection<S>(stream: S, dispatcher: Arc<CommandDispatcher>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, dispatcher).await {
            warn!("Admin connection error: {}", e);
        }
    });
}

/// Serves one client until it disconnects or sends an oversized line
async fn handle_connection<S>(stream: S, dispatcher: Arc<CommandDispatcher>) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let mut line = String::new();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_line(&mut line)
            .await?;

        if read == 0 {
            debug!("Admin client disconnected");
            return Ok(());
        }

        if !line.ends_with('\n') {
            if read >= MAX_LINE_BYTES {
                writer
                    .write_all(&Reply::Err("request too long".to_string()).encode())
                    .await?;
                writer.flush().await?;
            }
            // Oversized line or EOF mid-line; either way the framing is lost
            return Ok(());
        }

        let reply = match parse_request(&line) {
            Ok(request) => {
                debug!("Admin command: {}", request.command);
                dispatcher.dispatch(&request)
            }
            Err(reason) => Reply::Err(reason),
        };

        writer.write_all(&reply.encode()).await?;
        writer.flush().await?;
    }
}
