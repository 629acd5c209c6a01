//! SSH listener and session.
//!
//! [`SshListener`] owns the bound socket and the per-listener defaults
//! (bind address, port 22, host key file paths, algorithm overrides).
//! [`SshSession`] wraps one accepted connection: a thin tokio loop moving
//! bytes between the socket and the sans-IO [`HandshakeDriver`], plus the
//! message surface the application consumes after the handshake.
//!
//! # Example
//!
//! ```rust,no_run
//! use moorage_proto::ssh::server::SshListener;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut listener = SshListener::new();
//! listener.set_bind_address("0.0.0.0");
//! listener.set_port(2222);
//! listener.set_rsa_host_key("/etc/moorage/host_rsa_key.pem");
//! listener.listen().await?;
//!
//! loop {
//!     let mut session = listener.accept().await?;
//!     tokio::spawn(async move {
//!         if session.handle_key_exchange().await.is_ok() {
//!             // serve messages; without a callback every request gets
//!             // the protocol's default reply
//!             while session.execute_message_callbacks().await.is_ok() {}
//!         }
//!     });
//! }
//! # }
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;

use moorage_platform::{MoorageError, MoorageResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::ssh::auth::{AuthBanner, AuthFailure, AuthMethods, AuthPkOk, AuthSuccess};
use crate::ssh::dispatcher::{default_reply, parse_message, Message};
use crate::ssh::handshake::HandshakeDriver;
use crate::ssh::hostkey::{HostKey, HostKeyAlgorithm, HostKeySet};
use crate::ssh::kex::{AlgorithmCategory, AlgorithmPreferences};
use crate::ssh::transport::{SessionState, TransportConfig};

/// Default SSH port.
const DEFAULT_PORT: u16 = 22;

/// Listen backlog.
const BACKLOG: u32 = 10;

/// Callback deciding what happens to a parsed [`Message`].
///
/// Return `true` to have the default reply sent anyway, `false` when the
/// message was fully handled.
pub type MessageCallback = Box<dyn FnMut(&Message) -> bool + Send>;

/// A bound SSH server socket plus per-listener defaults.
pub struct SshListener {
    bind_address: Option<String>,
    port: u16,
    dsa_key_file: Option<PathBuf>,
    rsa_key_file: Option<PathBuf>,
    software_version: String,
    preferences: AlgorithmPreferences,
    auth_methods: AuthMethods,
    listener: Option<TcpListener>,
}

impl SshListener {
    /// Creates an unbound listener with the default port (22).
    pub fn new() -> Self {
        Self {
            bind_address: None,
            port: DEFAULT_PORT,
            dsa_key_file: None,
            rsa_key_file: None,
            software_version: format!("moorage_{}", env!("CARGO_PKG_VERSION")),
            preferences: AlgorithmPreferences::supported(),
            auth_methods: AuthMethods::default(),
            listener: None,
        }
    }

    /// Sets the bind address (default `0.0.0.0`).
    pub fn set_bind_address(&mut self, address: impl Into<String>) {
        self.bind_address = Some(address.into());
    }

    /// Sets the port to listen on.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Sets the DSA host key file path.
    pub fn set_dsa_host_key(&mut self, path: impl Into<PathBuf>) {
        self.dsa_key_file = Some(path.into());
    }

    /// Sets the RSA host key file path.
    pub fn set_rsa_host_key(&mut self, path: impl Into<PathBuf>) {
        self.rsa_key_file = Some(path.into());
    }

    /// Overrides the software name advertised in the banner.
    pub fn set_software_version(&mut self, software: impl Into<String>) {
        self.software_version = software.into();
    }

    /// Overrides one algorithm preference list for future sessions.
    pub fn set_algorithms(&mut self, category: AlgorithmCategory, names: Vec<String>) {
        self.preferences.set(category, names);
    }

    /// Sets the authentication methods advertised to future sessions.
    pub fn set_auth_methods(&mut self, methods: AuthMethods) {
        self.auth_methods = methods;
    }

    /// Resolves the bind address and starts listening.
    ///
    /// The address is resolved with the system resolver and may be IPv4 or
    /// IPv6; the socket is created with `SO_REUSEADDR` and a backlog of 10.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Config`] for unresolvable or unbindable
    /// addresses and [`MoorageError::Io`] for socket failures.
    pub async fn listen(&mut self) -> MoorageResult<()> {
        let host = self.bind_address.as_deref().unwrap_or("0.0.0.0").to_string();

        let addr: SocketAddr = lookup_host((host.as_str(), self.port))
            .await
            .map_err(|e| MoorageError::Config(format!("Resolving {}: {}", host, e)))?
            .next()
            .ok_or_else(|| {
                MoorageError::Config(format!("Resolving {}: no usable address", host))
            })?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(MoorageError::Io)?;

        socket.set_reuseaddr(true).map_err(MoorageError::Io)?;
        socket
            .bind(addr)
            .map_err(|e| MoorageError::Config(format!("Binding to {}:{}: {}", host, self.port, e)))?;

        let listener = socket.listen(BACKLOG).map_err(MoorageError::Io)?;
        info!("Listening on {}", listener.local_addr().map_err(MoorageError::Io)?);
        self.listener = Some(listener);
        Ok(())
    }

    /// The bound local address.
    pub fn local_addr(&self) -> MoorageResult<SocketAddr> {
        let listener = self.listener.as_ref().ok_or_else(|| {
            MoorageError::Config("listen() has not been called".to_string())
        })?;
        listener.local_addr().map_err(MoorageError::Io)
    }

    /// Accepts one connection and returns a session ready for
    /// [`SshSession::handle_key_exchange`].
    ///
    /// The configured host key files are loaded fresh for every accept; a
    /// failure on any step drops keys loaded so far.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Config`] when no host key file is set,
    /// [`MoorageError::Crypto`] when a key file does not parse, and
    /// [`MoorageError::Io`] for socket failures.
    pub async fn accept(&self) -> MoorageResult<SshSession> {
        let listener = self.listener.as_ref().ok_or_else(|| {
            MoorageError::Config(
                "Cannot accept new clients on a socket that is not listening".to_string(),
            )
        })?;

        if self.dsa_key_file.is_none() && self.rsa_key_file.is_none() {
            return Err(MoorageError::Config(
                "DSA or RSA host key file must be set before accept()".to_string(),
            ));
        }

        let mut host_keys = HostKeySet::default();
        if let Some(path) = &self.dsa_key_file {
            host_keys.dss = Some(HostKey::from_file(path, HostKeyAlgorithm::SshDss)?);
        }
        if let Some(path) = &self.rsa_key_file {
            host_keys.rsa = Some(HostKey::from_file(path, HostKeyAlgorithm::SshRsa)?);
        }

        let (stream, peer_addr) = listener.accept().await.map_err(MoorageError::Io)?;
        debug!("Accepted connection from {}", peer_addr);

        let mut config = TransportConfig::new(self.software_version.as_str());
        config.preferences = self.preferences.clone();
        config.auth_methods = self.auth_methods;

        Ok(SshSession::new(stream, peer_addr, config, host_keys))
    }
}

impl Default for SshListener {
    fn default() -> Self {
        Self::new()
    }
}

/// One accepted SSH connection.
pub struct SshSession {
    stream: TcpStream,
    peer_addr: SocketAddr,
    driver: HandshakeDriver,
    auth_methods: AuthMethods,
    callback: Option<MessageCallback>,
    queue: VecDeque<Message>,
}

impl SshSession {
    fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        config: TransportConfig,
        host_keys: HostKeySet,
    ) -> Self {
        let auth_methods = config.auth_methods;

        Self {
            stream,
            peer_addr,
            driver: HandshakeDriver::new(config, host_keys),
            auth_methods,
            callback: None,
            queue: VecDeque::new(),
        }
    }

    /// Drives the banner exchange and key exchange to completion.
    ///
    /// Blocks (asynchronously) until the session reaches `Authenticating`
    /// or dies. Returns `Ok` only for the former.
    pub async fn handle_key_exchange(&mut self) -> MoorageResult<()> {
        self.driver.start()?;
        self.flush().await?;

        let mut buf = vec![0u8; 4096];
        while !self.driver.state().is_terminal() {
            let n = self.stream.read(&mut buf).await.map_err(MoorageError::Io)?;
            if n == 0 {
                self.driver.abort();
                return Err(MoorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed during handshake",
                )));
            }

            let result = self.driver.handle_input(&buf[..n]);
            self.flush().await?;
            result?;
        }

        match self.driver.state() {
            SessionState::Authenticating => Ok(()),
            state => Err(MoorageError::Protocol(format!(
                "Handshake ended in state {:?}",
                state
            ))),
        }
    }

    /// Installs the application's message callback.
    ///
    /// The callback returns `true` to request the default reply anyway,
    /// `false` when it handled the message itself.
    pub fn set_message_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Pumps one round of packets and dispatches the queued messages.
    ///
    /// Without an installed callback every message receives its default
    /// reply.
    pub async fn execute_message_callbacks(&mut self) -> MoorageResult<()> {
        self.pump().await?;

        while let Some(message) = self.queue.pop_front() {
            let wants_default = match self.callback.as_mut() {
                Some(callback) => callback(&message),
                None => true,
            };

            if wants_default {
                self.reply_default(&message).await?;
            }
        }

        Ok(())
    }

    /// Fetches the next message, pumping the socket as needed.
    ///
    /// Returns `Ok(None)` once the peer has disconnected.
    pub async fn next_message(&mut self) -> MoorageResult<Option<Message>> {
        self.pump().await?;
        Ok(self.queue.pop_front())
    }

    /// Sends the protocol's default reply for `message`.
    pub async fn reply_default(&mut self, message: &Message) -> MoorageResult<()> {
        if let Some(reply) = default_reply(message, self.auth_methods) {
            self.send(&reply).await?;
        }
        Ok(())
    }

    /// Sends `USERAUTH_SUCCESS`, or a partial-success failure when
    /// `partial` is set.
    pub async fn auth_reply_success(&mut self, partial: bool) -> MoorageResult<()> {
        if partial {
            let failure = AuthFailure::from_methods(self.effective_auth_methods(), true);
            self.send(&failure.to_bytes()).await
        } else {
            self.send(&AuthSuccess::new().to_bytes()).await
        }
    }

    /// Sends `USERAUTH_PK_OK` for a publickey probe.
    pub async fn auth_reply_pk_ok(
        &mut self,
        algorithm: &str,
        public_key: &[u8],
    ) -> MoorageResult<()> {
        self.send(&AuthPkOk::new(algorithm, public_key.to_vec()).to_bytes())
            .await
    }

    /// Sends a `USERAUTH_BANNER` to the peer.
    pub async fn auth_banner(&mut self, text: &str) -> MoorageResult<()> {
        self.send(&AuthBanner::new(text.to_string()).to_bytes()).await
    }

    /// Adjusts the advertised authentication methods.
    pub fn auth_set_methods(&mut self, methods: AuthMethods) {
        self.auth_methods = methods;
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.driver.state()
    }

    /// Whether the handshake completed.
    pub fn is_established(&self) -> bool {
        self.driver.is_established()
    }

    /// The session identifier (exchange hash), once established.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.driver.session_id()
    }

    /// The peer's banner line, once received.
    pub fn client_banner(&self) -> Option<&str> {
        self.driver.client_banner()
    }

    /// The peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Reads until at least one message is queued or the peer disconnects.
    async fn pump(&mut self) -> MoorageResult<()> {
        let mut buf = vec![0u8; 4096];

        loop {
            self.drain_payloads()?;
            if !self.queue.is_empty() {
                return Ok(());
            }

            match self.driver.state() {
                SessionState::Authenticating => {}
                SessionState::Disconnected => return Ok(()),
                state => {
                    return Err(MoorageError::Protocol(format!(
                        "Cannot dispatch messages in state {:?}",
                        state
                    )))
                }
            }

            let n = self.stream.read(&mut buf).await.map_err(MoorageError::Io)?;
            if n == 0 {
                self.driver.abort();
                return Err(MoorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed",
                )));
            }

            let result = self.driver.handle_input(&buf[..n]);
            self.flush().await?;
            result?;
        }
    }

    /// Parses every buffered payload into the message queue.
    fn drain_payloads(&mut self) -> MoorageResult<()> {
        while let Some(payload) = self.driver.next_payload() {
            match parse_message(&payload, self.driver.session_id()) {
                Ok(message) => {
                    debug!("Queued {}", message.label());
                    self.queue.push_back(message);
                }
                Err(e) => {
                    self.driver.abort();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn effective_auth_methods(&self) -> AuthMethods {
        if self.auth_methods.is_empty() {
            AuthMethods::default()
        } else {
            self.auth_methods
        }
    }

    async fn send(&mut self, payload: &[u8]) -> MoorageResult<()> {
        self.driver.send_payload(payload)?;
        self.flush().await
    }

    async fn flush(&mut self) -> MoorageResult<()> {
        let out = self.driver.take_output();
        if !out.is_empty() {
            self.stream
                .write_all(&out)
                .await
                .map_err(MoorageError::Io)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.driver.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_defaults() {
        let listener = SshListener::new();
        assert_eq!(listener.port, DEFAULT_PORT);
        assert!(listener.bind_address.is_none());
        assert!(listener.local_addr().is_err());
    }

    #[tokio::test]
    async fn test_listen_binds_ephemeral_port() {
        let mut listener = SshListener::new();
        listener.set_bind_address("127.0.0.1");
        listener.set_port(0);
        listener.listen().await.unwrap();

        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_accept_without_host_key_fails() {
        let mut listener = SshListener::new();
        listener.set_bind_address("127.0.0.1");
        listener.set_port(0);
        listener.listen().await.unwrap();

        let err = listener.accept().await.unwrap_err();
        match err {
            MoorageError::Config(msg) => {
                assert_eq!(msg, "DSA or RSA host key file must be set before accept()");
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accept_before_listen_fails() {
        let listener = SshListener::new();
        assert!(matches!(
            listener.accept().await,
            Err(MoorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_with_unreadable_key_file_fails() {
        let mut listener = SshListener::new();
        listener.set_bind_address("127.0.0.1");
        listener.set_port(0);
        listener.set_rsa_host_key("/nonexistent/host_rsa_key.pem");
        listener.listen().await.unwrap();

        assert!(matches!(
            listener.accept().await,
            Err(MoorageError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_unresolvable_bind_address() {
        let mut listener = SshListener::new();
        listener.set_bind_address("host.invalid.");
        listener.set_port(0);

        assert!(matches!(
            listener.listen().await,
            Err(MoorageError::Config(_))
        ));
    }
}
