//! The server handshake driver.
//!
//! [`HandshakeDriver`] is the session state machine: it consumes raw bytes
//! from the socket layer ([`HandshakeDriver::handle_input`]) and queues
//! wire bytes to send ([`HandshakeDriver::take_output`]), advancing
//!
//! ```text
//! banner -> KEXINIT -> KEXDH -> NEWKEYS -> authenticating
//! ```
//!
//! without ever touching a socket itself. The embedding driver (see
//! `server.rs`) is a thin loop moving bytes between the two; the machine
//! is fully exercisable in tests by feeding it a scripted transcript.
//!
//! After the handshake the driver keeps serving as the session's framed
//! transport: [`HandshakeDriver::next_payload`] yields decrypted inbound
//! payloads and [`HandshakeDriver::send_payload`] seals outbound replies.
//!
//! # Error policy
//!
//! Any structural error - a packet type outside its one legal state, a
//! parse failure, a crypto failure - marks the session dead: state moves
//! to `Error`, the output buffer is reinitialized so no partial packet is
//! ever transmitted, and the error propagates to the caller, which closes
//! the socket. There are no retries at this layer; on SSH a failed
//! handshake means a dead session.
//!
//! Re-keying is not implemented: a KEXINIT after the handshake is refused
//! as a protocol error rather than re-entering the key-exchange states.

use std::collections::VecDeque;

use bytes::BytesMut;
use moorage_platform::{MoorageError, MoorageResult};
use tracing::debug;
use zeroize::Zeroizing;

use crate::ssh::crypto::{CipherAlgorithm, CryptoContext, DirectionKeys, MacAlgorithm};
use crate::ssh::hostkey::{HostKeyAlgorithm, HostKeySet};
use crate::ssh::kex::{KexInit, NegotiatedAlgorithms, NewKeys};
use crate::ssh::kex_dh::{derive_key, exchange_hash, DhExchange, KexAlgorithm};
use crate::ssh::message::MessageType;
use crate::ssh::packet::PacketFramer;
use crate::ssh::transport::{is_valid_transition, DhState, SessionState, TransportConfig};
use crate::ssh::version::Banner;
use crate::ssh::wire::WireBuffer;

/// Longest accepted banner line, excluding the newline.
const MAX_BANNER_LINE: usize = 128;

/// Negotiated algorithm names resolved to their implementations.
struct CryptoSelection {
    kex: KexAlgorithm,
    host_key: HostKeyAlgorithm,
    cipher_c2s: CipherAlgorithm,
    cipher_s2c: CipherAlgorithm,
    mac_c2s: MacAlgorithm,
    mac_s2c: MacAlgorithm,
}

impl CryptoSelection {
    fn from_negotiated(negotiated: &NegotiatedAlgorithms) -> MoorageResult<Self> {
        let unsupported =
            |what: &str, name: &str| MoorageError::Protocol(format!("Unsupported {} algorithm: '{}'", what, name));

        Ok(Self {
            kex: KexAlgorithm::from_name(negotiated.kex())
                .ok_or_else(|| unsupported("kex", negotiated.kex()))?,
            host_key: HostKeyAlgorithm::from_name(negotiated.host_key())
                .ok_or_else(|| unsupported("host key", negotiated.host_key()))?,
            cipher_c2s: CipherAlgorithm::from_name(negotiated.cipher_client_to_server())
                .ok_or_else(|| unsupported("cipher", negotiated.cipher_client_to_server()))?,
            cipher_s2c: CipherAlgorithm::from_name(negotiated.cipher_server_to_client())
                .ok_or_else(|| unsupported("cipher", negotiated.cipher_server_to_client()))?,
            mac_c2s: MacAlgorithm::from_name(negotiated.mac_client_to_server())
                .ok_or_else(|| unsupported("mac", negotiated.mac_client_to_server()))?,
            mac_s2c: MacAlgorithm::from_name(negotiated.mac_server_to_client())
                .ok_or_else(|| unsupported("mac", negotiated.mac_server_to_client()))?,
        })
    }
}

/// Shared secret and exchange hash, held between KEXDH_REPLY and the
/// peer's NEWKEYS.
struct PendingSecrets {
    shared_secret: Zeroizing<Vec<u8>>,
    exchange_hash: Vec<u8>,
}

/// Server-side handshake state machine and framed transport.
pub struct HandshakeDriver {
    config: TransportConfig,
    state: SessionState,
    dh_state: DhState,
    alive: bool,

    framer: PacketFramer,
    input: BytesMut,
    output: BytesMut,
    inbox: VecDeque<Vec<u8>>,

    server_banner: String,
    client_banner: Option<String>,
    server_kexinit: Option<KexInit>,
    server_kexinit_payload: Vec<u8>,
    client_kexinit_payload: Option<Vec<u8>>,
    negotiated: Option<NegotiatedAlgorithms>,
    selection: Option<CryptoSelection>,

    host_keys: HostKeySet,
    secrets: Option<PendingSecrets>,
    session_id: Option<Vec<u8>>,
}

impl HandshakeDriver {
    /// Creates a driver for an accepted connection.
    ///
    /// `host_keys` are consumed by the DH reply and dropped (zeroized)
    /// immediately after signing the exchange hash.
    pub fn new(config: TransportConfig, host_keys: HostKeySet) -> Self {
        let server_banner = config.banner().to_string();

        Self {
            config,
            state: SessionState::None,
            dh_state: DhState::Init,
            alive: false,
            framer: PacketFramer::new(),
            input: BytesMut::new(),
            output: BytesMut::new(),
            inbox: VecDeque::new(),
            server_banner,
            client_banner: None,
            server_kexinit: None,
            server_kexinit_payload: Vec::new(),
            client_kexinit_payload: None,
            negotiated: None,
            selection: None,
            host_keys,
            secrets: None,
            session_id: None,
        }
    }

    /// Queues the server banner and arms the machine.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Config`] when no host key is loaded.
    pub fn start(&mut self) -> MoorageResult<()> {
        if self.host_keys.is_empty() {
            return Err(MoorageError::Config(
                "A DSA or RSA host key must be loaded before the handshake".to_string(),
            ));
        }

        let has_dss = self.host_keys.has_dss();
        let has_rsa = self.host_keys.has_rsa();
        self.config
            .preferences
            .set_host_key_algorithms(has_dss, has_rsa);

        self.output
            .extend_from_slice(&self.config.banner().to_wire_format());
        self.transition(SessionState::SocketConnected)?;
        self.alive = true;
        Ok(())
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current DH sub-state.
    pub fn dh_state(&self) -> DhState {
        self.dh_state
    }

    /// Whether the session is still usable.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the handshake finished (state is `Authenticating`).
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Authenticating
    }

    /// The session identifier (exchange hash of the key exchange).
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    /// The peer's banner line, once received.
    pub fn client_banner(&self) -> Option<&str> {
        self.client_banner.as_deref()
    }

    /// Our banner line (without CR LF).
    pub fn server_banner(&self) -> &str {
        &self.server_banner
    }

    /// Negotiated algorithm names, once KEXINIT has been exchanged.
    pub fn negotiated(&self) -> Option<&NegotiatedAlgorithms> {
        self.negotiated.as_ref()
    }

    /// Test hook: whether the host private keys have been dropped.
    pub fn host_keys_cleared(&self) -> bool {
        self.host_keys.is_empty()
    }

    /// Drains the bytes queued for the socket.
    pub fn take_output(&mut self) -> Vec<u8> {
        let out = self.output.to_vec();
        self.output.clear();
        out
    }

    /// Feeds bytes received from the socket into the machine.
    ///
    /// On error the session is dead: state is `Error`, queued output is
    /// discarded, and the caller should close the socket.
    pub fn handle_input(&mut self, data: &[u8]) -> MoorageResult<()> {
        self.input.extend_from_slice(data);
        match self.process() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Pops the next post-handshake payload, if one is buffered.
    pub fn next_payload(&mut self) -> Option<Vec<u8>> {
        self.inbox.pop_front()
    }

    /// Seals an outbound payload into the output queue.
    pub fn send_payload(&mut self, payload: &[u8]) -> MoorageResult<()> {
        if matches!(self.state, SessionState::Error | SessionState::Disconnected) {
            return Err(MoorageError::Protocol("Session is closed".to_string()));
        }
        self.framer.seal(payload, &mut self.output)
    }

    /// Kills the session from the outside (socket exception, EOF).
    pub fn abort(&mut self) {
        self.fail();
    }

    fn fail(&mut self) {
        if self.state != SessionState::Disconnected {
            self.state = SessionState::Error;
        }
        self.alive = false;
        self.output.clear();
    }

    fn transition(&mut self, next: SessionState) -> MoorageResult<()> {
        if !is_valid_transition(self.state, next) {
            return Err(MoorageError::Protocol(format!(
                "Invalid state transition: {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    fn process(&mut self) -> MoorageResult<()> {
        loop {
            match self.state {
                SessionState::None | SessionState::Connecting => {
                    return Err(MoorageError::Protocol(
                        "Handshake has not been started".to_string(),
                    ));
                }
                SessionState::SocketConnected => {
                    if !self.try_read_banner()? {
                        return Ok(());
                    }
                }
                SessionState::InitialKex | SessionState::Dh | SessionState::Authenticating => {
                    match self.framer.unseal(&mut self.input)? {
                        Some(payload) => self.handle_packet(&payload)?,
                        None => return Ok(()),
                    }
                }
                // Transient states, advanced inline by their handlers.
                SessionState::BannerReceived | SessionState::KexinitReceived => return Ok(()),
                SessionState::Disconnected | SessionState::Error => return Ok(()),
            }
        }
    }

    /// Scans the input for the banner line terminator.
    ///
    /// Returns `true` when the banner was consumed and the machine moved
    /// on, `false` when more bytes are needed.
    fn try_read_banner(&mut self) -> MoorageResult<bool> {
        use bytes::Buf;

        let newline = self.input.iter().position(|&b| b == b'\n');

        match newline {
            Some(idx) if idx > MAX_BANNER_LINE => Err(MoorageError::Protocol(
                "Receiving banner: too large banner".to_string(),
            )),
            Some(idx) => {
                let line = &self.input[..idx];
                // A trailing \r terminates the line early.
                let end = line.iter().position(|&b| b == b'\r').unwrap_or(line.len());
                let text = String::from_utf8_lossy(&line[..end]).into_owned();
                self.input.advance(idx + 1);

                debug!("Received banner: {}", text);
                self.client_banner = Some(text);
                self.transition(SessionState::BannerReceived)?;
                self.analyze_banner()?;
                Ok(true)
            }
            None if self.input.len() > MAX_BANNER_LINE => Err(MoorageError::Protocol(
                "Receiving banner: too large banner".to_string(),
            )),
            None => Ok(false),
        }
    }

    /// Decides the protocol version and transmits our KEXINIT.
    fn analyze_banner(&mut self) -> MoorageResult<()> {
        let text = self
            .client_banner
            .as_deref()
            .expect("banner stored before analysis");
        let banner = Banner::parse(text)?;

        if !banner.supports_ssh2() {
            if banner.supports_ssh1() {
                return Err(MoorageError::Protocol(
                    "SSH-1 protocol not available".to_string(),
                ));
            }
            return Err(MoorageError::Protocol(format!(
                "No version of SSH protocol usable (banner: {})",
                text
            )));
        }

        self.transition(SessionState::InitialKex)?;

        let kexinit = KexInit::from_preferences(&self.config.preferences);
        let payload = kexinit.to_bytes();
        self.server_kexinit = Some(kexinit);
        self.server_kexinit_payload = payload.clone();
        self.framer.seal(&payload, &mut self.output)
    }

    fn handle_packet(&mut self, payload: &[u8]) -> MoorageResult<()> {
        if payload.is_empty() {
            return Err(MoorageError::Protocol("Empty packet payload".to_string()));
        }

        let msg_type = MessageType::from_u8(payload[0]);

        // Default handlers, legal in any packet state.
        match msg_type {
            Some(MessageType::Ignore) | Some(MessageType::Debug) => return Ok(()),
            Some(MessageType::Disconnect) => {
                debug!("Peer sent SSH_MSG_DISCONNECT");
                self.state = SessionState::Disconnected;
                self.alive = false;
                return Ok(());
            }
            _ => {}
        }

        match (self.state, msg_type) {
            (SessionState::InitialKex, Some(MessageType::KexInit)) => self.on_kexinit(payload),
            (SessionState::Dh, Some(MessageType::KexdhInit)) => self.on_kexdh_init(payload),
            (SessionState::Dh, Some(MessageType::NewKeys)) => self.on_newkeys(),
            (SessionState::Authenticating, Some(MessageType::KexInit)) => Err(
                MoorageError::Protocol("Re-keying is not supported".to_string()),
            ),
            (SessionState::Authenticating, _) => {
                self.inbox.push_back(payload.to_vec());
                Ok(())
            }
            (state, _) => Err(MoorageError::Protocol(format!(
                "Unexpected packet type {} in state {:?}",
                payload[0], state
            ))),
        }
    }

    fn on_kexinit(&mut self, payload: &[u8]) -> MoorageResult<()> {
        let client = KexInit::from_bytes(payload)?;
        self.client_kexinit_payload = Some(payload.to_vec());
        self.transition(SessionState::KexinitReceived)?;

        let server = self
            .server_kexinit
            .as_ref()
            .expect("our KEXINIT was sent before the peer's arrived");
        let negotiated = NegotiatedAlgorithms::negotiate(&client, server)?;

        debug!(
            "Negotiated: kex={} hostkey={} cipher c->s={} s->c={} mac c->s={} s->c={}",
            negotiated.kex(),
            negotiated.host_key(),
            negotiated.cipher_client_to_server(),
            negotiated.cipher_server_to_client(),
            negotiated.mac_client_to_server(),
            negotiated.mac_server_to_client(),
        );

        self.selection = Some(CryptoSelection::from_negotiated(&negotiated)?);
        self.negotiated = Some(negotiated);

        self.transition(SessionState::Dh)?;
        self.dh_state = DhState::Init;
        Ok(())
    }

    fn on_kexdh_init(&mut self, payload: &[u8]) -> MoorageResult<()> {
        debug!("Received SSH_MSG_KEXDH_INIT");

        if self.dh_state != DhState::Init {
            return Err(MoorageError::Protocol(
                "Invalid state for SSH_MSG_KEXDH_INIT".to_string(),
            ));
        }

        let mut buf = WireBuffer::from_bytes(payload);
        buf.read_u8()?;
        let e = buf.read_mpint().map_err(|_| {
            MoorageError::Protocol("No e number in client request".to_string())
        })?;

        self.dh_state = DhState::InitSent;

        let selection = self
            .selection
            .as_ref()
            .expect("algorithms negotiated before DH");

        let exchange = DhExchange::new(selection.kex);
        let f = exchange.public_key().to_vec();
        let shared_secret = exchange.compute_shared_secret(&e)?;

        let host_key = self.host_keys.select(selection.host_key).ok_or_else(|| {
            MoorageError::Crypto("No host key matches the negotiated algorithm".to_string())
        })?;
        let host_key_blob = host_key.public_key_blob();

        let hash = exchange_hash(
            selection.kex,
            self.client_banner
                .as_deref()
                .expect("banner received before DH"),
            &self.server_banner,
            self.client_kexinit_payload
                .as_deref()
                .expect("KEXINIT exchanged before DH"),
            &self.server_kexinit_payload,
            &host_key_blob,
            &e,
            &f,
            &shared_secret,
        );

        let signature = host_key.sign(&hash)?;

        // The exchange hash of the first (and only) exchange is the
        // session identifier.
        if self.session_id.is_none() {
            self.session_id = Some(hash.clone());
        }

        // The host private keys must not be readable after this point.
        self.host_keys = HostKeySet::default();

        let mut reply = WireBuffer::new();
        reply.put_u8(MessageType::KexdhReply as u8);
        reply.put_bytes(&host_key_blob);
        reply.put_mpint(&f);
        reply.put_bytes(&signature);
        self.framer.seal(reply.as_bytes(), &mut self.output)?;

        self.framer
            .seal(&NewKeys::new().to_bytes(), &mut self.output)?;
        debug!("SSH_MSG_NEWKEYS sent");
        self.dh_state = DhState::NewkeysSent;

        self.secrets = Some(PendingSecrets {
            shared_secret,
            exchange_hash: hash,
        });
        Ok(())
    }

    fn on_newkeys(&mut self) -> MoorageResult<()> {
        if self.dh_state != DhState::NewkeysSent {
            return Err(MoorageError::Protocol(
                "Invalid state for SSH_MSG_NEWKEYS".to_string(),
            ));
        }

        debug!("Received SSH_MSG_NEWKEYS");
        self.dh_state = DhState::Finished;

        let secrets = self.secrets.take().ok_or_else(|| {
            MoorageError::Crypto("No shared secret available for key derivation".to_string())
        })?;
        let session_id = self
            .session_id
            .clone()
            .expect("session id fixed by the DH reply");
        let selection = self
            .selection
            .as_ref()
            .expect("algorithms negotiated before NEWKEYS");

        let kex = selection.kex;
        let k = &secrets.shared_secret;
        let h = &secrets.exchange_hash;

        let iv_c2s = derive_key(kex, k, h, &session_id, b'A', selection.cipher_c2s.iv_size());
        let iv_s2c = derive_key(kex, k, h, &session_id, b'B', selection.cipher_s2c.iv_size());
        let key_c2s = derive_key(kex, k, h, &session_id, b'C', selection.cipher_c2s.key_size());
        let key_s2c = derive_key(kex, k, h, &session_id, b'D', selection.cipher_s2c.key_size());
        let mac_c2s = derive_key(kex, k, h, &session_id, b'E', selection.mac_c2s.key_size());
        let mac_s2c = derive_key(kex, k, h, &session_id, b'F', selection.mac_s2c.key_size());

        let crypto = CryptoContext::new(
            selection.cipher_s2c,
            selection.cipher_c2s,
            selection.mac_s2c,
            selection.mac_c2s,
            DirectionKeys {
                iv: &iv_s2c[..],
                key: &key_s2c[..],
                mac_key: &mac_s2c[..],
            },
            DirectionKeys {
                iv: &iv_c2s[..],
                key: &key_c2s[..],
                mac_key: &mac_c2s[..],
            },
        )?;

        // The next crypto context becomes current; every packet from here
        // on is sealed and opened under it.
        self.framer.install(crypto);
        self.transition(SessionState::Authenticating)?;
        debug!("Handshake complete, session keys installed");
        Ok(())
    }
}

impl std::fmt::Debug for HandshakeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeDriver")
            .field("state", &self.state)
            .field("dh_state", &self.dh_state)
            .field("alive", &self.alive)
            .field("client_banner", &self.client_banner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::hostkey::HostKey;

    fn rsa_driver() -> HandshakeDriver {
        let keys = HostKeySet {
            dss: None,
            rsa: Some(HostKey::generate_rsa(1024).unwrap()),
        };
        HandshakeDriver::new(TransportConfig::default(), keys)
    }

    #[test]
    fn test_start_emits_banner() {
        let mut driver = rsa_driver();
        driver.start().unwrap();

        let out = driver.take_output();
        let banner = String::from_utf8(out).unwrap();
        assert!(banner.starts_with("SSH-2.0-moorage_"));
        assert!(banner.ends_with("\r\n"));
        assert_eq!(driver.state(), SessionState::SocketConnected);
        assert!(driver.is_alive());
    }

    #[test]
    fn test_start_requires_host_key() {
        let mut driver =
            HandshakeDriver::new(TransportConfig::default(), HostKeySet::default());
        assert!(matches!(driver.start(), Err(MoorageError::Config(_))));
    }

    #[test]
    fn test_banner_received_sends_kexinit() {
        let mut driver = rsa_driver();
        driver.start().unwrap();
        driver.take_output();

        driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();

        assert_eq!(driver.state(), SessionState::InitialKex);
        assert_eq!(driver.client_banner(), Some("SSH-2.0-Probe"));

        // The KEXINIT packet is framed in the clear.
        let mut out = BytesMut::from(&driver.take_output()[..]);
        let mut client_framer = PacketFramer::new();
        let payload = client_framer.unseal(&mut out).unwrap().unwrap();
        assert_eq!(payload[0], MessageType::KexInit as u8);

        let kexinit = KexInit::from_bytes(&payload).unwrap();
        assert_eq!(
            kexinit.algorithms(crate::ssh::kex::AlgorithmCategory::HostKey),
            &["ssh-rsa".to_string()]
        );
    }

    #[test]
    fn test_banner_split_across_reads() {
        let mut driver = rsa_driver();
        driver.start().unwrap();

        driver.handle_input(b"SSH-2.0-Pro").unwrap();
        assert_eq!(driver.state(), SessionState::SocketConnected);

        driver.handle_input(b"be\r\n").unwrap();
        assert_eq!(driver.state(), SessionState::InitialKex);
    }

    #[test]
    fn test_banner_boundary_at_128_bytes() {
        let mut driver = rsa_driver();
        driver.start().unwrap();

        // 128 bytes without a newline: incomplete, not an error.
        let mut line = b"SSH-2.0-".to_vec();
        line.extend(std::iter::repeat(b'x').take(120));
        assert_eq!(line.len(), 128);
        driver.handle_input(&line).unwrap();
        assert_eq!(driver.state(), SessionState::SocketConnected);

        // The 129th byte kills the session.
        let err = driver.handle_input(b"x").unwrap_err();
        assert!(err.to_string().contains("too large banner"));
        assert_eq!(driver.state(), SessionState::Error);
        assert!(!driver.is_alive());
    }

    #[test]
    fn test_ssh1_only_banner_rejected() {
        let mut driver = rsa_driver();
        driver.start().unwrap();

        let err = driver.handle_input(b"SSH-1.5-Legacy\r\n").unwrap_err();
        assert!(err.to_string().contains("SSH-1"));
        assert_eq!(driver.state(), SessionState::Error);
    }

    #[test]
    fn test_ssh199_banner_accepted() {
        let mut driver = rsa_driver();
        driver.start().unwrap();

        driver.handle_input(b"SSH-1.99-Transitional\r\n").unwrap();
        assert_eq!(driver.state(), SessionState::InitialKex);
    }

    #[test]
    fn test_kexdh_init_before_kexinit_is_fatal() {
        let mut driver = rsa_driver();
        driver.start().unwrap();
        driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();
        driver.take_output();
        assert_eq!(driver.state(), SessionState::InitialKex);

        // KEXDH_INIT while still waiting for the peer's KEXINIT.
        let mut kexdh = WireBuffer::new();
        kexdh.put_u8(MessageType::KexdhInit as u8);
        kexdh.put_mpint(&[0x42; 128]);

        let mut wire = BytesMut::new();
        let mut client_framer = PacketFramer::new();
        client_framer.seal(kexdh.as_bytes(), &mut wire).unwrap();

        let err = driver.handle_input(&wire).unwrap_err();
        assert!(matches!(err, MoorageError::Protocol(_)));
        assert_eq!(driver.state(), SessionState::Error);
        assert!(driver.take_output().is_empty());
    }

    #[test]
    fn test_ignore_and_debug_tolerated() {
        let mut driver = rsa_driver();
        driver.start().unwrap();
        driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();

        let mut wire = BytesMut::new();
        let mut client_framer = PacketFramer::new();
        client_framer
            .seal(&[MessageType::Ignore as u8], &mut wire)
            .unwrap();

        driver.handle_input(&wire).unwrap();
        assert_eq!(driver.state(), SessionState::InitialKex);
    }

    #[test]
    fn test_disconnect_moves_to_disconnected() {
        let mut driver = rsa_driver();
        driver.start().unwrap();
        driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();

        let mut wire = BytesMut::new();
        let mut client_framer = PacketFramer::new();
        client_framer
            .seal(&[MessageType::Disconnect as u8, 0, 0, 0, 11], &mut wire)
            .unwrap();

        driver.handle_input(&wire).unwrap();
        assert_eq!(driver.state(), SessionState::Disconnected);
        assert!(!driver.is_alive());
    }

    #[test]
    fn test_handle_input_before_start_is_error() {
        let mut driver = rsa_driver();
        assert!(driver.handle_input(b"SSH-2.0-Probe\r\n").is_err());
    }
}
