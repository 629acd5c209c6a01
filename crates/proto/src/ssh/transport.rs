//! Session and key-exchange state machines.
//!
//! A session is in exactly one [`SessionState`] at a time; a packet type is
//! legal in exactly one of them, and the handshake driver refuses anything
//! else. Within the DH phase, [`DhState`] tracks the sub-steps between
//! receiving KEXDH_INIT and installing the new keys.
//!
//! Re-keying is deliberately not implemented: once a session reaches
//! `Authenticating` it never re-enters the key-exchange states, and a
//! late KEXINIT is treated as a protocol error.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::transport::{is_valid_transition, SessionState};
//!
//! assert!(is_valid_transition(
//!     SessionState::SocketConnected,
//!     SessionState::BannerReceived
//! ));
//! assert!(!is_valid_transition(
//!     SessionState::SocketConnected,
//!     SessionState::Authenticating
//! ));
//! ```

use crate::ssh::auth::AuthMethods;
use crate::ssh::kex::AlgorithmPreferences;
use crate::ssh::version::Banner;

/// Connection-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Freshly created, nothing has happened yet.
    None,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is connected and our banner has been sent.
    SocketConnected,
    /// The peer's banner line has arrived.
    BannerReceived,
    /// KEXINIT sent; waiting for the peer's.
    InitialKex,
    /// The peer's KEXINIT has arrived; negotiating.
    KexinitReceived,
    /// Diffie-Hellman exchange in progress.
    Dh,
    /// Handshake complete; user authentication may proceed.
    Authenticating,
    /// The peer disconnected cleanly.
    Disconnected,
    /// A fatal error occurred; the session is dead.
    Error,
}

impl SessionState {
    /// Whether the handshake loop should stop in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticating | SessionState::Disconnected | SessionState::Error
        )
    }
}

/// Diffie-Hellman handshake sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhState {
    /// Waiting for the client's KEXDH_INIT.
    Init,
    /// KEXDH_INIT received, reply being produced.
    InitSent,
    /// KEXDH_REPLY and our NEWKEYS are out; waiting for the peer's NEWKEYS.
    NewkeysSent,
    /// Both NEWKEYS seen; keys installed.
    Finished,
}

/// Validates a session state transition.
///
/// Forward progress follows the handshake order; `Error` and
/// `Disconnected` are reachable from anywhere; staying in place is
/// allowed.
pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    match (from, to) {
        (None, Connecting) => true,
        (None, SocketConnected) => true,
        (Connecting, SocketConnected) => true,
        (SocketConnected, BannerReceived) => true,
        (BannerReceived, InitialKex) => true,
        (InitialKex, KexinitReceived) => true,
        (KexinitReceived, Dh) => true,
        (Dh, Authenticating) => true,
        (_, Error) => true,
        (_, Disconnected) => true,
        (a, b) if a == b => true,
        _ => false,
    }
}

/// Per-session transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Software name advertised in the server banner.
    pub software_version: String,
    /// Algorithm preference lists.
    pub preferences: AlgorithmPreferences,
    /// Initially advertised authentication methods.
    pub auth_methods: AuthMethods,
}

impl TransportConfig {
    /// Creates a configuration with the given banner software name.
    pub fn new(software_version: impl Into<String>) -> Self {
        Self {
            software_version: software_version.into(),
            preferences: AlgorithmPreferences::supported(),
            auth_methods: AuthMethods::default(),
        }
    }

    /// Builds the server banner.
    pub fn banner(&self) -> Banner {
        Banner::new(&self.software_version, None)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(format!("moorage_{}", env!("CARGO_PKG_VERSION")))
    }
}
