//! Server-side SSH-2 connection establishment.
//!
//! This module drives an accepted TCP connection from raw bytes through
//! the SSH-2 server handshake and exposes the peer's requests to the
//! embedding application:
//!
//! 1. **Wire primitives** ([`wire`]) - length-prefixed integers, strings,
//!    mpints (RFC 4251 Section 5)
//! 2. **Packet layer** ([`packet`]) - binary packet protocol with the
//!    cipher/MAC transition (RFC 4253 Section 6)
//! 3. **Handshake** ([`handshake`], [`transport`], [`kex`], [`kex_dh`],
//!    [`hostkey`]) - banner exchange, algorithm negotiation,
//!    Diffie-Hellman key exchange, session-key installation
//! 4. **Dispatch** ([`dispatcher`], [`auth`], [`service`], [`connection`]) -
//!    service/auth/channel requests as records with default replies
//! 5. **Listener/session** ([`server`]) - the tokio driver around it all
//!
//! The handshake itself is sans-IO: [`handshake::HandshakeDriver`] consumes
//! bytes and queues bytes, which keeps the state machine testable without
//! a socket and confines suspension points to the socket loop in
//! [`server`].
//!
//! # Security Considerations
//!
//! - Packet parsing enforces the 35000-byte limit before anything else
//! - MAC verification uses constant-time comparison
//! - Host private keys are dropped (zeroized) the moment the exchange
//!   hash is signed; no later path can reach them
//! - SSH-1-only peers are rejected outright
//! - Re-keying is refused rather than half-implemented
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

pub mod auth;
pub mod connection;
pub mod crypto;
pub mod dispatcher;
pub mod handshake;
pub mod hostkey;
pub mod kex;
pub mod kex_dh;
pub mod message;
pub mod packet;
pub mod server;
pub mod service;
pub mod transport;
pub mod version;
pub mod wire;

// Re-export main types
pub use auth::{
    construct_signature_data, AuthBanner, AuthFailure, AuthMethod, AuthMethods, AuthPkOk,
    AuthRequest, AuthSuccess, PublickeySignatureState,
};
pub use connection::{
    ChannelFailure, ChannelOpen, ChannelOpenConfirmation, ChannelOpenFailure,
    ChannelOpenFailureReason, ChannelRequest, ChannelRequestType, ChannelSuccess, ChannelType,
};
pub use crypto::{CipherAlgorithm, CryptoContext, DirectionKeys, MacAlgorithm, MacKey};
pub use dispatcher::{default_reply, parse_message, Message};
pub use handshake::HandshakeDriver;
pub use hostkey::{HostKey, HostKeyAlgorithm, HostKeySet, PublicKey};
pub use kex::{
    negotiate_algorithm, AlgorithmCategory, AlgorithmPreferences, KexInit, NegotiatedAlgorithms,
    NewKeys,
};
pub use kex_dh::{derive_key, exchange_hash, DhExchange, KexAlgorithm};
pub use message::MessageType;
pub use packet::{PacketFramer, MAX_PACKET_SIZE};
pub use server::{MessageCallback, SshListener, SshSession};
pub use service::{ServiceAccept, ServiceRequest};
pub use transport::{DhState, SessionState, TransportConfig};
pub use version::Banner;
pub use wire::WireBuffer;
