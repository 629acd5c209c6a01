//! Server-side SSH-2 protocol core for the moorage library.
//!
//! moorage turns an accepted TCP connection into an authenticating SSH
//! session: version negotiation, algorithm negotiation, Diffie-Hellman key
//! exchange and session-key installation, followed by a message surface
//! through which the embedding application answers service, authentication
//! and channel requests.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::Banner;
//!
//! let banner = Banner::parse("SSH-2.0-OpenSSH_8.9\r\n").unwrap();
//! assert!(banner.supports_ssh2());
//! ```
//!
//! # Security
//!
//! - Cryptographic operations use vetted RustCrypto implementations
//! - MAC checks are constant-time
//! - Host private keys and derived key material are zeroized
//! - No `unsafe` code
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ssh;
