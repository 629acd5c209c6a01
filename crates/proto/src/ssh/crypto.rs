//! SSH transport cryptography.
//!
//! This module implements the cipher and MAC algorithms the packet framer
//! applies once NEWKEYS has been exchanged:
//!
//! - AES-128-CTR, AES-192-CTR, AES-256-CTR (stream ciphers, RFC 4344)
//! - HMAC-SHA1, HMAC-SHA2-256 (RFC 4253 Section 6.4)
//!
//! A [`CryptoContext`] bundles the cipher state and MAC keys for both
//! directions. Two contexts exist conceptually on a session: the *current*
//! one (installed in the framer, in use) and the *next* one (being
//! negotiated); on NEWKEYS the next replaces the current atomically for all
//! subsequent packets.
//!
//! # Security
//!
//! - MAC verification uses constant-time comparison
//! - MAC keys are zeroized on drop; cipher states are zeroized by the
//!   `aes` crate's drop implementation

use aes::{Aes128, Aes192, Aes256};
use cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use moorage_platform::{MoorageError, MoorageResult};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes192Ctr = ctr::Ctr128BE<Aes192>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Cipher algorithm for SSH packet encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128 in counter mode
    Aes128Ctr,
    /// AES-192 in counter mode
    Aes192Ctr,
    /// AES-256 in counter mode
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Ctr => "aes128-ctr",
            CipherAlgorithm::Aes192Ctr => "aes192-ctr",
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr => 16,
            CipherAlgorithm::Aes192Ctr => 24,
            CipherAlgorithm::Aes256Ctr => 32,
        }
    }

    /// Returns the IV size in bytes.
    pub fn iv_size(&self) -> usize {
        16
    }

    /// Returns the cipher block size in bytes.
    pub fn block_size(&self) -> usize {
        16
    }

    /// Parses a cipher algorithm from its SSH name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "aes128-ctr" => Some(CipherAlgorithm::Aes128Ctr),
            "aes192-ctr" => Some(CipherAlgorithm::Aes192Ctr),
            "aes256-ctr" => Some(CipherAlgorithm::Aes256Ctr),
            _ => None,
        }
    }
}

/// MAC algorithm for SSH packet integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA1 (RFC 4253 REQUIRED algorithm)
    HmacSha1,
    /// HMAC-SHA2-256 (RFC 6668)
    HmacSha256,
}

impl MacAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha1 => "hmac-sha1",
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
        }
    }

    /// Returns the MAC key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
        }
    }

    /// Returns the MAC output size in bytes.
    pub fn mac_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
        }
    }

    /// Parses a MAC algorithm from its SSH name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hmac-sha1" => Some(MacAlgorithm::HmacSha1),
            "hmac-sha2-256" => Some(MacAlgorithm::HmacSha256),
            _ => None,
        }
    }
}

/// Keyed CTR cipher state for one direction.
///
/// CTR keystream position advances with every byte processed, so each
/// ciphertext byte must be transformed exactly once and in order.
enum CtrState {
    Aes128(Aes128Ctr),
    Aes192(Aes192Ctr),
    Aes256(Aes256Ctr),
}

impl CtrState {
    fn new(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8]) -> MoorageResult<Self> {
        if key.len() < algorithm.key_size() {
            return Err(MoorageError::Crypto(format!(
                "Insufficient key material for {}: expected {}, got {}",
                algorithm.name(),
                algorithm.key_size(),
                key.len()
            )));
        }
        if iv.len() < algorithm.iv_size() {
            return Err(MoorageError::Crypto(format!(
                "Insufficient IV material for {}: expected {}, got {}",
                algorithm.name(),
                algorithm.iv_size(),
                iv.len()
            )));
        }

        let key = &key[..algorithm.key_size()];
        let iv = &iv[..algorithm.iv_size()];
        let invalid =
            |_| MoorageError::Crypto(format!("Failed to initialize {}", algorithm.name()));

        Ok(match algorithm {
            CipherAlgorithm::Aes128Ctr => {
                CtrState::Aes128(Aes128Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes192Ctr => {
                CtrState::Aes192(Aes192Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes256Ctr => {
                CtrState::Aes256(Aes256Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
        })
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        match self {
            CtrState::Aes128(c) => c.apply_keystream(data),
            CtrState::Aes192(c) => c.apply_keystream(data),
            CtrState::Aes256(c) => c.apply_keystream(data),
        }
    }
}

/// MAC key bound to one direction.
///
/// The MAC covers the 32-bit packet sequence number followed by the
/// plaintext packet, per RFC 4253 Section 6.4. The sequence number is owned
/// by the framer (it spans the unencrypted prefix of the connection) and is
/// passed in explicitly.
pub struct MacKey {
    algorithm: MacAlgorithm,
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl MacKey {
    /// Creates a MAC key from derived key material.
    pub fn new(algorithm: MacAlgorithm, key_material: &[u8]) -> MoorageResult<Self> {
        if key_material.len() < algorithm.key_size() {
            return Err(MoorageError::Crypto(format!(
                "Insufficient key material for {}: expected {}, got {}",
                algorithm.name(),
                algorithm.key_size(),
                key_material.len()
            )));
        }

        Ok(Self {
            algorithm,
            key: Zeroizing::new(key_material[..algorithm.key_size()].to_vec()),
        })
    }

    /// Computes the MAC over `sequence || packet`.
    pub fn compute(&self, sequence: u32, packet: &[u8]) -> Vec<u8> {
        match self.algorithm {
            MacAlgorithm::HmacSha1 => {
                let mut mac =
                    Hmac::<Sha1>::new_from_slice(&self.key).expect("HMAC accepts any key size");
                mac.update(&sequence.to_be_bytes());
                mac.update(packet);
                mac.finalize().into_bytes().to_vec()
            }
            MacAlgorithm::HmacSha256 => {
                let mut mac =
                    Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC accepts any key size");
                mac.update(&sequence.to_be_bytes());
                mac.update(packet);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    /// Verifies a received MAC in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Crypto`] on length or value mismatch.
    pub fn verify(&self, sequence: u32, packet: &[u8], received: &[u8]) -> MoorageResult<()> {
        let computed = self.compute(sequence, packet);

        if computed.len() != received.len() {
            return Err(MoorageError::Crypto("MAC length mismatch".to_string()));
        }

        use subtle::ConstantTimeEq;
        if computed.ct_eq(received).into() {
            Ok(())
        } else {
            Err(MoorageError::Crypto("MAC verification failed".to_string()))
        }
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }
}

/// Installed transport keys for both directions of one session.
pub struct CryptoContext {
    cipher_out: CipherAlgorithm,
    cipher_in: CipherAlgorithm,
    encryptor: CtrState,
    decryptor: CtrState,
    mac_out: MacKey,
    mac_in: MacKey,
}

impl std::fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoContext")
            .field("cipher_out", &self.cipher_out.name())
            .field("cipher_in", &self.cipher_in.name())
            .field("mac_out", &self.mac_out.algorithm().name())
            .field("mac_in", &self.mac_in.algorithm().name())
            .finish()
    }
}

/// Key material for one direction: IV, cipher key, MAC key.
pub struct DirectionKeys<'a> {
    /// Initial vector for the cipher
    pub iv: &'a [u8],
    /// Cipher key
    pub key: &'a [u8],
    /// MAC key
    pub mac_key: &'a [u8],
}

impl CryptoContext {
    /// Creates a context from negotiated algorithms and derived keys.
    ///
    /// `out` keys seal packets this side sends; `in` keys open packets it
    /// receives. A server passes server-to-client material as `out` and
    /// client-to-server material as `in`; a client does the opposite.
    pub fn new(
        cipher_out: CipherAlgorithm,
        cipher_in: CipherAlgorithm,
        mac_out: MacAlgorithm,
        mac_in: MacAlgorithm,
        out_keys: DirectionKeys<'_>,
        in_keys: DirectionKeys<'_>,
    ) -> MoorageResult<Self> {
        Ok(Self {
            cipher_out,
            cipher_in,
            encryptor: CtrState::new(cipher_out, out_keys.key, out_keys.iv)?,
            decryptor: CtrState::new(cipher_in, in_keys.key, in_keys.iv)?,
            mac_out: MacKey::new(mac_out, out_keys.mac_key)?,
            mac_in: MacKey::new(mac_in, in_keys.mac_key)?,
        })
    }

    /// Encrypts outbound bytes in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.encryptor.apply_keystream(data);
    }

    /// Decrypts inbound bytes in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.decryptor.apply_keystream(data);
    }

    /// Computes the MAC for an outbound plaintext packet.
    pub fn compute_mac(&self, sequence: u32, packet: &[u8]) -> Vec<u8> {
        self.mac_out.compute(sequence, packet)
    }

    /// Verifies the MAC of an inbound plaintext packet.
    pub fn verify_mac(&self, sequence: u32, packet: &[u8], mac: &[u8]) -> MoorageResult<()> {
        self.mac_in.verify(sequence, packet, mac)
    }

    /// Block size for outbound padding.
    pub fn block_size_out(&self) -> usize {
        self.cipher_out.block_size()
    }

    /// Block size for inbound framing.
    pub fn block_size_in(&self) -> usize {
        self.cipher_in.block_size()
    }

    /// Length of the outbound MAC tag.
    pub fn mac_size_out(&self) -> usize {
        self.mac_out.algorithm().mac_size()
    }

    /// Length of the inbound MAC tag.
    pub fn mac_size_in(&self) -> usize {
        self.mac_in.algorithm().mac_size()
    }
}
