//! Server host keys (RFC 4253 Section 6.6).
//!
//! A host key is the server's long-term identity: it signs the exchange
//! hash during key exchange, proving to the client which server it is
//! talking to. This module implements the two classic algorithms:
//!
//! - `ssh-dss` - DSA (1024/160) with SHA-1
//! - `ssh-rsa` - RSA PKCS#1 v1.5 with SHA-1
//!
//! Keys are loaded lazily from PEM files at accept time, carried by the
//! session only until the exchange hash has been signed, and then dropped;
//! both underlying key types zeroize their private material on drop.
//!
//! [`PublicKey`] is the read-only counterpart used to verify signatures
//! from `publickey` authentication requests.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::hostkey::{HostKey, PublicKey};
//!
//! # fn example() -> moorage_platform::MoorageResult<()> {
//! let key = HostKey::generate_rsa(2048)?;
//! let blob = key.public_key_blob();
//! let signature = key.sign(b"exchange hash")?;
//!
//! let public = PublicKey::from_blob(&blob)?;
//! assert!(public.verify(b"exchange hash", &signature)?);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use dsa::{
    Components, KeySize, Signature as DsaSignature, SigningKey as DsaSigningKey,
    VerifyingKey as DsaVerifyingKey,
};
use moorage_platform::{MoorageError, MoorageResult};
use num_bigint_dig::BigUint;
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use signature::{DigestSigner, DigestVerifier};

use crate::ssh::wire::WireBuffer;

/// Host key algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyAlgorithm {
    /// ssh-dss - DSA with SHA-1
    SshDss,
    /// ssh-rsa - RSA PKCS#1 v1.5 with SHA-1
    SshRsa,
}

impl HostKeyAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyAlgorithm::SshDss => "ssh-dss",
            HostKeyAlgorithm::SshRsa => "ssh-rsa",
        }
    }

    /// Parses an algorithm from its SSH name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ssh-dss" => Some(HostKeyAlgorithm::SshDss),
            "ssh-rsa" => Some(HostKeyAlgorithm::SshRsa),
            _ => None,
        }
    }
}

/// A loaded host private key.
pub enum HostKey {
    /// DSA host key
    Dss(DsaSigningKey),
    /// RSA host key
    Rsa(RsaPrivateKey),
}

impl HostKey {
    /// Loads a host key of the given type from a PEM file.
    ///
    /// RSA accepts both PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8
    /// (`BEGIN PRIVATE KEY`) encodings; DSA accepts PKCS#8.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Io`] if the file cannot be read and
    /// [`MoorageError::Crypto`] if it does not parse as a key of the
    /// requested type.
    pub fn from_file(path: &Path, algorithm: HostKeyAlgorithm) -> MoorageResult<Self> {
        let pem = std::fs::read_to_string(path)?;

        match algorithm {
            HostKeyAlgorithm::SshDss => {
                let key = DsaSigningKey::from_pkcs8_pem(&pem).map_err(|e| {
                    MoorageError::Crypto(format!(
                        "Cannot parse DSA private key {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(HostKey::Dss(key))
            }
            HostKeyAlgorithm::SshRsa => {
                let key = RsaPrivateKey::from_pkcs1_pem(&pem)
                    .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
                    .map_err(|e| {
                        MoorageError::Crypto(format!(
                            "Cannot parse RSA private key {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                Ok(HostKey::Rsa(key))
            }
        }
    }

    /// Generates a fresh DSA (1024/160) host key.
    pub fn generate_dss() -> MoorageResult<Self> {
        let mut rng = rand::thread_rng();
        #[allow(deprecated)]
        let components = Components::generate(&mut rng, KeySize::DSA_1024_160);
        let key = DsaSigningKey::generate(&mut rng, components);
        Ok(HostKey::Dss(key))
    }

    /// Generates a fresh RSA host key of the given size.
    pub fn generate_rsa(bits: usize) -> MoorageResult<Self> {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| MoorageError::Crypto(format!("RSA key generation failed: {}", e)))?;
        Ok(HostKey::Rsa(key))
    }

    /// Returns the algorithm this key signs with.
    pub fn algorithm(&self) -> HostKeyAlgorithm {
        match self {
            HostKey::Dss(_) => HostKeyAlgorithm::SshDss,
            HostKey::Rsa(_) => HostKeyAlgorithm::SshRsa,
        }
    }

    /// Serializes the public half as an SSH key blob.
    ///
    /// ```text
    /// ssh-dss: string "ssh-dss" || mpint p || mpint q || mpint g || mpint y
    /// ssh-rsa: string "ssh-rsa" || mpint e || mpint n
    /// ```
    pub fn public_key_blob(&self) -> Vec<u8> {
        let mut buf = WireBuffer::new();

        match self {
            HostKey::Dss(key) => {
                let verifying = key.verifying_key();
                let components = verifying.components();
                buf.put_string("ssh-dss");
                buf.put_mpint(&components.p().to_bytes_be());
                buf.put_mpint(&components.q().to_bytes_be());
                buf.put_mpint(&components.g().to_bytes_be());
                buf.put_mpint(&verifying.y().to_bytes_be());
            }
            HostKey::Rsa(key) => {
                buf.put_string("ssh-rsa");
                buf.put_mpint(&key.e().to_bytes_be());
                buf.put_mpint(&key.n().to_bytes_be());
            }
        }

        buf.into_bytes()
    }

    /// Signs `data` with SHA-1, returning an SSH signature blob.
    ///
    /// ```text
    /// string algorithm name
    /// string signature bytes (ssh-dss: 20-byte r || 20-byte s)
    /// ```
    pub fn sign(&self, data: &[u8]) -> MoorageResult<Vec<u8>> {
        let mut buf = WireBuffer::new();

        match self {
            HostKey::Dss(key) => {
                let signature: DsaSignature = key
                    .try_sign_digest(Sha1::new_with_prefix(data))
                    .map_err(|e| MoorageError::Crypto(format!("DSA signing failed: {}", e)))?;

                let mut raw = [0u8; 40];
                raw[..20].copy_from_slice(&fixed_width_20(signature.r())?);
                raw[20..].copy_from_slice(&fixed_width_20(signature.s())?);

                buf.put_string("ssh-dss");
                buf.put_bytes(&raw);
            }
            HostKey::Rsa(key) => {
                let digest = Sha1::digest(data);
                let signature = key
                    .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
                    .map_err(|e| MoorageError::Crypto(format!("RSA signing failed: {}", e)))?;

                buf.put_string("ssh-rsa");
                buf.put_bytes(&signature);
            }
        }

        Ok(buf.into_bytes())
    }
}

impl std::fmt::Debug for HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKey")
            .field("algorithm", &self.algorithm().name())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// The host keys a listener loads and a session consumes.
///
/// Both slots are emptied (dropping and thereby zeroizing the keys) as soon
/// as the exchange hash has been signed.
#[derive(Debug, Default)]
pub struct HostKeySet {
    /// DSA key, if configured.
    pub dss: Option<HostKey>,
    /// RSA key, if configured.
    pub rsa: Option<HostKey>,
}

impl HostKeySet {
    /// Returns the key matching a negotiated host-key algorithm.
    pub fn select(&self, algorithm: HostKeyAlgorithm) -> Option<&HostKey> {
        match algorithm {
            HostKeyAlgorithm::SshDss => self.dss.as_ref(),
            HostKeyAlgorithm::SshRsa => self.rsa.as_ref(),
        }
    }

    /// Whether no key is loaded.
    pub fn is_empty(&self) -> bool {
        self.dss.is_none() && self.rsa.is_none()
    }

    /// Whether a DSA key is loaded.
    pub fn has_dss(&self) -> bool {
        self.dss.is_some()
    }

    /// Whether an RSA key is loaded.
    pub fn has_rsa(&self) -> bool {
        self.rsa.is_some()
    }
}

/// A peer-supplied public key, parsed from an SSH key blob.
#[derive(Debug, Clone)]
pub enum PublicKey {
    /// DSA public key
    Dss(DsaVerifyingKey),
    /// RSA public key
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Parses an SSH public key blob.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] for malformed blobs and
    /// [`MoorageError::Crypto`] for structurally valid blobs that do not
    /// form a usable key.
    pub fn from_blob(blob: &[u8]) -> MoorageResult<Self> {
        let mut buf = WireBuffer::from_bytes(blob);
        let algorithm = buf.read_string()?;

        match algorithm.as_str() {
            "ssh-dss" => {
                let p = BigUint::from_bytes_be(&buf.read_mpint()?);
                let q = BigUint::from_bytes_be(&buf.read_mpint()?);
                let g = BigUint::from_bytes_be(&buf.read_mpint()?);
                let y = BigUint::from_bytes_be(&buf.read_mpint()?);

                let components = Components::from_components(p, q, g)
                    .map_err(|e| MoorageError::Crypto(format!("Invalid DSA key: {}", e)))?;
                let key = DsaVerifyingKey::from_components(components, y)
                    .map_err(|e| MoorageError::Crypto(format!("Invalid DSA key: {}", e)))?;
                Ok(PublicKey::Dss(key))
            }
            "ssh-rsa" => {
                let e = BigUint::from_bytes_be(&buf.read_mpint()?);
                let n = BigUint::from_bytes_be(&buf.read_mpint()?);

                let key = RsaPublicKey::new(n, e)
                    .map_err(|e| MoorageError::Crypto(format!("Invalid RSA key: {}", e)))?;
                Ok(PublicKey::Rsa(key))
            }
            other => Err(MoorageError::Protocol(format!(
                "Unsupported public key algorithm: '{}'",
                other
            ))),
        }
    }

    /// Returns the key's algorithm.
    pub fn algorithm(&self) -> HostKeyAlgorithm {
        match self {
            PublicKey::Dss(_) => HostKeyAlgorithm::SshDss,
            PublicKey::Rsa(_) => HostKeyAlgorithm::SshRsa,
        }
    }

    /// Verifies an SSH signature blob over `data`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not
    /// verify, and an error for blobs that cannot be parsed at all.
    pub fn verify(&self, data: &[u8], signature_blob: &[u8]) -> MoorageResult<bool> {
        let mut buf = WireBuffer::from_bytes(signature_blob);
        let algorithm = buf.read_string()?;
        let raw = buf.read_bytes()?;

        if algorithm != self.algorithm().name() {
            return Ok(false);
        }

        match self {
            PublicKey::Dss(key) => {
                if raw.len() != 40 {
                    return Ok(false);
                }
                let r = BigUint::from_bytes_be(&raw[..20]);
                let s = BigUint::from_bytes_be(&raw[20..]);
                let signature = match DsaSignature::from_components(r, s) {
                    Ok(sig) => sig,
                    Err(_) => return Ok(false),
                };
                Ok(key
                    .verify_digest(Sha1::new_with_prefix(data), &signature)
                    .is_ok())
            }
            PublicKey::Rsa(key) => {
                let digest = Sha1::digest(data);
                Ok(key
                    .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &raw)
                    .is_ok())
            }
        }
    }
}

/// Left-pads a DSA signature component to exactly 20 octets.
fn fixed_width_20(value: &BigUint) -> MoorageResult<[u8; 20]> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 20 {
        return Err(MoorageError::Crypto(
            "DSA signature component exceeds 160 bits".to_string(),
        ));
    }
    let mut out = [0u8; 20];
    out[20 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}
