//! Diffie-Hellman key exchange (RFC 4253 Section 8, RFC 4419 groups).
//!
//! This module implements the classic finite-field exchanges:
//! - diffie-hellman-group1-sha1 (1024-bit Oakley group 2)
//! - diffie-hellman-group14-sha1 (2048-bit MODP group)
//! - diffie-hellman-group14-sha256 (RFC 8268)
//!
//! plus the two derived quantities the transport needs: the exchange hash
//! `H = HASH(V_C || V_S || I_C || I_S || K_S || e || f || K)` (which becomes
//! the session identifier) and the six-key expansion of the shared secret.
//!
//! # Security
//!
//! - Peer public values are range-checked (1 < e < p-1)
//! - The private exponent is zeroized on drop
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::kex_dh::{DhExchange, KexAlgorithm};
//!
//! let server = DhExchange::new(KexAlgorithm::DhGroup14Sha256);
//! assert!(!server.public_key().is_empty());
//! ```

use moorage_platform::{MoorageError, MoorageResult};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::ssh::wire::{encode_mpint, WireBuffer};

/// Diffie-Hellman group parameters (RFC 2409, RFC 3526).
mod groups {
    use num_bigint::BigUint;
    use once_cell::sync::Lazy;

    /// Oakley group 2 prime (1024-bit), used by diffie-hellman-group1-sha1.
    pub static P_GROUP1: Lazy<BigUint> = Lazy::new(|| {
        BigUint::from_bytes_be(
            &hex::decode(
                "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
                 29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
                 EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
                 E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
                 EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
                 FFFFFFFFFFFFFFFF",
            )
            .expect("Invalid hex"),
        )
    });

    /// MODP group 14 prime (2048-bit), used by the group14 exchanges.
    pub static P_GROUP14: Lazy<BigUint> = Lazy::new(|| {
        BigUint::from_bytes_be(
            &hex::decode(
                "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
                 29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
                 EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
                 E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
                 EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
                 C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
                 83655D23DCA3AD961C62F356208552BB9ED529077096966D\
                 670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
                 E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9\
                 DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
                 15728E5A8AACAA68FFFFFFFFFFFFFFFF",
            )
            .expect("Invalid hex"),
        )
    });

    /// Generator shared by both groups.
    pub static G: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));
}

/// Key exchange algorithm: a Diffie-Hellman group paired with a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexAlgorithm {
    /// diffie-hellman-group1-sha1
    DhGroup1Sha1,
    /// diffie-hellman-group14-sha1
    DhGroup14Sha1,
    /// diffie-hellman-group14-sha256 (RFC 8268)
    DhGroup14Sha256,
}

impl KexAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            KexAlgorithm::DhGroup1Sha1 => "diffie-hellman-group1-sha1",
            KexAlgorithm::DhGroup14Sha1 => "diffie-hellman-group14-sha1",
            KexAlgorithm::DhGroup14Sha256 => "diffie-hellman-group14-sha256",
        }
    }

    /// Parses a key exchange algorithm from its SSH name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "diffie-hellman-group1-sha1" => Some(KexAlgorithm::DhGroup1Sha1),
            "diffie-hellman-group14-sha1" => Some(KexAlgorithm::DhGroup14Sha1),
            "diffie-hellman-group14-sha256" => Some(KexAlgorithm::DhGroup14Sha256),
            _ => None,
        }
    }

    /// Digest length of the exchange hash in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            KexAlgorithm::DhGroup1Sha1 | KexAlgorithm::DhGroup14Sha1 => 20,
            KexAlgorithm::DhGroup14Sha256 => 32,
        }
    }

    /// Hashes `data` with the algorithm's hash function.
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            KexAlgorithm::DhGroup1Sha1 | KexAlgorithm::DhGroup14Sha1 => {
                Sha1::digest(data).to_vec()
            }
            KexAlgorithm::DhGroup14Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    fn prime(&self) -> &'static num_bigint::BigUint {
        match self {
            KexAlgorithm::DhGroup1Sha1 => &*groups::P_GROUP1,
            KexAlgorithm::DhGroup14Sha1 | KexAlgorithm::DhGroup14Sha256 => &*groups::P_GROUP14,
        }
    }
}

/// One side of a finite-field Diffie-Hellman exchange.
///
/// The server imports the client's `e`, generates its own exponent `y`,
/// computes `f = g^y mod p` and `K = e^y mod p`. The same type serves a
/// client computing `K = f^x mod p`.
pub struct DhExchange {
    algorithm: KexAlgorithm,
    /// Private exponent, big-endian bytes; zeroized on drop.
    private_key: Zeroizing<Vec<u8>>,
    /// Public value g^x mod p, big-endian bytes.
    public_key: Vec<u8>,
}

impl DhExchange {
    /// Generates a fresh ephemeral exchange for the given algorithm.
    ///
    /// The private exponent is drawn uniformly from [2, p-1).
    pub fn new(algorithm: KexAlgorithm) -> Self {
        use num_bigint::{BigUint, RandBigInt};

        let p = algorithm.prime();
        let mut rng = rand::thread_rng();

        let p_minus_one = p.clone() - 1u32;
        let x = rng.gen_biguint_range(&BigUint::from(2u32), &p_minus_one);
        let public = groups::G.modpow(&x, p);

        Self {
            algorithm,
            private_key: Zeroizing::new(x.to_bytes_be()),
            public_key: public.to_bytes_be(),
        }
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> KexAlgorithm {
        self.algorithm
    }

    /// Returns the public value as big-endian bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Computes the shared secret `K = peer^x mod p`.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Crypto`] when the peer's public value is
    /// outside (1, p-1).
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> MoorageResult<Zeroizing<Vec<u8>>> {
        use num_bigint::BigUint;

        let p = self.algorithm.prime();
        let peer = BigUint::from_bytes_be(peer_public);

        if peer <= BigUint::from(1u32) || peer >= p.clone() - 1u32 {
            return Err(MoorageError::Crypto(
                "Invalid peer public key: out of range".to_string(),
            ));
        }

        let x = BigUint::from_bytes_be(&self.private_key);
        let k = peer.modpow(&x, p);

        Ok(Zeroizing::new(k.to_bytes_be()))
    }
}

impl std::fmt::Debug for DhExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhExchange")
            .field("algorithm", &self.algorithm.name())
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Computes the exchange hash `H` (RFC 4253 Section 8).
///
/// ```text
/// H = HASH(string V_C  || string V_S   (banner lines, without CR LF)
///       || string I_C  || string I_S   (raw KEXINIT payloads)
///       || string K_S                  (host key blob)
///       || mpint  e    || mpint  f     (exchange publics)
///       || mpint  K)                   (shared secret)
/// ```
///
/// `H` from the first exchange becomes the session identifier.
#[allow(clippy::too_many_arguments)]
pub fn exchange_hash(
    algorithm: KexAlgorithm,
    client_banner: &str,
    server_banner: &str,
    client_kexinit: &[u8],
    server_kexinit: &[u8],
    host_key_blob: &[u8],
    e: &[u8],
    f: &[u8],
    k: &[u8],
) -> Vec<u8> {
    let mut buf = WireBuffer::new();

    buf.put_string(client_banner.trim_end_matches("\r\n"));
    buf.put_string(server_banner.trim_end_matches("\r\n"));
    buf.put_bytes(client_kexinit);
    buf.put_bytes(server_kexinit);
    buf.put_bytes(host_key_blob);
    buf.put_mpint(e);
    buf.put_mpint(f);
    buf.put_mpint(k);

    algorithm.hash(buf.as_bytes())
}

/// Derives one transport key (RFC 4253 Section 7.2).
///
/// ```text
/// Initial IV client to server:     HASH(K || H || "A" || session_id)
/// Initial IV server to client:     HASH(K || H || "B" || session_id)
/// Encryption key client to server: HASH(K || H || "C" || session_id)
/// Encryption key server to client: HASH(K || H || "D" || session_id)
/// Integrity key client to server:  HASH(K || H || "E" || session_id)
/// Integrity key server to client:  HASH(K || H || "F" || session_id)
/// ```
///
/// When an algorithm needs more bytes than one digest yields, the key is
/// extended with `HASH(K || H || K1 || ... || Kn-1)`. `K` is hashed in its
/// mpint encoding.
///
/// # Example
///
/// ```rust
/// use moorage_proto::ssh::kex_dh::{derive_key, KexAlgorithm};
///
/// let k = vec![0x42; 128];
/// let h = vec![0x01; 20];
/// let session_id = h.clone();
///
/// let key = derive_key(KexAlgorithm::DhGroup1Sha1, &k, &h, &session_id, b'C', 16);
/// assert_eq!(key.len(), 16);
/// ```
pub fn derive_key(
    algorithm: KexAlgorithm,
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    key_type: u8,
    key_length: usize,
) -> Zeroizing<Vec<u8>> {
    let k_mpint = encode_mpint(shared_secret);

    let mut input = Vec::with_capacity(k_mpint.len() + exchange_hash.len() + 1 + session_id.len());
    input.extend_from_slice(&k_mpint);
    input.extend_from_slice(exchange_hash);
    input.push(key_type);
    input.extend_from_slice(session_id);

    let mut key = Zeroizing::new(algorithm.hash(&input));

    while key.len() < key_length {
        let mut extend_input =
            Vec::with_capacity(k_mpint.len() + exchange_hash.len() + key.len());
        extend_input.extend_from_slice(&k_mpint);
        extend_input.extend_from_slice(exchange_hash);
        extend_input.extend_from_slice(&key);
        let block = algorithm.hash(&extend_input);
        key.extend_from_slice(&block);
    }

    key.truncate(key_length);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kex_algorithm_names() {
        assert_eq!(
            KexAlgorithm::from_name("diffie-hellman-group1-sha1"),
            Some(KexAlgorithm::DhGroup1Sha1)
        );
        assert_eq!(
            KexAlgorithm::from_name("diffie-hellman-group14-sha256"),
            Some(KexAlgorithm::DhGroup14Sha256)
        );
        assert_eq!(KexAlgorithm::from_name("curve25519-sha256"), None);

        assert_eq!(KexAlgorithm::DhGroup1Sha1.digest_len(), 20);
        assert_eq!(KexAlgorithm::DhGroup14Sha256.digest_len(), 32);
    }

    #[test]
    fn test_group1_key_exchange_agreement() {
        let server = DhExchange::new(KexAlgorithm::DhGroup1Sha1);
        let client = DhExchange::new(KexAlgorithm::DhGroup1Sha1);

        let server_k = server.compute_shared_secret(client.public_key()).unwrap();
        let client_k = client.compute_shared_secret(server.public_key()).unwrap();

        assert_eq!(*server_k, *client_k);
        assert!(!server_k.is_empty());
    }

    #[test]
    fn test_group14_key_exchange_agreement() {
        let server = DhExchange::new(KexAlgorithm::DhGroup14Sha256);
        let client = DhExchange::new(KexAlgorithm::DhGroup14Sha256);

        let server_k = server.compute_shared_secret(client.public_key()).unwrap();
        let client_k = client.compute_shared_secret(server.public_key()).unwrap();

        assert_eq!(*server_k, *client_k);
    }

    #[test]
    fn test_invalid_peer_public_rejected() {
        let exchange = DhExchange::new(KexAlgorithm::DhGroup1Sha1);

        assert!(exchange.compute_shared_secret(&[1]).is_err());
        assert!(exchange.compute_shared_secret(&[0]).is_err());

        let p_bytes = KexAlgorithm::DhGroup1Sha1.prime().to_bytes_be();
        assert!(exchange.compute_shared_secret(&p_bytes).is_err());
    }

    #[test]
    fn test_exchange_hash_deterministic() {
        let h1 = exchange_hash(
            KexAlgorithm::DhGroup1Sha1,
            "SSH-2.0-Probe",
            "SSH-2.0-moorage_0.1.0",
            b"client kexinit",
            b"server kexinit",
            b"host key blob",
            &[0x11; 128],
            &[0x22; 128],
            &[0x33; 128],
        );
        let h2 = exchange_hash(
            KexAlgorithm::DhGroup1Sha1,
            "SSH-2.0-Probe",
            "SSH-2.0-moorage_0.1.0",
            b"client kexinit",
            b"server kexinit",
            b"host key blob",
            &[0x11; 128],
            &[0x22; 128],
            &[0x33; 128],
        );

        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 20);
    }

    #[test]
    fn test_exchange_hash_sensitive_to_inputs() {
        let base = exchange_hash(
            KexAlgorithm::DhGroup14Sha256,
            "SSH-2.0-A",
            "SSH-2.0-B",
            b"ic",
            b"is",
            b"ks",
            &[1, 2, 3],
            &[4, 5, 6],
            &[7, 8, 9],
        );
        let other = exchange_hash(
            KexAlgorithm::DhGroup14Sha256,
            "SSH-2.0-A",
            "SSH-2.0-B",
            b"ic",
            b"is",
            b"ks",
            &[1, 2, 3],
            &[4, 5, 6],
            &[7, 8, 10],
        );

        assert_ne!(base, other);
        assert_eq!(base.len(), 32);
    }

    #[test]
    fn test_exchange_hash_strips_crlf() {
        let with = exchange_hash(
            KexAlgorithm::DhGroup1Sha1,
            "SSH-2.0-Probe\r\n",
            "SSH-2.0-S\r\n",
            b"ic",
            b"is",
            b"ks",
            &[1],
            &[2],
            &[3],
        );
        let without = exchange_hash(
            KexAlgorithm::DhGroup1Sha1,
            "SSH-2.0-Probe",
            "SSH-2.0-S",
            b"ic",
            b"is",
            b"ks",
            &[1],
            &[2],
            &[3],
        );

        assert_eq!(with, without);
    }

    #[test]
    fn test_derive_key_lengths_and_distinctness() {
        let k = vec![0x42; 128];
        let h = vec![0x01; 20];

        let iv = derive_key(KexAlgorithm::DhGroup1Sha1, &k, &h, &h, b'A', 16);
        assert_eq!(iv.len(), 16);

        let key_a = derive_key(KexAlgorithm::DhGroup1Sha1, &k, &h, &h, b'A', 16);
        let key_c = derive_key(KexAlgorithm::DhGroup1Sha1, &k, &h, &h, b'C', 16);
        assert_eq!(*iv, *key_a);
        assert_ne!(*key_a, *key_c);
    }

    #[test]
    fn test_derive_key_extension() {
        let k = vec![0x42; 128];
        let h = vec![0x01; 20];

        // 32 bytes from a 20-byte digest requires the rehash extension.
        let long = derive_key(KexAlgorithm::DhGroup1Sha1, &k, &h, &h, b'E', 32);
        assert_eq!(long.len(), 32);

        // The first digest-length bytes match the unextended key.
        let short = derive_key(KexAlgorithm::DhGroup1Sha1, &k, &h, &h, b'E', 20);
        assert_eq!(&long[..20], &short[..]);
    }
}
