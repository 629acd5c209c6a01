//! SSH algorithm negotiation (RFC 4253 Section 7.1).
//!
//! This module implements:
//! - the SSH_MSG_KEXINIT message (random cookie + ten name-lists)
//! - the SSH_MSG_NEWKEYS message
//! - the server's per-category algorithm preference table
//! - negotiation (first name in the client's list the server also offers)
//!
//! # Name-list categories
//!
//! KEXINIT carries ten parallel name-lists. They are held here as a fixed
//! array indexed by [`AlgorithmCategory`] so category arithmetic is
//! impossible to get wrong, rather than as ten ad-hoc fields or a bare
//! array of magic indices.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::kex::{AlgorithmCategory, AlgorithmPreferences, KexInit};
//!
//! let prefs = AlgorithmPreferences::supported();
//! let kexinit = KexInit::from_preferences(&prefs);
//! assert_eq!(kexinit.cookie().len(), 16);
//! assert!(kexinit
//!     .algorithms(AlgorithmCategory::Kex)
//!     .contains(&"diffie-hellman-group14-sha256".to_string()));
//! ```

use bytes::{BufMut, BytesMut};
use moorage_platform::{MoorageError, MoorageResult};
use rand::RngCore;

use crate::ssh::message::MessageType;
use crate::ssh::wire;

/// Number of name-list categories in KEXINIT.
pub const ALGORITHM_CATEGORY_COUNT: usize = 10;

/// The ten KEXINIT name-list categories, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AlgorithmCategory {
    /// Key exchange algorithms
    Kex = 0,
    /// Server host key algorithms
    HostKey = 1,
    /// Encryption algorithms client to server
    EncryptionClientToServer = 2,
    /// Encryption algorithms server to client
    EncryptionServerToClient = 3,
    /// MAC algorithms client to server
    MacClientToServer = 4,
    /// MAC algorithms server to client
    MacServerToClient = 5,
    /// Compression algorithms client to server
    CompressionClientToServer = 6,
    /// Compression algorithms server to client
    CompressionServerToClient = 7,
    /// Languages client to server
    LanguagesClientToServer = 8,
    /// Languages server to client
    LanguagesServerToClient = 9,
}

impl AlgorithmCategory {
    /// All categories in wire order.
    pub const ALL: [AlgorithmCategory; ALGORITHM_CATEGORY_COUNT] = [
        AlgorithmCategory::Kex,
        AlgorithmCategory::HostKey,
        AlgorithmCategory::EncryptionClientToServer,
        AlgorithmCategory::EncryptionServerToClient,
        AlgorithmCategory::MacClientToServer,
        AlgorithmCategory::MacServerToClient,
        AlgorithmCategory::CompressionClientToServer,
        AlgorithmCategory::CompressionServerToClient,
        AlgorithmCategory::LanguagesClientToServer,
        AlgorithmCategory::LanguagesServerToClient,
    ];

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            AlgorithmCategory::Kex => "kex",
            AlgorithmCategory::HostKey => "hostkey",
            AlgorithmCategory::EncryptionClientToServer => "cipher c->s",
            AlgorithmCategory::EncryptionServerToClient => "cipher s->c",
            AlgorithmCategory::MacClientToServer => "mac c->s",
            AlgorithmCategory::MacServerToClient => "mac s->c",
            AlgorithmCategory::CompressionClientToServer => "compression c->s",
            AlgorithmCategory::CompressionServerToClient => "compression s->c",
            AlgorithmCategory::LanguagesClientToServer => "lang c->s",
            AlgorithmCategory::LanguagesServerToClient => "lang s->c",
        }
    }

    fn is_language(&self) -> bool {
        matches!(
            self,
            AlgorithmCategory::LanguagesClientToServer | AlgorithmCategory::LanguagesServerToClient
        )
    }
}

/// Per-category algorithm preference lists, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmPreferences {
    lists: [Vec<String>; ALGORITHM_CATEGORY_COUNT],
}

impl AlgorithmPreferences {
    /// Returns the library's supported defaults.
    ///
    /// The host-key list here covers everything the library can sign with;
    /// it is narrowed at accept time to the algorithms whose key files are
    /// actually loaded (see [`AlgorithmPreferences::set_host_key_algorithms`]).
    pub fn supported() -> Self {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut lists: [Vec<String>; ALGORITHM_CATEGORY_COUNT] = Default::default();
        lists[AlgorithmCategory::Kex as usize] = names(&[
            "diffie-hellman-group14-sha256",
            "diffie-hellman-group14-sha1",
            "diffie-hellman-group1-sha1",
        ]);
        lists[AlgorithmCategory::HostKey as usize] = names(&["ssh-dss", "ssh-rsa"]);
        lists[AlgorithmCategory::EncryptionClientToServer as usize] =
            names(&["aes256-ctr", "aes192-ctr", "aes128-ctr"]);
        lists[AlgorithmCategory::EncryptionServerToClient as usize] =
            names(&["aes256-ctr", "aes192-ctr", "aes128-ctr"]);
        lists[AlgorithmCategory::MacClientToServer as usize] =
            names(&["hmac-sha2-256", "hmac-sha1"]);
        lists[AlgorithmCategory::MacServerToClient as usize] =
            names(&["hmac-sha2-256", "hmac-sha1"]);
        lists[AlgorithmCategory::CompressionClientToServer as usize] = names(&["none"]);
        lists[AlgorithmCategory::CompressionServerToClient as usize] = names(&["none"]);
        // Language lists stay empty.

        Self { lists }
    }

    /// Returns the list for a category.
    pub fn get(&self, category: AlgorithmCategory) -> &[String] {
        &self.lists[category as usize]
    }

    /// Overrides the list for a category.
    pub fn set(&mut self, category: AlgorithmCategory, names: Vec<String>) {
        self.lists[category as usize] = names;
    }

    /// Restricts the host-key list to the key types actually loaded,
    /// `ssh-dss` before `ssh-rsa` when both are present.
    pub fn set_host_key_algorithms(&mut self, has_dss: bool, has_rsa: bool) {
        let mut names = Vec::new();
        if has_dss {
            names.push("ssh-dss".to_string());
        }
        if has_rsa {
            names.push("ssh-rsa".to_string());
        }
        self.set(AlgorithmCategory::HostKey, names);
    }
}

impl Default for AlgorithmPreferences {
    fn default() -> Self {
        Self::supported()
    }
}

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    /// Random cookie (16 bytes)
    cookie: [u8; 16],
    /// The ten name-lists, in wire order
    lists: [Vec<String>; ALGORITHM_CATEGORY_COUNT],
    /// First KEX packet follows
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Creates a KEXINIT from a preference table with a fresh random cookie.
    pub fn from_preferences(preferences: &AlgorithmPreferences) -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        Self {
            cookie,
            lists: preferences.lists.clone(),
            first_kex_packet_follows: false,
        }
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the name-list for a category.
    pub fn algorithms(&self, category: AlgorithmCategory) -> &[String] {
        &self.lists[category as usize]
    }

    /// Returns whether a guessed first KEX packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Serializes the KEXINIT message (without packet framing).
    ///
    /// Format (RFC 4253 Section 7.1):
    /// ```text
    /// byte         SSH_MSG_KEXINIT (20)
    /// byte[16]     cookie (random bytes)
    /// name-list    x10 (kex, host key, enc x2, mac x2, compression x2, languages x2)
    /// boolean      first_kex_packet_follows
    /// uint32       0 (reserved)
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::KexInit as u8);
        buf.put_slice(&self.cookie);

        for list in &self.lists {
            write_name_list(&mut buf, list);
        }

        buf.put_u8(u8::from(self.first_kex_packet_follows));
        buf.put_u32(0);

        buf.to_vec()
    }

    /// Parses a KEXINIT message.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] if the message type is wrong, a
    /// name-list is truncated, or the trailing flag/reserved field is
    /// missing.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() {
            return Err(MoorageError::Protocol("KEXINIT message is empty".to_string()));
        }

        if data[0] != MessageType::KexInit as u8 {
            return Err(MoorageError::Protocol(format!(
                "Invalid message type: expected 20 (SSH_MSG_KEXINIT), got {}",
                data[0]
            )));
        }

        if data.len() < 17 {
            return Err(MoorageError::Protocol(format!(
                "KEXINIT message too short: {} bytes (minimum 17)",
                data.len()
            )));
        }

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(&data[1..17]);

        let mut offset = 17;
        let mut lists: [Vec<String>; ALGORITHM_CATEGORY_COUNT] = Default::default();
        for list in lists.iter_mut() {
            *list = read_name_list(data, &mut offset)?;
        }

        let first_kex_packet_follows = wire::read_bool(data, &mut offset).map_err(|_| {
            MoorageError::Protocol(
                "KEXINIT message truncated (missing first_kex_packet_follows)".to_string(),
            )
        })?;

        wire::read_u32(data, &mut offset).map_err(|_| {
            MoorageError::Protocol("KEXINIT message truncated (missing reserved field)".to_string())
        })?;

        Ok(Self {
            cookie,
            lists,
            first_kex_packet_follows,
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// Signals that subsequent packets in that direction use the newly
/// negotiated keys. The packet sequence number is NOT reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the NEWKEYS message (a single byte, 21).
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses a NEWKEYS message.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() {
            return Err(MoorageError::Protocol("NEWKEYS message is empty".to_string()));
        }

        if data[0] != MessageType::NewKeys as u8 {
            return Err(MoorageError::Protocol(format!(
                "Invalid message type: expected 21 (SSH_MSG_NEWKEYS), got {}",
                data[0]
            )));
        }

        Ok(Self)
    }
}

/// The outcome of negotiating every KEXINIT category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    chosen: [String; ALGORITHM_CATEGORY_COUNT],
}

impl NegotiatedAlgorithms {
    /// Intersects the client's and server's KEXINIT lists.
    ///
    /// Per category the first name in the client's list that the server
    /// also offers wins. Language lists are allowed to negotiate to the
    /// empty selection when the client offers none; every other empty
    /// intersection is an error.
    pub fn negotiate(client: &KexInit, server: &KexInit) -> MoorageResult<Self> {
        let mut chosen: [String; ALGORITHM_CATEGORY_COUNT] = Default::default();

        for category in AlgorithmCategory::ALL {
            let client_list = client.algorithms(category);
            let server_list = server.algorithms(category);

            if category.is_language() && client_list.is_empty() {
                continue;
            }

            chosen[category as usize] =
                negotiate_algorithm(client_list, server_list).map_err(|_| {
                    MoorageError::Protocol(format!(
                        "No common {} algorithm: client={:?}, server={:?}",
                        category.label(),
                        client_list,
                        server_list
                    ))
                })?;
        }

        Ok(Self { chosen })
    }

    /// Returns the chosen name for a category.
    pub fn get(&self, category: AlgorithmCategory) -> &str {
        &self.chosen[category as usize]
    }

    /// Chosen key exchange algorithm.
    pub fn kex(&self) -> &str {
        self.get(AlgorithmCategory::Kex)
    }

    /// Chosen host key algorithm.
    pub fn host_key(&self) -> &str {
        self.get(AlgorithmCategory::HostKey)
    }

    /// Chosen client-to-server cipher.
    pub fn cipher_client_to_server(&self) -> &str {
        self.get(AlgorithmCategory::EncryptionClientToServer)
    }

    /// Chosen server-to-client cipher.
    pub fn cipher_server_to_client(&self) -> &str {
        self.get(AlgorithmCategory::EncryptionServerToClient)
    }

    /// Chosen client-to-server MAC.
    pub fn mac_client_to_server(&self) -> &str {
        self.get(AlgorithmCategory::MacClientToServer)
    }

    /// Chosen server-to-client MAC.
    pub fn mac_server_to_client(&self) -> &str {
        self.get(AlgorithmCategory::MacServerToClient)
    }
}

/// Negotiates one algorithm category (RFC 4253 Section 7.1).
///
/// Returns the first name in the client's list that also appears in the
/// server's list.
///
/// # Errors
///
/// Returns [`MoorageError::Protocol`] if there is no common algorithm.
///
/// # Example
///
/// ```rust
/// use moorage_proto::ssh::kex::negotiate_algorithm;
///
/// let client = vec!["aes256-ctr".to_string(), "aes128-ctr".to_string()];
/// let server = vec!["aes128-ctr".to_string(), "aes256-ctr".to_string()];
///
/// let chosen = negotiate_algorithm(&client, &server).unwrap();
/// assert_eq!(chosen, "aes256-ctr");
/// ```
pub fn negotiate_algorithm(client_list: &[String], server_list: &[String]) -> MoorageResult<String> {
    for client_alg in client_list {
        if server_list.contains(client_alg) {
            return Ok(client_alg.clone());
        }
    }

    Err(MoorageError::Protocol(format!(
        "No common algorithm: client={:?}, server={:?}",
        client_list, server_list
    )))
}

/// Writes a name-list (RFC 4251 Section 5): uint32 length + comma-joined names.
fn write_name_list(buf: &mut BytesMut, names: &[String]) {
    let list = names.join(",");
    wire::write_bytes(buf, list.as_bytes());
}

/// Reads a name-list (RFC 4251 Section 5).
fn read_name_list(data: &[u8], offset: &mut usize) -> MoorageResult<Vec<String>> {
    let list = wire::read_string(data, offset)
        .map_err(|_| MoorageError::Protocol(format!("Cannot read name-list at offset {}", offset)))?;

    if list.is_empty() {
        Ok(vec![])
    } else {
        Ok(list.split(',').map(String::from).collect())
    }
}
