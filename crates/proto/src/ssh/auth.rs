//! SSH user authentication messages (RFC 4252).
//!
//! The server side of this core never decides authentication policy; it
//! parses USERAUTH_REQUEST into a record the application inspects, and
//! provides the replies: failure (with the advertised method list), success,
//! PK_OK for publickey probes, and the optional banner.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::auth::{AuthMethod, AuthRequest};
//!
//! let request = AuthRequest::new("alice", "ssh-connection", AuthMethod::None);
//! let parsed = AuthRequest::from_bytes(&request.to_bytes()).unwrap();
//! assert_eq!(parsed.user_name(), "alice");
//! ```

use std::ops::{BitOr, BitOrAssign};

use bytes::{BufMut, BytesMut};
use moorage_platform::{MoorageError, MoorageResult};
use zeroize::Zeroize;

use crate::ssh::message::MessageType;
use crate::ssh::wire;

/// Bitmask of authentication methods a server advertises.
///
/// # Example
///
/// ```rust
/// use moorage_proto::ssh::auth::AuthMethods;
///
/// let methods = AuthMethods::default();
/// assert_eq!(methods.to_name_list(), "publickey,password");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthMethods(u32);

impl AuthMethods {
    /// No methods.
    pub const NONE: AuthMethods = AuthMethods(0);
    /// Public key authentication.
    pub const PUBLICKEY: AuthMethods = AuthMethods(0x01);
    /// Password authentication.
    pub const PASSWORD: AuthMethods = AuthMethods(0x02);
    /// Keyboard-interactive authentication.
    pub const KEYBOARD_INTERACTIVE: AuthMethods = AuthMethods(0x04);
    /// Host-based authentication.
    pub const HOSTBASED: AuthMethods = AuthMethods(0x08);

    /// Creates a mask from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        AuthMethods(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether all bits of `other` are set.
    pub const fn contains(&self, other: AuthMethods) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the method names whose bits are set, in advertisement order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::PUBLICKEY) {
            names.push("publickey");
        }
        if self.contains(Self::KEYBOARD_INTERACTIVE) {
            names.push("keyboard-interactive");
        }
        if self.contains(Self::PASSWORD) {
            names.push("password");
        }
        if self.contains(Self::HOSTBASED) {
            names.push("hostbased");
        }
        names
    }

    /// Renders the comma-separated name-list (no trailing comma).
    pub fn to_name_list(&self) -> String {
        self.names().join(",")
    }
}

impl Default for AuthMethods {
    /// `publickey | password`, the advertisement used when the application
    /// has not narrowed the mask.
    fn default() -> Self {
        Self::PUBLICKEY | Self::PASSWORD
    }
}

impl BitOr for AuthMethods {
    type Output = AuthMethods;

    fn bitor(self, rhs: AuthMethods) -> AuthMethods {
        AuthMethods(self.0 | rhs.0)
    }
}

impl BitOrAssign for AuthMethods {
    fn bitor_assign(&mut self, rhs: AuthMethods) {
        self.0 |= rhs.0;
    }
}

/// Verification state of a publickey authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublickeySignatureState {
    /// No signature present (probe phase).
    None,
    /// Signature present and valid for the session.
    Valid,
    /// Signature present but wrong.
    Wrong,
}

/// SSH authentication method carried by a USERAUTH_REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication (state probe).
    None,
    /// Password authentication.
    Password(String),
    /// Public key authentication.
    PublicKey {
        /// Algorithm name (e.g. "ssh-rsa")
        algorithm: String,
        /// Public key blob
        public_key: Vec<u8>,
        /// Signature blob, present in the sign phase
        signature: Option<Vec<u8>>,
    },
}

impl AuthMethod {
    /// Returns the method name.
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password(_) => "password",
            AuthMethod::PublicKey { .. } => "publickey",
        }
    }
}

impl Drop for AuthMethod {
    fn drop(&mut self) {
        if let AuthMethod::Password(ref mut password) = self {
            password.zeroize();
        }
    }
}

/// SSH_MSG_USERAUTH_REQUEST message (RFC 4252 Section 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// User name
    user_name: String,
    /// Service name (usually "ssh-connection")
    service_name: String,
    /// Authentication method
    method: AuthMethod,
}

impl AuthRequest {
    /// Creates a new authentication request.
    pub fn new(user_name: &str, service_name: &str, method: AuthMethod) -> Self {
        Self {
            user_name: user_name.to_string(),
            service_name: service_name.to_string(),
            method,
        }
    }

    /// Returns the user name.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the authentication method.
    pub fn method(&self) -> &AuthMethod {
        &self.method
    }

    /// Returns the password for a password request.
    pub fn password(&self) -> Option<&str> {
        match &self.method {
            AuthMethod::Password(password) => Some(password),
            _ => None,
        }
    }

    /// Returns the public key blob for a publickey request.
    pub fn public_key(&self) -> Option<&[u8]> {
        match &self.method {
            AuthMethod::PublicKey { public_key, .. } => Some(public_key),
            _ => None,
        }
    }

    /// Serializes the request.
    ///
    /// Format (RFC 4252 Section 5):
    /// ```text
    /// byte      SSH_MSG_USERAUTH_REQUEST (50)
    /// string    user name
    /// string    service name
    /// string    method name
    /// ....      method specific fields
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::UserauthRequest as u8);
        wire::write_string(&mut buf, &self.user_name);
        wire::write_string(&mut buf, &self.service_name);
        wire::write_string(&mut buf, self.method.name());

        match &self.method {
            AuthMethod::None => {}
            AuthMethod::Password(password) => {
                // boolean FALSE (not changing the password)
                buf.put_u8(0);
                wire::write_string(&mut buf, password);
            }
            AuthMethod::PublicKey {
                algorithm,
                public_key,
                signature,
            } => {
                buf.put_u8(u8::from(signature.is_some()));
                wire::write_string(&mut buf, algorithm);
                wire::write_bytes(&mut buf, public_key);
                if let Some(sig) = signature {
                    wire::write_bytes(&mut buf, sig);
                }
            }
        }

        buf.to_vec()
    }

    /// Parses a USERAUTH_REQUEST.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] for malformed requests or an
    /// unsupported method name.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() {
            return Err(MoorageError::Protocol(
                "USERAUTH_REQUEST message is empty".to_string(),
            ));
        }

        if data[0] != MessageType::UserauthRequest as u8 {
            return Err(MoorageError::Protocol(format!(
                "Invalid message type: expected 50 (SSH_MSG_USERAUTH_REQUEST), got {}",
                data[0]
            )));
        }

        let mut offset = 1;
        let user_name = wire::read_string(data, &mut offset)?;
        let service_name = wire::read_string(data, &mut offset)?;
        let method_name = wire::read_string(data, &mut offset)?;

        let method = match method_name.as_str() {
            "none" => AuthMethod::None,
            "password" => {
                let _changing = wire::read_bool(data, &mut offset)?;
                let password = wire::read_string(data, &mut offset)?;
                AuthMethod::Password(password)
            }
            "publickey" => {
                let has_signature = wire::read_bool(data, &mut offset)?;
                let algorithm = wire::read_string(data, &mut offset)?;
                let public_key = wire::read_bytes(data, &mut offset)?;
                let signature = if has_signature {
                    Some(wire::read_bytes(data, &mut offset)?)
                } else {
                    None
                };

                AuthMethod::PublicKey {
                    algorithm,
                    public_key,
                    signature,
                }
            }
            _ => {
                return Err(MoorageError::Protocol(format!(
                    "Unsupported authentication method: '{}'",
                    method_name
                )))
            }
        };

        Ok(Self {
            user_name,
            service_name,
            method,
        })
    }
}

/// SSH_MSG_USERAUTH_FAILURE message (RFC 4252 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Authentications that can continue
    methods_can_continue: Vec<String>,
    /// Partial success flag
    partial_success: bool,
}

impl AuthFailure {
    /// Creates a failure reply advertising `methods`.
    pub fn new(methods: Vec<String>, partial_success: bool) -> Self {
        Self {
            methods_can_continue: methods,
            partial_success,
        }
    }

    /// Creates a failure reply from an [`AuthMethods`] mask.
    pub fn from_methods(methods: AuthMethods, partial_success: bool) -> Self {
        Self {
            methods_can_continue: methods.names().iter().map(|s| s.to_string()).collect(),
            partial_success,
        }
    }

    /// Returns the methods that can continue.
    pub fn methods_can_continue(&self) -> &[String] {
        &self.methods_can_continue
    }

    /// Returns the partial success flag.
    pub fn partial_success(&self) -> bool {
        self.partial_success
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::UserauthFailure as u8);
        wire::write_string(&mut buf, &self.methods_can_continue.join(","));
        buf.put_u8(u8::from(self.partial_success));

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::UserauthFailure as u8 {
            return Err(MoorageError::Protocol(
                "Invalid USERAUTH_FAILURE message".to_string(),
            ));
        }

        let mut offset = 1;
        let methods = wire::read_string(data, &mut offset)?;
        let partial_success = wire::read_bool(data, &mut offset)?;

        let methods_can_continue = if methods.is_empty() {
            vec![]
        } else {
            methods.split(',').map(String::from).collect()
        };

        Ok(Self {
            methods_can_continue,
            partial_success,
        })
    }
}

/// SSH_MSG_USERAUTH_SUCCESS message (RFC 4252 Section 5.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthSuccess;

impl AuthSuccess {
    /// Creates the success reply.
    pub fn new() -> Self {
        Self
    }

    /// Serializes to bytes (a single byte, 52).
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::UserauthSuccess as u8]
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::UserauthSuccess as u8 {
            return Err(MoorageError::Protocol(
                "Invalid USERAUTH_SUCCESS message".to_string(),
            ));
        }
        Ok(Self)
    }
}

/// SSH_MSG_USERAUTH_BANNER message (RFC 4252 Section 5.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthBanner {
    /// Banner text
    message: String,
    /// Language tag (usually empty)
    language_tag: String,
}

impl AuthBanner {
    /// Creates a banner message.
    pub fn new(message: String) -> Self {
        Self {
            message,
            language_tag: String::new(),
        }
    }

    /// Returns the banner text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::UserauthBanner as u8);
        wire::write_string(&mut buf, &self.message);
        wire::write_string(&mut buf, &self.language_tag);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::UserauthBanner as u8 {
            return Err(MoorageError::Protocol(
                "Invalid USERAUTH_BANNER message".to_string(),
            ));
        }

        let mut offset = 1;
        let message = wire::read_string(data, &mut offset)?;
        let language_tag = wire::read_string(data, &mut offset)?;

        Ok(Self {
            message,
            language_tag,
        })
    }
}

/// SSH_MSG_USERAUTH_PK_OK message (RFC 4252 Section 7).
///
/// Answers a signatureless publickey probe: the key would be acceptable,
/// send a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPkOk {
    /// Public key algorithm name
    algorithm: String,
    /// Public key blob
    public_key: Vec<u8>,
}

impl AuthPkOk {
    /// Creates a PK_OK reply.
    pub fn new(algorithm: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            public_key,
        }
    }

    /// Returns the algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the public key blob.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Serializes to bytes.
    ///
    /// Format (RFC 4252 Section 7):
    /// ```text
    /// byte      SSH_MSG_USERAUTH_PK_OK (60)
    /// string    public key algorithm name
    /// string    public key blob
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::UserauthPkOk as u8);
        wire::write_string(&mut buf, &self.algorithm);
        wire::write_bytes(&mut buf, &self.public_key);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::UserauthPkOk as u8 {
            return Err(MoorageError::Protocol(
                "Invalid USERAUTH_PK_OK message".to_string(),
            ));
        }

        let mut offset = 1;
        let algorithm = wire::read_string(data, &mut offset)?;
        let public_key = wire::read_bytes(data, &mut offset)?;

        Ok(Self {
            algorithm,
            public_key,
        })
    }
}

/// Constructs the blob a publickey signature covers (RFC 4252 Section 7).
///
/// ```text
/// string    session identifier
/// byte      SSH_MSG_USERAUTH_REQUEST (50)
/// string    user name
/// string    service name
/// string    "publickey"
/// boolean   TRUE
/// string    public key algorithm name
/// string    public key blob
/// ```
pub fn construct_signature_data(
    session_id: &[u8],
    user_name: &str,
    service_name: &str,
    algorithm: &str,
    public_key_blob: &[u8],
) -> Vec<u8> {
    let mut buf = BytesMut::new();

    wire::write_bytes(&mut buf, session_id);
    buf.put_u8(MessageType::UserauthRequest as u8);
    wire::write_string(&mut buf, user_name);
    wire::write_string(&mut buf, service_name);
    wire::write_string(&mut buf, "publickey");
    buf.put_u8(1);
    wire::write_string(&mut buf, algorithm);
    wire::write_bytes(&mut buf, public_key_blob);

    buf.to_vec()
}
