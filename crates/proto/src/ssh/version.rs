//! SSH identification banner (RFC 4253 Section 4.2).
//!
//! The SSH protocol begins with each side sending one identification line:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! Example: `SSH-2.0-moorage_0.1.0`
//!
//! A protocol version of `1.99` announces a server that speaks both SSH-1
//! and SSH-2; this core selects SSH-2 when the peer allows it and rejects
//! SSH-1-only peers outright.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::version::Banner;
//!
//! let banner = Banner::parse("SSH-2.0-OpenSSH_8.9\r\n").unwrap();
//! assert_eq!(banner.software(), "OpenSSH_8.9");
//! assert!(banner.supports_ssh2());
//! ```

use moorage_platform::{MoorageError, MoorageResult};

/// Maximum length of an identification line (RFC 4253 Section 4.2).
pub const MAX_BANNER_LENGTH: usize = 255;

/// One side's SSH identification banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Protocol version (e.g. "2.0")
    proto_version: String,
    /// Software version (e.g. "moorage_0.1.0")
    software_version: String,
    /// Optional comments
    comments: Option<String>,
}

impl Banner {
    /// Creates a new SSH-2.0 banner.
    ///
    /// # Example
    ///
    /// ```rust
    /// use moorage_proto::ssh::version::Banner;
    ///
    /// let banner = Banner::new("moorage_0.1.0", None);
    /// assert_eq!(banner.to_string(), "SSH-2.0-moorage_0.1.0");
    /// ```
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Parses an identification line (with or without the trailing CR LF).
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] if:
    /// - the line exceeds 255 bytes
    /// - the line contains a null byte
    /// - the line does not start with `SSH-`
    /// - the `SSH-x.y-software` structure is missing
    ///
    /// Any protocol version is accepted here; whether the peer is usable is
    /// decided by [`Banner::supports_ssh2`] / [`Banner::supports_ssh1`].
    pub fn parse(line: &str) -> MoorageResult<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line.len() > MAX_BANNER_LENGTH {
            return Err(MoorageError::Protocol(format!(
                "Banner too long: {} bytes (max {})",
                line.len(),
                MAX_BANNER_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(MoorageError::Protocol(
                "Banner contains null byte".to_string(),
            ));
        }

        if !line.starts_with("SSH-") {
            return Err(MoorageError::Protocol(format!(
                "Invalid banner: must start with 'SSH-', got '{}'",
                line
            )));
        }

        let parts: Vec<&str> = line.splitn(3, '-').collect();
        if parts.len() < 3 {
            return Err(MoorageError::Protocol(format!(
                "Invalid banner format: '{}'",
                line
            )));
        }

        let proto_version = parts[1];
        let rest = parts[2];

        let (software_version, comments) = match rest.find(' ') {
            Some(space_pos) => (
                rest[..space_pos].to_string(),
                Some(rest[space_pos + 1..].trim().to_string()),
            ),
            None => (rest.to_string(), None),
        };

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version (e.g. "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version (e.g. "OpenSSH_8.9").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Whether the peer can speak SSH-2 ("2.0", or "1.99" meaning both).
    pub fn supports_ssh2(&self) -> bool {
        self.proto_version == "2.0" || self.proto_version == "1.99"
    }

    /// Whether the peer can speak SSH-1 (any "1.x" version).
    pub fn supports_ssh1(&self) -> bool {
        self.proto_version.starts_with("1.")
    }

    /// Converts to wire format (with CR LF).
    ///
    /// # Example
    ///
    /// ```rust
    /// use moorage_proto::ssh::version::Banner;
    ///
    /// let banner = Banner::new("moorage_0.1.0", None);
    /// assert_eq!(banner.to_wire_format(), b"SSH-2.0-moorage_0.1.0\r\n");
    /// ```
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self).into_bytes()
    }
}

impl std::fmt::Display for Banner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}
