//! SSH channel establishment messages (RFC 4254).
//!
//! This core only *establishes* sessions: it parses CHANNEL_OPEN and
//! CHANNEL_REQUEST into records for the application and produces the
//! refusal/acknowledgement replies. Data flow on an open channel (windows,
//! payload, stderr) is out of scope.

use bytes::{BufMut, BytesMut};
use moorage_platform::{MoorageError, MoorageResult};

use crate::ssh::message::MessageType;
use crate::ssh::wire;

/// Channel type carried by CHANNEL_OPEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    /// Session channel (shell, exec, subsystem).
    Session,
    /// Direct TCP/IP channel (client-initiated port forwarding).
    DirectTcpip {
        /// Destination host to connect to
        destination: String,
        /// Destination port
        destination_port: u32,
        /// Originator address
        originator: String,
        /// Originator port
        originator_port: u32,
    },
    /// Forwarded TCP/IP channel (server-initiated port forwarding).
    ForwardedTcpip {
        /// Address the connection arrived on
        destination: String,
        /// Port the connection arrived on
        destination_port: u32,
        /// Originator address
        originator: String,
        /// Originator port
        originator_port: u32,
    },
}

impl ChannelType {
    /// Returns the channel type name.
    pub fn name(&self) -> &str {
        match self {
            ChannelType::Session => "session",
            ChannelType::DirectTcpip { .. } => "direct-tcpip",
            ChannelType::ForwardedTcpip { .. } => "forwarded-tcpip",
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN message (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    /// Channel type
    channel_type: ChannelType,
    /// Sender channel number (the peer's handle)
    sender_channel: u32,
    /// Initial window size
    initial_window_size: u32,
    /// Maximum packet size
    maximum_packet_size: u32,
}

impl ChannelOpen {
    /// Creates a channel open message.
    pub fn new(
        channel_type: ChannelType,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns the channel type.
    pub fn channel_type(&self) -> &ChannelType {
        &self.channel_type
    }

    /// Returns the sender channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the initial window size.
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Returns the maximum packet size.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Returns the originator address and port for forwarding channels.
    pub fn originator(&self) -> Option<(&str, u32)> {
        match &self.channel_type {
            ChannelType::DirectTcpip {
                originator,
                originator_port,
                ..
            }
            | ChannelType::ForwardedTcpip {
                originator,
                originator_port,
                ..
            } => Some((originator, *originator_port)),
            ChannelType::Session => None,
        }
    }

    /// Returns the destination address and port for forwarding channels.
    pub fn destination(&self) -> Option<(&str, u32)> {
        match &self.channel_type {
            ChannelType::DirectTcpip {
                destination,
                destination_port,
                ..
            }
            | ChannelType::ForwardedTcpip {
                destination,
                destination_port,
                ..
            } => Some((destination, *destination_port)),
            ChannelType::Session => None,
        }
    }

    /// Serializes to bytes.
    ///
    /// Format (RFC 4254 Section 5.1):
    /// ```text
    /// byte      SSH_MSG_CHANNEL_OPEN (90)
    /// string    channel type
    /// uint32    sender channel
    /// uint32    initial window size
    /// uint32    maximum packet size
    /// ....      channel type specific data
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::ChannelOpen as u8);
        wire::write_string(&mut buf, self.channel_type.name());
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);

        match &self.channel_type {
            ChannelType::Session => {}
            ChannelType::DirectTcpip {
                destination,
                destination_port,
                originator,
                originator_port,
            }
            | ChannelType::ForwardedTcpip {
                destination,
                destination_port,
                originator,
                originator_port,
            } => {
                wire::write_string(&mut buf, destination);
                buf.put_u32(*destination_port);
                wire::write_string(&mut buf, originator);
                buf.put_u32(*originator_port);
            }
        }

        buf.to_vec()
    }

    /// Parses from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] for malformed messages or an
    /// unknown channel type.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ChannelOpen as u8 {
            return Err(MoorageError::Protocol(
                "Invalid CHANNEL_OPEN message".to_string(),
            ));
        }

        let mut offset = 1;
        let type_name = wire::read_string(data, &mut offset)?;
        let sender_channel = wire::read_u32(data, &mut offset)?;
        let initial_window_size = wire::read_u32(data, &mut offset)?;
        let maximum_packet_size = wire::read_u32(data, &mut offset)?;

        let channel_type = match type_name.as_str() {
            "session" => ChannelType::Session,
            "direct-tcpip" => {
                let destination = wire::read_string(data, &mut offset)?;
                let destination_port = wire::read_u32(data, &mut offset)?;
                let originator = wire::read_string(data, &mut offset)?;
                let originator_port = wire::read_u32(data, &mut offset)?;
                ChannelType::DirectTcpip {
                    destination,
                    destination_port,
                    originator,
                    originator_port,
                }
            }
            "forwarded-tcpip" => {
                let destination = wire::read_string(data, &mut offset)?;
                let destination_port = wire::read_u32(data, &mut offset)?;
                let originator = wire::read_string(data, &mut offset)?;
                let originator_port = wire::read_u32(data, &mut offset)?;
                ChannelType::ForwardedTcpip {
                    destination,
                    destination_port,
                    originator,
                    originator_port,
                }
            }
            _ => {
                return Err(MoorageError::Protocol(format!(
                    "Unsupported channel type: '{}'",
                    type_name
                )))
            }
        };

        Ok(Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        })
    }
}

/// SSH_MSG_CHANNEL_OPEN_CONFIRMATION message (RFC 4254 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOpenConfirmation {
    /// Recipient channel (the opener's sender channel)
    recipient_channel: u32,
    /// Our channel number
    sender_channel: u32,
    /// Initial window size
    initial_window_size: u32,
    /// Maximum packet size
    maximum_packet_size: u32,
}

impl ChannelOpenConfirmation {
    /// Creates a confirmation reply.
    pub fn new(
        recipient_channel: u32,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            recipient_channel,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the sender channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::ChannelOpenConfirmation as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ChannelOpenConfirmation as u8 {
            return Err(MoorageError::Protocol(
                "Invalid CHANNEL_OPEN_CONFIRMATION message".to_string(),
            ));
        }

        let mut offset = 1;
        Ok(Self {
            recipient_channel: wire::read_u32(data, &mut offset)?,
            sender_channel: wire::read_u32(data, &mut offset)?,
            initial_window_size: wire::read_u32(data, &mut offset)?,
            maximum_packet_size: wire::read_u32(data, &mut offset)?,
        })
    }
}

/// Reason codes for CHANNEL_OPEN_FAILURE (RFC 4254 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelOpenFailureReason {
    /// Administratively prohibited
    AdministrativelyProhibited = 1,
    /// Connect failed
    ConnectFailed = 2,
    /// Unknown channel type
    UnknownChannelType = 3,
    /// Resource shortage
    ResourceShortage = 4,
}

impl ChannelOpenFailureReason {
    /// Parses a reason code.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(ChannelOpenFailureReason::AdministrativelyProhibited),
            2 => Some(ChannelOpenFailureReason::ConnectFailed),
            3 => Some(ChannelOpenFailureReason::UnknownChannelType),
            4 => Some(ChannelOpenFailureReason::ResourceShortage),
            _ => None,
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN_FAILURE message (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenFailure {
    /// Recipient channel (the opener's sender channel)
    recipient_channel: u32,
    /// Reason code
    reason: ChannelOpenFailureReason,
    /// Human-readable description (may be empty)
    description: String,
    /// Language tag (may be empty)
    language_tag: String,
}

impl ChannelOpenFailure {
    /// Creates a failure reply with empty description and language.
    pub fn new(recipient_channel: u32, reason: ChannelOpenFailureReason) -> Self {
        Self {
            recipient_channel,
            reason,
            description: String::new(),
            language_tag: String::new(),
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the reason code.
    pub fn reason(&self) -> ChannelOpenFailureReason {
        self.reason
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::ChannelOpenFailure as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.reason as u32);
        wire::write_string(&mut buf, &self.description);
        wire::write_string(&mut buf, &self.language_tag);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ChannelOpenFailure as u8 {
            return Err(MoorageError::Protocol(
                "Invalid CHANNEL_OPEN_FAILURE message".to_string(),
            ));
        }

        let mut offset = 1;
        let recipient_channel = wire::read_u32(data, &mut offset)?;
        let reason_code = wire::read_u32(data, &mut offset)?;
        let reason = ChannelOpenFailureReason::from_u32(reason_code).ok_or_else(|| {
            MoorageError::Protocol(format!("Unknown channel open failure reason {}", reason_code))
        })?;
        let description = wire::read_string(data, &mut offset)?;
        let language_tag = wire::read_string(data, &mut offset)?;

        Ok(Self {
            recipient_channel,
            reason,
            description,
            language_tag,
        })
    }
}

/// Channel request payload (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequestType {
    /// Pseudoterminal allocation
    PtyReq {
        /// Terminal type from the TERM environment variable
        term: String,
        /// Terminal width in characters
        width_chars: u32,
        /// Terminal height in rows
        height_rows: u32,
        /// Terminal width in pixels
        width_pixels: u32,
        /// Terminal height in pixels
        height_pixels: u32,
        /// Encoded terminal modes
        modes: Vec<u8>,
    },
    /// Environment variable
    Env {
        /// Variable name
        name: String,
        /// Variable value
        value: String,
    },
    /// Execute a command
    Exec {
        /// Command line to execute
        command: String,
    },
    /// Start an interactive shell
    Shell,
    /// Start a subsystem (e.g. "sftp")
    Subsystem {
        /// Subsystem name
        name: String,
    },
    /// Terminal dimensions changed
    WindowChange {
        /// Terminal width in characters
        width_chars: u32,
        /// Terminal height in rows
        height_rows: u32,
        /// Terminal width in pixels
        width_pixels: u32,
        /// Terminal height in pixels
        height_pixels: u32,
    },
}

impl ChannelRequestType {
    /// Returns the request type name.
    pub fn name(&self) -> &str {
        match self {
            ChannelRequestType::PtyReq { .. } => "pty-req",
            ChannelRequestType::Env { .. } => "env",
            ChannelRequestType::Exec { .. } => "exec",
            ChannelRequestType::Shell => "shell",
            ChannelRequestType::Subsystem { .. } => "subsystem",
            ChannelRequestType::WindowChange { .. } => "window-change",
        }
    }
}

/// SSH_MSG_CHANNEL_REQUEST message (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    /// Recipient channel number
    recipient_channel: u32,
    /// Request payload
    request_type: ChannelRequestType,
    /// Want reply flag
    want_reply: bool,
}

impl ChannelRequest {
    /// Creates a channel request.
    pub fn new(recipient_channel: u32, request_type: ChannelRequestType, want_reply: bool) -> Self {
        Self {
            recipient_channel,
            request_type,
            want_reply,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the request payload.
    pub fn request_type(&self) -> &ChannelRequestType {
        &self.request_type
    }

    /// Returns whether the peer wants a reply.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Returns the TERM value for a pty-req.
    pub fn pty_term(&self) -> Option<&str> {
        match &self.request_type {
            ChannelRequestType::PtyReq { term, .. } => Some(term),
            _ => None,
        }
    }

    /// Returns the exec command line.
    pub fn exec_command(&self) -> Option<&str> {
        match &self.request_type {
            ChannelRequestType::Exec { command } => Some(command),
            _ => None,
        }
    }

    /// Returns the subsystem name.
    pub fn subsystem_name(&self) -> Option<&str> {
        match &self.request_type {
            ChannelRequestType::Subsystem { name } => Some(name),
            _ => None,
        }
    }

    /// Returns the env name/value pair.
    pub fn env(&self) -> Option<(&str, &str)> {
        match &self.request_type {
            ChannelRequestType::Env { name, value } => Some((name, value)),
            _ => None,
        }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::ChannelRequest as u8);
        buf.put_u32(self.recipient_channel);
        wire::write_string(&mut buf, self.request_type.name());
        buf.put_u8(u8::from(self.want_reply));

        match &self.request_type {
            ChannelRequestType::PtyReq {
                term,
                width_chars,
                height_rows,
                width_pixels,
                height_pixels,
                modes,
            } => {
                wire::write_string(&mut buf, term);
                buf.put_u32(*width_chars);
                buf.put_u32(*height_rows);
                buf.put_u32(*width_pixels);
                buf.put_u32(*height_pixels);
                wire::write_bytes(&mut buf, modes);
            }
            ChannelRequestType::Env { name, value } => {
                wire::write_string(&mut buf, name);
                wire::write_string(&mut buf, value);
            }
            ChannelRequestType::Exec { command } => {
                wire::write_string(&mut buf, command);
            }
            ChannelRequestType::Shell => {}
            ChannelRequestType::Subsystem { name } => {
                wire::write_string(&mut buf, name);
            }
            ChannelRequestType::WindowChange {
                width_chars,
                height_rows,
                width_pixels,
                height_pixels,
            } => {
                buf.put_u32(*width_chars);
                buf.put_u32(*height_rows);
                buf.put_u32(*width_pixels);
                buf.put_u32(*height_pixels);
            }
        }

        buf.to_vec()
    }

    /// Parses from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] for malformed messages or an
    /// unknown request type.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ChannelRequest as u8 {
            return Err(MoorageError::Protocol(
                "Invalid CHANNEL_REQUEST message".to_string(),
            ));
        }

        let mut offset = 1;
        let recipient_channel = wire::read_u32(data, &mut offset)?;
        let request_name = wire::read_string(data, &mut offset)?;
        let want_reply = wire::read_bool(data, &mut offset)?;

        let request_type = match request_name.as_str() {
            "pty-req" => ChannelRequestType::PtyReq {
                term: wire::read_string(data, &mut offset)?,
                width_chars: wire::read_u32(data, &mut offset)?,
                height_rows: wire::read_u32(data, &mut offset)?,
                width_pixels: wire::read_u32(data, &mut offset)?,
                height_pixels: wire::read_u32(data, &mut offset)?,
                modes: wire::read_bytes(data, &mut offset)?,
            },
            "env" => ChannelRequestType::Env {
                name: wire::read_string(data, &mut offset)?,
                value: wire::read_string(data, &mut offset)?,
            },
            "exec" => ChannelRequestType::Exec {
                command: wire::read_string(data, &mut offset)?,
            },
            "shell" => ChannelRequestType::Shell,
            "subsystem" => ChannelRequestType::Subsystem {
                name: wire::read_string(data, &mut offset)?,
            },
            "window-change" => ChannelRequestType::WindowChange {
                width_chars: wire::read_u32(data, &mut offset)?,
                height_rows: wire::read_u32(data, &mut offset)?,
                width_pixels: wire::read_u32(data, &mut offset)?,
                height_pixels: wire::read_u32(data, &mut offset)?,
            },
            _ => {
                return Err(MoorageError::Protocol(format!(
                    "Unsupported channel request type: '{}'",
                    request_name
                )))
            }
        };

        Ok(Self {
            recipient_channel,
            request_type,
            want_reply,
        })
    }
}

/// SSH_MSG_CHANNEL_SUCCESS message (RFC 4254 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSuccess {
    /// Recipient channel number
    recipient_channel: u32,
}

impl ChannelSuccess {
    /// Creates a success reply.
    pub fn new(recipient_channel: u32) -> Self {
        Self { recipient_channel }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelSuccess as u8);
        buf.put_u32(self.recipient_channel);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ChannelSuccess as u8 {
            return Err(MoorageError::Protocol(
                "Invalid CHANNEL_SUCCESS message".to_string(),
            ));
        }

        let mut offset = 1;
        Ok(Self {
            recipient_channel: wire::read_u32(data, &mut offset)?,
        })
    }
}

/// SSH_MSG_CHANNEL_FAILURE message (RFC 4254 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFailure {
    /// Recipient channel number
    recipient_channel: u32,
}

impl ChannelFailure {
    /// Creates a failure reply.
    pub fn new(recipient_channel: u32) -> Self {
        Self { recipient_channel }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelFailure as u8);
        buf.put_u32(self.recipient_channel);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ChannelFailure as u8 {
            return Err(MoorageError::Protocol(
                "Invalid CHANNEL_FAILURE message".to_string(),
            ));
        }

        let mut offset = 1;
        Ok(Self {
            recipient_channel: wire::read_u32(data, &mut offset)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_open_session_round_trip() {
        let open = ChannelOpen::new(ChannelType::Session, 7, 2097152, 32768);
        let bytes = open.to_bytes();
        assert_eq!(bytes[0], 90);

        let parsed = ChannelOpen::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.sender_channel(), 7);
        assert_eq!(parsed.initial_window_size(), 2097152);
        assert_eq!(parsed.maximum_packet_size(), 32768);
        assert_eq!(parsed.channel_type().name(), "session");
        assert!(parsed.originator().is_none());
    }

    #[test]
    fn test_channel_open_direct_tcpip_round_trip() {
        let open = ChannelOpen::new(
            ChannelType::DirectTcpip {
                destination: "10.0.0.5".to_string(),
                destination_port: 80,
                originator: "192.168.1.2".to_string(),
                originator_port: 52611,
            },
            3,
            1048576,
            16384,
        );

        let parsed = ChannelOpen::from_bytes(&open.to_bytes()).unwrap();
        assert_eq!(parsed.destination(), Some(("10.0.0.5", 80)));
        assert_eq!(parsed.originator(), Some(("192.168.1.2", 52611)));
    }

    #[test]
    fn test_channel_open_unknown_type() {
        let mut buf = BytesMut::new();
        buf.put_u8(90);
        wire::write_string(&mut buf, "x11");
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(0);

        assert!(ChannelOpen::from_bytes(&buf).is_err());
    }

    #[test]
    fn test_channel_open_failure_wire_layout() {
        let failure =
            ChannelOpenFailure::new(7, ChannelOpenFailureReason::AdministrativelyProhibited);
        let bytes = failure.to_bytes();

        // byte 92, recipient 7, reason 1, empty description, empty language
        assert_eq!(
            bytes,
            vec![92, 0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_channel_open_failure_round_trip() {
        let failure =
            ChannelOpenFailure::new(9, ChannelOpenFailureReason::UnknownChannelType);
        let parsed = ChannelOpenFailure::from_bytes(&failure.to_bytes()).unwrap();

        assert_eq!(parsed.recipient_channel(), 9);
        assert_eq!(parsed.reason(), ChannelOpenFailureReason::UnknownChannelType);
        assert_eq!(parsed.description(), "");
    }

    #[test]
    fn test_channel_open_confirmation_round_trip() {
        let confirmation = ChannelOpenConfirmation::new(7, 0, 2097152, 32768);
        let parsed = ChannelOpenConfirmation::from_bytes(&confirmation.to_bytes()).unwrap();

        assert_eq!(parsed.recipient_channel(), 7);
        assert_eq!(parsed.sender_channel(), 0);
    }

    #[test]
    fn test_channel_request_pty_round_trip() {
        let request = ChannelRequest::new(
            0,
            ChannelRequestType::PtyReq {
                term: "xterm-256color".to_string(),
                width_chars: 80,
                height_rows: 24,
                width_pixels: 640,
                height_pixels: 480,
                modes: vec![0],
            },
            true,
        );

        let parsed = ChannelRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.pty_term(), Some("xterm-256color"));
        assert!(parsed.want_reply());
        match parsed.request_type() {
            ChannelRequestType::PtyReq {
                width_chars,
                height_rows,
                ..
            } => {
                assert_eq!(*width_chars, 80);
                assert_eq!(*height_rows, 24);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_channel_request_exec_round_trip() {
        let request = ChannelRequest::new(
            2,
            ChannelRequestType::Exec {
                command: "uname -a".to_string(),
            },
            true,
        );

        let parsed = ChannelRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.exec_command(), Some("uname -a"));
        assert_eq!(parsed.recipient_channel(), 2);
    }

    #[test]
    fn test_channel_request_env_and_subsystem() {
        let env = ChannelRequest::new(
            0,
            ChannelRequestType::Env {
                name: "LANG".to_string(),
                value: "C.UTF-8".to_string(),
            },
            false,
        );
        let parsed = ChannelRequest::from_bytes(&env.to_bytes()).unwrap();
        assert_eq!(parsed.env(), Some(("LANG", "C.UTF-8")));
        assert!(!parsed.want_reply());

        let subsystem = ChannelRequest::new(
            0,
            ChannelRequestType::Subsystem {
                name: "sftp".to_string(),
            },
            true,
        );
        let parsed = ChannelRequest::from_bytes(&subsystem.to_bytes()).unwrap();
        assert_eq!(parsed.subsystem_name(), Some("sftp"));
    }

    #[test]
    fn test_channel_request_shell_and_window_change() {
        let shell = ChannelRequest::new(1, ChannelRequestType::Shell, true);
        let parsed = ChannelRequest::from_bytes(&shell.to_bytes()).unwrap();
        assert_eq!(parsed.request_type().name(), "shell");

        let resize = ChannelRequest::new(
            1,
            ChannelRequestType::WindowChange {
                width_chars: 120,
                height_rows: 40,
                width_pixels: 0,
                height_pixels: 0,
            },
            false,
        );
        let parsed = ChannelRequest::from_bytes(&resize.to_bytes()).unwrap();
        assert_eq!(parsed.request_type().name(), "window-change");
    }

    #[test]
    fn test_channel_request_unknown_type() {
        let mut buf = BytesMut::new();
        buf.put_u8(98);
        buf.put_u32(0);
        wire::write_string(&mut buf, "x11-req");
        buf.put_u8(1);

        assert!(ChannelRequest::from_bytes(&buf).is_err());
    }

    #[test]
    fn test_channel_failure_round_trip() {
        let failure = ChannelFailure::new(7);
        let bytes = failure.to_bytes();
        assert_eq!(bytes, vec![100, 0, 0, 0, 7]);

        let parsed = ChannelFailure::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.recipient_channel(), 7);
    }

    #[test]
    fn test_channel_success_round_trip() {
        let success = ChannelSuccess::new(5);
        let parsed = ChannelSuccess::from_bytes(&success.to_bytes()).unwrap();
        assert_eq!(parsed.recipient_channel(), 5);
    }
}
