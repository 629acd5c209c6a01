//! SSH service negotiation (RFC 4253 Section 10).
//!
//! After the handshake the client asks for a service by name (in practice
//! always `ssh-userauth`). The only replies the specification allows are
//! SERVICE_ACCEPT echoing the name, or disconnection.

use bytes::{BufMut, BytesMut};
use moorage_platform::{MoorageError, MoorageResult};

use crate::ssh::message::MessageType;
use crate::ssh::wire;

/// SSH_MSG_SERVICE_REQUEST message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Requested service name
    service_name: String,
}

impl ServiceRequest {
    /// Creates a service request.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Returns the requested service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ServiceRequest as u8);
        wire::write_string(&mut buf, &self.service_name);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ServiceRequest as u8 {
            return Err(MoorageError::Protocol(
                "Invalid SERVICE_REQUEST message".to_string(),
            ));
        }

        let mut offset = 1;
        let service_name = wire::read_string(data, &mut offset)?;

        Ok(Self { service_name })
    }
}

/// SSH_MSG_SERVICE_ACCEPT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccept {
    /// Accepted service name
    service_name: String,
}

impl ServiceAccept {
    /// Creates an accept reply echoing the requested name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Returns the accepted service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ServiceAccept as u8);
        wire::write_string(&mut buf, &self.service_name);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> MoorageResult<Self> {
        if data.is_empty() || data[0] != MessageType::ServiceAccept as u8 {
            return Err(MoorageError::Protocol(
                "Invalid SERVICE_ACCEPT message".to_string(),
            ));
        }

        let mut offset = 1;
        let service_name = wire::read_string(data, &mut offset)?;

        Ok(Self { service_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_request_round_trip() {
        let request = ServiceRequest::new("ssh-userauth");
        let bytes = request.to_bytes();
        assert_eq!(bytes[0], 5);

        let parsed = ServiceRequest::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.service_name(), "ssh-userauth");
    }

    #[test]
    fn test_service_accept_echoes_name() {
        let request = ServiceRequest::new("ssh-userauth");
        let accept = ServiceAccept::new(request.service_name());
        let bytes = accept.to_bytes();

        assert_eq!(bytes[0], 6);
        let parsed = ServiceAccept::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.service_name(), "ssh-userauth");
    }

    #[test]
    fn test_service_request_invalid_type() {
        assert!(ServiceRequest::from_bytes(&[6, 0, 0, 0, 0]).is_err());
        assert!(ServiceRequest::from_bytes(&[]).is_err());
    }
}
