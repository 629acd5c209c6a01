//! Post-handshake message dispatch.
//!
//! Once a session is authenticating, every inbound payload is parsed into
//! a [`Message`] record. The application consumes them through the
//! callback surface on `SshSession`; anything it declines to handle gets
//! the protocol-mandated default reply:
//!
//! - authentication requests: `USERAUTH_FAILURE` listing the advertised
//!   methods, partial-success false
//! - service requests: `SERVICE_ACCEPT` echoing the requested name
//! - channel opens: `CHANNEL_OPEN_FAILURE(ADMINISTRATIVELY_PROHIBITED)`
//! - channel requests: `CHANNEL_FAILURE` when a reply is wanted,
//!   silence otherwise

use moorage_platform::{MoorageError, MoorageResult};
use tracing::debug;

use crate::ssh::auth::{
    construct_signature_data, AuthFailure, AuthMethod, AuthMethods, AuthRequest,
    PublickeySignatureState,
};
use crate::ssh::connection::{
    ChannelFailure, ChannelOpen, ChannelOpenFailure, ChannelOpenFailureReason, ChannelRequest,
};
use crate::ssh::hostkey::PublicKey;
use crate::ssh::message::MessageType;
use crate::ssh::service::{ServiceAccept, ServiceRequest};

/// A parsed request from the peer, owned by the application until replied.
#[derive(Debug)]
pub enum Message {
    /// USERAUTH_REQUEST
    Auth {
        /// The parsed request
        request: AuthRequest,
        /// Outcome of verifying the publickey signature, if one was sent
        signature_state: PublickeySignatureState,
    },
    /// CHANNEL_OPEN
    ChannelOpen(ChannelOpen),
    /// CHANNEL_REQUEST
    ChannelRequest(ChannelRequest),
    /// SERVICE_REQUEST
    Service(ServiceRequest),
}

impl Message {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Message::Auth { .. } => "auth request",
            Message::ChannelOpen(_) => "channel open request",
            Message::ChannelRequest(_) => "channel request",
            Message::Service(_) => "service request",
        }
    }
}

/// Parses one post-handshake payload into a [`Message`].
///
/// For publickey requests carrying a signature, the signature is verified
/// against the RFC 4252 Section 7 signing blob bound to `session_id`, and
/// the outcome is recorded in the message.
///
/// # Errors
///
/// Returns [`MoorageError::Protocol`] for malformed payloads and for
/// message types that have no business arriving after the handshake.
pub fn parse_message(payload: &[u8], session_id: Option<&[u8]>) -> MoorageResult<Message> {
    if payload.is_empty() {
        return Err(MoorageError::Protocol("Empty message payload".to_string()));
    }

    match MessageType::from_u8(payload[0]) {
        Some(MessageType::UserauthRequest) => {
            let request = AuthRequest::from_bytes(payload)?;
            let signature_state = verify_publickey_signature(&request, session_id);
            Ok(Message::Auth {
                request,
                signature_state,
            })
        }
        Some(MessageType::ServiceRequest) => {
            Ok(Message::Service(ServiceRequest::from_bytes(payload)?))
        }
        Some(MessageType::ChannelOpen) => {
            Ok(Message::ChannelOpen(ChannelOpen::from_bytes(payload)?))
        }
        Some(MessageType::ChannelRequest) => {
            Ok(Message::ChannelRequest(ChannelRequest::from_bytes(payload)?))
        }
        _ => Err(MoorageError::Protocol(format!(
            "No message handler for packet type {}",
            payload[0]
        ))),
    }
}

/// Checks a publickey request's signature, when one is present.
fn verify_publickey_signature(
    request: &AuthRequest,
    session_id: Option<&[u8]>,
) -> PublickeySignatureState {
    let (algorithm, blob, signature) = match request.method() {
        AuthMethod::PublicKey {
            algorithm,
            public_key,
            signature: Some(signature),
        } => (algorithm, public_key, signature),
        _ => return PublickeySignatureState::None,
    };

    let session_id = match session_id {
        Some(id) => id,
        None => return PublickeySignatureState::Wrong,
    };

    let public_key = match PublicKey::from_blob(blob) {
        Ok(key) => key,
        Err(_) => return PublickeySignatureState::Wrong,
    };

    let signed_data = construct_signature_data(
        session_id,
        request.user_name(),
        request.service_name(),
        algorithm,
        blob,
    );

    match public_key.verify(&signed_data, signature) {
        Ok(true) => PublickeySignatureState::Valid,
        _ => PublickeySignatureState::Wrong,
    }
}

/// Produces the default reply for a message, or `None` when the protocol
/// calls for silence.
///
/// The advertised method list comes from `auth_methods`; an empty mask
/// falls back to `publickey | password`.
pub fn default_reply(message: &Message, auth_methods: AuthMethods) -> Option<Vec<u8>> {
    match message {
        Message::Auth { .. } => {
            let methods = if auth_methods.is_empty() {
                AuthMethods::default()
            } else {
                auth_methods
            };
            debug!(
                "Sending an auth failure. Methods that can continue: {}",
                methods.to_name_list()
            );
            Some(AuthFailure::from_methods(methods, false).to_bytes())
        }
        Message::Service(request) => {
            debug!(
                "Sending a SERVICE_ACCEPT for service {}",
                request.service_name()
            );
            Some(ServiceAccept::new(request.service_name()).to_bytes())
        }
        Message::ChannelOpen(open) => {
            debug!("Refusing a channel");
            Some(
                ChannelOpenFailure::new(
                    open.sender_channel(),
                    ChannelOpenFailureReason::AdministrativelyProhibited,
                )
                .to_bytes(),
            )
        }
        Message::ChannelRequest(request) => {
            if request.want_reply() {
                debug!(
                    "Sending a default channel_request denied to channel {}",
                    request.recipient_channel()
                );
                Some(ChannelFailure::new(request.recipient_channel()).to_bytes())
            } else {
                debug!("The peer does not want to know the request failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::auth::AuthMethod;
    use crate::ssh::connection::{ChannelRequestType, ChannelType};
    use crate::ssh::hostkey::HostKey;
    use crate::ssh::wire;

    #[test]
    fn test_parse_auth_none_request() {
        let payload = AuthRequest::new("alice", "ssh-connection", AuthMethod::None).to_bytes();
        let message = parse_message(&payload, Some(b"sid")).unwrap();

        match message {
            Message::Auth {
                request,
                signature_state,
            } => {
                assert_eq!(request.user_name(), "alice");
                assert_eq!(signature_state, PublickeySignatureState::None);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_default_auth_reply_is_failure_with_method_list() {
        let payload = AuthRequest::new("alice", "ssh-connection", AuthMethod::None).to_bytes();
        let message = parse_message(&payload, Some(b"sid")).unwrap();

        let reply = default_reply(&message, AuthMethods::default()).unwrap();
        assert_eq!(reply[0], 51);

        let mut offset = 1;
        assert_eq!(
            wire::read_string(&reply, &mut offset).unwrap(),
            "publickey,password"
        );
        assert!(!wire::read_bool(&reply, &mut offset).unwrap());
    }

    #[test]
    fn test_default_auth_reply_empty_mask_falls_back() {
        let payload = AuthRequest::new("alice", "ssh-connection", AuthMethod::None).to_bytes();
        let message = parse_message(&payload, Some(b"sid")).unwrap();

        let reply = default_reply(&message, AuthMethods::NONE).unwrap();
        let mut offset = 1;
        assert_eq!(
            wire::read_string(&reply, &mut offset).unwrap(),
            "publickey,password"
        );
    }

    #[test]
    fn test_service_accept_echoes_byte_for_byte() {
        let payload = ServiceRequest::new("ssh-userauth").to_bytes();
        let message = parse_message(&payload, None).unwrap();

        let reply = default_reply(&message, AuthMethods::default()).unwrap();
        assert_eq!(reply, ServiceAccept::new("ssh-userauth").to_bytes());

        let mut offset = 1;
        assert_eq!(
            wire::read_string(&reply, &mut offset).unwrap(),
            "ssh-userauth"
        );
    }

    #[test]
    fn test_channel_open_rejected_administratively() {
        let payload = ChannelOpen::new(ChannelType::Session, 7, 131072, 32768).to_bytes();
        let message = parse_message(&payload, None).unwrap();

        let reply = default_reply(&message, AuthMethods::default()).unwrap();
        // byte 92, recipient 7, reason 1, empty description, empty language
        assert_eq!(
            reply,
            vec![92, 0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_channel_request_reply_follows_want_reply() {
        let with_reply = ChannelRequest::new(
            4,
            ChannelRequestType::Exec {
                command: "ls".to_string(),
            },
            true,
        )
        .to_bytes();
        let message = parse_message(&with_reply, None).unwrap();
        let reply = default_reply(&message, AuthMethods::default()).unwrap();
        assert_eq!(reply, vec![100, 0, 0, 0, 4]);

        let without_reply = ChannelRequest::new(
            4,
            ChannelRequestType::Env {
                name: "LANG".to_string(),
                value: "C".to_string(),
            },
            false,
        )
        .to_bytes();
        let message = parse_message(&without_reply, None).unwrap();
        assert!(default_reply(&message, AuthMethods::default()).is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = parse_message(&[21], None);
        assert!(matches!(result, Err(MoorageError::Protocol(_))));
    }

    #[test]
    fn test_publickey_probe_has_no_signature_state() {
        let key = HostKey::generate_rsa(1024).unwrap();
        let blob = key.public_key_blob();

        let payload = AuthRequest::new(
            "alice",
            "ssh-connection",
            AuthMethod::PublicKey {
                algorithm: "ssh-rsa".to_string(),
                public_key: blob,
                signature: None,
            },
        )
        .to_bytes();

        let message = parse_message(&payload, Some(b"session id")).unwrap();
        match message {
            Message::Auth {
                signature_state, ..
            } => assert_eq!(signature_state, PublickeySignatureState::None),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_publickey_signature_valid_and_wrong() {
        let key = HostKey::generate_rsa(1024).unwrap();
        let blob = key.public_key_blob();
        let session_id = b"the session identifier";

        let signed_data = construct_signature_data(
            session_id,
            "alice",
            "ssh-connection",
            "ssh-rsa",
            &blob,
        );
        let signature = key.sign(&signed_data).unwrap();

        let payload = AuthRequest::new(
            "alice",
            "ssh-connection",
            AuthMethod::PublicKey {
                algorithm: "ssh-rsa".to_string(),
                public_key: blob.clone(),
                signature: Some(signature.clone()),
            },
        )
        .to_bytes();

        let message = parse_message(&payload, Some(session_id)).unwrap();
        match message {
            Message::Auth {
                signature_state, ..
            } => assert_eq!(signature_state, PublickeySignatureState::Valid),
            other => panic!("unexpected message {:?}", other),
        }

        // The same signature bound to a different session id is wrong.
        let message = parse_message(&payload, Some(b"another session")).unwrap();
        match message {
            Message::Auth {
                signature_state, ..
            } => assert_eq!(signature_state, PublickeySignatureState::Wrong),
            other => panic!("unexpected message {:?}", other),
        }
    }
}
