//! End-to-end handshake scenarios.
//!
//! The scripted client here performs real Diffie-Hellman: it recomputes
//! the exchange hash from the transcript, verifies the host key's
//! signature over it, derives the same session keys, and talks to the
//! server through the encrypted framing - first against the sans-IO
//! driver, then over a real TCP socket through the listener.

use bytes::BytesMut;
use moorage_platform::MoorageError;
use moorage_proto::ssh::auth::{AuthMethod, AuthMethods, AuthRequest};
use moorage_proto::ssh::connection::{ChannelOpen, ChannelType};
use moorage_proto::ssh::crypto::{CipherAlgorithm, CryptoContext, DirectionKeys, MacAlgorithm};
use moorage_proto::ssh::dispatcher::{default_reply, parse_message};
use moorage_proto::ssh::handshake::HandshakeDriver;
use moorage_proto::ssh::hostkey::{HostKey, HostKeySet, PublicKey};
use moorage_proto::ssh::kex::{AlgorithmCategory, AlgorithmPreferences, KexInit};
use moorage_proto::ssh::kex_dh::{derive_key, exchange_hash, DhExchange, KexAlgorithm};
use moorage_proto::ssh::message::MessageType;
use moorage_proto::ssh::packet::PacketFramer;
use moorage_proto::ssh::server::SshListener;
use moorage_proto::ssh::service::ServiceRequest;
use moorage_proto::ssh::transport::{SessionState, TransportConfig};
use moorage_proto::ssh::wire::{self, WireBuffer};

/// The client preferences from the minimal-exchange scenario.
fn probe_preferences() -> AlgorithmPreferences {
    let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut prefs = AlgorithmPreferences::supported();
    prefs.set(AlgorithmCategory::Kex, names(&["diffie-hellman-group1-sha1"]));
    prefs.set(AlgorithmCategory::HostKey, names(&["ssh-rsa"]));
    prefs.set(AlgorithmCategory::EncryptionClientToServer, names(&["aes128-ctr"]));
    prefs.set(AlgorithmCategory::EncryptionServerToClient, names(&["aes128-ctr"]));
    prefs.set(AlgorithmCategory::MacClientToServer, names(&["hmac-sha1"]));
    prefs.set(AlgorithmCategory::MacServerToClient, names(&["hmac-sha1"]));
    prefs
}

/// Client-side session keys for the negotiated aes128-ctr / hmac-sha1.
fn client_crypto(k: &[u8], h: &[u8], session_id: &[u8]) -> CryptoContext {
    let kex = KexAlgorithm::DhGroup1Sha1;
    let iv_c2s = derive_key(kex, k, h, session_id, b'A', 16);
    let iv_s2c = derive_key(kex, k, h, session_id, b'B', 16);
    let key_c2s = derive_key(kex, k, h, session_id, b'C', 16);
    let key_s2c = derive_key(kex, k, h, session_id, b'D', 16);
    let mac_c2s = derive_key(kex, k, h, session_id, b'E', 20);
    let mac_s2c = derive_key(kex, k, h, session_id, b'F', 20);

    CryptoContext::new(
        CipherAlgorithm::Aes128Ctr,
        CipherAlgorithm::Aes128Ctr,
        MacAlgorithm::HmacSha1,
        MacAlgorithm::HmacSha1,
        DirectionKeys {
            iv: &iv_c2s[..],
            key: &key_c2s[..],
            mac_key: &mac_c2s[..],
        },
        DirectionKeys {
            iv: &iv_s2c[..],
            key: &key_s2c[..],
            mac_key: &mac_s2c[..],
        },
    )
    .unwrap()
}

#[test]
fn minimal_exchange_reaches_authenticating() {
    let host_keys = HostKeySet {
        dss: None,
        rsa: Some(HostKey::generate_rsa(1024).unwrap()),
    };
    let mut driver = HandshakeDriver::new(TransportConfig::default(), host_keys);
    driver.start().unwrap();

    let banner_bytes = driver.take_output();
    let server_banner = std::str::from_utf8(&banner_bytes).unwrap().trim_end().to_string();
    assert!(server_banner.starts_with("SSH-2.0-"));

    // Client banner.
    driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();
    assert_eq!(driver.state(), SessionState::InitialKex);

    // Server KEXINIT.
    let mut client_framer = PacketFramer::new();
    let mut from_server = BytesMut::from(&driver.take_output()[..]);
    let server_kexinit_payload = client_framer.unseal(&mut from_server).unwrap().unwrap();
    assert_eq!(server_kexinit_payload[0], MessageType::KexInit as u8);

    // Client KEXINIT offering exactly the scenario algorithms.
    let client_kexinit_payload = KexInit::from_preferences(&probe_preferences()).to_bytes();
    let mut to_server = BytesMut::new();
    client_framer.seal(&client_kexinit_payload, &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();
    assert_eq!(driver.state(), SessionState::Dh);
    assert_eq!(driver.negotiated().unwrap().kex(), "diffie-hellman-group1-sha1");
    assert_eq!(driver.negotiated().unwrap().host_key(), "ssh-rsa");

    // KEXDH_INIT with a real ephemeral e.
    let exchange = DhExchange::new(KexAlgorithm::DhGroup1Sha1);
    let mut init = WireBuffer::new();
    init.put_u8(MessageType::KexdhInit as u8);
    init.put_mpint(exchange.public_key());
    let mut to_server = BytesMut::new();
    client_framer.seal(init.as_bytes(), &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();

    // The host private key is unreachable once the hash is signed.
    assert!(driver.host_keys_cleared());

    // KEXDH_REPLY(K_S, f, signature) followed by NEWKEYS.
    let mut from_server = BytesMut::from(&driver.take_output()[..]);
    let reply = client_framer.unseal(&mut from_server).unwrap().unwrap();
    assert_eq!(reply[0], MessageType::KexdhReply as u8);

    let mut fields = WireBuffer::from_bytes(&reply);
    fields.read_u8().unwrap();
    let host_key_blob = fields.read_bytes().unwrap();
    let f = fields.read_mpint().unwrap();
    let signature = fields.read_bytes().unwrap();
    assert_eq!(fields.remaining(), 0);

    let newkeys = client_framer.unseal(&mut from_server).unwrap().unwrap();
    assert_eq!(newkeys, vec![MessageType::NewKeys as u8]);
    assert!(from_server.is_empty());

    // Recompute H from the captured transcript; it must match the session
    // id bit-exactly, and the host key's signature over it must verify.
    let k = exchange.compute_shared_secret(&f).unwrap();
    let h = exchange_hash(
        KexAlgorithm::DhGroup1Sha1,
        "SSH-2.0-Probe",
        &server_banner,
        &client_kexinit_payload,
        &server_kexinit_payload,
        &host_key_blob,
        exchange.public_key(),
        &f,
        &k,
    );

    let host_public = PublicKey::from_blob(&host_key_blob).unwrap();
    assert!(host_public.verify(&h, &signature).unwrap());

    // Client NEWKEYS completes the handshake.
    let mut to_server = BytesMut::new();
    client_framer.seal(&[MessageType::NewKeys as u8], &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();

    assert_eq!(driver.state(), SessionState::Authenticating);
    assert!(driver.is_established());
    assert_eq!(driver.session_id(), Some(&h[..]));

    // From here both directions run under the derived keys. The client
    // derives its own copies and sends USERAUTH_REQUEST(alice, none).
    client_framer.install(client_crypto(&k, &h, &h));

    let auth = AuthRequest::new("alice", "ssh-connection", AuthMethod::None);
    let mut to_server = BytesMut::new();
    client_framer.seal(&auth.to_bytes(), &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();

    let payload = driver.next_payload().expect("userauth request decrypted");
    let message = parse_message(&payload, driver.session_id()).unwrap();
    let reply = default_reply(&message, AuthMethods::default()).unwrap();
    driver.send_payload(&reply).unwrap();

    // The client decrypts the default failure and sees the method list.
    let mut from_server = BytesMut::from(&driver.take_output()[..]);
    let failure = client_framer.unseal(&mut from_server).unwrap().unwrap();
    assert_eq!(failure[0], MessageType::UserauthFailure as u8);
    let mut offset = 1;
    assert_eq!(
        wire::read_string(&failure, &mut offset).unwrap(),
        "publickey,password"
    );
    assert!(!wire::read_bool(&failure, &mut offset).unwrap());
}

#[test]
fn dss_host_key_handshake() {
    let host_keys = HostKeySet {
        dss: Some(HostKey::generate_dss().unwrap()),
        rsa: None,
    };
    let mut driver = HandshakeDriver::new(TransportConfig::default(), host_keys);
    driver.start().unwrap();
    let server_banner = String::from_utf8(driver.take_output())
        .unwrap()
        .trim_end()
        .to_string();

    driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();

    let mut client_framer = PacketFramer::new();
    let mut from_server = BytesMut::from(&driver.take_output()[..]);
    let server_kexinit_payload = client_framer.unseal(&mut from_server).unwrap().unwrap();

    // With only a DSA key loaded the server offers exactly ssh-dss.
    let server_kexinit = KexInit::from_bytes(&server_kexinit_payload).unwrap();
    assert_eq!(
        server_kexinit.algorithms(AlgorithmCategory::HostKey),
        &["ssh-dss".to_string()]
    );

    let mut prefs = probe_preferences();
    prefs.set(AlgorithmCategory::HostKey, vec!["ssh-dss".to_string()]);
    let client_kexinit_payload = KexInit::from_preferences(&prefs).to_bytes();
    let mut to_server = BytesMut::new();
    client_framer.seal(&client_kexinit_payload, &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();

    let exchange = DhExchange::new(KexAlgorithm::DhGroup1Sha1);
    let mut init = WireBuffer::new();
    init.put_u8(MessageType::KexdhInit as u8);
    init.put_mpint(exchange.public_key());
    let mut to_server = BytesMut::new();
    client_framer.seal(init.as_bytes(), &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();

    let mut from_server = BytesMut::from(&driver.take_output()[..]);
    let reply = client_framer.unseal(&mut from_server).unwrap().unwrap();
    let mut fields = WireBuffer::from_bytes(&reply);
    fields.read_u8().unwrap();
    let host_key_blob = fields.read_bytes().unwrap();
    let f = fields.read_mpint().unwrap();
    let signature = fields.read_bytes().unwrap();

    let k = exchange.compute_shared_secret(&f).unwrap();
    let h = exchange_hash(
        KexAlgorithm::DhGroup1Sha1,
        "SSH-2.0-Probe",
        &server_banner,
        &client_kexinit_payload,
        &server_kexinit_payload,
        &host_key_blob,
        exchange.public_key(),
        &f,
        &k,
    );

    let host_public = PublicKey::from_blob(&host_key_blob).unwrap();
    assert_eq!(host_public.algorithm().name(), "ssh-dss");
    assert!(host_public.verify(&h, &signature).unwrap());

    client_framer.unseal(&mut from_server).unwrap().unwrap(); // NEWKEYS
    let mut to_server = BytesMut::new();
    client_framer.seal(&[MessageType::NewKeys as u8], &mut to_server).unwrap();
    driver.handle_input(&to_server).unwrap();

    assert!(driver.is_established());
    assert_eq!(driver.session_id(), Some(&h[..]));
}

#[test]
fn kexdh_init_in_wrong_state_kills_session() {
    let host_keys = HostKeySet {
        dss: None,
        rsa: Some(HostKey::generate_rsa(1024).unwrap()),
    };
    let mut driver = HandshakeDriver::new(TransportConfig::default(), host_keys);
    driver.start().unwrap();
    driver.handle_input(b"SSH-2.0-Probe\r\n").unwrap();
    driver.take_output();

    // KEXDH_INIT while the session is still in INITIAL_KEX.
    let mut init = WireBuffer::new();
    init.put_u8(MessageType::KexdhInit as u8);
    init.put_mpint(&[0x55; 128]);
    let mut to_server = BytesMut::new();
    let mut client_framer = PacketFramer::new();
    client_framer.seal(init.as_bytes(), &mut to_server).unwrap();

    let err = driver.handle_input(&to_server).unwrap_err();
    assert!(matches!(err, MoorageError::Protocol(_)));
    assert_eq!(driver.state(), SessionState::Error);
    assert!(!driver.is_alive());
}

mod socket {
    use super::*;
    use std::io::{Read, Write};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPrivateKey;

    fn write_host_key_pem(tag: &str) -> std::path::PathBuf {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let path = std::env::temp_dir().join(format!(
            "moorage-test-hostkey-{}-{}.pem",
            tag,
            std::process::id()
        ));
        std::fs::write(&path, pem.as_bytes()).unwrap();
        path
    }

    fn read_line(stream: &mut std::net::TcpStream) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).unwrap();
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).unwrap()
    }

    fn read_packet(
        stream: &mut std::net::TcpStream,
        framer: &mut PacketFramer,
        inbound: &mut BytesMut,
    ) -> Vec<u8> {
        loop {
            if let Some(payload) = framer.unseal(inbound).unwrap() {
                return payload;
            }
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "server closed the connection unexpectedly");
            inbound.extend_from_slice(&chunk[..n]);
        }
    }

    fn send_packet(
        stream: &mut std::net::TcpStream,
        framer: &mut PacketFramer,
        payload: &[u8],
    ) {
        let mut out = BytesMut::new();
        framer.seal(payload, &mut out).unwrap();
        stream.write_all(&out).unwrap();
    }

    /// Scripted client: handshake, then three requests answered by the
    /// server's default replies. Returns the exchange hash it computed.
    fn run_probe_client(addr: SocketAddr) -> Vec<u8> {
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .unwrap();

        stream.write_all(b"SSH-2.0-Probe\r\n").unwrap();
        let server_banner = read_line(&mut stream);
        assert!(server_banner.starts_with("SSH-2.0-"));

        let mut framer = PacketFramer::new();
        let mut inbound = BytesMut::new();

        let server_kexinit_payload = read_packet(&mut stream, &mut framer, &mut inbound);
        assert_eq!(server_kexinit_payload[0], MessageType::KexInit as u8);

        let client_kexinit_payload = KexInit::from_preferences(&probe_preferences()).to_bytes();
        send_packet(&mut stream, &mut framer, &client_kexinit_payload);

        let exchange = DhExchange::new(KexAlgorithm::DhGroup1Sha1);
        let mut init = WireBuffer::new();
        init.put_u8(MessageType::KexdhInit as u8);
        init.put_mpint(exchange.public_key());
        send_packet(&mut stream, &mut framer, init.as_bytes());

        let reply = read_packet(&mut stream, &mut framer, &mut inbound);
        assert_eq!(reply[0], MessageType::KexdhReply as u8);
        let mut fields = WireBuffer::from_bytes(&reply);
        fields.read_u8().unwrap();
        let host_key_blob = fields.read_bytes().unwrap();
        let f = fields.read_mpint().unwrap();
        let signature = fields.read_bytes().unwrap();

        let newkeys = read_packet(&mut stream, &mut framer, &mut inbound);
        assert_eq!(newkeys, vec![MessageType::NewKeys as u8]);

        let k = exchange.compute_shared_secret(&f).unwrap();
        let h = exchange_hash(
            KexAlgorithm::DhGroup1Sha1,
            "SSH-2.0-Probe",
            &server_banner,
            &client_kexinit_payload,
            &server_kexinit_payload,
            &host_key_blob,
            exchange.public_key(),
            &f,
            &k,
        );
        assert!(PublicKey::from_blob(&host_key_blob)
            .unwrap()
            .verify(&h, &signature)
            .unwrap());

        send_packet(&mut stream, &mut framer, &[MessageType::NewKeys as u8]);
        framer.install(client_crypto(&k, &h, &h));

        // 1. USERAUTH_REQUEST(alice, none) -> failure with the default
        //    method list.
        let auth = AuthRequest::new("alice", "ssh-connection", AuthMethod::None);
        send_packet(&mut stream, &mut framer, &auth.to_bytes());
        let failure = read_packet(&mut stream, &mut framer, &mut inbound);
        assert_eq!(failure[0], MessageType::UserauthFailure as u8);
        let mut offset = 1;
        assert_eq!(
            wire::read_string(&failure, &mut offset).unwrap(),
            "publickey,password"
        );
        assert!(!wire::read_bool(&failure, &mut offset).unwrap());

        // 2. SERVICE_REQUEST(ssh-userauth) -> byte-exact SERVICE_ACCEPT.
        send_packet(
            &mut stream,
            &mut framer,
            &ServiceRequest::new("ssh-userauth").to_bytes(),
        );
        let accept = read_packet(&mut stream, &mut framer, &mut inbound);
        let mut expected = vec![MessageType::ServiceAccept as u8];
        expected.extend_from_slice(&12u32.to_be_bytes());
        expected.extend_from_slice(b"ssh-userauth");
        assert_eq!(accept, expected);

        // 3. CHANNEL_OPEN(session, sender=7) -> administratively refused.
        let open = ChannelOpen::new(ChannelType::Session, 7, 131072, 32768);
        send_packet(&mut stream, &mut framer, &open.to_bytes());
        let refusal = read_packet(&mut stream, &mut framer, &mut inbound);
        assert_eq!(
            refusal,
            vec![92, 0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]
        );

        h
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_handshake_and_default_replies() {
        let key_path = write_host_key_pem("defaults");

        let mut listener = SshListener::new();
        listener.set_bind_address("127.0.0.1");
        listener.set_port(0);
        listener.set_rsa_host_key(&key_path);
        listener.listen().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::task::spawn_blocking(move || run_probe_client(addr));

        let mut session = listener.accept().await.unwrap();
        tokio::time::timeout(Duration::from_secs(60), session.handle_key_exchange())
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_established());
        assert_eq!(session.client_banner(), Some("SSH-2.0-Probe"));

        // No callback installed: every message gets the default reply. A
        // counting callback that still requests the default shows the
        // dispatch order.
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);
        session.set_message_callback(move |_message| {
            seen_in_callback.fetch_add(1, Ordering::SeqCst);
            true
        });

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(60), session.execute_message_callbacks())
                .await
                .unwrap()
                .unwrap();
        }

        let h = client.await.unwrap();
        assert_eq!(session.session_id(), Some(&h[..]));
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        std::fs::remove_file(&key_path).ok();
    }

    #[tokio::test]
    async fn accept_without_host_key_is_refused() {
        let mut listener = SshListener::new();
        listener.set_bind_address("127.0.0.1");
        listener.set_port(0);
        listener.listen().await.unwrap();

        let err = listener.accept().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: DSA or RSA host key file must be set before accept()"
        );
    }
}
