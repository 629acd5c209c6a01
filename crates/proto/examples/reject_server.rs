//! Minimal moorage server example.
//!
//! Accepts connections, completes the SSH-2 handshake with an ephemeral
//! RSA host key, and answers every request with the protocol's default
//! reply: authentication fails with the advertised method list, service
//! requests are accepted, channel opens are administratively refused.
//!
//! Usage:
//!   cargo run --example reject_server [bind_address] [port]
//!
//! Then poke it with a client:
//!   ssh -p 2222 alice@127.0.0.1

use std::env;
use std::error::Error;

use moorage_proto::ssh::server::SshListener;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let bind_addr = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.get(2).map(|p| p.parse()).transpose()?.unwrap_or(2222);

    // Ephemeral host key for the demo. A real deployment loads a
    // persistent key so the server identity survives restarts.
    println!("Generating RSA host key...");
    let host_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048)?;
    let pem = host_key.to_pkcs8_pem(LineEnding::LF)?;
    let key_path = env::temp_dir().join(format!("moorage-demo-hostkey-{}.pem", std::process::id()));
    std::fs::write(&key_path, pem.as_bytes())?;

    let mut listener = SshListener::new();
    listener.set_bind_address(bind_addr);
    listener.set_port(port);
    listener.set_rsa_host_key(&key_path);
    listener.listen().await?;

    println!("Listening on {}", listener.local_addr()?);
    println!("Every authentication attempt will be refused. Ctrl+C to stop.");

    loop {
        match listener.accept().await {
            Ok(mut session) => {
                let peer = session.peer_addr();
                println!("[{}] new connection", peer);

                tokio::spawn(async move {
                    match session.handle_key_exchange().await {
                        Ok(()) => {
                            println!(
                                "[{}] handshake complete (client: {})",
                                peer,
                                session.client_banner().unwrap_or("?")
                            );

                            loop {
                                if let Err(e) = session.execute_message_callbacks().await {
                                    println!("[{}] session ended: {}", peer, e);
                                    break;
                                }
                                if !session.is_established() {
                                    println!("[{}] peer disconnected", peer);
                                    break;
                                }
                            }
                        }
                        Err(e) => println!("[{}] handshake failed: {}", peer, e),
                    }
                });
            }
            Err(e) => {
                eprintln!("accept error: {}", e);
                break;
            }
        }
    }

    std::fs::remove_file(&key_path).ok();
    Ok(())
}
