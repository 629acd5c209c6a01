//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac (once keys are installed)
//! ```
//!
//! # Constraints
//!
//! - `packet_length` does not count the MAC or the length field itself
//! - padding is at least 4 bytes and brings the record to a multiple of
//!   the cipher block size (8 before keys are installed)
//! - packets larger than 35000 bytes are rejected
//!
//! [`PacketFramer`] owns the per-direction 32-bit sequence numbers. They
//! count every packet from the very first one and keep counting across the
//! NEWKEYS transition; the MAC of each sealed packet covers
//! `sequence || plaintext record`. Inbound, `unseal` either yields exactly
//! one payload or reports "need more bytes" without consuming anything it
//! would have to re-decrypt later.

use bytes::{Buf, BufMut, BytesMut};
use moorage_platform::{MoorageError, MoorageResult};
use rand::RngCore;

use crate::ssh::crypto::CryptoContext;

/// Maximum packet size in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: usize = 4;

/// Block size used before any cipher is installed.
const PLAIN_BLOCK_SIZE: usize = 8;

/// Inbound packet whose first cipher block has been decrypted while the
/// remainder is still in flight. CTR keystream position only moves
/// forward, so the decrypted block is parked here instead of re-decrypted.
struct PendingPacket {
    first_block: Vec<u8>,
    packet_length: usize,
}

/// Framer for the SSH binary packet protocol.
///
/// Before NEWKEYS it frames in the clear; after [`PacketFramer::install`]
/// every outbound packet is encrypted and MACed and every inbound packet
/// is decrypted and verified under the installed [`CryptoContext`].
pub struct PacketFramer {
    crypto: Option<CryptoContext>,
    seq_in: u32,
    seq_out: u32,
    pending: Option<PendingPacket>,
}

impl PacketFramer {
    /// Creates a cleartext framer with both sequence numbers at zero.
    pub fn new() -> Self {
        Self {
            crypto: None,
            seq_in: 0,
            seq_out: 0,
            pending: None,
        }
    }

    /// Installs the negotiated keys.
    ///
    /// Sequence numbers are NOT reset; they keep counting from the
    /// cleartext prefix of the connection.
    pub fn install(&mut self, crypto: CryptoContext) {
        self.crypto = Some(crypto);
    }

    /// Whether keys are installed.
    pub fn is_encrypted(&self) -> bool {
        self.crypto.is_some()
    }

    /// Next outbound sequence number.
    pub fn seq_out(&self) -> u32 {
        self.seq_out
    }

    /// Next inbound sequence number.
    pub fn seq_in(&self) -> u32 {
        self.seq_in
    }

    /// Seals one payload into `out`.
    ///
    /// The record is built completely (padded, MACed, encrypted) before a
    /// single byte is appended, so a failure never leaves half a packet in
    /// the output buffer.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] if the payload cannot fit in a
    /// legal packet.
    pub fn seal(&mut self, payload: &[u8], out: &mut BytesMut) -> MoorageResult<()> {
        let block_size = self
            .crypto
            .as_ref()
            .map_or(PLAIN_BLOCK_SIZE, |c| c.block_size_out());

        let unpadded = 4 + 1 + payload.len();
        let mut padding_len = block_size - (unpadded % block_size);
        if padding_len < MIN_PADDING_LEN {
            padding_len += block_size;
        }

        let packet_length = 1 + payload.len() + padding_len;
        if packet_length > MAX_PACKET_SIZE {
            return Err(MoorageError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                packet_length, MAX_PACKET_SIZE
            )));
        }

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        let mut record = BytesMut::with_capacity(4 + packet_length);
        record.put_u32(packet_length as u32);
        record.put_u8(padding_len as u8);
        record.put_slice(payload);
        record.put_slice(&padding);

        match &mut self.crypto {
            Some(crypto) => {
                let mac = crypto.compute_mac(self.seq_out, &record);
                crypto.encrypt(&mut record);
                out.put_slice(&record);
                out.put_slice(&mac);
            }
            None => out.put_slice(&record),
        }

        self.seq_out = self.seq_out.wrapping_add(1);
        Ok(())
    }

    /// Extracts one payload from `buf`, or returns `Ok(None)` when more
    /// bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`MoorageError::Protocol`] on an oversized or undersized
    /// declared length, bad padding, or block misalignment, and
    /// [`MoorageError::Crypto`] on MAC mismatch.
    pub fn unseal(&mut self, buf: &mut BytesMut) -> MoorageResult<Option<Vec<u8>>> {
        if self.crypto.is_some() {
            self.unseal_encrypted(buf)
        } else {
            self.unseal_plain(buf)
        }
    }

    fn unseal_plain(&mut self, buf: &mut BytesMut) -> MoorageResult<Option<Vec<u8>>> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let packet_length =
            u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        validate_packet_length(packet_length)?;

        if buf.len() < 4 + packet_length {
            return Ok(None);
        }

        buf.advance(4);
        let record = buf.split_to(packet_length);
        let payload = extract_payload(&record, packet_length)?;

        self.seq_in = self.seq_in.wrapping_add(1);
        Ok(Some(payload))
    }

    fn unseal_encrypted(&mut self, buf: &mut BytesMut) -> MoorageResult<Option<Vec<u8>>> {
        let (block_size, mac_size) = {
            let crypto = self.crypto.as_ref().expect("encrypted path requires keys");
            (crypto.block_size_in(), crypto.mac_size_in())
        };

        if self.pending.is_none() {
            if buf.len() < block_size {
                return Ok(None);
            }

            let mut first_block = buf.split_to(block_size).to_vec();
            self.crypto
                .as_mut()
                .expect("encrypted path requires keys")
                .decrypt(&mut first_block);

            let packet_length = u32::from_be_bytes([
                first_block[0],
                first_block[1],
                first_block[2],
                first_block[3],
            ]) as usize;
            validate_packet_length(packet_length)?;

            if (4 + packet_length) % block_size != 0 {
                return Err(MoorageError::Protocol(format!(
                    "Block misalignment: packet length {} with block size {}",
                    packet_length, block_size
                )));
            }

            self.pending = Some(PendingPacket {
                first_block,
                packet_length,
            });
        }

        let packet_length = self
            .pending
            .as_ref()
            .expect("pending packet was just stored")
            .packet_length;
        let remainder_len = 4 + packet_length - block_size;

        if buf.len() < remainder_len + mac_size {
            return Ok(None);
        }

        let pending = self.pending.take().expect("pending packet was just stored");

        let mut record = pending.first_block;
        if remainder_len > 0 {
            let mut remainder = buf.split_to(remainder_len).to_vec();
            self.crypto
                .as_mut()
                .expect("encrypted path requires keys")
                .decrypt(&mut remainder);
            record.extend_from_slice(&remainder);
        }

        let mac = buf.split_to(mac_size);
        self.crypto
            .as_ref()
            .expect("encrypted path requires keys")
            .verify_mac(self.seq_in, &record, &mac)?;

        let payload = extract_payload(&record[4..], packet_length)?;

        self.seq_in = self.seq_in.wrapping_add(1);
        Ok(Some(payload))
    }
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_packet_length(packet_length: usize) -> MoorageResult<()> {
    if packet_length > MAX_PACKET_SIZE {
        return Err(MoorageError::Protocol(format!(
            "Packet too large: {} bytes (maximum {})",
            packet_length, MAX_PACKET_SIZE
        )));
    }
    if packet_length < 1 + MIN_PADDING_LEN {
        return Err(MoorageError::Protocol(format!(
            "Packet too small: {} bytes",
            packet_length
        )));
    }
    Ok(())
}

/// Pulls the payload out of a record body (`padding_length || payload || padding`).
fn extract_payload(body: &[u8], packet_length: usize) -> MoorageResult<Vec<u8>> {
    let padding_length = body[0] as usize;

    if padding_length < MIN_PADDING_LEN {
        return Err(MoorageError::Protocol(format!(
            "Padding too short: {} bytes (minimum {})",
            padding_length, MIN_PADDING_LEN
        )));
    }
    if padding_length + 1 > packet_length {
        return Err(MoorageError::Protocol(format!(
            "Invalid packet: padding {} exceeds packet length {}",
            padding_length, packet_length
        )));
    }

    Ok(body[1..packet_length - padding_length].to_vec())
}
