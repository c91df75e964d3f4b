/* This file is part of fromage
 *
 * Copyright (C) 2020-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! One half of a session: a socket, the active secrets, and for the
//! serverbound write path the fingerprint counter.
//!
//! Frames carry an unsigned LEB128 length prefix. On serverbound
//! frames the prefix does not count the fingerprint byte, so readers
//! add one and writers subtract one.

use std::{
    io::Cursor,
    net::{Shutdown, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use futures::{AsyncReadExt, AsyncWriteExt};
use log::debug;
use smol::net::TcpStream;

use crate::{
    error::Result,
    proto::{packet::UnknownPacket, Clientbound, Serverbound},
    wire::{Ctx, Decode, Encode, VarInt},
    Error, Secrets,
};

/// Advance a serverbound fingerprint. The counter wraps at 100, not at
/// the byte boundary.
pub fn advance_fingerprint(fingerprint: u8) -> u8 {
    (fingerprint + 1) % 100
}

// The bot role does away with the identification cipher.
fn effective_cipher(ctx: &Ctx, cipher: Option<crate::secrets::Cipher>) -> Option<crate::secrets::Cipher> {
    match cipher {
        Some(crate::secrets::Cipher::Identification) if ctx.secrets.is_bot_role() => None,
        cipher => cipher,
    }
}

pub struct Connection {
    stream: TcpStream,
    reader: smol::lock::Mutex<TcpStream>,
    writer: smol::lock::Mutex<TcpStream>,

    ctx: Mutex<Ctx>,

    /// The next outbound serverbound fingerprint.
    fingerprint: Mutex<u8>,

    closing: AtomicBool,

    /// The paired connection closure propagates to.
    destination: Mutex<Option<Arc<Connection>>>,

    peer_addr: Option<SocketAddr>,
}

impl Connection {
    pub fn new(stream: TcpStream, secrets: Secrets, fingerprint: u8) -> Arc<Self> {
        let peer_addr = stream.peer_addr().ok();

        Arc::new(Self {
            reader: smol::lock::Mutex::new(stream.clone()),
            writer: smol::lock::Mutex::new(stream.clone()),
            stream,
            ctx: Mutex::new(Ctx::new(secrets)),
            fingerprint: Mutex::new(fingerprint),
            closing: AtomicBool::new(false),
            destination: Mutex::new(None),
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> String {
        match self.peer_addr {
            Some(addr) => addr.to_string(),
            None => "<unknown>".to_string(),
        }
    }

    pub fn secrets(&self) -> Secrets {
        self.ctx.lock().expect("ctx poisoned").secrets.clone()
    }

    pub fn set_secrets(&self, secrets: Secrets) {
        *self.ctx.lock().expect("ctx poisoned") = Ctx::new(secrets);
    }

    fn ctx(&self) -> Ctx {
        self.ctx.lock().expect("ctx poisoned").clone()
    }

    pub fn fingerprint(&self) -> u8 {
        *self.fingerprint.lock().expect("fingerprint poisoned")
    }

    pub fn set_fingerprint(&self, fingerprint: u8) {
        *self.fingerprint.lock().expect("fingerprint poisoned") = fingerprint;
    }

    fn take_fingerprint(&self) -> u8 {
        let mut guard = self.fingerprint.lock().expect("fingerprint poisoned");
        let fingerprint = *guard;
        *guard = advance_fingerprint(fingerprint);
        fingerprint
    }

    /// Link two connections so closing either closes both.
    pub fn pair(a: &Arc<Self>, b: &Arc<Self>) {
        *a.destination.lock().expect("destination poisoned") = Some(b.clone());
        *b.destination.lock().expect("destination poisoned") = Some(a.clone());
    }

    pub fn destination(&self) -> Option<Arc<Self>> {
        self.destination.lock().expect("destination poisoned").clone()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Close the connection and its paired destination.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return
        }

        debug!(target: "fromage::net::connection", "Closing connection to {}", self.peer_addr());
        let _ = self.stream.shutdown(Shutdown::Both);

        if let Some(destination) = self.destination() {
            destination.close();
        }
    }

    /// Read one frame. `with_fingerprint` reads the extra serverbound
    /// byte the length prefix does not count. Returns `None` on a
    /// clean end of stream.
    async fn read_frame(&self, with_fingerprint: bool) -> Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;

        // The length prefix arrives byte by byte; more than 5
        // continuation bytes poisons the connection.
        let mut length: u64 = 0;
        let mut index = 0;

        loop {
            let mut byte = [0u8; 1];
            let n = match reader.read(&mut byte).await {
                Ok(n) => n,
                Err(_) if self.is_closing() => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if index == 0 {
                    return Ok(None)
                }
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()))
            }

            length |= ((byte[0] & 0b0111_1111) as u64) << (7 * index);
            index += 1;

            if byte[0] & 0b1000_0000 == 0 {
                break
            }

            if index >= 5 {
                return Err(Error::VarNumTooLong)
            }
        }

        let length = length as u32 as i32;
        if length < 0 {
            return Err(Error::MalformedPacket("negative frame length"))
        }

        let mut frame = vec![0u8; length as usize + usize::from(with_fingerprint)];
        match reader.read_exact(&mut frame).await {
            Ok(()) => Ok(Some(frame)),
            Err(_) if self.is_closing() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the next clientbound packet. Returns `None` on a clean end
    /// of stream.
    pub async fn read_clientbound(&self) -> Result<Option<Clientbound>> {
        let Some(frame) = self.read_frame(false).await? else { return Ok(None) };

        let ctx = self.ctx();
        let mut cursor = Cursor::new(frame.as_slice());

        let c = u8::decode(&mut cursor, &ctx)?;
        let cc = u8::decode(&mut cursor, &ctx)?;

        Ok(Some(Clientbound::decode_body((c, cc), &mut cursor, &ctx)?))
    }

    /// Read the next serverbound packet together with its fingerprint.
    /// Returns `None` on a clean end of stream.
    ///
    /// A ciphered packet whose key sources are not known yet decodes
    /// as a generic packet with the still-ciphered body.
    pub async fn read_serverbound(&self) -> Result<Option<(u8, Serverbound)>> {
        let Some(frame) = self.read_frame(true).await? else { return Ok(None) };

        let ctx = self.ctx();
        let mut cursor = Cursor::new(frame.as_slice());

        let fingerprint = u8::decode(&mut cursor, &ctx)?;
        let c = u8::decode(&mut cursor, &ctx)?;
        let cc = u8::decode(&mut cursor, &ctx)?;
        let id = (c, cc);

        let packet = match effective_cipher(&ctx, Serverbound::cipher_for_id(id)) {
            None => Serverbound::decode_body(id, &mut cursor, &ctx)?,
            Some(cipher) => {
                if ctx.secrets.packet_key_sources.is_some() {
                    let mut body = Vec::new();
                    std::io::Read::read_to_end(&mut cursor, &mut body)?;

                    let plain = ctx.secrets.decipher(cipher, &body, fingerprint)?;
                    let mut plain_cursor = Cursor::new(plain.as_slice());
                    Serverbound::decode_body(id, &mut plain_cursor, &ctx)?
                } else {
                    Serverbound::Unknown(UnknownPacket::read(id, &mut cursor)?)
                }
            }
        };

        Ok(Some((fingerprint, packet)))
    }

    /// Write a serverbound packet: allocate the fingerprint, cipher the
    /// body if the packet calls for it, and frame. Returns the
    /// fingerprint used.
    pub async fn write_serverbound(&self, packet: &Serverbound) -> Result<u8> {
        let ctx = self.ctx();

        let mut body = Vec::new();
        packet.encode_body(&mut body, &ctx)?;

        // The fingerprint is allocated under the writer lock so
        // concurrent writes cannot reorder the sequence.
        let mut writer = self.writer.lock().await;
        let fingerprint = self.take_fingerprint();

        if let Some(cipher) = effective_cipher(&ctx, packet.cipher()) {
            body = ctx.secrets.cipher(cipher, &body, fingerprint)?;
        }

        let id = packet.id();
        let mut payload = Vec::with_capacity(3 + body.len());
        payload.push(fingerprint);
        payload.push(id.0);
        payload.push(id.1);
        payload.extend_from_slice(&body);

        // The fingerprint byte is not counted by the length prefix.
        let mut frame = Vec::with_capacity(payload.len() + 5);
        VarInt((payload.len() - 1) as i32).encode(&mut frame, &ctx)?;
        frame.extend_from_slice(&payload);

        writer.write_all(&frame).await?;

        debug!(
            target: "fromage::net::connection",
            "--> {} {:?} fingerprint={}", self.peer_addr(), id, fingerprint,
        );

        Ok(fingerprint)
    }

    /// Write a clientbound packet: no fingerprint, no cipher.
    pub async fn write_clientbound(&self, packet: &Clientbound) -> Result<()> {
        let ctx = self.ctx();

        let id = packet.id();
        let mut payload = Vec::new();
        payload.push(id.0);
        payload.push(id.1);
        packet.encode_body(&mut payload, &ctx)?;

        let mut frame = Vec::with_capacity(payload.len() + 5);
        VarInt(payload.len() as i32).encode(&mut frame, &ctx)?;
        frame.extend_from_slice(&payload);

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;

        debug!(target: "fromage::net::connection", "--> {} {:?}", self.peer_addr(), id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_rollover() {
        let mut fingerprint = 98u8;
        let mut seen = vec![];

        for _ in 0..3 {
            seen.push(fingerprint);
            fingerprint = advance_fingerprint(fingerprint);
        }

        assert_eq!(seen, vec![98, 99, 0]);
    }

    #[test]
    fn fingerprints_form_mod_100_progression() {
        let mut fingerprint = 57u8;

        for step in 0..250 {
            assert_eq!(fingerprint as u32, (57 + step) % 100);
            fingerprint = advance_fingerprint(fingerprint);
        }
    }
}
