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

//! Per-session secrets and the packet ciphers keyed from them.
//!
//! The key material originates outside this crate (external tooling
//! extracts it from the game loader) and reaches us either through
//! configuration or through extension packets.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use lazy_static::lazy_static;

use crate::{
    crypto::{keystream, xxtea},
    error::Result,
    Error,
};

/// The ciphers applied to the bodies of selected serverbound packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// XXTEA over u32 blocks, used for the login packet.
    Identification,
    /// Keystream XOR offset by the packet fingerprint.
    Xor,
}

impl Cipher {
    /// The name folded into key derivation.
    pub fn name(self) -> &'static str {
        match self {
            Self::Identification => "identification",
            Self::Xor => "msg",
        }
    }
}

lazy_static! {
    // Key derivation is deterministic, so derived keys are memoized
    // per (sources, name) pair.
    static ref KEY_CACHE: Mutex<HashMap<(Vec<u8>, String), Arc<Vec<u32>>>> =
        Mutex::new(HashMap::new());
}

/// Derive a cipher key from the packet key sources and a cipher name.
///
/// All arithmetic is 32-bit two's-complement with wrapping semantics;
/// the right shift is arithmetic.
pub fn derive_key(sources: &[u8], name: &str) -> Arc<Vec<u32>> {
    let cache_key = (sources.to_vec(), name.to_string());

    let mut cache = KEY_CACHE.lock().expect("key cache poisoned");
    if let Some(key) = cache.get(&cache_key) {
        return key.clone()
    }

    let name_bytes = name.as_bytes();
    let mut num: i32 = 0x1505;

    for (i, &source) in sources.iter().enumerate() {
        num = num
            .wrapping_shl(5)
            .wrapping_add(num)
            .wrapping_add(source as i32)
            .wrapping_add(name_bytes[i % name_bytes.len()] as i32);
    }

    let mut key = Vec::with_capacity(sources.len());
    for _ in 0..sources.len() {
        num ^= num.wrapping_shl(13);
        num ^= num >> 17;
        num ^= num.wrapping_shl(5);

        key.push(num as u32);
    }

    let key = Arc::new(key);
    cache.insert(cache_key, key.clone());
    key
}

fn xxtea_key(key: &[u32]) -> Result<[u32; 4]> {
    if key.len() < 4 {
        return Err(Error::CipherFailed("key has fewer than 4 words"))
    }

    Ok([key[0], key[1], key[2], key[3]])
}

fn xxtea_cipher_data(data: &[u8], key: &[u32]) -> Result<Vec<u8>> {
    let key = xxtea_key(key)?;

    // Pad to 8 bytes, then to whole blocks.
    let mut padded = data.to_vec();
    if padded.len() < 8 {
        padded.resize(8, 0);
    }
    while padded.len() % 4 != 0 {
        padded.push(0);
    }

    let mut blocks: Vec<u32> =
        padded.chunks_exact(4).map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]])).collect();

    xxtea::encode_in_place(&mut blocks, &key);

    let mut out = Vec::with_capacity(2 + blocks.len() * 4);
    out.extend_from_slice(&(blocks.len() as u16).to_be_bytes());
    for block in blocks {
        out.extend_from_slice(&block.to_be_bytes());
    }

    Ok(out)
}

fn xxtea_decipher_data(data: &[u8], key: &[u32]) -> Result<Vec<u8>> {
    let key = xxtea_key(key)?;

    if data.len() < 2 {
        return Err(Error::CipherFailed("missing block count"))
    }

    let num_blocks = u16::from_be_bytes([data[0], data[1]]) as usize;
    let body = &data[2..];
    if body.len() < num_blocks * 4 {
        return Err(Error::CipherFailed("ciphertext shorter than its block count"))
    }

    let mut blocks: Vec<u32> = body[..num_blocks * 4]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if blocks.is_empty() {
        return Ok(vec![])
    }

    xxtea::decode_in_place(&mut blocks, &key);

    let mut out = Vec::with_capacity(blocks.len() * 4);
    for block in blocks {
        out.extend_from_slice(&block.to_be_bytes());
    }

    Ok(out)
}

/// The secrets of a session.
///
/// This is an immutable value object: it is constructed once and only
/// ever replaced wholesale through the `with_*` methods.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Secrets {
    pub server_address: Option<String>,
    pub server_ports: Vec<u16>,
    pub game_version: Option<i16>,
    pub connection_token: Option<String>,
    pub auth_key: Option<i32>,
    /// At most 16 bytes of key material from external tooling.
    pub packet_key_sources: Option<Vec<u8>>,
    pub client_verification_template: Option<Vec<u8>>,
}

impl Secrets {
    /// The sentinel game version of trusted automated clients. It
    /// disables several handshake fields and the identification cipher.
    pub const BOT_ROLE_VERSION: i16 = 666;

    /// The literal marker substituted with the verification token in
    /// the client verification template.
    const VERIFICATION_MARKER: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

    pub fn is_bot_role(&self) -> bool {
        self.game_version == Some(Self::BOT_ROLE_VERSION)
    }

    pub fn with_server_address(mut self, address: impl Into<String>) -> Self {
        self.server_address = Some(address.into());
        self
    }

    pub fn with_server_ports(mut self, ports: Vec<u16>) -> Self {
        self.server_ports = ports;
        self
    }

    pub fn with_game_version(mut self, version: i16) -> Self {
        self.game_version = Some(version);
        self
    }

    pub fn with_connection_token(mut self, token: impl Into<String>) -> Self {
        self.connection_token = Some(token.into());
        self
    }

    pub fn with_auth_key(mut self, auth_key: i32) -> Self {
        self.auth_key = Some(auth_key);
        self
    }

    pub fn with_packet_key_sources(mut self, sources: Vec<u8>) -> Self {
        self.packet_key_sources = Some(sources);
        self
    }

    pub fn with_client_verification_template(mut self, template: Vec<u8>) -> Self {
        self.client_verification_template = Some(template);
        self
    }

    /// The derived key for the given cipher name.
    pub fn key(&self, name: &str) -> Result<Arc<Vec<u32>>> {
        let sources = self.packet_key_sources.as_ref().ok_or(Error::MissingKeySources)?;

        Ok(derive_key(sources, name))
    }

    /// Cipher a packet body.
    pub fn cipher(&self, cipher: Cipher, data: &[u8], fingerprint: u8) -> Result<Vec<u8>> {
        let key = self.key(cipher.name())?;

        match cipher {
            Cipher::Identification => xxtea_cipher_data(data, &key),
            Cipher::Xor => {
                let mut data = data.to_vec();
                keystream::apply_in_place(&mut data, &key, fingerprint);
                Ok(data)
            }
        }
    }

    /// Decipher a packet body.
    pub fn decipher(&self, cipher: Cipher, data: &[u8], fingerprint: u8) -> Result<Vec<u8>> {
        let key = self.key(cipher.name())?;

        match cipher {
            Cipher::Identification => xxtea_decipher_data(data, &key),
            Cipher::Xor => {
                let mut data = data.to_vec();
                keystream::apply_in_place(&mut data, &key, fingerprint);
                Ok(data)
            }
        }
    }

    /// Build the response to the login anti-cheat challenge: the
    /// template with its marker substituted by the token in network
    /// byte order, XXTEA-enciphered with a key derived using the
    /// token's decimal string as the cipher name.
    pub fn client_verification_data(&self, verification_token: i32) -> Result<Vec<u8>> {
        let template = self
            .client_verification_template
            .as_ref()
            .ok_or(Error::CipherFailed("no client verification template"))?;
        let sources = self.packet_key_sources.as_ref().ok_or(Error::MissingKeySources)?;

        let token_bytes = verification_token.to_be_bytes();
        let mut data = Vec::with_capacity(template.len());

        let mut i = 0;
        while i < template.len() {
            if template[i..].starts_with(&Self::VERIFICATION_MARKER) {
                data.extend_from_slice(&token_bytes);
                i += Self::VERIFICATION_MARKER.len();
            } else {
                data.push(template[i]);
                i += 1;
            }
        }

        let key = derive_key(sources, &verification_token.to_string());
        xxtea_cipher_data(&data, &key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_vector() {
        let key = derive_key(&[0x11, 0x22], "msg");
        assert_eq!(*key, vec![0xC877_FC25, 0xC99B_BC5C]);

        let sources: Vec<u8> = (1..=16).collect();
        let key = derive_key(&sources, "identification");
        assert_eq!(key.len(), 16);
        assert_eq!(key[..4], [0x7936_354D, 0x4C69_1AC2, 0x891C_C61A, 0x2A2E_5055]);
    }

    #[test]
    fn key_derivation_memoized() {
        let a = derive_key(&[1, 2, 3, 4], "msg");
        let b = derive_key(&[1, 2, 3, 4], "msg");
        assert!(Arc::ptr_eq(&a, &b));

        let c = derive_key(&[1, 2, 3, 4], "identification");
        assert!(!Arc::ptr_eq(&a, &c));
    }

    fn secrets() -> Secrets {
        Secrets::default().with_packet_key_sources((1..=16).collect())
    }

    #[test]
    fn identification_cipher_roundtrip() {
        let secrets = secrets();

        for data in [&b""[..], b"a", b"exactly8", b"rather longer than one block"] {
            let ciphered = secrets.cipher(Cipher::Identification, data, 0).unwrap();

            // u16 block count plus whole blocks, at least two of them.
            let num_blocks = u16::from_be_bytes([ciphered[0], ciphered[1]]) as usize;
            assert!(num_blocks >= 2);
            assert_eq!(ciphered.len(), 2 + num_blocks * 4);

            let deciphered = secrets.decipher(Cipher::Identification, &ciphered, 0).unwrap();
            // Deciphering keeps the zero padding.
            assert_eq!(&deciphered[..data.len()], data);
            assert!(deciphered[data.len()..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn xor_cipher_roundtrip() {
        let secrets = secrets();

        let data = b"/mort".to_vec();
        for fingerprint in [0u8, 57, 99] {
            let ciphered = secrets.cipher(Cipher::Xor, &data, fingerprint).unwrap();
            assert_eq!(ciphered.len(), data.len());
            assert_ne!(ciphered, data);

            let deciphered = secrets.decipher(Cipher::Xor, &ciphered, fingerprint).unwrap();
            assert_eq!(deciphered, data);
        }
    }

    #[test]
    fn cipher_without_key_sources() {
        let secrets = Secrets::default();
        assert!(matches!(
            secrets.cipher(Cipher::Xor, b"data", 0),
            Err(Error::MissingKeySources),
        ));
    }

    #[test]
    fn client_verification_data_substitutes_marker() {
        let secrets = secrets().with_client_verification_template(vec![
            0x01, 0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0x03, 0x04,
        ]);

        let data = secrets.client_verification_data(0x1234_5678).unwrap();

        // Decipher with the same token-derived key to observe the
        // substituted token.
        let key = derive_key(secrets.packet_key_sources.as_ref().unwrap(), "305419896");
        let plain = xxtea_decipher_data(&data, &key).unwrap();
        assert_eq!(&plain[..8], &[0x01, 0x02, 0x12, 0x34, 0x56, 0x78, 0x03, 0x04]);
    }

    #[test]
    fn bot_role() {
        assert!(Secrets::default().with_game_version(666).is_bot_role());
        assert!(!Secrets::default().with_game_version(42).is_bot_role());
        assert!(!Secrets::default().is_bot_role());
    }
}
