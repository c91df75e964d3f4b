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

//! The "SHAKikoo" password hashing scheme used on the login path.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

const SALT: [u8; 32] = [
    0xF7, 0x1A, 0xA6, 0xDE, 0x8F, 0x17, 0x76, 0xA8, 0x03, 0x9D, 0x32, 0xB8, 0xA1, 0x56, 0xB2,
    0xA9, 0x3E, 0xDD, 0x43, 0x9D, 0xC5, 0xDD, 0xCE, 0x56, 0xD3, 0xB7, 0xA4, 0x05, 0x4A, 0x0D,
    0x08, 0xB0,
];

/// Hash a password: SHA-256, hex-encode, append the fixed salt,
/// SHA-256 again, base64 the final digest.
pub fn shakikoo(data: &str) -> String {
    let base_hash = Sha256::digest(data.as_bytes());

    let mut salted = hex::encode(base_hash).into_bytes();
    salted.extend_from_slice(&SALT);

    STANDARD.encode(Sha256::digest(&salted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(shakikoo("test"), "6Kpl3yoH6HJ4CLB2PuwR9IagM13Ky1aO9XW6lJUl3YE=");
        assert_eq!(shakikoo("hunter2"), "ghXyt0qFlRb8lHNhmDbeAugDjld07xOzxZ0TEzi1coc=");
    }
}
