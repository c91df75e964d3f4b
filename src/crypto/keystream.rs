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

//! The keystream XOR cipher applied to selected packet bodies.
//!
//! Byte `i` of the output is `data[i] ^ key[(i + fingerprint + 1) % K]`,
//! with the key words truncated to their low byte. The operation is its
//! own inverse.

/// XOR data in place against the keystream offset by the packet
/// fingerprint.
pub fn apply_in_place(data: &mut [u8], key: &[u32], fingerprint: u8) {
    if key.is_empty() {
        return
    }

    let offset = fingerprint as usize + 1;
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(i + offset) % key.len()] as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric() {
        let key = [0x11u32, 0x2222, 0x3333_33, 0x4444_4444];
        let original = b"attack at dawn".to_vec();

        for fingerprint in [0u8, 1, 42, 99] {
            let mut data = original.clone();
            apply_in_place(&mut data, &key, fingerprint);
            assert_ne!(data, original);

            apply_in_place(&mut data, &key, fingerprint);
            assert_eq!(data, original);
        }
    }

    #[test]
    fn fingerprint_offsets_keystream() {
        let key = [1u32, 2, 3];

        let mut a = vec![0u8; 6];
        apply_in_place(&mut a, &key, 0);
        // Key bytes starting from index (0 + 0 + 1) % 3 = 1.
        assert_eq!(a, vec![2, 3, 1, 2, 3, 1]);

        let mut b = vec![0u8; 6];
        apply_in_place(&mut b, &key, 1);
        assert_eq!(b, vec![3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn only_low_byte_of_key_words() {
        let mut data = vec![0u8; 2];
        apply_in_place(&mut data, &[0xABCDu32, 0x100], 0);
        assert_eq!(data, vec![0x00, 0xCD]);
    }
}
