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

//! Extension packets: not part of the vanilla protocol, spoken only
//! between a proxy and its local tooling. A proxy never forwards these
//! upstream.

use super::packet::define_extension_packets;
use crate::wire::GreedyVec;

define_extension_packets! {
    pub enum ServerboundExtension {
        /// The per-session key material extracted by external tooling.
        "packet_key_sources" KeySources {
            packet_key_sources: GreedyVec<u8>,
        }

        /// The XOR key the auth token is proven with.
        "auth_key" AuthKey {
            auth_key: i32,
        }

        /// Where the real main server lives, for proxies with no
        /// static upstream configured.
        "main_server_info" MainServerInfo {
            address: String,
            ports: GreedyVec<u16>,
        }
    }
}

define_extension_packets! {
    pub enum ClientboundExtension {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{deserialize, serialize, Ctx};

    #[test]
    fn key_sources_roundtrip() {
        let ctx = Ctx::default();

        let packet = ServerboundExtension::KeySources(KeySources {
            packet_key_sources: (1..=16).collect::<Vec<u8>>().into(),
        });

        let data = serialize(&packet, &ctx);
        // String id prefix.
        assert_eq!(&data[..2], &[0, 18]);
        assert_eq!(&data[2..20], b"packet_key_sources");
        assert_eq!(deserialize::<ServerboundExtension>(&data, &ctx).unwrap(), packet);
    }

    #[test]
    fn main_server_info_roundtrip() {
        let ctx = Ctx::default();

        let packet = ServerboundExtension::MainServerInfo(MainServerInfo {
            address: "51.75.130.180".to_string(),
            ports: vec![11801u16, 12801].into(),
        });

        let data = serialize(&packet, &ctx);
        assert_eq!(deserialize::<ServerboundExtension>(&data, &ctx).unwrap(), packet);
    }

    #[test]
    fn unknown_extension_id() {
        let ctx = Ctx::default();

        let mut data = serialize(&"who_knows".to_string(), &ctx);
        data.extend([1, 2, 3]);

        let decoded = deserialize::<ServerboundExtension>(&data, &ctx).unwrap();
        assert_eq!(decoded.id(), "who_knows");
        assert_eq!(serialize(&decoded, &ctx), data);
    }
}
