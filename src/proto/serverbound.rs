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

//! Serverbound top-level packets.

use super::{
    enums::{FashionSquadOutfitBackground, Referrer, ShamanLabel, StaffMessageType, Transformation},
    extension::ServerboundExtension,
    legacy::ServerboundLegacy,
    packet::define_packets,
    tribulle::ServerboundTribulle,
};
use crate::{
    proto::enums::LoginMethod,
    wire::{EnumOr, IntPrefixedVec, ShiftedString, UnlessBotRole},
};

define_packets! {
    pub enum Serverbound {
        (1, 1) LegacyWrapper {
            nested: ServerboundLegacy,
        }

        /// Creates a shaman label on the satellite server. Sending it
        /// while not shaman gets you kicked.
        (5, 9) CreateShamanLabel {
            label: ShamanLabel,
            x: i16,
            y: i16,
        }

        (5, 38) JoinRoom {
            // Only non-empty when choosing a room from the room list menu.
            community: String,

            // The server strips any illegal characters from the name,
            // e.g. "*\x03TribeName" joins "*TribeName" instead.
            name: String,

            // True if using the 'salonauto' command.
            auto: bool,
        }

        (6, 6) [Xor] RoomMessage {
            message: String,
        }

        (6, 10) StaffMessage {
            message_type: StaffMessageType,
            message: String,
        }

        /// Sent when certain commands are used. Not all commands send
        /// this packet, and some go to only one of the two servers.
        (6, 26) [Xor] Command {
            // The command without the '/' prefix.
            command: String,
        }

        (26, 7) ClientVerification {
            ciphered_data: IntPrefixedVec<u8>,
        }

        (26, 8) [Identification] Login {
            username: String,

            // An empty string when logging in as a guest.
            password_hash: String,
            loader_url: String,
            start_room: ShiftedString,

            ciphered_auth_token: i32,

            // Hardcoded as '18' in game.
            unk_short_6: i16,

            login_method: LoginMethod,

            // Has something to do with the username it looks like.
            unk_string_8: String,
        }

        (26, 12) EnvironmentUserId {
            // This seems to always be the player's Steam ID.
            user_id: String,

            // Seems to always be empty.
            unk_string_2: String,
        }

        /// Tests the ping of the satellite server. Staff can see the
        /// result in their `/ips` screen; the client gives up if no
        /// pong arrives within 10 seconds.
        (26, 25) Ping {}

        /// Sent periodically to keep the connection alive.
        (26, 26) KeepAlive {}

        (27, 11) SetTransformation {
            transformation: Transformation,
        }

        /// The first packet of a connection.
        (28, 1) Handshake {
            game_version: i16,
            language: String,

            // Random hardcoded string, changed routinely in the game's
            // source.
            connection_token: UnlessBotRole<String>,

            player_type: UnlessBotRole<String>,

            // 'navigator.appVersion' and 'navigator.appName' joined
            // with a '-', or just '-' when javascript is unavailable.
            browser_info: UnlessBotRole<String>,

            // The length of the loaded bytes of the loader SWF. The
            // server ends the connection on an unexpected size.
            loader_stage_size: i32,

            // SharedObject "ccf" data. Seemingly always unset.
            ccf_data: UnlessBotRole<String>,

            concatenated_font_name_hash: UnlessBotRole<String>,

            // Unescaped 'Capabilities.serverString'.
            server_string: UnlessBotRole<String>,

            referrer: EnumOr<Referrer>,

            milliseconds_since_start: i32,

            // Set by 'x_defNomJeuModule801', never by the game itself.
            game_name: String,
        }

        (28, 6) Pong {
            payload: u8,
        }

        /// Sent in response to the handshake response.
        (28, 17) SystemInformation {
            language: String,
            os: String,
            flash_version: String,

            // Always written as '0'.
            zero_byte: i8,
        }

        (29, 2) [Xor] Keyboard {
            key_code: i16,
            down: bool,
            player_x: i16,
            player_y: i16,

            // Seem to always be '0'?
            unk_short_5: i16,
            unk_short_6: i16,
        }

        (29, 3) MouseDown {
            x: i16,
            y: i16,
        }

        /// Sent to the satellite server after switching to it.
        (44, 1) SatelliteDelayedIdentification {
            timestamp: i32,
            global_id: i32,
            auth_id: i32,
        }

        (60, 3) TribulleWrapper {
            nested: ServerboundTribulle,
        }

        (149, 12) OpenFashionSquadOutfitsMenu {}

        (149, 13) AddFashionSquadOutfit {
            outfit_name: String,
            background: EnumOr<FashionSquadOutfitBackground>,
            date: String,
            outfit_code: String,
        }

        (149, 14) RemoveFashionSquadOutfit {
            outfit_id: i32,
        }

        (176, 1) SetLanguage {
            language: String,
        }

        // This ID doesn't seem to be used by the vanilla protocol at all.
        (255, 255) ExtensionWrapper {
            nested: ServerboundExtension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        secrets::Cipher,
        wire::{deserialize, serialize, Ctx},
        Secrets,
    };

    #[test]
    fn cipher_table() {
        assert_eq!(Serverbound::cipher_for_id(Login::ID), Some(Cipher::Identification));
        assert_eq!(Serverbound::cipher_for_id(RoomMessage::ID), Some(Cipher::Xor));
        assert_eq!(Serverbound::cipher_for_id(Command::ID), Some(Cipher::Xor));
        assert_eq!(Serverbound::cipher_for_id(Keyboard::ID), Some(Cipher::Xor));
        assert_eq!(Serverbound::cipher_for_id(Handshake::ID), None);
        assert_eq!(Serverbound::cipher_for_id(KeepAlive::ID), None);
    }

    #[test]
    fn handshake_roundtrip() {
        let ctx = Ctx::default();
        let handshake = Handshake {
            game_version: 666,
            language: "en".to_string(),
            connection_token: UnlessBotRole::from("token"),
            player_type: UnlessBotRole::from("Steam AIR"),
            browser_info: UnlessBotRole::from("-"),
            loader_stage_size: 0x7EE88,
            referrer: Referrer::Steam.into(),
            milliseconds_since_start: 3128,
            ..Default::default()
        };

        let data = serialize(&handshake, &ctx);
        assert_eq!(deserialize::<Handshake>(&data, &ctx).unwrap(), handshake);
    }

    #[test]
    fn handshake_elides_bot_role_fields() {
        let plain_ctx = Ctx::default();
        let bot_ctx = Ctx::new(Secrets::default().with_game_version(Secrets::BOT_ROLE_VERSION));

        let handshake = Handshake {
            game_version: Secrets::BOT_ROLE_VERSION,
            language: "en".to_string(),
            connection_token: UnlessBotRole::from("token"),
            ..Default::default()
        };

        let bot_data = serialize(&handshake, &bot_ctx);
        let plain_data = serialize(&handshake, &plain_ctx);
        assert!(bot_data.len() < plain_data.len());

        // The token does not appear on the wire under the bot role.
        let decoded = deserialize::<Handshake>(&bot_data, &bot_ctx).unwrap();
        assert_eq!(decoded.connection_token, UnlessBotRole::default());
    }

    #[test]
    fn unknown_id_decodes_generically() {
        let ctx = Ctx::default();

        let mut cursor = std::io::Cursor::new(&[0xDEu8, 0xAD][..]);
        let packet = Serverbound::decode_body((200, 200), &mut cursor, &ctx).unwrap();

        assert_eq!(packet.id(), (200, 200));
        match &packet {
            Serverbound::Unknown(p) => assert_eq!(p.body, vec![0xDE, 0xAD]),
            other => panic!("expected generic packet, got {other:?}"),
        }

        let mut out = Vec::new();
        packet.encode_body(&mut out, &ctx).unwrap();
        assert_eq!(out, vec![0xDE, 0xAD]);
    }

    #[test]
    fn wrapper_roundtrip() {
        let ctx = Ctx::default();
        let wrapper = Serverbound::TribulleWrapper(TribulleWrapper {
            nested: crate::proto::tribulle::serverbound::CreateTribe {
                tribe_name: "Kikoo".to_string(),
            }
            .into(),
        });

        let mut data = Vec::new();
        wrapper.encode_body(&mut data, &ctx).unwrap();

        let mut cursor = std::io::Cursor::new(data.as_slice());
        let decoded = Serverbound::decode_body((60, 3), &mut cursor, &ctx).unwrap();
        assert_eq!(decoded, wrapper);
    }
}
