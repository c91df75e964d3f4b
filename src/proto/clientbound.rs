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

//! Clientbound top-level packets.

use std::io::{Read, Write};

use super::{
    descriptions::PlayerDescription,
    enums::{Community, Gender, ShamanLabel, StaffMessageType, StaffRoleId, Transformation},
    extension::ClientboundExtension,
    legacy::ClientboundLegacy,
    packet::define_packets,
    tribulle::ClientboundTribulle,
};
use crate::{
    error::Result,
    wire::{
        BytePrefixedVec, CompressedString, Ctx, Decode, Encode, Leb128, ShortPrefixedVec,
        UShortPrefixedVec,
    },
};

/// Satellite ports, written as a `"-"`-joined decimal string.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PortList(pub Vec<u16>);

impl From<Vec<u16>> for PortList {
    fn from(ports: Vec<u16>) -> Self {
        Self(ports)
    }
}

impl Encode for PortList {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let joined =
            self.0.iter().map(u16::to_string).collect::<Vec<_>>().join("-");

        joined.as_str().encode(w, ctx)
    }
}

impl Decode for PortList {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let joined = String::decode(r, ctx)?;

        let mut ports = Vec::new();
        for part in joined.split('-') {
            ports.push(
                part.parse().map_err(|_| crate::Error::ParseFailed("bad port number"))?,
            );
        }

        Ok(Self(ports))
    }
}

/// A mapping from community codes to flag codes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommunityToFlag(pub Vec<(String, String)>);

impl Encode for CommunityToFlag {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = (self.0.len() as u16).encode(w, ctx)?;
        for (community, flag) in &self.0 {
            n += community.encode(w, ctx)?;
            n += flag.encode(w, ctx)?;
        }
        Ok(n)
    }
}

impl Decode for CommunityToFlag {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let len = u16::decode(r, ctx)?;

        let mut entries = Vec::with_capacity(len as usize);
        for _ in 0..len {
            entries.push((String::decode(r, ctx)?, String::decode(r, ctx)?));
        }

        Ok(Self(entries))
    }
}

/// One selectable language.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub code: String,
    pub display_name: String,
    pub flag_code: String,
}

impl Encode for LanguageInfo {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        Ok(self.code.encode(w, ctx)? +
            self.display_name.encode(w, ctx)? +
            self.flag_code.encode(w, ctx)?)
    }
}

impl Decode for LanguageInfo {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        Ok(Self {
            code: Decode::decode(r, ctx)?,
            display_name: Decode::decode(r, ctx)?,
            flag_code: Decode::decode(r, ctx)?,
        })
    }
}

define_packets! {
    pub enum Clientbound {
        (1, 1) LegacyWrapper {
            nested: ClientboundLegacy,
        }

        (5, 2) NewMap {
            code: i32,

            unk_short_2: i16,
            unk_byte_3: i8,

            xml: CompressedString,

            author: String,
            perm_code: i8,
            mirrored: bool,

            unk_boolean_8: bool,
            unk_boolean_9: bool,
            unk_boolean_10: bool,

            unk_int_11: i32,
        }

        /// Sent by the satellite server to create a shaman label.
        (5, 9) CreateShamanLabel {
            label: ShamanLabel,
            x: i16,
            y: i16,
        }

        (5, 21) JoinedRoom {
            official: bool,
            raw_name: String,
            flag_code: String,
        }

        (5, 22) SetMapTimer {
            seconds: i16,
        }

        (6, 6) RoomMessage {
            username: String,
            message: String,

            // Seems to always be 'False', and the value doesn't seem
            // to matter in the game code.
            unk_boolean_3: bool,
        }

        (6, 10) StaffMessage {
            message_type: StaffMessageType,

            // Not always used, and not always just a username.
            name: String,

            message: String,

            // Without decoration the message shows up in the general
            // channel with no frill besides being colored.
            disable_decoration: bool,

            // If 'True' then 'message' is treated as a translation key.
            is_translation: bool,

            translation_args: BytePrefixedVec<String>,
        }

        (6, 20) ServerMessage {
            general_channel: bool,

            // A translation key not starting with '$', or containing a
            // space or newline, is just treated as the final message.
            translation_key: String,
            translation_args: BytePrefixedVec<String>,
        }

        (26, 2) LoginSuccess {
            global_id: i32,
            username: String,
            played_time: i32,
            community: Community,
            session_id: i32,

            // Whether the account is registered rather than a guest.
            registered: bool,

            staff_role_ids: BytePrefixedVec<StaffRoleId>,

            unk_boolean_8: bool,

            // Never used despite having maybe meaningful values.
            unk_ushort_9: u16,

            community_to_flag: CommunityToFlag,
        }

        /// The response to a serverbound handshake.
        (26, 3) HandshakeResponse {
            num_online_players: i32,
            language: String,
            country: String,
            auth_token: i32,

            // If 'True' the game calls an empty function.
            unk_boolean_5: bool,
        }

        /// The login anti-cheat challenge.
        (26, 7) ClientVerification {
            verification_token: i32,
        }

        (26, 25) Pong {}

        (26, 35) AccountError {
            error_code: i8,
        }

        (27, 10) SetCanTransform {
            can_transform: bool,
        }

        (27, 11) SetTransformation {
            session_id: i32,
            transformation: Transformation,
        }

        (28, 6) Ping {
            payload: u8,

            // Which connection the pong should answer on.
            main_server: bool,
        }

        /// Makes sure the client is connected to the expected server.
        (28, 98) ReaffirmServerAddress {
            address: String,
        }

        (29, 2) BindKeyboard {
            key_code: i16,
            down: bool,
            active: bool,
        }

        (29, 3) BindMouseDown {
            active: bool,
        }

        (29, 4) SetPlayerNameColor {
            session_id: i32,
            color: i32,
        }

        (29, 5) CleanupLuaScripting {}

        /// Tells the client to change its satellite server.
        (44, 1) ChangeSatelliteServer {
            timestamp: i32,
            global_id: i32,
            auth_id: i32,

            address: String,
            ports: PortList,
        }

        (60, 3) TribulleWrapper {
            nested: ClientboundTribulle,
        }

        (60, 4) SetHandlingTribullePackets {
            handle_tribulle_packets: bool,
        }

        (100, 72) SetTitle {
            gender: Gender,
            title_id: u16,
        }

        (144, 1) SetActivePlayers {
            players: ShortPrefixedVec<PlayerDescription>,
        }

        (144, 2) UpdateActivePlayer {
            player: PlayerDescription,

            unk_boolean_2: bool,

            // If 'True' it resets a timer calling an empty function
            // every second.
            unk_boolean_3: bool,
        }

        (144, 31) SetLoginBanner {
            week_number: Leb128,
        }

        /// Sets the popup image showing a new event or new limited
        /// edition shop items.
        (144, 35) SetNewsPopupFlyer {
            image_name: String,
        }

        (176, 5) SetLanguage {
            language: String,
            country: String,
        }

        (176, 6) LanguageSelectionInformation {
            languages: UShortPrefixedVec<LanguageInfo>,
        }

        // This ID doesn't seem to be used by the vanilla protocol at all.
        (255, 255) ExtensionWrapper {
            nested: ClientboundExtension,
        }
    }
}

impl ChangeSatelliteServer {
    /// The single-character sentinel address telling the client to
    /// stay where it is.
    pub fn should_ignore(&self) -> bool {
        self.address == "x"
    }
}

impl SetLoginBanner {
    pub fn image_url(&self) -> String {
        format!(
            "https://www.transformice.com/images/x_transformice/x_aventure/x_banniere/x_{}.jpg",
            self.week_number.0,
        )
    }
}

impl SetNewsPopupFlyer {
    /// The client eventually loads this image and shows it on screen.
    pub fn image_url(&self) -> String {
        format!("https://www.transformice.com/images/x_nouveaute/{}", self.image_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{deserialize, serialize};

    #[test]
    fn port_list_wire_form() {
        let ctx = Ctx::default();

        let ports = PortList(vec![11801, 12801]);
        let data = serialize(&ports, &ctx);
        assert_eq!(&data[2..], b"11801-12801");
        assert_eq!(deserialize::<PortList>(&data, &ctx).unwrap(), ports);
    }

    #[test]
    fn change_satellite_server_sentinel() {
        let ignored = ChangeSatelliteServer { address: "x".to_string(), ..Default::default() };
        assert!(ignored.should_ignore());

        let real = ChangeSatelliteServer {
            address: "51.75.130.180".to_string(),
            ports: vec![11801].into(),
            ..Default::default()
        };
        assert!(!real.should_ignore());
    }

    #[test]
    fn login_success_roundtrip() {
        let ctx = Ctx::default();
        let packet = LoginSuccess {
            global_id: 1234,
            username: "Souris".to_string(),
            played_time: 99,
            community: Community::Fr,
            session_id: 5678,
            registered: true,
            staff_role_ids: vec![StaffRoleId::Modo, StaffRoleId::MapCrew].into(),
            community_to_flag: CommunityToFlag(vec![("en".into(), "gb".into())]),
            ..Default::default()
        };

        let data = serialize(&packet, &ctx);
        assert_eq!(deserialize::<LoginSuccess>(&data, &ctx).unwrap(), packet);
    }

    #[test]
    fn new_map_roundtrip() {
        let ctx = Ctx::default();
        let packet = NewMap {
            code: 1234567,
            xml: CompressedString::from("<C><P /><Z><S /></Z></C>"),
            author: "Souris_1".to_string(),
            perm_code: 1,
            mirrored: true,
            ..Default::default()
        };

        let data = serialize(&packet, &ctx);
        assert_eq!(deserialize::<NewMap>(&data, &ctx).unwrap(), packet);
    }

    #[test]
    fn banner_image_url() {
        let packet = SetLoginBanner { week_number: Leb128(31) };
        assert!(packet.image_url().ends_with("x_31.jpg"));
    }
}
