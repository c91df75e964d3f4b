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

//! Packets of the community platform, used for inter-room and
//! inter-game communication.
//!
//! The name "tribulle" is jargon from the game's code, from the French
//! "tri" (sorting) and "bulle" (bubble), the game's name for rooms.

pub use clientbound::ClientboundTribulle;
pub use serverbound::ServerboundTribulle;

pub mod serverbound {
    use crate::proto::packet::define_tribulle_packets;

    define_tribulle_packets! {
        pub enum ServerboundTribulle {
            52 SendWhisper {
                receiver: String,
                message: String,
            }

            78 TribeInvite {
                target: String,
            }

            80 AnswerTribeInvite {
                inviter: String,
                accepted: bool,
            }

            84 CreateTribe {
                tribe_name: String,
            }

            102 ChangeTribeHouseMap {
                map_code: i32,
            }

            108 OpenTribeMenu {
                include_disconnected_members: bool,
            }

            110 CloseTribeMenu {}

            112 ChangeTribeMemberRank {
                target: String,
                rank_index: i8,
            }
        }
    }
}

pub mod clientbound {
    use crate::{
        proto::{enums::TribulleCommunity, packet::define_tribulle_packets},
        wire::{EnumOr, SignedLengthString},
    };

    define_tribulle_packets! {
        pub enum ClientboundTribulle {
            66 Whisper {
                sender: SignedLengthString,
                community: EnumOr<TribulleCommunity>,
                receiver: SignedLengthString,
                message: SignedLengthString,
            }

            86 TribeInvite {
                inviter: SignedLengthString,
                tribe_name: SignedLengthString,
            }

            87 AnswerTribeInvite {
                target: SignedLengthString,
                accepted: bool,
            }

            88 TribeMemberConnected {
                username: SignedLengthString,
            }

            90 TribeMemberDisconnected {
                username: SignedLengthString,
            }

            91 TribeMemberJoined {
                username: SignedLengthString,
            }

            92 TribeMemberLeft {
                username: SignedLengthString,
            }

            124 TribeMemberRankChanged {
                initiator: SignedLengthString,
                target: SignedLengthString,
                rank_name: SignedLengthString,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{deserialize, serialize, Ctx, SignedLengthString};

    #[test]
    fn whisper_wire_form() {
        let ctx = Ctx::default();

        let whisper = ClientboundTribulle::Whisper(clientbound::Whisper {
            sender: SignedLengthString::from("Souris"),
            community: crate::proto::enums::TribulleCommunity::Fr.into(),
            receiver: SignedLengthString::from("Fromage"),
            message: SignedLengthString::from("salut"),
        });

        let data = serialize(&whisper, &ctx);
        // i16 id then the body.
        assert_eq!(&data[..2], &[0, 66]);
        assert_eq!(deserialize::<ClientboundTribulle>(&data, &ctx).unwrap(), whisper);
    }

    #[test]
    fn unknown_id_round_trips() {
        let ctx = Ctx::default();

        let data = [0x00u8, 0xFF, 0xAA, 0xBB];
        let decoded = deserialize::<ClientboundTribulle>(&data, &ctx).unwrap();
        assert_eq!(decoded.id(), 255);
        assert_eq!(serialize(&decoded, &ctx), data.to_vec());
    }

    #[test]
    fn serverbound_roundtrip() {
        let ctx = Ctx::default();

        let invite = ServerboundTribulle::TribeInvite(serverbound::TribeInvite {
            target: "Fromage".to_string(),
        });

        let data = serialize(&invite, &ctx);
        assert_eq!(deserialize::<ServerboundTribulle>(&data, &ctx).unwrap(), invite);
    }
}
