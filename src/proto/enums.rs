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

//! Enumerations appearing in packet fields.

use crate::wire_enum;

wire_enum! {
    /// Where the account creating the session was referred from. The
    /// non-zero values look like account IDs freed up for this purpose.
    pub enum Referrer: i32 {
        Unknown = 0,
        Facebook = 58524153,
        Steam = 65102833,
    }
}

wire_enum! {
    /// A player's gender as the game describes it.
    pub enum Gender: i8 {
        Unknown = 0,
        Feminine = 1,
        Masculine = 2,
    }
}

wire_enum! {
    pub enum LoginMethod: i8 {
        // More values exist in the game but only this one is used.
        Normal = 0,
    }
}

wire_enum! {
    pub enum Community: i8 {
        En = 0,
        Fr = 1,
        Ru = 2,
        Br = 3,
        Es = 4,
        Cn = 5,
        Tr = 6,
        Vk = 7,
        Pl = 8,
        Hu = 9,
        Nl = 10,
        Ro = 11,
        Id = 12,
        De = 13,
        E2 = 14,
        Ar = 15,
        Ph = 16,
        Lt = 17,
        Jp = 18,
        Ch = 19,
        Fi = 20,
        Cz = 21,
        Sk = 22,
        Hr = 23,
        Bg = 24,
        Lv = 25,
        He = 26,
        It = 27,
        // No 28.
        Et = 29,
        Az = 30,
        Pt = 31,
    }
}

wire_enum! {
    /// Like [`Community`] but shifted by one, used on the community
    /// platform side.
    pub enum TribulleCommunity: i32 {
        En = 1,
        Fr = 2,
        Ru = 3,
        Br = 4,
        Es = 5,
        Cn = 6,
        Tr = 7,
        Vk = 8,
        Pl = 9,
        Hu = 10,
        Nl = 11,
        Ro = 12,
        Id = 13,
        De = 14,
        E2 = 15,
        Ar = 16,
        Ph = 17,
        Lt = 18,
        Jp = 19,
        Ch = 20,
        Fi = 21,
        Cz = 22,
        Hr = 23,
        Sk = 24,
        Bg = 25,
        Lv = 26,
        He = 27,
        It = 28,
        Et = 29,
        Az = 30,
        Pt = 31,
    }
}

wire_enum! {
    pub enum ShamanLabel: i8 {
        StayThere = 0,
        FollowMe = 1,
        GoThere = 2,
        WorkInProgress = 3,
        KeepCalm = 4,
        GetReady = 5,
        NoIdea = 6,
    }
}

wire_enum! {
    pub enum Transformation: i16 {
        SmallBox = 48,
        LargeBox = 49,
        Anvil = 50,
        SmallPlank = 51,
        LargePlank = 52,
        Mouse = 53,
    }
}

wire_enum! {
    /// The `All` variants reach members of the team in every community,
    /// not just the sender's.
    pub enum StaffMessageType: i8 {
        ModeratorRoom = 0,
        AdministratorGlobal = 1,
        Arbitre = 2,
        Modo = 3,
        ModoAll = 4,
        ArbitreAll = 5,
        ModeratorCommunity = 6,
        LuaTeam = 7,
        MapCrew = 8,
        FunCorp = 9,
        FashionSquad = 10,
    }
}

wire_enum! {
    pub enum StaffRoleId: i8 {
        None = 0,
        Arbitre = 3,
        Modo = 5,
        Sentinel = 7,
        Administrator = 10,
        MapCrew = 11,
        LuaTeam = 12,
        FunCorp = 13,
        FashionSquad = 15,
    }
}

wire_enum! {
    pub enum PlayerActivity: i8 {
        Alive = 0,
        Dead = 1,
        /// Not added to the record of players that can be acted on.
        Inert = 2,
    }
}

wire_enum! {
    pub enum DeathType: i8 {
        Normal = 0,
        CollisionDamage = 1,
        NoBubbleSound = 3,
        Crushed = 50,
        Spiked = 51,
        Burned = 52,
        Decapitated = 53,
        Dissolved = 54,
        Snapped = 55,
        Halved = 56,
    }
}

wire_enum! {
    pub enum ExplosionParticles: i8 {
        Clouds = 0,
        ScatterGlitter = 1,
        /// Not a value explicated in the game, just one that causes no
        /// particles.
        None = 2,
    }
}

wire_enum! {
    pub enum FashionSquadOutfitBackground: i16 {
        Greenery = 0,
        Beach = 1,
        Ocean = 2,
        Valentines = 3,
        Halloween = 4,
        Fishing = 5,
    }
}

wire_enum! {
    pub enum MapCategory: i16 {
        /// Only seen in room property map rotations, never with an
        /// actual vanilla map.
        Vanilla = -1,
        Standard = 0,
        Protected = 1,
        Prime = 2,
        PrimeBootcamp = 3,
        Shaman = 4,
        Art = 5,
        Mechanism = 6,
        NoShaman = 7,
        DualShaman = 8,
        Miscellaneous = 9,
        Survivor = 10,
        VampireSurvivor = 11,
        Bootcamp = 13,
        Racing = 17,
        Defilante = 18,
        Music = 19,
        SurvivorTest = 20,
        VampireSurvivorTest = 21,
        TribeHouse = 22,
        BootcampTest = 23,
        DualShamanSurvivor = 24,
        DualShamanTest = 32,
        DualShamanSurvivorTest = 34,
        RacingTest = 38,
        Module = 41,
        NoShamanTest = 42,
        DeletedInappropriate = 43,
        Deleted = 44,
        Thematic = 66,
        UserMadeVanilla = 87,
        Unknown88 = 88,
        /// Without this category the button returning to the map
        /// editor is not made available.
        MapEditor = 100,
        Halloween = 666,
    }
}

impl MapCategory {
    /// Categories the client still presents as vanilla, forgetting the
    /// author and map code.
    pub fn overridden_by_vanilla(self) -> bool {
        matches!(
            self,
            Self::DeletedInappropriate | Self::UserMadeVanilla | Self::MapEditor | Self::Halloween
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{deserialize, serialize, Ctx, EnumOr};

    #[test]
    fn reprs() {
        let ctx = Ctx::default();

        assert_eq!(serialize(&Gender::Masculine, &ctx), vec![2u8]);
        assert_eq!(serialize(&Transformation::Mouse, &ctx), vec![0u8, 53]);
        assert_eq!(serialize(&Referrer::Steam, &ctx), 65102833i32.to_be_bytes().to_vec());
        assert_eq!(deserialize::<MapCategory>(&[0xFF, 0xFF], &ctx).unwrap(), MapCategory::Vanilla);
    }

    #[test]
    fn unknown_referrer_round_trips() {
        let ctx = Ctx::default();
        let raw = 1234i32.to_be_bytes();

        let decoded = deserialize::<EnumOr<Referrer>>(&raw, &ctx).unwrap();
        assert_eq!(decoded, EnumOr::Raw(1234));
        assert_eq!(serialize(&decoded, &ctx), raw.to_vec());
    }

    #[test]
    fn vanilla_override() {
        assert!(MapCategory::MapEditor.overridden_by_vanilla());
        assert!(MapCategory::Halloween.overridden_by_vanilla());
        assert!(!MapCategory::Standard.overridden_by_vanilla());
    }
}
