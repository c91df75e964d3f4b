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

//! Compound record types shared between packets.

use std::io::{Read, Write};

use super::enums::{Gender, PlayerActivity};
use crate::{
    error::Result,
    wire::{Ctx, Decode, Encode, ScaledShort, SignedLengthString},
};

/// One entry of a friend list.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FriendDescription {
    pub id: i32,
    pub name: SignedLengthString,
    pub gender: Gender,
    pub avatar_id: i32,
    pub bidirectional: bool,
    pub connected: bool,
    pub game_id: i32,
    pub room_name: SignedLengthString,
    pub last_login: i32,
}

impl Encode for FriendDescription {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = self.id.encode(w, ctx)?;
        n += self.name.encode(w, ctx)?;
        n += self.gender.encode(w, ctx)?;
        n += self.avatar_id.encode(w, ctx)?;
        n += (self.bidirectional as i8).encode(w, ctx)?;
        n += (self.connected as i8).encode(w, ctx)?;
        n += self.game_id.encode(w, ctx)?;
        n += self.room_name.encode(w, ctx)?;
        n += self.last_login.encode(w, ctx)?;
        Ok(n)
    }
}

impl Decode for FriendDescription {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        Ok(Self {
            id: Decode::decode(r, ctx)?,
            name: Decode::decode(r, ctx)?,
            gender: Decode::decode(r, ctx)?,
            avatar_id: Decode::decode(r, ctx)?,
            bidirectional: i8::decode(r, ctx)? != 0,
            connected: i8::decode(r, ctx)? != 0,
            game_id: Decode::decode(r, ctx)?,
            room_name: Decode::decode(r, ctx)?,
            last_login: Decode::decode(r, ctx)?,
        })
    }
}

/// Summary of a tribe.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TribeDescription {
    pub name: SignedLengthString,
    pub id: i32,
    pub greeting: SignedLengthString,
    pub house_map: i32,
}

impl Encode for TribeDescription {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = self.name.encode(w, ctx)?;
        n += self.id.encode(w, ctx)?;
        n += self.greeting.encode(w, ctx)?;
        n += self.house_map.encode(w, ctx)?;
        Ok(n)
    }
}

impl Decode for TribeDescription {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        Ok(Self {
            name: Decode::decode(r, ctx)?,
            id: Decode::decode(r, ctx)?,
            greeting: Decode::decode(r, ctx)?,
            house_map: Decode::decode(r, ctx)?,
        })
    }
}

/// Everything the room list needs to know about a player.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlayerDescription {
    pub username: String,
    pub session_id: i32,
    pub is_shaman: bool,
    pub activity: PlayerActivity,
    pub score: i16,
    pub cheeses: i8,
    pub title_id: i16,
    pub title_stars: i8,
    pub gender: Gender,
    // A lot of times the string '0', sometimes a different number.
    // Same value as the avatar ID seemingly.
    pub unk_string_10: String,
    pub outfit_code: String,
    pub unk_boolean_12: bool,
    pub mouse_color: i32,
    pub shaman_color: i32,
    // Staff name color?
    pub unk_int_15: i32,
    pub name_color: i32,
    pub context_id: u8,
}

impl Encode for PlayerDescription {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = self.username.encode(w, ctx)?;
        n += self.session_id.encode(w, ctx)?;
        n += self.is_shaman.encode(w, ctx)?;
        n += self.activity.encode(w, ctx)?;
        n += self.score.encode(w, ctx)?;
        n += self.cheeses.encode(w, ctx)?;
        n += self.title_id.encode(w, ctx)?;
        n += self.title_stars.encode(w, ctx)?;
        n += self.gender.encode(w, ctx)?;
        n += self.unk_string_10.encode(w, ctx)?;
        n += self.outfit_code.encode(w, ctx)?;
        n += self.unk_boolean_12.encode(w, ctx)?;
        n += self.mouse_color.encode(w, ctx)?;
        n += self.shaman_color.encode(w, ctx)?;
        n += self.unk_int_15.encode(w, ctx)?;
        n += self.name_color.encode(w, ctx)?;
        n += self.context_id.encode(w, ctx)?;
        Ok(n)
    }
}

impl Decode for PlayerDescription {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        Ok(Self {
            username: Decode::decode(r, ctx)?,
            session_id: Decode::decode(r, ctx)?,
            is_shaman: Decode::decode(r, ctx)?,
            activity: Decode::decode(r, ctx)?,
            score: Decode::decode(r, ctx)?,
            cheeses: Decode::decode(r, ctx)?,
            title_id: Decode::decode(r, ctx)?,
            title_stars: Decode::decode(r, ctx)?,
            gender: Decode::decode(r, ctx)?,
            unk_string_10: Decode::decode(r, ctx)?,
            outfit_code: Decode::decode(r, ctx)?,
            unk_boolean_12: Decode::decode(r, ctx)?,
            mouse_color: Decode::decode(r, ctx)?,
            shaman_color: Decode::decode(r, ctx)?,
            unk_int_15: Decode::decode(r, ctx)?,
            name_color: Decode::decode(r, ctx)?,
            context_id: Decode::decode(r, ctx)?,
        })
    }
}

/// The physics state of a shaman object, as the clientbound sync path
/// describes it.
///
/// A `shaman_object_id` of `-1` is the short removal form carrying no
/// physics fields. Coordinates are thirtieths of a pixel over
/// hundredths on the wire; velocities are tenths, rotations hundredths.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectDescription {
    pub object_id: i32,
    pub shaman_object_id: i16,
    pub x: f32,
    pub y: f32,
    pub velocity_x: ScaledShort<10>,
    pub velocity_y: ScaledShort<10>,
    pub rotation: ScaledShort<100>,
    pub angular_velocity: ScaledShort<100>,
    pub mice_collidable: bool,
    pub inactive: bool,
    pub add_if_missing: bool,
}

impl ObjectDescription {
    pub fn should_remove(&self) -> bool {
        self.shaman_object_id == -1
    }
}

impl Encode for ObjectDescription {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = self.object_id.encode(w, ctx)?;
        n += self.shaman_object_id.encode(w, ctx)?;

        if self.should_remove() {
            return Ok(n)
        }

        n += (((self.x * 100.0 / 30.0).round()) as i32).encode(w, ctx)?;
        n += (((self.y * 100.0 / 30.0).round()) as i32).encode(w, ctx)?;
        n += self.velocity_x.encode(w, ctx)?;
        n += self.velocity_y.encode(w, ctx)?;
        n += self.rotation.encode(w, ctx)?;
        n += self.angular_velocity.encode(w, ctx)?;
        n += self.mice_collidable.encode(w, ctx)?;
        n += self.inactive.encode(w, ctx)?;
        n += (self.add_if_missing as i8).encode(w, ctx)?;
        Ok(n)
    }
}

impl Decode for ObjectDescription {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let object_id = i32::decode(r, ctx)?;
        let shaman_object_id = i16::decode(r, ctx)?;

        if shaman_object_id == -1 {
            return Ok(Self { object_id, shaman_object_id, ..Default::default() })
        }

        Ok(Self {
            object_id,
            shaman_object_id,
            x: i32::decode(r, ctx)? as f32 * 30.0 / 100.0,
            y: i32::decode(r, ctx)? as f32 * 30.0 / 100.0,
            velocity_x: Decode::decode(r, ctx)?,
            velocity_y: Decode::decode(r, ctx)?,
            rotation: Decode::decode(r, ctx)?,
            angular_velocity: Decode::decode(r, ctx)?,
            mice_collidable: Decode::decode(r, ctx)?,
            inactive: Decode::decode(r, ctx)?,
            add_if_missing: i8::decode(r, ctx)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{deserialize, serialize};

    #[test]
    fn friend_description_roundtrip() {
        let ctx = Ctx::default();
        let friend = FriendDescription {
            id: 7,
            name: SignedLengthString::from("Papaille"),
            gender: Gender::Feminine,
            avatar_id: 42,
            bidirectional: true,
            connected: false,
            game_id: 4,
            room_name: SignedLengthString::from("village"),
            last_login: 123456,
        };

        let data = serialize(&friend, &ctx);
        assert_eq!(deserialize::<FriendDescription>(&data, &ctx).unwrap(), friend);
    }

    #[test]
    fn object_removal_short_form() {
        let ctx = Ctx::default();
        let object =
            ObjectDescription { object_id: 9, shaman_object_id: -1, ..Default::default() };

        let data = serialize(&object, &ctx);
        // Only the object id and the -1 marker.
        assert_eq!(data.len(), 6);
        assert_eq!(deserialize::<ObjectDescription>(&data, &ctx).unwrap(), object);
    }

    #[test]
    fn object_description_roundtrip() {
        let ctx = Ctx::default();
        let object = ObjectDescription {
            object_id: 3,
            shaman_object_id: 28,
            x: 30.0,
            y: 120.0,
            velocity_x: ScaledShort(1.5),
            velocity_y: ScaledShort(-2.5),
            rotation: ScaledShort(0.25),
            angular_velocity: ScaledShort(0.0),
            mice_collidable: true,
            inactive: false,
            add_if_missing: true,
        };

        let data = serialize(&object, &ctx);
        assert_eq!(deserialize::<ObjectDescription>(&data, &ctx).unwrap(), object);
    }
}
