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

//! Wire types beyond the fixed-size primitives: the various string
//! forms, length-prefixed sequences, enum wrappers and scaled integers.

use std::io::{Cursor, Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use super::{Ctx, Decode, Encode, VarInt};
use crate::{error::Result, Error};

/// An i16-prefixed UTF-8 string.
///
/// A negative length is the "null" convention of nested tribulle data
/// and decodes as the empty string.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct SignedLengthString(pub String);

impl Encode for SignedLengthString {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let bytes = self.0.as_bytes();
        if bytes.len() > i16::MAX as usize {
            return Err(Error::StringTooLong)
        }

        let n = (bytes.len() as i16).encode(w, ctx)?;
        w.write_all(bytes)?;
        Ok(n + bytes.len())
    }
}

impl Decode for SignedLengthString {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let len = i16::decode(r, ctx)?;
        if len <= 0 {
            return Ok(Self(String::new()))
        }

        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)?;

        String::from_utf8(buf)
            .map(Self)
            .map_err(|_| Error::ParseFailed("string was not valid UTF-8"))
    }
}

impl From<&str> for SignedLengthString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A u24-prefixed UTF-8 string.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct LargeString(pub String);

impl Encode for LargeString {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let bytes = self.0.as_bytes();
        if bytes.len() > 0xFF_FFFF {
            return Err(Error::StringTooLong)
        }

        let n = super::U24(bytes.len() as u32).encode(w, ctx)?;
        w.write_all(bytes)?;
        Ok(n + bytes.len())
    }
}

impl Decode for LargeString {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let len = super::U24::decode(r, ctx)?.0 as usize;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf)?;

        String::from_utf8(buf)
            .map(Self)
            .map_err(|_| Error::ParseFailed("string was not valid UTF-8"))
    }
}

/// An i32-prefixed zlib-compressed UTF-8 string. A zero prefix means
/// the empty string.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct CompressedString(pub String);

impl Encode for CompressedString {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(self.0.as_bytes())?;
        let compressed = encoder.finish()?;

        let n = (compressed.len() as i32).encode(w, ctx)?;
        w.write_all(&compressed)?;
        Ok(n + compressed.len())
    }
}

impl Decode for CompressedString {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let len = i32::decode(r, ctx)?;
        if len == 0 {
            return Ok(Self(String::new()))
        }
        if len < 0 {
            return Err(Error::ParseFailed("negative compressed string length"))
        }

        let mut compressed = vec![0u8; len as usize];
        r.read_exact(&mut compressed)?;

        let mut data = String::new();
        ZlibDecoder::new(Cursor::new(compressed))
            .read_to_string(&mut data)
            .map_err(|_| Error::ParseFailed("compressed string failed to inflate"))?;

        Ok(Self(data))
    }
}

impl From<&str> for CompressedString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A u16-prefixed UTF-8 string whose bytes are shifted by
/// `game_version % 5` before framing.
///
/// Degrades to a plain string under the bot role or when the game
/// version is unknown.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct ShiftedString(pub String);

impl ShiftedString {
    fn shift(ctx: &Ctx) -> Option<u8> {
        if ctx.secrets.is_bot_role() {
            return None
        }

        ctx.secrets.game_version.map(|version| (version.rem_euclid(5)) as u8)
    }
}

impl Encode for ShiftedString {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let Some(shift) = Self::shift(ctx) else {
            return self.0.encode(w, ctx)
        };

        let bytes: Vec<u8> = self.0.bytes().map(|b| b.wrapping_add(shift)).collect();
        if bytes.len() > u16::MAX as usize {
            return Err(Error::StringTooLong)
        }

        let n = (bytes.len() as u16).encode(w, ctx)?;
        w.write_all(&bytes)?;
        Ok(n + bytes.len())
    }
}

impl Decode for ShiftedString {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let Some(shift) = Self::shift(ctx) else {
            return Ok(Self(String::decode(r, ctx)?))
        };

        let len = u16::decode(r, ctx)? as usize;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf)?;

        for b in buf.iter_mut() {
            *b = b.wrapping_sub(shift);
        }

        String::from_utf8(buf)
            .map(Self)
            .map_err(|_| Error::ParseFailed("string was not valid UTF-8"))
    }
}

impl From<&str> for ShiftedString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A field elided from the wire when the session runs under the bot
/// role, decoding as its default in that case.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct UnlessBotRole<T>(pub T);

impl<T: Encode> Encode for UnlessBotRole<T> {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        if ctx.secrets.is_bot_role() {
            return Ok(0)
        }

        self.0.encode(w, ctx)
    }
}

impl<T: Decode + Default> Decode for UnlessBotRole<T> {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        if ctx.secrets.is_bot_role() {
            return Ok(Self(T::default()))
        }

        Ok(Self(T::decode(r, ctx)?))
    }
}

impl From<&str> for UnlessBotRole<String> {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

macro_rules! impl_prefixed_vec {
    ($(#[$attr:meta])* $name:ident, $len_ty:ty, $max:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name<T>(pub Vec<T>);

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self(vec![])
            }
        }

        impl<T> From<Vec<T>> for $name<T> {
            fn from(items: Vec<T>) -> Self {
                Self(items)
            }
        }

        impl<T> std::ops::Deref for $name<T> {
            type Target = Vec<T>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<T: Encode> Encode for $name<T> {
            fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
                if self.0.len() > $max as usize {
                    return Err(Error::ParseFailed("sequence exceeds its length prefix"))
                }

                let mut n = (self.0.len() as $len_ty).encode(w, ctx)?;
                for item in &self.0 {
                    n += item.encode(w, ctx)?;
                }
                Ok(n)
            }
        }

        impl<T: Decode> Decode for $name<T> {
            fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
                let len = <$len_ty>::decode(r, ctx)?;
                if len <= 0 {
                    return Ok(Self(vec![]))
                }

                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(T::decode(r, ctx)?);
                }
                Ok(Self(items))
            }
        }
    };
}

impl_prefixed_vec! {
    /// A sequence with an i8 element count.
    BytePrefixedVec, i8, i8::MAX
}

impl_prefixed_vec! {
    /// A sequence with an i16 element count.
    ShortPrefixedVec, i16, i16::MAX
}

impl_prefixed_vec! {
    /// A sequence with an i32 element count.
    IntPrefixedVec, i32, i32::MAX
}

/// A sequence with a u16 element count.
#[derive(Debug, Clone, PartialEq)]
pub struct UShortPrefixedVec<T>(pub Vec<T>);

impl<T> Default for UShortPrefixedVec<T> {
    fn default() -> Self {
        Self(vec![])
    }
}

impl<T> From<Vec<T>> for UShortPrefixedVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T> std::ops::Deref for UShortPrefixedVec<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Encode> Encode for UShortPrefixedVec<T> {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        if self.0.len() > u16::MAX as usize {
            return Err(Error::ParseFailed("sequence exceeds its length prefix"))
        }

        let mut n = (self.0.len() as u16).encode(w, ctx)?;
        for item in &self.0 {
            n += item.encode(w, ctx)?;
        }
        Ok(n)
    }
}

impl<T: Decode> Decode for UShortPrefixedVec<T> {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let len = u16::decode(r, ctx)?;
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(T::decode(r, ctx)?);
        }
        Ok(Self(items))
    }
}

/// A sequence with a [`VarInt`] element count.
#[derive(Debug, Clone, PartialEq)]
pub struct VarPrefixedVec<T>(pub Vec<T>);

impl<T> Default for VarPrefixedVec<T> {
    fn default() -> Self {
        Self(vec![])
    }
}

impl<T> From<Vec<T>> for VarPrefixedVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T: Encode> Encode for VarPrefixedVec<T> {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = VarInt(self.0.len() as i32).encode(w, ctx)?;
        for item in &self.0 {
            n += item.encode(w, ctx)?;
        }
        Ok(n)
    }
}

impl<T: Decode> Decode for VarPrefixedVec<T> {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let len = VarInt::decode(r, ctx)?.0;
        if len <= 0 {
            return Ok(Self(vec![]))
        }

        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(T::decode(r, ctx)?);
        }
        Ok(Self(items))
    }
}

/// A sequence with no length prefix, consuming the rest of the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyVec<T>(pub Vec<T>);

impl<T> Default for GreedyVec<T> {
    fn default() -> Self {
        Self(vec![])
    }
}

impl<T> From<Vec<T>> for GreedyVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T> std::ops::Deref for GreedyVec<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Encode> Encode for GreedyVec<T> {
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        let mut n = 0;
        for item in &self.0 {
            n += item.encode(w, ctx)?;
        }
        Ok(n)
    }
}

impl<T: Decode> Decode for GreedyVec<T> {
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let mut rest = Vec::new();
        r.read_to_end(&mut rest)?;

        let mut cursor = Cursor::new(rest.as_slice());
        let mut items = Vec::new();

        while (cursor.position() as usize) < rest.len() {
            items.push(T::decode(&mut cursor, ctx)?);
        }

        Ok(Self(items))
    }
}

/// A C-like enumeration with a fixed wire representation. Generated by
/// [`wire_enum!`](crate::wire_enum).
pub trait WireEnum: Copy {
    type Repr: Copy + std::fmt::Debug + PartialEq + Eq;

    const NAME: &'static str;

    fn from_repr(repr: Self::Repr) -> Option<Self>;
    fn to_repr(self) -> Self::Repr;
}

/// An enum field which keeps unknown wire values verbatim, so that
/// round-tripping is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumOr<E: WireEnum> {
    Known(E),
    Raw(E::Repr),
}

impl<E: WireEnum> EnumOr<E> {
    pub fn known(self) -> Option<E> {
        match self {
            Self::Known(e) => Some(e),
            Self::Raw(_) => None,
        }
    }
}

impl<E: WireEnum> Default for EnumOr<E>
where
    E::Repr: Default,
{
    fn default() -> Self {
        Self::Raw(E::Repr::default())
    }
}

impl<E: WireEnum> From<E> for EnumOr<E> {
    fn from(e: E) -> Self {
        Self::Known(e)
    }
}

impl<E: WireEnum> Encode for EnumOr<E>
where
    E::Repr: Encode,
{
    fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
        match self {
            Self::Known(e) => e.to_repr().encode(w, ctx),
            Self::Raw(repr) => repr.encode(w, ctx),
        }
    }
}

impl<E: WireEnum> Decode for EnumOr<E>
where
    E::Repr: Decode,
{
    fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
        let repr = E::Repr::decode(r, ctx)?;

        Ok(match E::from_repr(repr) {
            Some(e) => Self::Known(e),
            None => Self::Raw(repr),
        })
    }
}

/// Declare a wire enum: a C-like enum stored on the wire as its
/// representation type, defaulting to its first variant. Decoding an
/// undeclared value fails with [`Error::UnknownEnumValue`]; use
/// [`EnumOr`] where unknown values must survive a round trip.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$attr:meta])*
        pub enum $name:ident : $repr:ty {
            $(#[$first_vattr:meta])*
            $first:ident = $first_value:literal,
            $(
                $(#[$vattr:meta])*
                $variant:ident = $value:literal,
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(#[$first_vattr])*
            $first,
            $(
                $(#[$vattr])*
                $variant,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$first
            }
        }

        impl $crate::wire::WireEnum for $name {
            type Repr = $repr;

            const NAME: &'static str = stringify!($name);

            fn from_repr(repr: $repr) -> Option<Self> {
                match repr {
                    $first_value => Some(Self::$first),
                    $( $value => Some(Self::$variant), )*
                    _ => None,
                }
            }

            fn to_repr(self) -> $repr {
                match self {
                    Self::$first => $first_value,
                    $( Self::$variant => $value, )*
                }
            }
        }

        impl $crate::wire::Encode for $name {
            fn encode<W: std::io::Write>(
                &self,
                w: &mut W,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<usize> {
                $crate::wire::Encode::encode(&$crate::wire::WireEnum::to_repr(*self), w, ctx)
            }
        }

        impl $crate::wire::Decode for $name {
            fn decode<R: std::io::Read>(
                r: &mut R,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<Self> {
                let repr = <$repr as $crate::wire::Decode>::decode(r, ctx)?;

                <Self as $crate::wire::WireEnum>::from_repr(repr).ok_or(
                    $crate::Error::UnknownEnumValue(
                        <Self as $crate::wire::WireEnum>::NAME,
                        repr as i64,
                    ),
                )
            }
        }
    };
}

macro_rules! impl_scaled {
    ($(#[$attr:meta])* $name:ident, $wire_ty:ty) => {
        $(#[$attr])*
        #[derive(Debug, Default, Clone, Copy, PartialEq)]
        pub struct $name<const SCALE: i32>(pub f32);

        impl<const SCALE: i32> Encode for $name<SCALE> {
            fn encode<W: Write>(&self, w: &mut W, ctx: &Ctx) -> Result<usize> {
                (((self.0 * SCALE as f32).round()) as $wire_ty).encode(w, ctx)
            }
        }

        impl<const SCALE: i32> Decode for $name<SCALE> {
            fn decode<R: Read>(r: &mut R, ctx: &Ctx) -> Result<Self> {
                Ok(Self(<$wire_ty>::decode(r, ctx)? as f32 / SCALE as f32))
            }
        }
    };
}

impl_scaled! {
    /// An i16 on the wire holding a float scaled by `SCALE`.
    ScaledShort, i16
}

impl_scaled! {
    /// An i32 on the wire holding a float scaled by `SCALE`.
    ScaledInt, i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        wire::{deserialize, serialize},
        Secrets,
    };

    fn ctx() -> Ctx {
        Ctx::default()
    }

    #[test]
    fn signed_length_string_test() {
        assert_eq!(serialize(&SignedLengthString::from("ab"), &ctx()), vec![0u8, 2, 0x61, 0x62]);

        // Negative length is the tribulle "null" convention.
        assert_eq!(
            deserialize::<SignedLengthString>(&[0xFF, 0xFF], &ctx()).unwrap(),
            SignedLengthString(String::new()),
        );
    }

    #[test]
    fn large_string_test() {
        assert_eq!(serialize(&LargeString("hi".to_string()), &ctx()), vec![0u8, 0, 2, 0x68, 0x69]);
        assert_eq!(
            deserialize::<LargeString>(&[0, 0, 2, 0x68, 0x69], &ctx()).unwrap(),
            LargeString("hi".to_string()),
        );
    }

    #[test]
    fn compressed_string_test() {
        // Zero prefix means the empty string.
        assert_eq!(serialize(&CompressedString::default(), &ctx())[..4], [0u8, 0, 0, 0]);
        assert_eq!(
            deserialize::<CompressedString>(&[0, 0, 0, 0], &ctx()).unwrap(),
            CompressedString(String::new()),
        );

        // A zlib stream produced by the reference implementation.
        let mut data = vec![0u8, 0, 0, 19];
        data.extend(hex::decode("789ccb48cdc9c95728cf2fca4901001a0b045d").unwrap());
        assert_eq!(
            deserialize::<CompressedString>(&data, &ctx()).unwrap(),
            CompressedString("hello world".to_string()),
        );

        let value = CompressedString("the quick brown fox".to_string());
        let encoded = serialize(&value, &ctx());
        assert_eq!(deserialize::<CompressedString>(&encoded, &ctx()).unwrap(), value);
    }

    #[test]
    fn shifted_string_test() {
        // Without a known version the type degrades to a plain string.
        assert_eq!(serialize(&ShiftedString::from("abc"), &ctx()), vec![0u8, 3, 0x61, 0x62, 0x63]);

        let shifted_ctx = Ctx::new(Secrets::default().with_game_version(7));
        assert_eq!(
            serialize(&ShiftedString::from("abc"), &shifted_ctx),
            vec![0u8, 3, 0x63, 0x64, 0x65],
        );
        assert_eq!(
            deserialize::<ShiftedString>(&[0, 3, 0x63, 0x64, 0x65], &shifted_ctx).unwrap(),
            ShiftedString::from("abc"),
        );

        // The bot role also degrades to a plain string.
        let bot_ctx = Ctx::new(Secrets::default().with_game_version(Secrets::BOT_ROLE_VERSION));
        assert_eq!(serialize(&ShiftedString::from("abc"), &bot_ctx), vec![0u8, 3, 0x61, 0x62, 0x63]);
    }

    #[test]
    fn prefixed_vec_test() {
        let v = BytePrefixedVec::from(vec![1u8, 2, 3]);
        assert_eq!(serialize(&v, &ctx()), vec![3u8, 1, 2, 3]);
        assert_eq!(deserialize::<BytePrefixedVec<u8>>(&[3, 1, 2, 3], &ctx()).unwrap(), v);

        let v = ShortPrefixedVec::from(vec![0x0102u16]);
        assert_eq!(serialize(&v, &ctx()), vec![0u8, 1, 1, 2]);

        // A negative count decodes as empty.
        assert_eq!(
            deserialize::<ShortPrefixedVec<u8>>(&[0xFF, 0xFF], &ctx()).unwrap(),
            ShortPrefixedVec::default(),
        );
    }

    #[test]
    fn greedy_vec_test() {
        let v = GreedyVec::from(vec![1u8, 2, 3]);
        assert_eq!(serialize(&v, &ctx()), vec![1u8, 2, 3]);
        assert_eq!(deserialize::<GreedyVec<u8>>(&[1, 2, 3], &ctx()).unwrap(), v);
        assert_eq!(deserialize::<GreedyVec<u16>>(&[0, 1, 0, 2], &ctx()).unwrap().0, vec![1, 2]);
    }

    wire_enum! {
        pub enum Direction8: i8 {
            North = 0,
            South = 1,
        }
    }

    #[test]
    fn enum_test() {
        assert_eq!(serialize(&Direction8::South, &ctx()), vec![1u8]);
        assert_eq!(deserialize::<Direction8>(&[0], &ctx()).unwrap(), Direction8::North);
        assert!(matches!(
            deserialize::<Direction8>(&[9], &ctx()),
            Err(Error::UnknownEnumValue("Direction8", 9)),
        ));
    }

    #[test]
    fn enum_or_preserves_raw_test() {
        let decoded = deserialize::<EnumOr<Direction8>>(&[9], &ctx()).unwrap();
        assert_eq!(decoded, EnumOr::Raw(9));
        assert_eq!(serialize(&decoded, &ctx()), vec![9u8]);

        let known = deserialize::<EnumOr<Direction8>>(&[1], &ctx()).unwrap();
        assert_eq!(known, EnumOr::Known(Direction8::South));
    }

    #[test]
    fn scaled_test() {
        assert_eq!(serialize(&ScaledShort::<100>(1.25), &ctx()), vec![0u8, 125]);
        assert_eq!(deserialize::<ScaledShort<100>>(&[0, 125], &ctx()).unwrap().0, 1.25);
        assert_eq!(serialize(&ScaledShort::<10>(-1.5), &ctx()), serialize(&-15i16, &ctx()));
    }
}
