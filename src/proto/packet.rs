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

//! The schema machinery shared by every packet family.
//!
//! Packets are declared as ordered field lists with the
//! `define_*_packets!` macros, which generate the packet structs, their
//! body codecs, the per-family sum type and the id registry. IDs with
//! no registered schema decode into the family's generic packet with an
//! opaque body.

use std::io::Read;

use crate::{error::Result, Error};

/// A top-level packet with no registered schema.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnknownPacket {
    pub id: (u8, u8),
    pub body: Vec<u8>,
}

impl UnknownPacket {
    pub fn read<R: Read>(id: (u8, u8), r: &mut R) -> Result<Self> {
        let mut body = Vec::new();
        r.read_to_end(&mut body)?;
        Ok(Self { id, body })
    }
}

/// A tribulle packet with no registered schema.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnknownTribulle {
    pub id: i16,
    pub body: Vec<u8>,
}

/// A legacy packet with no registered schema: its raw body components.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnknownLegacy {
    pub id: (u8, u8),
    pub components: Vec<String>,
}

/// An extension packet with no registered schema.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnknownExtension {
    pub id: String,
    pub body: Vec<u8>,
}

/// A legacy packet body: a list of ASCII string components.
pub trait LegacyBody: Sized {
    const ID: (u8, u8);

    fn from_components(components: &[&str]) -> Result<Self>;
    fn components(&self) -> Vec<String>;
}

/// Split a joined legacy string into its ID and body components.
pub(crate) fn split_legacy(data: &str) -> Result<((u8, u8), Vec<String>)> {
    let mut components = data.split('\x01');

    let id_component = components.next().expect("split yields at least one component");
    let mut code_points = id_component.chars();

    let (Some(c), Some(cc)) = (code_points.next(), code_points.next()) else {
        return Err(Error::MalformedPacket("legacy packet ID has fewer than 2 code points"))
    };
    if c as u32 > 0xFF || cc as u32 > 0xFF {
        return Err(Error::MalformedPacket("legacy packet ID code point out of range"))
    }

    Ok(((c as u8, cc as u8), components.map(str::to_string).collect()))
}

/// Join a legacy ID and body components back into the wrapped string.
pub(crate) fn join_legacy(id: (u8, u8), components: &[String]) -> String {
    let mut joined = String::new();
    joined.push(char::from(id.0));
    joined.push(char::from(id.1));

    for component in components {
        joined.push('\x01');
        joined.push_str(component);
    }

    joined
}

/// Parse one legacy body component.
pub(crate) fn legacy_component<T: std::str::FromStr>(components: &[&str], index: usize) -> Result<T> {
    components
        .get(index)
        .and_then(|c| c.parse().ok())
        .ok_or(Error::MalformedPacket("bad legacy body component"))
}

/// Declare the top-level packets of one direction.
macro_rules! define_packets {
    (
        $(#[$eattr:meta])*
        pub enum $enum_name:ident {
            $(
                $(#[$pattr:meta])*
                ($c:literal, $cc:literal) $([$cipher:ident])? $name:ident {
                    $(
                        $(#[$fattr:meta])*
                        $fname:ident: $ftype:ty,
                    )*
                }
            )*
        }
    ) => {
        $(
            $(#[$pattr])*
            #[derive(Debug, Default, Clone, PartialEq)]
            pub struct $name {
                $(
                    $(#[$fattr])*
                    pub $fname: $ftype,
                )*
            }

            impl $name {
                pub const ID: (u8, u8) = ($c, $cc);
            }

            impl $crate::wire::Encode for $name {
                #[allow(unused_variables, unused_mut)]
                fn encode<W: std::io::Write>(
                    &self,
                    w: &mut W,
                    ctx: &$crate::wire::Ctx,
                ) -> $crate::Result<usize> {
                    let mut n = 0;
                    $( n += $crate::wire::Encode::encode(&self.$fname, w, ctx)?; )*
                    Ok(n)
                }
            }

            impl $crate::wire::Decode for $name {
                #[allow(unused_variables)]
                fn decode<R: std::io::Read>(
                    r: &mut R,
                    ctx: &$crate::wire::Ctx,
                ) -> $crate::Result<Self> {
                    Ok(Self {
                        $( $fname: $crate::wire::Decode::decode(r, ctx)?, )*
                    })
                }
            }

            impl From<$name> for $enum_name {
                fn from(packet: $name) -> Self {
                    Self::$name(packet)
                }
            }
        )*

        $(#[$eattr])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $enum_name {
            $( $name($name), )*
            /// A packet with no registered schema.
            Unknown($crate::proto::packet::UnknownPacket),
        }

        impl Default for $enum_name {
            fn default() -> Self {
                Self::Unknown(Default::default())
            }
        }

        impl $enum_name {
            /// The `(C, CC)` identifier.
            pub fn id(&self) -> (u8, u8) {
                match self {
                    $( Self::$name(_) => ($c, $cc), )*
                    Self::Unknown(p) => p.id,
                }
            }

            pub fn packet_name(&self) -> &'static str {
                match self {
                    $( Self::$name(_) => stringify!($name), )*
                    Self::Unknown(_) => "Unknown",
                }
            }

            /// The cipher applied to this packet's body, if any.
            pub fn cipher(&self) -> Option<$crate::secrets::Cipher> {
                Self::cipher_for_id(self.id())
            }

            pub fn cipher_for_id(id: (u8, u8)) -> Option<$crate::secrets::Cipher> {
                match id {
                    $( ($c, $cc) => None $( .or(Some($crate::secrets::Cipher::$cipher)) )?, )*
                    _ => None,
                }
            }

            /// Decode the body of the packet registered for `id`,
            /// falling back to [`UnknownPacket`].
            pub fn decode_body<R: std::io::Read>(
                id: (u8, u8),
                r: &mut R,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<Self> {
                match id {
                    $(
                        ($c, $cc) => {
                            Ok(Self::$name(<$name as $crate::wire::Decode>::decode(r, ctx)?))
                        }
                    )*
                    _ => Ok(Self::Unknown($crate::proto::packet::UnknownPacket::read(id, r)?)),
                }
            }

            pub fn encode_body<W: std::io::Write>(
                &self,
                w: &mut W,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<usize> {
                match self {
                    $( Self::$name(p) => $crate::wire::Encode::encode(p, w, ctx), )*
                    Self::Unknown(p) => {
                        w.write_all(&p.body)?;
                        Ok(p.body.len())
                    }
                }
            }
        }
    };
}
pub(crate) use define_packets;

/// Declare the tribulle packets of one direction. The family enum
/// encodes as `i16 id || body`, which is exactly the nested layout
/// inside the `(60, 3)` wrapper.
macro_rules! define_tribulle_packets {
    (
        $(#[$eattr:meta])*
        pub enum $enum_name:ident {
            $(
                $(#[$pattr:meta])*
                $id:literal $name:ident {
                    $(
                        $(#[$fattr:meta])*
                        $fname:ident: $ftype:ty,
                    )*
                }
            )*
        }
    ) => {
        $(
            $(#[$pattr])*
            #[derive(Debug, Default, Clone, PartialEq)]
            pub struct $name {
                $(
                    $(#[$fattr])*
                    pub $fname: $ftype,
                )*
            }

            impl $name {
                pub const ID: i16 = $id;
            }

            impl $crate::wire::Encode for $name {
                #[allow(unused_variables, unused_mut)]
                fn encode<W: std::io::Write>(
                    &self,
                    w: &mut W,
                    ctx: &$crate::wire::Ctx,
                ) -> $crate::Result<usize> {
                    let mut n = 0;
                    $( n += $crate::wire::Encode::encode(&self.$fname, w, ctx)?; )*
                    Ok(n)
                }
            }

            impl $crate::wire::Decode for $name {
                #[allow(unused_variables)]
                fn decode<R: std::io::Read>(
                    r: &mut R,
                    ctx: &$crate::wire::Ctx,
                ) -> $crate::Result<Self> {
                    Ok(Self {
                        $( $fname: $crate::wire::Decode::decode(r, ctx)?, )*
                    })
                }
            }

            impl From<$name> for $enum_name {
                fn from(packet: $name) -> Self {
                    Self::$name(packet)
                }
            }
        )*

        $(#[$eattr])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $enum_name {
            $( $name($name), )*
            /// A packet with no registered schema.
            Unknown($crate::proto::packet::UnknownTribulle),
        }

        impl Default for $enum_name {
            fn default() -> Self {
                Self::Unknown(Default::default())
            }
        }

        impl $enum_name {
            pub fn id(&self) -> i16 {
                match self {
                    $( Self::$name(_) => $id, )*
                    Self::Unknown(p) => p.id,
                }
            }

            pub fn packet_name(&self) -> &'static str {
                match self {
                    $( Self::$name(_) => stringify!($name), )*
                    Self::Unknown(_) => "Unknown",
                }
            }
        }

        impl $crate::wire::Encode for $enum_name {
            fn encode<W: std::io::Write>(
                &self,
                w: &mut W,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<usize> {
                let mut n = $crate::wire::Encode::encode(&self.id(), w, ctx)?;

                match self {
                    $( Self::$name(p) => n += $crate::wire::Encode::encode(p, w, ctx)?, )*
                    Self::Unknown(p) => {
                        w.write_all(&p.body)?;
                        n += p.body.len();
                    }
                }

                Ok(n)
            }
        }

        impl $crate::wire::Decode for $enum_name {
            fn decode<R: std::io::Read>(
                r: &mut R,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<Self> {
                let id = <i16 as $crate::wire::Decode>::decode(r, ctx)?;

                match id {
                    $(
                        $id => Ok(Self::$name(<$name as $crate::wire::Decode>::decode(r, ctx)?)),
                    )*
                    _ => {
                        let mut body = Vec::new();
                        r.read_to_end(&mut body)?;
                        Ok(Self::Unknown($crate::proto::packet::UnknownTribulle { id, body }))
                    }
                }
            }
        }
    };
}
pub(crate) use define_tribulle_packets;

/// Declare the extension packets of one direction. The family enum
/// encodes as `String id || body`, the nested layout inside the
/// `(255, 255)` wrapper.
macro_rules! define_extension_packets {
    (
        $(#[$eattr:meta])*
        pub enum $enum_name:ident {
            $(
                $(#[$pattr:meta])*
                $id:literal $name:ident {
                    $(
                        $(#[$fattr:meta])*
                        $fname:ident: $ftype:ty,
                    )*
                }
            )*
        }
    ) => {
        $(
            $(#[$pattr])*
            #[derive(Debug, Default, Clone, PartialEq)]
            pub struct $name {
                $(
                    $(#[$fattr])*
                    pub $fname: $ftype,
                )*
            }

            impl $name {
                pub const ID: &'static str = $id;
            }

            impl $crate::wire::Encode for $name {
                #[allow(unused_variables, unused_mut)]
                fn encode<W: std::io::Write>(
                    &self,
                    w: &mut W,
                    ctx: &$crate::wire::Ctx,
                ) -> $crate::Result<usize> {
                    let mut n = 0;
                    $( n += $crate::wire::Encode::encode(&self.$fname, w, ctx)?; )*
                    Ok(n)
                }
            }

            impl $crate::wire::Decode for $name {
                #[allow(unused_variables)]
                fn decode<R: std::io::Read>(
                    r: &mut R,
                    ctx: &$crate::wire::Ctx,
                ) -> $crate::Result<Self> {
                    Ok(Self {
                        $( $fname: $crate::wire::Decode::decode(r, ctx)?, )*
                    })
                }
            }

            impl From<$name> for $enum_name {
                fn from(packet: $name) -> Self {
                    Self::$name(packet)
                }
            }
        )*

        $(#[$eattr])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $enum_name {
            $( $name($name), )*
            /// A packet with no registered schema.
            Unknown($crate::proto::packet::UnknownExtension),
        }

        impl Default for $enum_name {
            fn default() -> Self {
                Self::Unknown(Default::default())
            }
        }

        impl $enum_name {
            pub fn id(&self) -> &str {
                match self {
                    $( Self::$name(_) => $id, )*
                    Self::Unknown(p) => &p.id,
                }
            }

            pub fn packet_name(&self) -> &'static str {
                match self {
                    $( Self::$name(_) => stringify!($name), )*
                    Self::Unknown(_) => "Unknown",
                }
            }
        }

        impl $crate::wire::Encode for $enum_name {
            fn encode<W: std::io::Write>(
                &self,
                w: &mut W,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<usize> {
                let mut n = $crate::wire::Encode::encode(self.id(), w, ctx)?;

                match self {
                    $( Self::$name(p) => n += $crate::wire::Encode::encode(p, w, ctx)?, )*
                    Self::Unknown(p) => {
                        w.write_all(&p.body)?;
                        n += p.body.len();
                    }
                }

                Ok(n)
            }
        }

        impl $crate::wire::Decode for $enum_name {
            fn decode<R: std::io::Read>(
                r: &mut R,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<Self> {
                let id = <String as $crate::wire::Decode>::decode(r, ctx)?;

                match id.as_str() {
                    $(
                        $id => Ok(Self::$name(<$name as $crate::wire::Decode>::decode(r, ctx)?)),
                    )*
                    _ => {
                        let mut body = Vec::new();
                        r.read_to_end(&mut body)?;
                        Ok(Self::Unknown($crate::proto::packet::UnknownExtension { id, body }))
                    }
                }
            }
        }
    };
}
pub(crate) use define_extension_packets;

/// Declare the legacy packets of one direction. The family enum
/// encodes as a single u16-prefixed string of `\x01`-separated
/// components, the first holding the two-code-point ID; each packet
/// supplies its own component conversions through [`LegacyBody`].
macro_rules! define_legacy_packets {
    (
        $(#[$eattr:meta])*
        pub enum $enum_name:ident {
            $( $name:ident, )*
        }
    ) => {
        $(#[$eattr])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $enum_name {
            $( $name($name), )*
            /// A packet with no registered schema.
            Unknown($crate::proto::packet::UnknownLegacy),
        }

        impl Default for $enum_name {
            fn default() -> Self {
                Self::Unknown(Default::default())
            }
        }

        $(
            impl From<$name> for $enum_name {
                fn from(packet: $name) -> Self {
                    Self::$name(packet)
                }
            }
        )*

        impl $enum_name {
            pub fn id(&self) -> (u8, u8) {
                match self {
                    $( Self::$name(_) => <$name as $crate::proto::packet::LegacyBody>::ID, )*
                    Self::Unknown(p) => p.id,
                }
            }

            pub fn packet_name(&self) -> &'static str {
                match self {
                    $( Self::$name(_) => stringify!($name), )*
                    Self::Unknown(_) => "Unknown",
                }
            }

            fn body_components(&self) -> Vec<String> {
                match self {
                    $( Self::$name(p) => $crate::proto::packet::LegacyBody::components(p), )*
                    Self::Unknown(p) => p.components.clone(),
                }
            }
        }

        impl $crate::wire::Encode for $enum_name {
            fn encode<W: std::io::Write>(
                &self,
                w: &mut W,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<usize> {
                let joined =
                    $crate::proto::packet::join_legacy(self.id(), &self.body_components());

                $crate::wire::Encode::encode(joined.as_str(), w, ctx)
            }
        }

        impl $crate::wire::Decode for $enum_name {
            fn decode<R: std::io::Read>(
                r: &mut R,
                ctx: &$crate::wire::Ctx,
            ) -> $crate::Result<Self> {
                let data = <String as $crate::wire::Decode>::decode(r, ctx)?;
                let (id, components) = $crate::proto::packet::split_legacy(&data)?;
                let component_refs: Vec<&str> =
                    components.iter().map(String::as_str).collect();

                $(
                    if id == <$name as $crate::proto::packet::LegacyBody>::ID {
                        return Ok(Self::$name(
                            <$name as $crate::proto::packet::LegacyBody>::from_components(
                                &component_refs,
                            )?,
                        ))
                    }
                )*

                Ok(Self::Unknown($crate::proto::packet::UnknownLegacy { id, components }))
            }
        }
    };
}
pub(crate) use define_legacy_packets;
