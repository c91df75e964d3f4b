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

//! The packet families and their schemas.
//!
//! Four families share the byte stream. Top-level packets are
//! identified by a `(C, CC)` byte pair; "tribulle" community packets by
//! an i16 and carried inside the `(60, 3)` wrapper; "legacy" ASCII
//! component packets by two code points at the start of a string inside
//! the `(1, 1)` wrapper; and "extension" packets by a string identifier
//! inside the `(255, 255)` wrapper, spoken only between a proxy and its
//! local tooling.

pub mod packet;
pub use packet::{LegacyBody, UnknownExtension, UnknownLegacy, UnknownPacket, UnknownTribulle};

pub mod enums;

pub mod descriptions;

pub mod serverbound;
pub use serverbound::Serverbound;

pub mod clientbound;
pub use clientbound::Clientbound;

pub mod tribulle;
pub use tribulle::{ClientboundTribulle, ServerboundTribulle};

pub mod legacy;
pub use legacy::{ClientboundLegacy, ServerboundLegacy};

pub mod extension;
pub use extension::{ClientboundExtension, ServerboundExtension};

/// Which way a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Serverbound,
    Clientbound,
}
