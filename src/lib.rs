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

//! Client, server and MITM proxy library for a two-server game protocol.
//!
//! The protocol is a length-prefixed, typed, binary wire format over TCP.
//! Clients keep two connections open at once: a *main* connection for
//! login, account and community traffic, and a *satellite* connection for
//! per-room gameplay. Four packet families share the byte stream:
//! top-level packets, "tribulle" community packets, "legacy" ASCII
//! component packets, and an out-of-band "extension" family spoken only
//! between a proxy and its local tooling.

/// Error library
pub mod error;
pub use error::{Error, Result};

/// Primitive wire codec
pub mod wire;

/// Block and stream ciphers, password hashing
pub mod crypto;

/// Per-session secrets and key derivation
pub mod secrets;
pub use secrets::Secrets;

/// Packet families, schemas and registries
pub mod proto;

/// TCP connections and framing
pub mod net;

/// Packet-listener dispatch
pub mod handler;

/// Protocol constants and component settings
pub mod settings;

/// Client state machine
pub mod client;
pub use client::Client;

/// Server state machine
pub mod server;
pub use server::Server;

/// MITM proxy core
pub mod proxy;
pub use proxy::Proxy;
