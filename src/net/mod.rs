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

//! TCP plumbing: frame assembly and the [`Connection`] object.

use log::warn;
use rand::seq::SliceRandom;
use smol::net::TcpStream;

use crate::{error::Result, Error};

pub mod connection;
pub use connection::Connection;

/// Open a TCP stream to one of the given ports, tried in random order.
pub async fn open_stream(address: &str, ports: &[u16]) -> Result<TcpStream> {
    let mut ports = ports.to_vec();
    ports.shuffle(&mut rand::thread_rng());

    for &port in &ports {
        match TcpStream::connect((address, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!(
                    target: "fromage::net::open_stream",
                    "Failed connecting to {}:{}: {}", address, port, e,
                );
                continue
            }
        }
    }

    Err(Error::UpstreamUnavailable(format!("{}:{:?}", address, ports)))
}
