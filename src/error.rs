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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========= Framing =========
    #[error("Var-num cannot be read beyond 5 bytes")]
    VarNumTooLong,

    #[error("Value '{0}' is out of the var-num range")]
    VarNumOutOfRange(i64),

    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error("Malformed packet: {0}")]
    MalformedPacket(&'static str),

    // ========= Schema =========
    #[error("Unknown value '{1}' for enum '{0}'")]
    UnknownEnumValue(&'static str, i64),

    #[error("String too long for its length prefix")]
    StringTooLong,

    // ========= Ciphers =========
    #[error("Cipher failed: {0}")]
    CipherFailed(&'static str),

    #[error("Packet key sources are not known yet")]
    MissingKeySources,

    // ========= Protocol state =========
    #[error("Protocol state violation: {0}")]
    StateViolation(&'static str),

    #[error("Account error code '{0}'")]
    AccountError(i8),

    // ========= Connections =========
    #[error("Unable to connect to upstream '{0}'")]
    UpstreamUnavailable(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Detached task stopped")]
    DetachedTaskStopped,

    #[error("{0}")]
    Custom(String),
}
