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

//! Protocol constants and per-component settings.

use crate::Secrets;

/// The ports the main upstream server may listen on.
pub const MAIN_SERVER_PORTS: [u16; 4] = [11801, 12801, 13801, 14801];

/// Seconds between client keep-alive writes.
pub const KEEP_ALIVE_INTERVAL: u64 = 15;

/// Seconds of silence after which the server drops a connection.
pub const KEEP_ALIVE_TIMEOUT: u64 = 60;

/// Seconds the satellite ping path waits for a pong before giving up.
pub const SATELLITE_PING_TIMEOUT: u64 = 10;

/// The loader stage size the real server expects. A proxy rewrites the
/// handshake to carry this value since its own loader differs.
pub const CORRECTED_LOADER_SIZE: i32 = 0x1FBD;

/// The fixed response of the socket policy listener, followed by a
/// closing NUL.
pub const SOCKET_POLICY_RESPONSE: &[u8] =
    b"<cross-domain-policy><allow-access-from domain=\"*\" to-ports=\"*\" secure=\"false\" /></cross-domain-policy>\x00";

// The client identifies like a Steam install by default. These values
// are directly taken from such.
pub const PLAYER_TYPE: &str = "Steam AIR";
pub const BROWSER_INFO: &str = "-";
pub const LOADER_STAGE_SIZE: i32 = 0x7EE88;
pub const FONTS_HASH: &str = "5610fd5713a0ed29fb13b576d2e0e4692dd99ddbbcd7b5c0a32b7271c91083e0";
pub const SERVER_STRING: &str =
    "A=t&SA=t&SV=t&EV=t&MP3=t&AE=t&VE=t&ACC=t&PR=t&SP=f&SB=f&DEB=f&V=WIN 16,0,0,276&\
     M=Adobe Windows&R=1920x1080&COL=color&AR=1.0&OS=Windows 8&ARCH=x86&L=en&IME=f&\
     PR32=t&PR64=t&LS=en-US&PT=Desktop&AVD=f&LFD=f&WD=f&TLS=t&ML=5.1&DP=72";
pub const MILLISECONDS_SINCE_START: i32 = 3128;
pub const OS: &str = "Windows 8";
pub const FLASH_VERSION: &str = "WIN 16,0,0,276";
pub const LOADER_URL: &str = "app:/Transformice.swf/[[DYNAMIC]]/1";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub secrets: Secrets,

    /// `None` sits at the login screen without logging in.
    pub username: Option<String>,
    /// SHAKikoo digest of the password; empty for guest logins.
    pub password_hash: String,
    pub start_room: String,

    pub language: String,
    pub steam_id: Option<String>,

    /// Keep dispatching clientbound listeners sequentially even after
    /// login.
    pub listen_sequentially: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            secrets: Secrets::default(),
            username: None,
            password_hash: String::new(),
            start_room: "1".to_string(),
            language: "en".to_string(),
            steam_id: None,
            listen_sequentially: false,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host_address: String,
    pub host_main_port: u16,

    /// `None` disables the idle watchdog.
    pub keep_alive_timeout: Option<u64>,

    /// Expected handshake loader stage size; `None` accepts any.
    pub loader_stage_size: Option<i32>,

    pub game_version: Option<i16>,
    pub auth_key: Option<i32>,
    pub packet_key_sources: Option<Vec<u8>>,
    pub client_verification_template: Option<Vec<u8>>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host_address: "127.0.0.1".to_string(),
            host_main_port: 11801,
            keep_alive_timeout: Some(KEEP_ALIVE_TIMEOUT),
            loader_stage_size: None,
            game_version: None,
            auth_key: None,
            packet_key_sources: None,
            client_verification_template: None,
        }
    }
}

impl ServerSettings {
    pub fn initial_secrets(&self) -> Secrets {
        let mut secrets = Secrets::default();

        if let Some(version) = self.game_version {
            secrets = secrets.with_game_version(version);
        }
        if let Some(auth_key) = self.auth_key {
            secrets = secrets.with_auth_key(auth_key);
        }
        if let Some(sources) = &self.packet_key_sources {
            secrets = secrets.with_packet_key_sources(sources.clone());
        }
        if let Some(template) = &self.client_verification_template {
            secrets = secrets.with_client_verification_template(template.clone());
        }

        secrets
    }
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub host_address: String,
    pub host_main_port: u16,
    pub host_satellite_port: u16,
    pub host_socket_policy_port: Option<u16>,

    /// The address the client believes it is connected to. Written
    /// into reaffirm-address and satellite-redirect packets.
    pub expected_address: String,

    /// Static upstream. When unset, the upstream is learned from the
    /// main-server-info extension packet of the local tooling.
    pub main_server_address: Option<String>,
    pub main_server_ports: Option<Vec<u16>>,

    /// Key material known ahead of time; extension packets may still
    /// replace it.
    pub secrets: Secrets,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host_address: "127.0.0.1".to_string(),
            host_main_port: 11801,
            host_satellite_port: 12801,
            host_socket_policy_port: Some(10801),
            expected_address: "localhost".to_string(),
            main_server_address: None,
            main_server_ports: None,
            secrets: Secrets::default(),
        }
    }
}
