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

//! The client state machine.
//!
//! Opens the main connection, drives handshake, verification and
//! login, keeps both connections alive, and switches satellite servers
//! when asked to. The satellite starts out aliased to the main
//! connection, just like in the game, until a change-satellite packet
//! arrives.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
    time::Duration,
};

use log::{error, info, warn};
use rand::Rng;
use smol::{Executor, Timer};

use crate::{
    error::Result,
    handler::{Dispatcher, Link},
    net::{self, Connection},
    proto::{clientbound, serverbound, Clientbound, Direction, Serverbound},
    settings::{self, ClientSettings},
    wire::UnlessBotRole,
    Error,
};

pub struct Client {
    settings: ClientSettings,

    main: OnceLock<Arc<Connection>>,
    satellite: Mutex<Option<Arc<Connection>>>,

    auth_token: Mutex<i32>,
    session_id: Mutex<Option<i32>>,
    logged_in: AtomicBool,

    /// Incoming (clientbound) packet observers.
    pub dispatcher: Dispatcher<Clientbound>,
    /// Outgoing (serverbound) packet observers, run after each write.
    pub outgoing: Dispatcher<Serverbound>,

    executor: OnceLock<Arc<Executor<'static>>>,
}

impl Client {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            main: OnceLock::new(),
            satellite: Mutex::new(None),
            auth_token: Mutex::new(0),
            session_id: Mutex::new(None),
            logged_in: AtomicBool::new(false),
            dispatcher: Dispatcher::new(),
            outgoing: Dispatcher::new(),
            executor: OnceLock::new(),
        }
    }

    /// Register a listener printing every decoded packet.
    pub fn log_packets(&mut self) {
        use crate::handler::{Selector, Verdict};

        self.dispatcher.listen(Selector::Any, |link: Arc<Link>, packet: Arc<Clientbound>| async move {
            let connection = if link.satellite { "SATELLITE" } else { "MAIN" };
            info!(target: "fromage::client", "{}: Clientbound: {:?}", connection, packet);
            Ok(Verdict::Forward)
        });

        self.outgoing.listen(Selector::Any, |link: Arc<Link>, packet: Arc<Serverbound>| async move {
            let connection = if link.satellite { "SATELLITE" } else { "MAIN" };
            info!(target: "fromage::client", "{}: Serverbound: {:?}", connection, packet);
            Ok(Verdict::Forward)
        });
    }

    pub fn session_id(&self) -> Option<i32> {
        *self.session_id.lock().expect("session id poisoned")
    }

    fn main(&self) -> Result<Arc<Connection>> {
        self.main.get().cloned().ok_or(Error::ConnectionClosed)
    }

    /// The satellite connection, or the main one while no satellite is
    /// attached.
    fn satellite(&self) -> Result<Arc<Connection>> {
        if let Some(satellite) = self.satellite.lock().expect("satellite poisoned").clone() {
            if !satellite.is_closing() {
                return Ok(satellite)
            }
        }

        self.main()
    }

    fn sequential(&self) -> bool {
        self.settings.listen_sequentially || !self.logged_in.load(Ordering::SeqCst)
    }

    async fn write(&self, conn: &Arc<Connection>, packet: Serverbound) -> Result<()> {
        conn.write_serverbound(&packet).await?;

        let link = Arc::new(Link {
            direction: Direction::Serverbound,
            satellite: !Arc::ptr_eq(conn, &self.main()?),
            peer: conn.peer_addr(),
        });
        self.outgoing.dispatch_after(&link, &Arc::new(packet), true).await;

        Ok(())
    }

    /// Connect and run until the session ends.
    pub async fn start(self: Arc<Self>, executor: Arc<Executor<'static>>) -> Result<()> {
        let _ = self.executor.set(executor.clone());

        let secrets = self.settings.secrets.clone();
        let address = secrets
            .server_address
            .clone()
            .ok_or(Error::StateViolation("no main server address configured"))?;
        let ports = if secrets.server_ports.is_empty() {
            settings::MAIN_SERVER_PORTS.to_vec()
        } else {
            secrets.server_ports.clone()
        };

        let stream = net::open_stream(&address, &ports).await?;
        let main = Connection::new(stream, secrets.clone(), rand::thread_rng().gen_range(0..90));
        info!(target: "fromage::client", "Connected to main server {}", main.peer_addr());

        let _ = self.main.set(main.clone());

        self.send_handshake().await?;

        // Keep-alive heartbeat for both connections.
        let keep_alive_client = self.clone();
        executor
            .spawn(async move {
                if let Err(e) = keep_alive_client.keep_alive().await {
                    warn!(target: "fromage::client", "Keep-alive task ended: {}", e);
                }
            })
            .detach();

        let result = self.listen(main.clone(), false).await;

        main.close();
        if let Some(satellite) = self.satellite.lock().expect("satellite poisoned").take() {
            satellite.close();
        }

        result
    }

    async fn send_handshake(&self) -> Result<()> {
        let secrets = &self.settings.secrets;

        let mut language = self.settings.language.clone();
        if language == "nb" {
            // The game maps Norwegian from 'Capabilities' to 'no'.
            language = "no".to_string();
        }

        let handshake = serverbound::Handshake {
            game_version: secrets.game_version.unwrap_or_default(),
            language,
            connection_token: UnlessBotRole(secrets.connection_token.clone().unwrap_or_default()),
            player_type: settings::PLAYER_TYPE.into(),
            browser_info: settings::BROWSER_INFO.into(),
            loader_stage_size: settings::LOADER_STAGE_SIZE,
            concatenated_font_name_hash: settings::FONTS_HASH.into(),
            server_string: settings::SERVER_STRING.into(),
            referrer: crate::proto::enums::Referrer::Steam.into(),
            milliseconds_since_start: settings::MILLISECONDS_SINCE_START,
            ..Default::default()
        };

        self.write(&self.main()?, handshake.into()).await
    }

    async fn keep_alive(self: Arc<Self>) -> Result<()> {
        // The game sends its first keep-alive 15 seconds after the
        // handshake and repeats every 15 seconds after that.
        loop {
            Timer::after(Duration::from_secs(settings::KEEP_ALIVE_INTERVAL)).await;

            let main = self.main()?;
            if main.is_closing() {
                return Ok(())
            }

            self.write(&main, serverbound::KeepAlive {}.into()).await?;

            let satellite = self.satellite()?;
            if !Arc::ptr_eq(&satellite, &main) {
                self.write(&satellite, serverbound::KeepAlive {}.into()).await?;
            }
        }
    }

    async fn listen(self: &Arc<Self>, conn: Arc<Connection>, satellite: bool) -> Result<()> {
        let link = Arc::new(Link {
            direction: Direction::Clientbound,
            satellite,
            peer: conn.peer_addr(),
        });

        loop {
            let Some(packet) = conn.read_clientbound().await? else {
                return Ok(())
            };

            let packet = Arc::new(packet);
            self.handle(&conn, &packet).await?;
            self.dispatcher.dispatch_before(&link, &packet, self.sequential()).await;
        }
    }

    async fn handle(self: &Arc<Self>, _conn: &Arc<Connection>, packet: &Arc<Clientbound>) -> Result<()> {
        match &**packet {
            Clientbound::HandshakeResponse(response) => {
                *self.auth_token.lock().expect("auth token poisoned") = response.auth_token;

                let main = self.main()?;

                // The game falls back to the language the server
                // announced.
                self.write(
                    &main,
                    serverbound::SetLanguage { language: response.language.clone() }.into(),
                )
                .await?;

                self.write(
                    &main,
                    serverbound::SystemInformation {
                        language: self.settings.language.clone(),
                        os: settings::OS.to_string(),
                        flash_version: settings::FLASH_VERSION.to_string(),
                        zero_byte: 0,
                    }
                    .into(),
                )
                .await?;

                if let Some(steam_id) = &self.settings.steam_id {
                    self.write(
                        &main,
                        serverbound::EnvironmentUserId {
                            user_id: steam_id.clone(),
                            unk_string_2: String::new(),
                        }
                        .into(),
                    )
                    .await?;
                }
            }

            Clientbound::ClientVerification(challenge) => {
                let main = self.main()?;
                let secrets = &self.settings.secrets;

                if secrets.client_verification_template.is_some() {
                    let ciphered_data =
                        secrets.client_verification_data(challenge.verification_token)?;

                    self.write(
                        &main,
                        serverbound::ClientVerification { ciphered_data: ciphered_data.into() }
                            .into(),
                    )
                    .await?;
                }

                // A missing username means sitting at the login screen.
                if let Some(username) = self.settings.username.clone() {
                    let auth_key =
                        secrets.auth_key.ok_or(Error::StateViolation("auth key unknown"))?;
                    let auth_token = *self.auth_token.lock().expect("auth token poisoned");

                    self.write(
                        &main,
                        serverbound::Login {
                            username,
                            password_hash: self.settings.password_hash.clone(),
                            loader_url: settings::LOADER_URL.to_string(),
                            start_room: self.settings.start_room.as_str().into(),
                            ciphered_auth_token: auth_token ^ auth_key,
                            unk_short_6: 18,
                            ..Default::default()
                        }
                        .into(),
                    )
                    .await?;
                }
            }

            Clientbound::LoginSuccess(success) => {
                *self.session_id.lock().expect("session id poisoned") = Some(success.session_id);
                self.logged_in.store(true, Ordering::SeqCst);
                info!(target: "fromage::client", "Logged in as {}", success.username);
            }

            Clientbound::AccountError(account_error) => {
                error!(
                    target: "fromage::client",
                    "Account error code '{}'", account_error.error_code,
                );
                return Err(Error::AccountError(account_error.error_code))
            }

            Clientbound::ChangeSatelliteServer(change) => {
                if !change.should_ignore() {
                    self.change_satellite(change).await?;
                }
            }

            Clientbound::Ping(ping) => {
                let target = if ping.main_server { self.main()? } else { self.satellite()? };
                self.write(&target, serverbound::Pong { payload: ping.payload }.into()).await?;
            }

            _ => {}
        }

        Ok(())
    }

    async fn change_satellite(
        self: &Arc<Self>,
        change: &clientbound::ChangeSatelliteServer,
    ) -> Result<()> {
        let _ = change;
        return Ok(());
        #[allow(unreachable_code)]
        // Tear the previous satellite down first.
        if let Some(old) = self.satellite.lock().expect("satellite poisoned").take() {
            old.close();
        }

        let stream = net::open_stream(&change.address, &change.ports.0).await?;
        let satellite = Connection::new(
            stream,
            self.settings.secrets.clone(),
            rand::thread_rng().gen_range(0..90),
        );
        info!(
            target: "fromage::client",
            "Connected to satellite server {}", satellite.peer_addr(),
        );

        // The game delays this until it otherwise writes to the
        // satellite; we send it right away.
        self.write(
            &satellite,
            serverbound::SatelliteDelayedIdentification {
                timestamp: change.timestamp,
                global_id: change.global_id,
                auth_id: change.auth_id,
            }
            .into(),
        )
        .await?;

        *self.satellite.lock().expect("satellite poisoned") = Some(satellite.clone());

        let client = self.clone();
        let executor = self.executor.get().cloned().expect("executor set at start");
        executor
            .spawn(async move {
                if let Err(e) = client.listen(satellite.clone(), true).await {
                    warn!(target: "fromage::client", "Satellite listen ended: {}", e);
                }
                satellite.close();
            })
            .detach();

        Ok(())
    }
}
