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

//! A minimal main server.
//!
//! Enforces the handshake → verification → login ordering and the
//! keep-alive watchdog, generates the per-connection tokens, and
//! answers every valid login attempt with an account error. Anything
//! more is for a real implementation built on top.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use log::{error, info, warn};
use rand::Rng;
use smol::{net::TcpListener, Executor, Timer};

use crate::{
    error::Result,
    handler::{Dispatcher, Link},
    net::Connection,
    proto::{clientbound, serverbound, Direction, Serverbound, ServerboundExtension},
    settings::ServerSettings,
    Error,
};

/// One accepted connection and its login progress.
pub struct ServerClient {
    pub conn: Arc<Connection>,

    did_handshake: AtomicBool,
    can_login: AtomicBool,
    logged_in: AtomicBool,

    auth_token: Mutex<i32>,
    verification_token: Mutex<Option<i32>>,

    last_keep_alive: Mutex<Instant>,
}

impl ServerClient {
    fn new(conn: Arc<Connection>) -> Arc<Self> {
        Arc::new(Self {
            conn,
            did_handshake: AtomicBool::new(false),
            can_login: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            auth_token: Mutex::new(0),
            verification_token: Mutex::new(None),
            last_keep_alive: Mutex::new(Instant::now()),
        })
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    pub fn auth_token(&self) -> i32 {
        *self.auth_token.lock().expect("auth token poisoned")
    }

    fn refresh_keep_alive(&self) {
        *self.last_keep_alive.lock().expect("keep alive poisoned") = Instant::now();
    }

    fn keep_alive_deadline(&self, timeout: u64) -> Instant {
        *self.last_keep_alive.lock().expect("keep alive poisoned") + Duration::from_secs(timeout)
    }
}

pub struct Server {
    settings: ServerSettings,

    clients: Mutex<Vec<Arc<ServerClient>>>,

    /// Incoming (serverbound) packet observers.
    pub dispatcher: Dispatcher<Serverbound>,
}

impl Server {
    pub fn new(settings: ServerSettings) -> Self {
        Self { settings, clients: Mutex::new(vec![]), dispatcher: Dispatcher::new() }
    }

    /// Register a listener printing every decoded packet.
    pub fn log_packets(&mut self) {
        use crate::handler::{Selector, Verdict};

        self.dispatcher.listen(Selector::Any, |link: Arc<Link>, packet: Arc<Serverbound>| async move {
            info!(target: "fromage::server", "{}: Serverbound: {:?}", link.peer, packet);
            Ok(Verdict::Forward)
        });
    }

    pub fn num_online_players(&self) -> i32 {
        self.clients
            .lock()
            .expect("clients poisoned")
            .iter()
            .filter(|client| client.logged_in())
            .count() as i32
    }

    /// Accept connections until the listener fails.
    pub async fn start(self: Arc<Self>, executor: Arc<Executor<'static>>) -> Result<()> {
        let listener = TcpListener::bind(
            (self.settings.host_address.as_str(), self.settings.host_main_port),
        )
        .await?;
        info!(
            target: "fromage::server",
            "Listening on {}:{}", self.settings.host_address, self.settings.host_main_port,
        );

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(target: "fromage::server", "Failed accepting connection: {}", e);
                    continue
                }
            };
            info!(target: "fromage::server", "Accepted client: {}", peer_addr);

            let server = self.clone();
            let client_executor = executor.clone();
            executor
                .spawn(async move {
                    if let Err(e) = server.process_connection(stream, client_executor).await {
                        warn!(target: "fromage::server", "Client {} ended: {}", peer_addr, e);
                    }
                })
                .detach();
        }
    }

    async fn process_connection(
        self: Arc<Self>,
        stream: smol::net::TcpStream,
        executor: Arc<Executor<'static>>,
    ) -> Result<()> {
        let conn = Connection::new(stream, self.settings.initial_secrets(), 0);
        let client = ServerClient::new(conn.clone());

        self.clients.lock().expect("clients poisoned").push(client.clone());

        if let Some(timeout) = self.settings.keep_alive_timeout {
            let watchdog_client = client.clone();
            executor
                .spawn(async move {
                    Self::keep_alive_watchdog(watchdog_client, timeout).await;
                })
                .detach();
        }

        let result = self.listen(&client).await;

        conn.close();
        self.clients
            .lock()
            .expect("clients poisoned")
            .retain(|other| !Arc::ptr_eq(other, &client));

        result
    }

    /// Close the connection once the last keep-alive is older than the
    /// timeout.
    async fn keep_alive_watchdog(client: Arc<ServerClient>, timeout: u64) {
        loop {
            if client.conn.is_closing() {
                return
            }

            let deadline = client.keep_alive_deadline(timeout);
            let now = Instant::now();

            if now >= deadline {
                warn!(
                    target: "fromage::server",
                    "Client {} idled out", client.conn.peer_addr(),
                );
                client.conn.close();
                return
            }

            Timer::at(deadline).await;
        }
    }

    async fn listen(&self, client: &Arc<ServerClient>) -> Result<()> {
        let link = Arc::new(Link {
            direction: Direction::Serverbound,
            satellite: false,
            peer: client.conn.peer_addr(),
        });

        loop {
            let Some((fingerprint, packet)) = client.conn.read_serverbound().await? else {
                return Ok(())
            };

            let packet = Arc::new(packet);
            self.handle(client, fingerprint, &packet).await?;

            if client.conn.is_closing() {
                return Ok(())
            }

            self.dispatcher.dispatch_before(&link, &packet, true).await;
        }
    }

    async fn handle(
        &self,
        client: &Arc<ServerClient>,
        _fingerprint: u8,
        packet: &Arc<Serverbound>,
    ) -> Result<()> {
        // Nothing but a handshake or an extension wrapper may open a
        // session.
        if !client.did_handshake.load(Ordering::SeqCst) &&
            !matches!(
                &**packet,
                Serverbound::Handshake(_) | Serverbound::ExtensionWrapper(_)
            )
        {
            client.conn.close();
            return Err(Error::StateViolation("first packet was not a handshake"))
        }

        match &**packet {
            Serverbound::Handshake(handshake) => self.on_handshake(client, handshake).await?,

            Serverbound::SetLanguage(_) => {
                client
                    .conn
                    .write_clientbound(
                        &clientbound::SetLanguage {
                            language: "en".to_string(),
                            country: "us".to_string(),
                        }
                        .into(),
                    )
                    .await?;
            }

            Serverbound::SystemInformation(_) => {
                if self.settings.client_verification_template.is_none() {
                    client.can_login.store(true, Ordering::SeqCst);
                }
            }

            Serverbound::ClientVerification(verification) => {
                let token = client
                    .verification_token
                    .lock()
                    .expect("verification token poisoned")
                    .ok_or(Error::StateViolation("verification reply without challenge"))?;

                let expected = client.conn.secrets().client_verification_data(token)?;
                if verification.ciphered_data.0 != expected {
                    client.conn.close();
                    return Err(Error::StateViolation("bad client verification data"))
                }

                client.can_login.store(true, Ordering::SeqCst);
            }

            Serverbound::Login(login) => self.on_login(client, login).await?,

            Serverbound::KeepAlive(_) => client.refresh_keep_alive(),

            Serverbound::ExtensionWrapper(wrapper) => {
                if let ServerboundExtension::KeySources(key_sources) = &wrapper.nested {
                    client.conn.set_secrets(
                        client
                            .conn
                            .secrets()
                            .with_packet_key_sources(key_sources.packet_key_sources.0.clone()),
                    );
                }
            }

            _ => {}
        }

        Ok(())
    }

    async fn on_handshake(
        &self,
        client: &Arc<ServerClient>,
        handshake: &serverbound::Handshake,
    ) -> Result<()> {
        if let Some(expected) = self.settings.loader_stage_size {
            if handshake.loader_stage_size != expected {
                client.conn.close();
                return Err(Error::StateViolation("unexpected loader stage size"))
            }
        }

        match self.settings.game_version {
            // Only track what could matter.
            None => client.conn.set_secrets(
                client.conn.secrets().with_game_version(handshake.game_version),
            ),
            Some(version) => {
                if handshake.game_version != version {
                    client.conn.close();
                    return Err(Error::StateViolation("unexpected game version"))
                }
            }
        }

        client.did_handshake.store(true, Ordering::SeqCst);

        // A 31-bit non-negative token, stable for the connection.
        let auth_token = rand::thread_rng().gen_range(0..=i32::MAX);
        *client.auth_token.lock().expect("auth token poisoned") = auth_token;

        client
            .conn
            .write_clientbound(
                &clientbound::HandshakeResponse {
                    num_online_players: self.num_online_players(),
                    language: "en".to_string(),
                    country: "us".to_string(),
                    auth_token,
                    unk_boolean_5: false,
                }
                .into(),
            )
            .await?;

        if self.settings.client_verification_template.is_some() {
            let verification_token = rand::thread_rng().gen_range(0..=i32::MAX);
            *client.verification_token.lock().expect("verification token poisoned") =
                Some(verification_token);

            client
                .conn
                .write_clientbound(
                    &clientbound::ClientVerification { verification_token }.into(),
                )
                .await?;
        }

        Ok(())
    }

    async fn on_login(
        &self,
        client: &Arc<ServerClient>,
        login: &serverbound::Login,
    ) -> Result<()> {
        if !client.can_login.load(Ordering::SeqCst) {
            client.conn.close();
            return Err(Error::StateViolation("login before verification"))
        }

        if let Some(auth_key) = self.settings.auth_key {
            if login.ciphered_auth_token != (client.auth_token() ^ auth_key) {
                client.conn.close();
                return Err(Error::StateViolation("bad auth token"))
            }
        }

        info!(
            target: "fromage::server",
            "Login attempt from '{}'", login.username,
        );

        // The minimal server rejects every login.
        client
            .conn
            .write_clientbound(&clientbound::AccountError { error_code: 2 }.into())
            .await?;

        Ok(())
    }
}
