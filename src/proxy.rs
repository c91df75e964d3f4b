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

//! The MITM proxy core.
//!
//! Two listening sockets accept game clients: one for main
//! connections, one for satellites. Every packet is decoded, shown to
//! the listeners, and re-encoded towards the other side, so listeners
//! can observe and transform the whole session. The clientbound
//! satellite redirect is rewritten to point back at the proxy, and a
//! satellite client is paired with its originating main session by the
//! 32-bit auth id echoed in its delayed identification packet.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use futures::AsyncWriteExt;
use log::{error, info, warn};
use smol::{net::TcpListener, Executor};

use crate::{
    error::Result,
    handler::{Dispatcher, Link, Verdict},
    net::{self, Connection},
    proto::{serverbound, Clientbound, Direction, Serverbound, ServerboundExtension},
    settings::{self, ProxySettings},
    Error,
};

/// A satellite redirect we are still waiting on: the original
/// destination and the main session it belongs to.
struct PendingSatellite {
    auth_id: i32,
    address: String,
    ports: Vec<u16>,
    main_client: Arc<Connection>,
}

/// Per-pair state shared by the two relay directions.
struct PairState {
    satellite: bool,
    logged_in: AtomicBool,
}

pub struct Proxy {
    settings: ProxySettings,

    pending_satellites: Mutex<Vec<PendingSatellite>>,

    /// Serverbound packet listeners.
    pub sb_dispatcher: Dispatcher<Serverbound>,
    /// Clientbound packet listeners.
    pub cb_dispatcher: Dispatcher<Clientbound>,
}

impl Proxy {
    pub fn new(settings: ProxySettings) -> Self {
        Self {
            settings,
            pending_satellites: Mutex::new(vec![]),
            sb_dispatcher: Dispatcher::new(),
            cb_dispatcher: Dispatcher::new(),
        }
    }

    /// Register listeners printing every decoded packet.
    pub fn log_packets(&mut self) {
        use crate::handler::Selector;

        self.sb_dispatcher.listen(Selector::Any, |link: Arc<Link>, packet: Arc<Serverbound>| async move {
            let connection = if link.satellite { "SATELLITE" } else { "MAIN" };
            info!(target: "fromage::proxy", "{}: Serverbound: {:?}", connection, packet);
            Ok(Verdict::Forward)
        });

        self.cb_dispatcher.listen(Selector::Any, |link: Arc<Link>, packet: Arc<Clientbound>| async move {
            let connection = if link.satellite { "SATELLITE" } else { "MAIN" };
            info!(target: "fromage::proxy", "{}: Clientbound: {:?}", connection, packet);
            Ok(Verdict::Forward)
        });
    }

    /// Listen on all configured sockets until one of the accept loops
    /// fails.
    pub async fn start(self: Arc<Self>, executor: Arc<Executor<'static>>) -> Result<()> {
        let host = self.settings.host_address.as_str();

        let main_listener = TcpListener::bind((host, self.settings.host_main_port)).await?;
        let satellite_listener =
            TcpListener::bind((host, self.settings.host_satellite_port)).await?;
        info!(
            target: "fromage::proxy",
            "Listening on {}:{} (main) and :{} (satellite)",
            host, self.settings.host_main_port, self.settings.host_satellite_port,
        );

        if let Some(policy_port) = self.settings.host_socket_policy_port {
            let policy_listener = TcpListener::bind((host, policy_port)).await?;
            executor
                .spawn(async move {
                    if let Err(e) = Self::serve_socket_policy(policy_listener).await {
                        error!(target: "fromage::proxy", "Socket policy listener failed: {}", e);
                    }
                })
                .detach();
        }

        let satellite_proxy = self.clone();
        let satellite_executor = executor.clone();
        executor
            .spawn(async move {
                satellite_proxy.accept_loop(satellite_listener, true, satellite_executor).await;
            })
            .detach();

        self.accept_loop(main_listener, false, executor).await;
        Ok(())
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        satellite: bool,
        executor: Arc<Executor<'static>>,
    ) {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(target: "fromage::proxy", "Failed accepting connection: {}", e);
                    continue
                }
            };
            info!(
                target: "fromage::proxy",
                "Accepted {} client: {}",
                if satellite { "satellite" } else { "main" },
                peer_addr,
            );

            let proxy = self.clone();
            let connection_executor = executor.clone();
            executor
                .spawn(async move {
                    if let Err(e) =
                        proxy.new_connection(stream, satellite, connection_executor).await
                    {
                        warn!(target: "fromage::proxy", "Client {} ended: {}", peer_addr, e);
                    }
                })
                .detach();
        }
    }

    async fn serve_socket_policy(listener: TcpListener) -> Result<()> {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(target: "fromage::proxy", "Socket policy accept failed: {}", e);
                    continue
                }
            };

            if let Err(e) = stream.write_all(settings::SOCKET_POLICY_RESPONSE).await {
                warn!(target: "fromage::proxy", "Socket policy write failed: {}", e);
            }
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    async fn new_connection(
        self: Arc<Self>,
        stream: smol::net::TcpStream,
        satellite: bool,
        executor: Arc<Executor<'static>>,
    ) -> Result<()> {
        let client = Connection::new(stream, self.settings.secrets.clone(), 0);

        // A statically configured upstream is opened right away; the
        // dynamic path waits for the main-server-info extension packet,
        // and satellites for their delayed identification.
        if !satellite {
            if let (Some(address), Some(ports)) =
                (self.settings.main_server_address.clone(), self.settings.main_server_ports.clone())
            {
                self.open_upstream(&client, &address, &ports, 0, satellite, &executor).await?;
            }
        }

        let result = self.relay_serverbound(client.clone(), satellite, executor).await;

        client.close();
        result
    }

    /// Open the upstream half of a pair and start its clientbound
    /// relay.
    async fn open_upstream(
        self: &Arc<Self>,
        client: &Arc<Connection>,
        address: &str,
        ports: &[u16],
        fingerprint: u8,
        satellite: bool,
        executor: &Arc<Executor<'static>>,
    ) -> Result<Arc<Connection>> {
        let stream = net::open_stream(address, ports).await?;
        let upstream = Connection::new(stream, client.secrets(), fingerprint);
        info!(target: "fromage::proxy", "Opened upstream {}", upstream.peer_addr());

        Connection::pair(client, &upstream);

        let proxy = self.clone();
        let relay_client = client.clone();
        let relay_upstream = upstream.clone();
        executor
            .spawn(async move {
                let state =
                    PairState { satellite, logged_in: AtomicBool::new(false) };
                if let Err(e) =
                    proxy.relay_clientbound(relay_upstream, relay_client.clone(), state).await
                {
                    warn!(target: "fromage::proxy", "Clientbound relay ended: {}", e);
                }
                relay_client.close();
            })
            .detach();

        Ok(upstream)
    }

    /// The client-to-upstream direction. Serverbound packets are
    /// always dispatched sequentially so the fingerprint sequence
    /// cannot reorder.
    async fn relay_serverbound(
        self: Arc<Self>,
        client: Arc<Connection>,
        satellite: bool,
        executor: Arc<Executor<'static>>,
    ) -> Result<()> {
        let link = Arc::new(Link {
            direction: Direction::Serverbound,
            satellite,
            peer: client.peer_addr(),
        });

        loop {
            let Some((fingerprint, packet)) = client.read_serverbound().await? else {
                return Ok(())
            };

            // The proxy-core paths: pairing, handshake correction and
            // the extension side channel.
            let packet = match self
                .handle_serverbound(&client, fingerprint, packet, satellite, &executor)
                .await?
            {
                Some(packet) => Arc::new(packet),
                None => continue,
            };

            let Some(upstream) = client.destination() else {
                client.close();
                return Err(Error::StateViolation("packet before upstream is known"))
            };

            match self.sb_dispatcher.dispatch_before(&link, &packet, true).await {
                Verdict::Forward => {
                    upstream.write_serverbound(&packet).await?;
                }
                Verdict::Rewrite(rewritten) => {
                    upstream.write_serverbound(&rewritten).await?;
                }
                Verdict::Replace => {
                    // A no-op write keeps the fingerprint sequence in
                    // lockstep with the client's.
                    upstream.write_serverbound(&serverbound::KeepAlive {}.into()).await?;
                }
                Verdict::Drop => continue,
            }

            self.sb_dispatcher.dispatch_after(&link, &packet, true).await;
        }
    }

    /// Returns the packet to run through the listeners, or `None` when
    /// the proxy core consumed it.
    async fn handle_serverbound(
        self: &Arc<Self>,
        client: &Arc<Connection>,
        fingerprint: u8,
        packet: Serverbound,
        satellite: bool,
        executor: &Arc<Executor<'static>>,
    ) -> Result<Option<Serverbound>> {
        // A satellite client must identify itself before anything can
        // be forwarded.
        if satellite && client.destination().is_none() {
            let Serverbound::SatelliteDelayedIdentification(identification) = &packet else {
                client.close();
                return Err(Error::StateViolation("satellite client did not identify"))
            };

            self.pair_satellite(client, fingerprint, identification, executor).await?;
            return Ok(Some(packet))
        }

        match packet {
            Serverbound::Handshake(mut handshake) => {
                let Some(upstream) = client.destination() else {
                    client.close();
                    return Err(Error::StateViolation("handshake before upstream is known"))
                };

                // The serverbound fingerprint sequence continues from
                // the client's handshake.
                upstream.set_fingerprint(fingerprint);

                // Version-dependent codings downstream need the real
                // version.
                let secrets = client.secrets().with_game_version(handshake.game_version);
                client.set_secrets(secrets.clone());
                upstream.set_secrets(secrets);

                // With the proxy loader, the loader's stage size is not
                // what the server expects.
                handshake.loader_stage_size = settings::CORRECTED_LOADER_SIZE;

                Ok(Some(handshake.into()))
            }

            Serverbound::ExtensionWrapper(wrapper) => {
                self.handle_extension(client, &wrapper.nested, satellite, executor).await?;

                // Extension packets never travel upstream, but
                // listeners still get to see them.
                let link = Arc::new(Link {
                    direction: Direction::Serverbound,
                    satellite,
                    peer: client.peer_addr(),
                });
                let packet = Arc::new(Serverbound::ExtensionWrapper(wrapper));
                self.sb_dispatcher.dispatch_before(&link, &packet, true).await;

                Ok(None)
            }

            packet => Ok(Some(packet)),
        }
    }

    async fn handle_extension(
        self: &Arc<Self>,
        client: &Arc<Connection>,
        nested: &ServerboundExtension,
        satellite: bool,
        executor: &Arc<Executor<'static>>,
    ) -> Result<()> {
        match nested {
            ServerboundExtension::KeySources(key_sources) => {
                let secrets = client
                    .secrets()
                    .with_packet_key_sources(key_sources.packet_key_sources.0.clone());

                client.set_secrets(secrets.clone());
                if let Some(upstream) = client.destination() {
                    upstream.set_secrets(secrets);
                }
            }

            ServerboundExtension::AuthKey(auth_key) => {
                let secrets = client.secrets().with_auth_key(auth_key.auth_key);

                client.set_secrets(secrets.clone());
                if let Some(upstream) = client.destination() {
                    upstream.set_secrets(secrets);
                }
            }

            ServerboundExtension::MainServerInfo(info) => {
                if satellite || client.destination().is_some() {
                    return Ok(())
                }

                let address = self
                    .settings
                    .main_server_address
                    .clone()
                    .unwrap_or_else(|| info.address.clone());
                let ports = self
                    .settings
                    .main_server_ports
                    .clone()
                    .unwrap_or_else(|| info.ports.0.clone());

                self.open_upstream(client, &address, &ports, 0, false, executor).await?;
            }

            ServerboundExtension::Unknown(unknown) => {
                warn!(
                    target: "fromage::proxy",
                    "Unhandled extension packet '{}'", unknown.id,
                );
            }
        }

        Ok(())
    }

    /// Complete a satellite pairing: look up the pending redirect by
    /// auth id, open the real upstream and adopt the main session's
    /// secrets.
    async fn pair_satellite(
        self: &Arc<Self>,
        client: &Arc<Connection>,
        fingerprint: u8,
        identification: &serverbound::SatelliteDelayedIdentification,
        executor: &Arc<Executor<'static>>,
    ) -> Result<()> {
        let pending = {
            let mut pending_satellites =
                self.pending_satellites.lock().expect("pending satellites poisoned");

            match pending_satellites
                .iter()
                .position(|pending| pending.auth_id == identification.auth_id)
            {
                Some(index) => pending_satellites.remove(index),
                None => {
                    client.close();
                    return Err(Error::StateViolation("satellite auth id matches no redirect"))
                }
            }
        };

        let secrets = pending.main_client.secrets();
        client.set_secrets(secrets);

        let upstream = self
            .open_upstream(client, &pending.address, &pending.ports, fingerprint, true, executor)
            .await?;
        upstream.set_secrets(pending.main_client.secrets());

        info!(
            target: "fromage::proxy",
            "Paired satellite client with auth id {}", identification.auth_id,
        );

        Ok(())
    }

    /// The upstream-to-client direction.
    async fn relay_clientbound(
        self: Arc<Self>,
        upstream: Arc<Connection>,
        client: Arc<Connection>,
        state: PairState,
    ) -> Result<()> {
        let link = Arc::new(Link {
            direction: Direction::Clientbound,
            satellite: state.satellite,
            peer: upstream.peer_addr(),
        });

        loop {
            let Some(packet) = upstream.read_clientbound().await? else {
                return Ok(())
            };

            let packet = match self.handle_clientbound(&client, packet, &state).await? {
                Some(packet) => Arc::new(packet),
                None => continue,
            };

            let sequential = !state.logged_in.load(Ordering::SeqCst);
            match self.cb_dispatcher.dispatch_before(&link, &packet, sequential).await {
                Verdict::Forward => client.write_clientbound(&packet).await?,
                Verdict::Rewrite(rewritten) => client.write_clientbound(&rewritten).await?,
                // Clientbound frames carry no fingerprint, so there is
                // nothing to hold a place for.
                Verdict::Replace | Verdict::Drop => continue,
            }

            self.cb_dispatcher.dispatch_after(&link, &packet, sequential).await;
        }
    }

    async fn handle_clientbound(
        self: &Arc<Self>,
        client: &Arc<Connection>,
        packet: Clientbound,
        state: &PairState,
    ) -> Result<Option<Clientbound>> {
        match packet {
            // The client would disconnect if the reaffirmed address
            // did not match the one it dialed.
            Clientbound::ReaffirmServerAddress(mut reaffirm) => {
                reaffirm.address = self.settings.expected_address.clone();
                Ok(Some(reaffirm.into()))
            }

            Clientbound::ChangeSatelliteServer(change) => {
                if change.should_ignore() {
                    return Ok(Some(change.into()))
                }

                self.pending_satellites
                    .lock()
                    .expect("pending satellites poisoned")
                    .push(PendingSatellite {
                        auth_id: change.auth_id,
                        address: change.address.clone(),
                        ports: change.ports.0.clone(),
                        main_client: client.clone(),
                    });

                let mut redirected = change;
                redirected.address = self.settings.expected_address.clone();
                redirected.ports = vec![self.settings.host_satellite_port].into();

                Ok(Some(redirected.into()))
            }

            Clientbound::LoginSuccess(success) => {
                state.logged_in.store(true, Ordering::SeqCst);
                Ok(Some(success.into()))
            }

            packet => Ok(Some(packet)),
        }
    }
}
