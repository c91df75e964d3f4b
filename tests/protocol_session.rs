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

//! Loopback sessions through the real TCP stack.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::{select, Either};
use smol::{
    net::{TcpListener, TcpStream},
    Executor, Timer,
};

use fromage::{
    net::Connection,
    proto::{clientbound, serverbound, Clientbound, Serverbound},
    settings::{ClientSettings, ProxySettings, ServerSettings, CORRECTED_LOADER_SIZE},
    Client, Error, Proxy, Secrets, Server,
};

fn key_sources() -> Vec<u8> {
    (1..=16).collect()
}

fn verification_template() -> Vec<u8> {
    vec![0x01, 0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
}

const AUTH_KEY: i32 = 0x1234_5678;

async fn with_timeout<T>(fut: impl Future<Output = T>, secs: u64) -> T {
    futures::pin_mut!(fut);

    match select(fut, Timer::after(Duration::from_secs(secs))).await {
        Either::Left((value, _)) => value,
        Either::Right(_) => panic!("timed out"),
    }
}

fn client_secrets(port: u16) -> Secrets {
    Secrets::default()
        .with_server_address("127.0.0.1")
        .with_server_ports(vec![port])
        .with_game_version(616)
        .with_connection_token("test-token")
        .with_auth_key(AUTH_KEY)
        .with_packet_key_sources(key_sources())
        .with_client_verification_template(verification_template())
}

#[test]
fn direct_login_flow() {
    let ex = Arc::new(Executor::new());
    smol::block_on(ex.clone().run(async {
        const PORT: u16 = 27801;

        let server = Arc::new(Server::new(ServerSettings {
            host_main_port: PORT,
            auth_key: Some(AUTH_KEY),
            packet_key_sources: Some(key_sources()),
            client_verification_template: Some(verification_template()),
            ..Default::default()
        }));
        ex.spawn(server.clone().start(ex.clone())).detach();
        Timer::after(Duration::from_millis(250)).await;

        let client = Arc::new(Client::new(ClientSettings {
            secrets: client_secrets(PORT),
            username: Some("Souris".to_string()),
            password_hash: fromage::crypto::shakikoo("hunter2"),
            ..Default::default()
        }));

        // The minimal server walks the whole handshake, verification
        // and login sequence, then rejects the account.
        let result = with_timeout(client.start(ex.clone()), 10).await;
        assert!(matches!(result, Err(Error::AccountError(2))));
    }));
}

#[test]
fn proxied_login_flow() {
    let ex = Arc::new(Executor::new());
    smol::block_on(ex.clone().run(async {
        const SERVER_PORT: u16 = 27811;
        const PROXY_MAIN_PORT: u16 = 27812;
        const PROXY_SATELLITE_PORT: u16 = 27813;

        let server = Arc::new(Server::new(ServerSettings {
            host_main_port: SERVER_PORT,
            // Only the corrected size may reach the real server.
            loader_stage_size: Some(CORRECTED_LOADER_SIZE),
            auth_key: Some(AUTH_KEY),
            packet_key_sources: Some(key_sources()),
            client_verification_template: Some(verification_template()),
            ..Default::default()
        }));
        ex.spawn(server.clone().start(ex.clone())).detach();

        let proxy = Arc::new(Proxy::new(ProxySettings {
            host_main_port: PROXY_MAIN_PORT,
            host_satellite_port: PROXY_SATELLITE_PORT,
            host_socket_policy_port: None,
            main_server_address: Some("127.0.0.1".to_string()),
            main_server_ports: Some(vec![SERVER_PORT]),
            secrets: Secrets::default()
                .with_packet_key_sources(key_sources())
                .with_client_verification_template(verification_template()),
            ..Default::default()
        }));
        ex.spawn(proxy.start(ex.clone())).detach();
        Timer::after(Duration::from_millis(250)).await;

        let client = Arc::new(Client::new(ClientSettings {
            secrets: client_secrets(PROXY_MAIN_PORT),
            username: Some("Souris".to_string()),
            password_hash: fromage::crypto::shakikoo("hunter2"),
            ..Default::default()
        }));

        // The handshake is rewritten in flight, so the login sequence
        // survives the proxy hop end to end.
        let result = with_timeout(client.start(ex.clone()), 10).await;
        assert!(matches!(result, Err(Error::AccountError(2))));
    }));
}

#[test]
fn proxy_satellite_pairing() {
    let ex = Arc::new(Executor::new());
    smol::block_on(ex.clone().run(async {
        const UPSTREAM_MAIN_PORT: u16 = 27821;
        const UPSTREAM_SATELLITE_PORT: u16 = 27822;
        const PROXY_MAIN_PORT: u16 = 27823;
        const PROXY_SATELLITE_PORT: u16 = 27824;

        let upstream_listener =
            TcpListener::bind(("127.0.0.1", UPSTREAM_MAIN_PORT)).await.unwrap();
        let satellite_upstream_listener =
            TcpListener::bind(("127.0.0.1", UPSTREAM_SATELLITE_PORT)).await.unwrap();

        let proxy = Arc::new(Proxy::new(ProxySettings {
            host_main_port: PROXY_MAIN_PORT,
            host_satellite_port: PROXY_SATELLITE_PORT,
            host_socket_policy_port: None,
            main_server_address: Some("127.0.0.1".to_string()),
            main_server_ports: Some(vec![UPSTREAM_MAIN_PORT]),
            ..Default::default()
        }));
        ex.spawn(proxy.start(ex.clone())).detach();
        Timer::after(Duration::from_millis(250)).await;

        // A game client dials the proxy; the proxy dials upstream.
        let client_stream = TcpStream::connect(("127.0.0.1", PROXY_MAIN_PORT)).await.unwrap();
        let client = Connection::new(client_stream, Secrets::default(), 5);

        let (upstream_stream, _) = with_timeout(upstream_listener.accept(), 5).await.unwrap();
        let upstream = Connection::new(upstream_stream, Secrets::default(), 0);

        // The handshake keeps its fingerprint and gets its loader
        // stage size corrected in flight.
        client
            .write_serverbound(
                &serverbound::Handshake {
                    game_version: 616,
                    language: "en".to_string(),
                    loader_stage_size: 0x7EE88,
                    ..Default::default()
                }
                .into(),
            )
            .await
            .unwrap();

        let (fingerprint, packet) =
            with_timeout(upstream.read_serverbound(), 5).await.unwrap().unwrap();
        assert_eq!(fingerprint, 5);
        let Serverbound::Handshake(handshake) = packet else {
            panic!("expected handshake, got {packet:?}");
        };
        assert_eq!(handshake.loader_stage_size, CORRECTED_LOADER_SIZE);
        assert_eq!(handshake.game_version, 616);

        // The "x" sentinel passes through untouched.
        upstream
            .write_clientbound(
                &clientbound::ChangeSatelliteServer {
                    timestamp: 1,
                    global_id: 1,
                    auth_id: 43,
                    address: "x".to_string(),
                    ports: vec![1u16].into(),
                }
                .into(),
            )
            .await
            .unwrap();

        let packet = with_timeout(client.read_clientbound(), 5).await.unwrap().unwrap();
        let Clientbound::ChangeSatelliteServer(ignored) = packet else {
            panic!("expected satellite redirect");
        };
        assert_eq!(ignored.address, "x");

        // A real redirect is recorded and rewritten to point at the
        // proxy's own satellite listener.
        upstream
            .write_clientbound(
                &clientbound::ChangeSatelliteServer {
                    timestamp: 11,
                    global_id: 22,
                    auth_id: 42,
                    address: "127.0.0.1".to_string(),
                    ports: vec![UPSTREAM_SATELLITE_PORT].into(),
                }
                .into(),
            )
            .await
            .unwrap();

        let packet = with_timeout(client.read_clientbound(), 5).await.unwrap().unwrap();
        let Clientbound::ChangeSatelliteServer(redirect) = packet else {
            panic!("expected satellite redirect");
        };
        assert_eq!(redirect.address, "localhost");
        assert_eq!(redirect.ports.0, vec![PROXY_SATELLITE_PORT]);
        assert_eq!(redirect.auth_id, 42);

        // The satellite client identifies with the echoed auth id and
        // the proxy opens the originally advertised upstream.
        let satellite_stream =
            TcpStream::connect(("127.0.0.1", PROXY_SATELLITE_PORT)).await.unwrap();
        let satellite_client = Connection::new(satellite_stream, Secrets::default(), 7);
        satellite_client
            .write_serverbound(
                &serverbound::SatelliteDelayedIdentification {
                    timestamp: 11,
                    global_id: 22,
                    auth_id: 42,
                }
                .into(),
            )
            .await
            .unwrap();

        let (satellite_upstream_stream, _) =
            with_timeout(satellite_upstream_listener.accept(), 5).await.unwrap();
        let satellite_upstream =
            Connection::new(satellite_upstream_stream, Secrets::default(), 0);

        let (fingerprint, packet) =
            with_timeout(satellite_upstream.read_serverbound(), 5).await.unwrap().unwrap();
        assert_eq!(fingerprint, 7);
        let Serverbound::SatelliteDelayedIdentification(identification) = packet else {
            panic!("expected identification, got {packet:?}");
        };
        assert_eq!(identification.auth_id, 42);

        // A second identification with the same auth id matches no
        // pending redirect and is cut off.
        let stray_stream = TcpStream::connect(("127.0.0.1", PROXY_SATELLITE_PORT)).await.unwrap();
        let stray = Connection::new(stray_stream, Secrets::default(), 0);
        stray
            .write_serverbound(
                &serverbound::SatelliteDelayedIdentification {
                    timestamp: 11,
                    global_id: 22,
                    auth_id: 42,
                }
                .into(),
            )
            .await
            .unwrap();

        let result = with_timeout(stray.read_clientbound(), 5).await;
        assert!(matches!(result, Ok(None) | Err(_)));
    }));
}

#[test]
fn server_enforces_first_packet_and_idle_timeout() {
    let ex = Arc::new(Executor::new());
    smol::block_on(ex.clone().run(async {
        const PORT: u16 = 27831;

        let server = Arc::new(Server::new(ServerSettings {
            host_main_port: PORT,
            keep_alive_timeout: Some(1),
            ..Default::default()
        }));
        ex.spawn(server.clone().start(ex.clone())).detach();
        Timer::after(Duration::from_millis(250)).await;

        // Anything but a handshake as the first packet is refused.
        let bad_stream = TcpStream::connect(("127.0.0.1", PORT)).await.unwrap();
        let bad = Connection::new(bad_stream, Secrets::default(), 0);
        bad.write_serverbound(&serverbound::KeepAlive {}.into()).await.unwrap();

        let result = with_timeout(bad.read_clientbound(), 5).await;
        assert!(matches!(result, Ok(None) | Err(_)));

        // A handshaken connection that stops sending keep-alives idles
        // out.
        let idle_stream = TcpStream::connect(("127.0.0.1", PORT)).await.unwrap();
        let idle = Connection::new(idle_stream, Secrets::default(), 3);
        idle.write_serverbound(
            &serverbound::Handshake {
                game_version: 616,
                language: "en".to_string(),
                ..Default::default()
            }
            .into(),
        )
        .await
        .unwrap();

        let response = with_timeout(idle.read_clientbound(), 5).await.unwrap().unwrap();
        assert!(matches!(response, Clientbound::HandshakeResponse(_)));

        let result = with_timeout(idle.read_clientbound(), 5).await;
        assert!(matches!(result, Ok(None) | Err(_)));
    }));
}
