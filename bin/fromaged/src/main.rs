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

use std::sync::Arc;

use serde::Deserialize;
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};
use smol::Executor;
use structopt::StructOpt;
use structopt_toml::StructOptToml;

use fromage::{
    crypto::shakikoo,
    settings::{ProxySettings, ServerSettings},
    Error, Proxy, Result, Server,
};

const CONFIG_FILE_CONTENTS: &str = include_str!("../fromaged_config.toml");

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(name = "fromaged", about = "Proxy and server daemon for the mouse game protocol")]
struct Args {
    #[structopt(short, parse(from_occurrences))]
    /// Increase verbosity (-vvv supported)
    verbose: u8,

    #[structopt(short, long)]
    /// Configuration file to use
    config: Option<String>,

    #[structopt(default_value = "proxy")]
    /// What to run: proxy, server, or shakikoo
    action: String,

    /// The password to hash for the shakikoo action
    input: Option<String>,

    #[structopt(flatten)]
    proxy: ProxyArgs,

    #[structopt(flatten)]
    server: ServerArgs,
}

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[structopt()]
struct ProxyArgs {
    #[structopt(long, default_value = "127.0.0.1")]
    /// Address the proxy listeners bind to
    proxy_host: String,

    #[structopt(long, default_value = "11801")]
    /// Main listener port
    main_port: u16,

    #[structopt(long, default_value = "12801")]
    /// Satellite listener port
    satellite_port: u16,

    #[structopt(long)]
    /// Socket policy listener port
    socket_policy_port: Option<u16>,

    #[structopt(long, default_value = "localhost")]
    /// Address the game client expects to be connected to
    expected_address: String,

    #[structopt(long)]
    /// Static upstream address (otherwise taken from the extension
    /// side channel)
    server_address: Option<String>,

    #[structopt(long)]
    /// Static upstream ports
    server_port: Vec<u16>,
}

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[structopt()]
struct ServerArgs {
    #[structopt(long, default_value = "127.0.0.1")]
    /// Address the server binds to
    server_host: String,

    #[structopt(long, default_value = "11801")]
    /// Main listener port
    port: u16,

    #[structopt(long, default_value = "60")]
    /// Seconds without a keep-alive before a client is dropped
    keep_alive_timeout: u64,
}

fn main() -> Result<()> {
    // One pass to find the config file, then the real parse overlays
    // the command line on top of the TOML.
    let initial = Args::from_args();
    let toml_contents = match &initial.config {
        Some(path) => std::fs::read_to_string(path)?,
        None => CONFIG_FILE_CONTENTS.to_string(),
    };

    let args = Args::from_args_with_toml(&toml_contents)
        .map_err(|e| Error::Custom(format!("failed parsing configuration: {}", e)))?;

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, simplelog::Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .expect("logger init");

    match args.action.as_str() {
        "shakikoo" => {
            let input = args
                .input
                .ok_or_else(|| Error::Custom("shakikoo needs a password to hash".to_string()))?;
            println!("{}", shakikoo(&input));
            Ok(())
        }

        "proxy" => {
            let settings = ProxySettings {
                host_address: args.proxy.proxy_host,
                host_main_port: args.proxy.main_port,
                host_satellite_port: args.proxy.satellite_port,
                host_socket_policy_port: args.proxy.socket_policy_port,
                expected_address: args.proxy.expected_address,
                main_server_address: args.proxy.server_address,
                main_server_ports: if args.proxy.server_port.is_empty() {
                    None
                } else {
                    Some(args.proxy.server_port)
                },
                ..Default::default()
            };

            let mut proxy = Proxy::new(settings);
            proxy.log_packets();
            let proxy = Arc::new(proxy);

            let ex = Arc::new(Executor::new());
            smol::block_on(ex.clone().run(proxy.start(ex.clone())))
        }

        "server" => {
            let settings = ServerSettings {
                host_address: args.server.server_host,
                host_main_port: args.server.port,
                keep_alive_timeout: Some(args.server.keep_alive_timeout),
                ..Default::default()
            };

            let mut server = Server::new(settings);
            server.log_packets();
            let server = Arc::new(server);

            let ex = Arc::new(Executor::new());
            smol::block_on(ex.clone().run(server.start(ex.clone())))
        }

        action => Err(Error::Custom(format!("unknown action '{}'", action))),
    }
}
