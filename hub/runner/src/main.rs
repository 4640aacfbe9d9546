use adcproto::logging;
use clap::{App, Arg};
use hubcore::config::HubConfig;
use hubcore::hub::plugin::PluginManager;
use hubcore::hub::server::ServerManager;
use hubcore::hub::Hub;
use hubcore::net::listener::ListenerKind;
use hubcore::net::reactor::Reactor;
use std::time::Duration;

mod plugins;

use plugins::{FloodGuard, PasswordGate};

fn main() {
    let matches = App::new("adchub")
        .version("0.1")
        .about("Runs the ADC hub.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .required(true),
        )
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();
    let config = HubConfig::load(config_file_path);

    // Initialize logging
    let logger = logging::init();

    logging::info!(logger, "starting hub"; "name" => %config.hub.name);

    let server = ServerManager::new(
        &config.hub.name,
        &config.hub.description,
        config.hub.sid_bits,
        config.hub.hub_id,
        config.hub.interpass.clone(),
        logger.new(logging::o!()),
    );
    let hub = Hub::new(server, config.hub.motd.clone(), logger.new(logging::o!()));

    let mut plugins = PluginManager::new(logger.new(logging::o!()));
    if !config.passwords.is_empty() {
        plugins.register(Box::new(PasswordGate::new(&config.passwords)));
    }
    plugins.register(Box::new(FloodGuard::new(20, Duration::from_secs(10))));

    let mut reactor =
        Reactor::new(hub, plugins, logger.new(logging::o!())).expect("Error creating reactor");

    reactor
        .listen(ListenerKind::Client, &config.net.client_addr)
        .expect("Error opening client port");

    if let Some(address) = &config.net.inter_addr {
        reactor
            .listen(ListenerKind::InterHub, address)
            .expect("Error opening interhub port");
    }

    for peer in &config.peers {
        if let Err(err) = reactor.connect_hub(&peer.address) {
            logging::warn!(logger, "failed to dial federation peer";
                           "address" => %peer.address,
                           "error" => %err);
        }
    }

    reactor.run();
}
