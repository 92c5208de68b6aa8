#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

mod commands;

use scampack::manager::RelayManager;
use scampack::probe::RelayHealthProbe;
use scampack::relay_config::RelayConfigStore;
use scampack::settings::Settings;
use scampack::storage::{FileStore, KeyValueStore};
use scampack::transport::WebsocketTransport;
use scampack::{Error, PackClient};
use std::env;
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() -> Result<(), Error> {
    // Setup logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    let env_filter = EnvFilter::from_default_env();
    let max_level = match env_filter.max_level_hint() {
        Some(l) => l,
        None => LevelFilter::ERROR,
    };
    let show_debug = cfg!(debug_assertions) || max_level <= LevelFilter::DEBUG;
    tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_file(show_debug)
        .with_line_number(show_debug)
        .with_env_filter(env_filter)
        .init();

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::default_location()?);
    let settings = Settings::load(&*store);

    let transport = Arc::new(WebsocketTransport::new(&settings));
    let probe = RelayHealthProbe::new(transport.clone());
    let manager = RelayManager::new(RelayConfigStore::new(store), probe)
        .with_probe_timeout(settings.probe_timeout());
    let client = PackClient::new(settings, Arc::new(manager), transport);

    // Setup async
    let rt = tokio::runtime::Runtime::new()?;
    let _main_rt = rt.enter();

    let mut args = env::args();
    let _ = args.next(); // program name
    if args.len() == 0 {
        commands::help_all();
        return Ok(());
    }

    if let Err(e) = commands::handle_command(args, &rt, &client) {
        println!("{}", e);
    }

    Ok(())
}
