//! Headless Cadence client: logs in, keeps the session alive and logs what the server sends.

mod game_loop;
mod host;
mod login;
mod platform;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_config::{CliArgs, Config, ConfigHandle};
use cadence_net::ReqwestTransport;
use cadence_online::OnlineClient;
use clap::Parser;
use tracing::{error, info, warn};

use crate::game_loop::TickLoop;
use crate::platform::PlatformDirs;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let dirs = match PlatformDirs::resolve().and_then(|dirs| {
        let dirs = dirs.with_config_override(args.config.as_deref());
        dirs.create_dirs()?;
        Ok(dirs)
    }) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to initialize platform directories: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);
    cadence_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    info!(config_dir = %dirs.config_dir.display(), data_dir = %config.paths.data_dir.display(), "starting");

    let http = match ReqwestTransport::new(cadence_online::transport::USER_AGENT) {
        Ok(http) => Arc::new(http),
        Err(e) => {
            error!(error = %e, "failed to start the HTTP transport");
            return ExitCode::FAILURE;
        }
    };

    let autologin = config.online.autologin;
    let handle = ConfigHandle::persistent(config, &dirs.config_dir);
    let mut client = OnlineClient::new(handle, host::log_collaborators(), http);

    if args.browser_login {
        if let Err(e) = login::browser_login(&mut client, std::io::stdin().lock()) {
            error!(error = %e, "browser login failed");
            return ExitCode::FAILURE;
        }
    } else if let Some(uri) = &args.uri {
        if let Err(e) = client.handle_uri(uri) {
            warn!(%uri, error = %e, "could not handle uri");
        }
    } else if autologin {
        client.reconnect();
    }

    let deadline = args.run_for.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut tick_loop = TickLoop::new();
    while deadline.is_none_or(|deadline| Instant::now() < deadline) {
        tick_loop.tick(|| client.tick());
        std::thread::sleep(tick_loop.time_until_next_step());
    }

    info!(steps = tick_loop.step_count(), "shutting down");
    client.disconnect();
    ExitCode::SUCCESS
}
