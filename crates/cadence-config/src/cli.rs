//! Command-line argument parsing for the Cadence client.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Cadence client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cadence", about = "Cadence online client")]
pub struct CliArgs {
    /// Protocol server host (e.g. `example.net`).
    #[arg(long)]
    pub server: Option<String>,

    /// Account name.
    #[arg(long)]
    pub username: Option<String>,

    /// Plaintext password. Hashed before the first login attempt.
    #[arg(long)]
    pub password: Option<String>,

    /// Use https for every request.
    #[arg(long)]
    pub https: Option<bool>,

    /// Log in right after startup.
    #[arg(long)]
    pub autologin: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory for replays, avatars, and maps.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Log in through the browser, then paste the code it shows.
    #[arg(long)]
    pub browser_login: bool,

    /// Stop after this many seconds. Runs until interrupted when absent.
    #[arg(long)]
    pub run_for: Option<u64>,

    /// `<scheme>://` uri passed by the OS. A login uri needs the browser login
    /// started by this process, so paste it into `--browser-login` instead.
    pub uri: Option<String>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref server) = args.server {
            self.online.server = server.clone();
        }
        if let Some(ref username) = args.username {
            self.online.username = username.clone();
        }
        if let Some(ref password) = args.password {
            self.online.password = password.clone();
        }
        if let Some(https) = args.https {
            self.online.use_https = https;
        }
        if let Some(autologin) = args.autologin {
            self.online.autologin = autologin;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(ref dir) = args.data_dir {
            self.paths.data_dir = dir.clone();
        }
    }
}
