//! `ssserver` — the Shadowsocks-facing front door.
//!
//! Grounded on the teacher's `bin/server.rs`, modernized from `clap` 2.x
//! `App`/`Arg` to the `clap` v4 derive API; see `bin/local.rs` for the
//! matching Local-role entry point.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use log::{error, LevelFilter};

use shadowtun::config::ServerConfig;
use shadowtun::relay::server::run_remote;

#[derive(Parser, Debug)]
#[command(name = "ssserver", about = "Shadowsocks front door bridging to plaintext destinations")]
struct Args {
    /// Local address to accept Shadowsocks clients on.
    #[arg(short = 's', long = "server-addr")]
    bind_addr: Option<SocketAddr>,

    /// Shadowsocks cipher method (e.g. aes-256-cfb, chacha20, rc4-md5).
    #[arg(short = 'm', long = "encrypt-method")]
    method: Option<String>,

    /// Shared password with Shadowsocks clients.
    #[arg(short = 'k', long = "password")]
    password: Option<String>,

    /// JSON config file; CLI flags above override the fields it sets.
    #[arg(short = 'c', long = "config")]
    config: Option<std::path::PathBuf>,

    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level_filter_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn build_config(args: &Args) -> Option<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load_from_file(path).ok()?,
        None => ServerConfig {
            bind_addr: args.bind_addr?,
            method: args.method.clone()?,
            password: args.password.clone()?,
        },
    };
    if let Some(addr) = args.bind_addr {
        config.bind_addr = addr;
    }
    if let Some(method) = &args.method {
        config.method = method.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    Some(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(level_filter_for_verbosity(args.verbose))
        .parse_env("RUST_LOG")
        .init();

    let Some(config) = build_config(&args) else {
        error!("missing required configuration: need -s, -m and -k, or a -c config file providing them");
        return ExitCode::FAILURE;
    };

    match run_remote(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ssserver exited: {e}");
            ExitCode::FAILURE
        }
    }
}
