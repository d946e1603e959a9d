//! hauth - IIIF Auth 1.0 access cookie and access token broker

use std::net::IpAddr;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use hauth::{
    cli::{Cli, Command},
    config::Config,
    network::NetworkClassifier,
    service::{AppState, Broker},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&cli),
        Some(Command::Classify { ip }) => run_classify(&cli, ip),
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Validate configuration and build every component without serving
fn run_check_config(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    if let Err(e) = config.server.bind_addr() {
        eprintln!("❌ {e}");
        return ExitCode::FAILURE;
    }

    let state = match AppState::with_seeded_store(&config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("✅ Configuration is valid\n");
    println!("   Version:          {}", config.version);
    println!("   Listen:           {}:{}", config.server.host, config.server.port);
    println!("   Cookie:           {} (secure={})", state.cookie.name, state.cookie.secure);
    println!("   Cookie password:  set");
    println!("   Cookie salt:      set");
    println!("   External secret:  set");
    println!("   External prefix:  {}", config.external.valid_prefix);
    println!(
        "   External cookies: {}, {}",
        config.external.ciphertext_cookie, config.external.iv_cookie
    );
    match config.token.expires_in {
        Some(seconds) => println!("   Token expiresIn:  {seconds}s"),
        None => println!("   Token expiresIn:  not advertised"),
    }
    println!("   Degraded origins: {}", config.degraded_access.origins.len());
    println!("   Item modes:       {}", config.items.access_modes.len());
    println!("   Campus subnets:   {}", state.classifier.blocks().len());
    for block in state.classifier.blocks() {
        println!("     {block}");
    }

    ExitCode::SUCCESS
}

/// Print the campus network classification of one address
fn run_classify(cli: &Cli, ip: IpAddr) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    let classifier = match NetworkClassifier::load(&config.campus_network.subnets) {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    if classifier.is_privileged_ip(ip) {
        println!("{ip}: campus network");
    } else {
        println!("{ip}: not on the campus network");
    }

    ExitCode::SUCCESS
}

/// Run the broker
async fn run_server(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting hauth"
    );

    let broker = match Broker::new(config) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create broker: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = broker.run().await {
        error!("Broker error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Broker shutdown complete");
    ExitCode::SUCCESS
}
