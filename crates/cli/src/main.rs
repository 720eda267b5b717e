use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tasklink")]
#[command(about = "Slack to Notion task relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay (POST /slack/actions, GET /health).
    Serve {
        /// Config file path (default: TASKLINK_CONFIG_PATH or ./tasklink.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config, PORT env, or 4567)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Report which required settings are present. Values are never printed.
    CheckConfig {
        /// Config file path (default: TASKLINK_CONFIG_PATH or ./tasklink.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("tasklink {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig { config }) => match run_check_config(config) {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                log::error!("check-config failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = tasklink::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "starting relay on {}:{} (config {})",
        config.server.bind,
        config.server.port,
        path.display()
    );
    tasklink::server::run_server(config).await
}

/// Prints a summary; returns false when something required is missing.
fn run_check_config(config_path: Option<std::path::PathBuf>) -> anyhow::Result<bool> {
    let (config, path) = tasklink::config::load_config(config_path)?;
    println!("config: {}", path.display());
    println!("listen: {}:{}", config.server.bind, config.server.port);
    println!("allowed hosts: {}", config.allowed_hosts().join(", "));
    println!(
        "retry: max_retries={} base_delay_ms={} jitter_ms={}",
        config.retry.max_retries, config.retry.base_delay_ms, config.retry.jitter_ms
    );
    let missing = config.missing_settings();
    if missing.is_empty() {
        println!("all required settings present");
        return Ok(true);
    }
    for m in missing {
        println!("missing: {}", m);
    }
    Ok(false)
}
