//! SSM Storage CLI
//!
//! Command-line front end for the SSM storage plugin: list systems, pools
//! and volumes of an SSM managed array and create, resize or delete volumes.
//! Results are printed as JSON.

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ssm_storage_plugin::{Error, Pool, Provisioning, Result, SsmPlugin, Volume};

// =============================================================================
// CLI Arguments
// =============================================================================

/// SSM Storage CLI - manage SSM (CIM/WBEM) storage arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Plugin URI, e.g. ssm+ssl://admin@array/?namespace=root/huawei
    #[arg(long, env = "SSM_URI")]
    uri: String,

    /// Password of the URI user
    #[arg(long, env = "SSM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Timeout of every remote call in milliseconds
    #[arg(long, env = "SSM_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List root storage systems
    Systems,
    /// List storage pools
    Pools {
        #[arg(long, requires = "search_value")]
        search_key: Option<String>,
        #[arg(long, requires = "search_key")]
        search_value: Option<String>,
    },
    /// List storage volumes
    Volumes {
        #[arg(long, requires = "search_value")]
        search_key: Option<String>,
        #[arg(long, requires = "search_key")]
        search_value: Option<String>,
    },
    /// Create a volume
    VolumeCreate {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        size_bytes: u64,
        /// full, thin or default
        #[arg(long, default_value = "default")]
        provisioning: String,
    },
    /// Grow a volume
    VolumeResize {
        #[arg(long)]
        volume: String,
        #[arg(long)]
        size_bytes: u64,
    },
    /// Delete a volume
    VolumeDelete {
        #[arg(long)]
        volume: String,
    },
    /// Show capabilities of a system
    Capabilities {
        #[arg(long)]
        system: String,
    },
    /// Show plugin description and version
    PluginInfo,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting SSM Storage CLI");
    info!("  Version: {}", ssm_storage_plugin::VERSION);
    info!("  Timeout: {} ms", args.timeout_ms);

    let plugin = SsmPlugin::register(&args.uri, args.password.as_deref(), args.timeout_ms)?;

    let result = run(&plugin, args.command).await;
    plugin.unregister();

    if let Err(e) = &result {
        error!("Command failed ({:?}): {}", e.number(), e);
        if let Some(trace) = e.debug() {
            error!("{}", trace);
        }
    }
    result
}

async fn run(plugin: &SsmPlugin, command: Command) -> Result<()> {
    match command {
        Command::Systems => print_json(&plugin.systems().await?),
        Command::Pools {
            search_key,
            search_value,
        } => print_json(
            &plugin
                .pools(search_key.as_deref(), search_value.as_deref())
                .await?,
        ),
        Command::Volumes {
            search_key,
            search_value,
        } => print_json(
            &plugin
                .volumes(search_key.as_deref(), search_value.as_deref())
                .await?,
        ),
        Command::VolumeCreate {
            pool,
            name,
            size_bytes,
            provisioning,
        } => {
            let provisioning: Provisioning = provisioning.parse()?;
            let pool = find_pool(plugin, &pool).await?;
            print_json(
                &plugin
                    .volume_create(&pool, &name, size_bytes, provisioning)
                    .await?,
            )
        }
        Command::VolumeResize { volume, size_bytes } => {
            let volume = find_volume(plugin, &volume).await?;
            print_json(&plugin.volume_resize(&volume, size_bytes).await?)
        }
        Command::VolumeDelete { volume } => {
            let volume = find_volume(plugin, &volume).await?;
            plugin.volume_delete(&volume).await?;
            info!("Deleted volume {}", volume.id);
            Ok(())
        }
        Command::Capabilities { system } => {
            let systems = plugin.systems().await?;
            let system = systems
                .iter()
                .find(|s| s.id == system)
                .ok_or_else(|| Error::NotFoundSystem(format!("System not found: {}", system)))?;
            print_json(&plugin.capabilities(system)?)
        }
        Command::PluginInfo => print_json(&plugin.plugin_info()),
    }
}

async fn find_pool(plugin: &SsmPlugin, id: &str) -> Result<Pool> {
    plugin
        .pools(Some("id"), Some(id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFoundPool(format!("Pool not found: {}", id)))
}

async fn find_volume(plugin: &SsmPlugin, id: &str) -> Result<Volume> {
    plugin
        .volumes(Some("id"), Some(id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFoundVolume(format!("Volume not found: {}", id)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::plugin_bug(format!("JSON encoding failed: {}", e)))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(d) = directive.parse::<Directive>() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
