use clap::{Parser, Subcommand};
use ruster_resolver::config;
use ruster_resolver::dataplane::Resolver;
use ruster_resolver::telemetry::init_logging;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ruster-resolver")]
#[command(about = "IPv4 address resolution (ARP, gateways, route cache)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration file without using it
    Validate {
        /// Path to resolver.toml
        #[arg(short, long, default_value = "resolver.toml")]
        config: PathBuf,
    },
    /// Build the tables from a configuration file and print them
    Show {
        /// Path to resolver.toml
        #[arg(short, long, default_value = "resolver.toml")]
        config: PathBuf,

        /// Extra static entries in ethers(5) format
        #[arg(short, long)]
        ethers: Option<PathBuf>,

        /// Also print the event counters
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Show {
            config,
            ethers,
            stats,
        } => cmd_show(&config, ethers.as_ref(), stats),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_validate(config_path: &PathBuf) -> Result<(), String> {
    init_logging(None);
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_show(config_path: &PathBuf, ethers: Option<&PathBuf>, stats: bool) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;
    init_logging(Some(&cfg.log));

    let validation = config::validate(&cfg);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("Validation failed".to_string());
    }

    let now = Instant::now();
    let mut resolver =
        Resolver::from_config(&cfg, now).map_err(|e| format!("Failed to build resolver: {}", e))?;

    if let Some(path) = ethers {
        let entries = config::ethers::load(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        info!("Loading {} entries from {}", entries.len(), path.display());
        for (ip, mac) in entries {
            resolver
                .add_cache(ip, mac, false, now)
                .map_err(|e| format!("{} -> {}: {}", ip, mac, e))?;
        }
    }

    print!("{}", resolver.dump(now));

    if stats {
        println!("Counters");
        for (name, value) in resolver.stats().export() {
            println!("  {:<24} {}", name, value);
        }
    }
    Ok(())
}
