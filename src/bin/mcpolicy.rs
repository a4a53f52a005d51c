use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mcpolicy::filter::{Direction, Verdict};
use mcpolicy::instance::Role;
use mcpolicy::{CompileOptions, Configuration};

/// Compiles multicast proxy configuration scripts and queries their filters
#[derive(Parser)]
struct Cli {
    /// Path to the configuration script
    #[clap(long, short)]
    config: PathBuf,

    /// YAML file with compile options. Flags below override it
    #[clap(long)]
    options: Option<PathBuf>,

    /// Do not look the interfaces up on this host
    #[clap(long)]
    no_resolve: bool,

    #[clap(long)]
    reset_rp_filter: bool,

    /// Verdict for traffic no rule covers
    #[clap(long, value_enum)]
    unmatched: Option<Verdict>,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compiled configuration
    Dump {
        #[clap(long)]
        json: bool,
    },

    /// Ask whether a source may be forwarded for a group
    Check {
        #[clap(long)]
        instance: String,
        #[clap(long, default_value = "downstream")]
        role: Role,
        #[clap(long)]
        interface: String,
        /// Interface the request arrived on, if not the one holding the filter
        #[clap(long)]
        via: Option<String>,
        #[clap(long, default_value = "in")]
        direction: Direction,
        group: IpAddr,
        source: IpAddr,
    },
}

fn load_options(cli: &Cli) -> anyhow::Result<CompileOptions> {
    let mut options = match &cli.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Reading options file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("Parsing options file {}", path.display()))?
        }
        None => CompileOptions::default(),
    };

    if cli.no_resolve {
        options.resolve_interfaces = false;
    }
    if cli.reset_rp_filter {
        options.reset_reverse_path_filter = true;
    }
    if let Some(v) = cli.unmatched {
        options.unmatched = v;
    }
    Ok(options)
}

fn main() -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }

    env_logger::init();

    let cli = Cli::parse();
    let options = load_options(&cli)?;
    log::debug!("Compile options: {options:?}");

    let config = match Configuration::load(&cli.config, &options) {
        Ok(v) => v,
        Err(e) => {
            log::error!("Invalid configuration {}: {e}", cli.config.display());
            return Err(e).with_context(|| format!("Compiling {}", cli.config.display()));
        }
    };

    match cli.cmd {
        Command::Dump { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{config}");
            }
        }
        Command::Check {
            instance,
            role,
            interface,
            via,
            direction,
            group,
            source,
        } => {
            let definition = config
                .instance(&instance)
                .with_context(|| format!("Unknown proxy instance {instance}"))?
                .interface(role, &interface)
                .with_context(|| format!("Unknown {role} interface {interface} of {instance}"))?;

            if IpAddr::is_ipv4(&group) != IpAddr::is_ipv4(&source) {
                bail!("Group {group} and source {source} are of different address families");
            }

            let via = via.as_deref().unwrap_or(&interface);
            let verdict = definition.is_source_allowed(direction, via, group, source);
            log::info!(
                "{direction} {via} ({group}, {source}) on {instance}/{interface}: {}",
                if verdict { "allowed" } else { "denied" }
            );
            println!("{}", if verdict { "allow" } else { "deny" });
        }
    }

    Ok(())
}
