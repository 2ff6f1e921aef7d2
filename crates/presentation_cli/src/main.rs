//! MyStop CLI
//!
//! Command-line driver for the Avail MyStop client: agency discovery,
//! route and stop listings, live departures and alerts, and a `watch` mode
//! running the stop monitor on its polling cadences.

#![allow(clippy::print_stdout)]

mod config;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use application::presentation::{direction_label, format_clock_time};
use application::{
    FeedSnapshot, MonitorPlan, SetupEntry, StopMonitor, filter_departures, next_departure_label,
};
use clap::{Parser, Subcommand};
use integration_mystop::{AvailClient, Departure, IdValue, MyStopClient};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CliConfig;

/// MyStop CLI
#[derive(Parser)]
#[command(name = "mystop-cli")]
#[command(author, version, about = "Avail MyStop real-time transit client", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (default: ./mystop.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Agency base URL, overriding the configuration
    #[arg(short, long, env = "MYSTOP_BASE_URL", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List agencies from the discovery endpoint
    Agencies {
        /// Discovery endpoint, overriding the configuration
        #[arg(long)]
        discovery_url: Option<String>,
    },

    /// List the agency's visible routes
    Routes,

    /// List the stops of a route
    Stops {
        /// Route id
        #[arg(short, long)]
        route_id: String,
    },

    /// Show upcoming departures at a stop
    Departures {
        /// Stop id
        #[arg(short, long)]
        stop_id: String,

        /// Only show this route
        #[arg(short, long)]
        route_id: Option<String>,
    },

    /// Look up a stop's display name
    StopName {
        /// Stop id
        #[arg(short, long)]
        stop_id: String,
    },

    /// Show agency-wide service alerts
    Alerts,

    /// Show the alerts of one route
    RouteAlerts {
        /// Route id
        #[arg(short, long)]
        route_id: String,
    },

    /// Poll a stop until interrupted
    ///
    /// Departures refresh every `polling.departures_interval_secs`, alerts
    /// every `polling.alerts_interval_secs`.
    Watch {
        /// Stop id
        #[arg(short, long)]
        stop_id: String,

        /// Route the stop is monitored for
        #[arg(short, long)]
        route_id: Option<String>,

        /// Agency display name, overriding the configuration
        #[arg(long)]
        agency: Option<String>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber; `RUST_LOG` wins over `-v`
fn init_logging(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter_from_verbosity(verbose)));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per departure: route, direction, destination, time
fn departure_line(departure: &Departure) -> String {
    let time = departure.eta.as_deref().map_or_else(
        || "--".to_string(),
        |eta| format_clock_time(eta).unwrap_or_else(|| eta.to_string()),
    );
    let source = if departure.is_realtime { "live" } else { "scheduled" };
    format!(
        "{:>6}  {:<8}  {:<30}  {:>8}  {source}",
        departure.route_id.as_deref().unwrap_or("?"),
        direction_label(departure.direction.as_deref()),
        departure.destination,
        time,
    )
}

/// Wait for the next snapshot of an optional feed
///
/// Never resolves for an absent feed.
async fn next_snapshot<T>(
    receiver: Option<&mut watch::Receiver<FeedSnapshot<T>>>,
) -> Result<(), watch::error::RecvError> {
    match receiver {
        Some(receiver) => receiver.changed().await,
        None => std::future::pending().await,
    }
}

async fn watch_stop(
    client: AvailClient,
    config: &CliConfig,
    stop_id: String,
    route_id: Option<String>,
    agency: String,
) -> anyhow::Result<()> {
    let base_url = client
        .base_url()
        .map(ToString::to_string)
        .context("A base URL is required to watch a stop")?;
    let client: Arc<dyn MyStopClient> = Arc::new(client);

    let stop_name = client.stop_name(IdValue::from(&stop_id)).await?;
    let entry = SetupEntry {
        agency_name: agency,
        base_url,
        stop_id,
        stop_name,
        route_id,
        route_name: None,
    };
    println!("👀 Watching {} (Ctrl-C to stop)", entry.title());

    let plan = MonitorPlan::for_entry(&entry, &HashSet::new());
    let monitor = StopMonitor::spawn(client, entry, &plan, &config.polling);

    let mut departures = monitor.departures().subscribe();
    let mut alerts = monitor.alerts().map(application::FeedHandle::subscribe);
    let mut route_alerts = monitor.route_alerts().map(application::FeedHandle::subscribe);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            },
            changed = departures.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = departures.borrow_and_update().clone();
                let state = monitor.stop_state();
                println!("🚌 {} [{:?}]", state.state, snapshot.status);
                for departure in &state.attributes.departures {
                    println!("   {}", departure_line(departure));
                }
            },
            changed = next_snapshot(alerts.as_mut()) => {
                if changed.is_err() {
                    break;
                }
                if let Some(state) = monitor.general_alerts_state() {
                    println!("⚠️  {} general alert(s)", state.state);
                }
            },
            changed = next_snapshot(route_alerts.as_mut()) => {
                if changed.is_err() {
                    break;
                }
                if let Some(state) = monitor.route_alerts_state() {
                    println!("⚠️  {} route alert(s)", state.state);
                }
            },
        }
    }

    monitor.stop();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = CliConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_base_url(cli.base_url);

    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {e}");
    }

    if matches!(cli.command, Commands::ShowConfig) {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let client = AvailClient::new(&config.client).context("Failed to create MyStop client")?;

    match cli.command {
        Commands::Agencies { discovery_url } => {
            let url = discovery_url.unwrap_or_else(|| config.client.discovery_url.clone());
            let agencies = client.discover_agencies(&url).await;
            if agencies.is_empty() {
                println!("No agencies found");
            }
            for (name, base_url) in &agencies {
                println!("{name}\t{base_url}");
            }
        },

        Commands::Routes => {
            let catalog = client.list_routes().await?;
            for label in application::presentation::sort_route_labels(catalog.routes.keys()) {
                let route_id = catalog.route_id(&label).unwrap_or_default();
                println!("{route_id:>6}  {label}");
            }
        },

        Commands::Stops { route_id } => {
            let catalog = client.list_routes().await?;
            let Some(stops) = catalog.stops_for(&route_id) else {
                bail!("Unknown route: {route_id}");
            };
            for (label, stop_id) in stops {
                println!("{stop_id:>8}  {label}");
            }
        },

        Commands::Departures { stop_id, route_id } => {
            let departures = client.list_departures(IdValue::from(&stop_id)).await?;
            let departures = filter_departures(&departures, route_id.as_deref());
            println!("🚏 {}", next_departure_label(&departures));
            for departure in &departures {
                println!("{}", departure_line(departure));
            }
        },

        Commands::StopName { stop_id } => {
            println!("{}", client.stop_name(IdValue::from(&stop_id)).await?);
        },

        Commands::Alerts => {
            print_json(&client.list_alerts().await?)?;
        },

        Commands::RouteAlerts { route_id } => {
            print_json(&client.list_route_alerts(IdValue::from(&route_id)).await?)?;
        },

        Commands::Watch {
            stop_id,
            route_id,
            agency,
        } => {
            let agency = agency.unwrap_or_else(|| config.agency_name().to_string());
            watch_stop(client, &config, stop_id, route_id, agency).await?;
        },

        Commands::ShowConfig => {},
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    #[test]
    fn test_log_filter_from_verbosity() {
        assert_eq!(log_filter_from_verbosity(0), "warn");
        assert_eq!(log_filter_from_verbosity(1), "info");
        assert_eq!(log_filter_from_verbosity(2), "debug");
        assert_eq!(log_filter_from_verbosity(5), "trace");
    }

    #[test]
    fn test_parses_departures() {
        let cli = parse(&["mystop-cli", "departures", "--stop-id", "101", "-r", "5"]).unwrap();
        match cli.command {
            Commands::Departures { stop_id, route_id } => {
                assert_eq!(stop_id, "101");
                assert_eq!(route_id.as_deref(), Some("5"));
            },
            _ => panic!("expected departures command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&[
            "mystop-cli",
            "routes",
            "--base-url",
            "https://agency.example.com",
            "-vv",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("https://agency.example.com"));
        assert_eq!(cli.verbose, 2);
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Routes));
    }

    #[test]
    fn test_watch_requires_stop_id() {
        assert!(parse(&["mystop-cli", "watch"]).is_err());
        let cli = parse(&["mystop-cli", "watch", "-s", "7", "--agency", "Metro"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { agency: Some(_), .. }));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(parse(&["mystop-cli"]).is_err());
    }

    #[test]
    fn test_departure_line() {
        let departure = Departure {
            route_id: Some("5".to_string()),
            direction: Some("O".to_string()),
            destination: "Downtown".to_string(),
            eta: Some("2024-05-01T08:05:00".to_string()),
            status: None,
            is_realtime: false,
        };
        let line = departure_line(&departure);
        assert!(line.contains("Outbound"));
        assert!(line.contains("8:05 AM"));
        assert!(line.ends_with("scheduled"));
    }
}
