//! kafka-lag - print the lag of every partition a consumer group consumes
//!
//! One line per partition goes to stdout:
//!
//! ```text
//! group topic partition committedOffset producedOffset lag ownerId ownerHost
//! ```
//!
//! Diagnostics go to stderr.

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use kafka_lag::client::{ClientBuilder, DEFAULT_MAX_MESSAGE_SIZE};
use kafka_lag::{lag, DEFAULT_CLIENT_ID};

/// Report per-partition consumer group lag and partition owners
#[derive(Parser, Debug)]
#[command(name = "kafka-lag")]
#[command(version, about)]
struct Args {
    /// Consumer groups to report on, comma separated. Only the first one is reported
    #[arg(long, env = "KAFKA_LAG_GROUPS", default_value = "")]
    groups: String,

    /// Kafka brokers to bootstrap the connection, comma separated `host:port`
    #[arg(long, env = "KAFKA_LAG_BOOTSTRAP_SERVERS", default_value = "localhost:9092")]
    bootstrap_servers: String,

    /// Client ID sent to the brokers
    #[arg(long, env = "KAFKA_LAG_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// Largest response frame accepted from a broker, in bytes
    #[arg(long, env = "KAFKA_LAG_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Log filter used when `RUST_LOG` is not set
    #[arg(long, env = "KAFKA_LAG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let groups = split_list(&args.groups);
    let Some((group, ignored)) = groups.split_first() else {
        eprintln!("No consumer groups specified. Exiting...");
        return ExitCode::FAILURE;
    };
    if !ignored.is_empty() {
        warn!(?ignored, "Only the first consumer group is reported");
    }
    let group = group.clone();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args, group))
}

async fn run(args: Args, group: String) -> ExitCode {
    let builder = ClientBuilder::new(split_list(&args.bootstrap_servers))
        .client_id(args.client_id)
        .max_message_size(args.max_message_size);

    let client = match lag::connect(builder).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(brokers = client.brokers().len(), "Connected to cluster");

    let group_client = client.group_client(group);
    let result = lag::generate(&client, &group_client).await;

    // connections are closed whatever the outcome
    client.close().await;

    match result {
        Ok(report) => {
            info!(
                group = %report.group,
                state = %report.state,
                generated_at = %report.generated_at.to_rfc3339(),
                "Figures are best-effort, offsets and ownership are read at slightly different instants",
            );
            for record in &report.records {
                println!("{record}");
            }
            for warning in &report.warnings {
                warn!(%warning, "Incomplete report");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
