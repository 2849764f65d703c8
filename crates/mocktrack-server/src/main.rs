use anyhow::Context;
use clap::Parser;
use mocktrack_server::api::server::ApiServer;
use mocktrack_server::api::AppContext;
use mocktrack_server::gate::Gate;
use mocktrack_server::hook::{DispatcherConfig, WebhookDispatcher};
use mocktrack_server::store::{empty_state, sample_state, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mocktrack-server")]
#[command(about = "Stateful mock of an issue-tracking REST API")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "MOCKTRACK_HOST")]
    host: String,

    /// Port to bind
    #[arg(short, long, default_value = "8080", env = "MOCKTRACK_PORT")]
    port: u16,

    /// Log filter (e.g. info, debug, mocktrack_server=debug)
    #[arg(long, default_value = "info", env = "MOCKTRACK_LOG")]
    log_level: String,

    /// Start with an empty store instead of seeded sample data
    #[arg(long)]
    no_seed: bool,

    /// Minimum delivery jitter in milliseconds
    #[arg(long, default_value = "50", env = "MOCKTRACK_WEBHOOK_JITTER_MIN_MS")]
    webhook_jitter_min_ms: u64,

    /// Maximum delivery jitter in milliseconds
    #[arg(long, default_value = "250", env = "MOCKTRACK_WEBHOOK_JITTER_MAX_MS")]
    webhook_jitter_max_ms: u64,

    /// Probability in [0, 1] of deliberately poisoning a delivery
    #[arg(long, default_value = "0.0", env = "MOCKTRACK_WEBHOOK_POISON_PROBABILITY")]
    webhook_poison_probability: f64,

    /// Outbound delivery timeout in milliseconds
    #[arg(long, default_value = "3000", env = "MOCKTRACK_WEBHOOK_TIMEOUT_MS")]
    webhook_timeout_ms: u64,

    /// Signing secret for registrations without their own
    #[arg(long, default_value = "mock-webhook-secret", env = "MOCKTRACK_WEBHOOK_SECRET")]
    webhook_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_level)
                .context("invalid --log-level filter")?,
        )
        .init();

    let dispatcher = Arc::new(WebhookDispatcher::new(DispatcherConfig {
        jitter_min_ms: args.webhook_jitter_min_ms,
        jitter_max_ms: args.webhook_jitter_max_ms,
        poison_probability: args.webhook_poison_probability.clamp(0.0, 1.0),
        send_timeout: Duration::from_millis(args.webhook_timeout_ms),
        default_secret: args.webhook_secret,
    }));

    let initial = if args.no_seed {
        info!("starting with an empty store");
        empty_state()
    } else {
        info!("starting with seeded sample data");
        sample_state()
    };
    let store = Arc::new(Store::new(initial, dispatcher.clone()));
    let gate = Arc::new(Gate::new(store.clone()));

    let ctx = Arc::new(AppContext {
        store,
        gate,
        dispatcher,
        started_at: Instant::now(),
    });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let server = ApiServer::bind(addr, ctx)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
