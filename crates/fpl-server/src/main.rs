// FPL gameweek planner entry point.
//
// Startup sequence:
// 1. Initialize tracing (stdout)
// 2. Load config
// 3. Build the upstream client
// 4. Serve the routes until Ctrl+C

use fpl_server::config;
use fpl_server::routes::{self, AppContext};
use fpl_server::upstream::FplClient;

use anyhow::Context;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("FPL planner starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: upstream={}, cache ttl {}s, default mode {}",
        config.upstream.base_url, config.upstream.cache_ttl_secs, config.planner.default_mode
    );

    // 3. Upstream client
    let client = FplClient::from_config(&config.upstream).context("failed to build upstream client")?;
    let ctx = AppContext {
        source: Arc::new(client),
        planner: config.planner.clone(),
    };

    // 4. Serve
    let host: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server.host '{}'", config.server.host))?;
    let (addr, server) = warp::serve(routes::app(ctx))
        .try_bind_with_graceful_shutdown((host, config.server.port), async {
            tokio::signal::ctrl_c().await.ok();
        })
        .with_context(|| format!("failed to bind {}:{}", host, config.server.port))?;
    info!("Listening on http://{}", addr);

    server.await;

    info!("FPL planner shut down cleanly");
    Ok(())
}

/// Initialize tracing to stdout. `RUST_LOG` overrides the default filter.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fpl_server=info,fpl_core=info,warn")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
