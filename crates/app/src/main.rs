//! Astra entry point: logging, wiring, then the command loop.

mod context;
mod repl;

use context::AppContext;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ctx = AppContext::init();
    repl::run(&ctx).await?;
    ctx.shutdown();
    Ok(())
}
