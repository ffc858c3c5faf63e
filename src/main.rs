//! # Microcks Operator
//!
//! Entry point: initialize the runtime, then run the controllers until a
//! shutdown signal is received.

use anyhow::Result;
use microcks_operator::runtime::initialization::initialize;
use microcks_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.client, init.reconciler, init.server_state, init.triggers).await
}
