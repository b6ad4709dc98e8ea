use anyhow::Context;
use clap::Parser;

use frontdoor::{Gateway, config::Args, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logging::init(&args.log_level, args.log_json);

    let config = args.into_config().context("invalid configuration")?;
    let gateway = Gateway::new(config).context("failed to construct the gateway")?;
    gateway.start().await.context("gateway stopped with an error")?;
    Ok(())
}
