use clap::Parser;

use mirrorlist::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mirrorlist::bootstrapper::run_updater(Args::parse()).await
}
