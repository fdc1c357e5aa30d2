mod config;

use clap::Parser;
use lockable_storage_core::cli::execute;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (stdout carries command output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let manager = config.build_manager();
    debug!(
        "Storage dir: {}, lock dir: {}, lease: {:?}s, manager: {:?}",
        config.effective_storage_dir().display(),
        config.effective_lock_dir().display(),
        config.lock_lease_secs,
        manager
    );

    let output = execute(&manager, config.command).await?;
    println!("{}", output);
    Ok(())
}
