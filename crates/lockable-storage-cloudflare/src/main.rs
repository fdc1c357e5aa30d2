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
    let manager = config.build_manager()?;
    debug!(
        "Bucket: {:?}, lock backend: {:?}, lease: {:?}s, manager: {:?}",
        config.r2_bucket_name, config.lock_backend, config.lock_lease_secs, manager
    );

    let output = execute(&manager, config.command).await?;
    println!("{}", output);
    Ok(())
}
