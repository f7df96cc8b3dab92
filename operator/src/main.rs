use clap::Parser;
pub use controller::*;
use futures::future::select_all;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup tracing layers
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let logger = if args.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    Registry::default().with(logger).with(env_filter).init();

    // Start kubernetes controllers
    let (manager, controllers) = Manager::new(args).await?;
    let (names, futures): (Vec<&'static str>, Vec<_>) = controllers.into_iter().unzip();
    tracing::info!("Starting controllers for {}", names.join(", "));

    let (_, index, _) = select_all(futures).await;
    tracing::warn!(
        "{} controller exited, known platforms were: {:?}",
        names[index],
        manager.platforms().await
    );
    Ok(())
}
