use clap::Parser;
use sensor_relay::config::{read_config_file, Config};
use sensor_relay::service::Pipeline;
use tracing::{debug, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (built-in defaults apply when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("sensor_relay", LevelFilter::DEBUG),
        ("relayd", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    // The pipeline is thread-based and carries a blocking HTTP client, so
    // it is built, started and stopped off the async runtime. Construction
    // failure (broker address, webhook client) exits nonzero.
    let mut pipeline = tokio::task::spawn_blocking(move || {
        let mut pipeline = Pipeline::new(&config)?;
        pipeline.start();
        anyhow::Ok(pipeline)
    })
    .await??;

    tokio::signal::ctrl_c().await?;
    debug!("interrupt received, shutting down");

    tokio::task::spawn_blocking(move || {
        pipeline.stop();
    })
    .await?;

    Ok(())
}
