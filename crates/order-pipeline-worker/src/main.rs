use clap::{Parser, Subcommand};
use order_pipeline_core::Amount;
use order_pipeline_worker::config::LogFormat;
use order_pipeline_worker::{OrderRequest, Pipeline, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "order-pipeline")]
#[command(about = "Asynchronous order processing pipeline", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit orders and process them until the pipeline is idle
    DispatchOrder {
        /// Order amount, e.g. 42.50 (random when omitted)
        #[arg(short, long)]
        amount: Option<Amount>,

        /// Number of orders to submit
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Number of concurrent workers
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Probability that a payment attempt fails
        #[arg(long)]
        failure_rate: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    init_tracing(&config);

    match args.command {
        Command::DispatchOrder {
            amount,
            count,
            concurrency,
            failure_rate,
        } => {
            // Override with CLI args
            if let Some(concurrency) = concurrency {
                config.workers.concurrency = concurrency;
            }
            if let Some(failure_rate) = failure_rate {
                config.retry.failure_rate = failure_rate;
            }

            dispatch_orders(config, amount, count).await
        }
    }
}

fn init_tracing(config: &WorkerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.monitoring.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.monitoring.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

async fn dispatch_orders(
    config: WorkerConfig,
    amount: Option<Amount>,
    count: usize,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::builder(config).build()?;
    let handle = pipeline.spawn();

    for _ in 0..count {
        let receipt = pipeline.submit(OrderRequest {
            order_id: None,
            amount,
        })?;
        println!(
            "Order dispatched: {} (amount: {})",
            receipt.order_id, receipt.amount
        );
    }

    // Handle shutdown signals
    tokio::select! {
        _ = handle.wait_idle() => {
            tracing::info!(
                orders = count,
                dead_letters = pipeline.metrics().dead_letters.get(),
                "All orders processed"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    handle.shutdown().await;
    Ok(())
}
