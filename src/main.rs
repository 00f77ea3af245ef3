use std::sync::Arc;

use data_pipeline::config::PipelineConfig;
use data_pipeline::error::Result;
use data_pipeline::pipeline::Pipeline;
use data_pipeline::pipeline::downloads::HttpFetcher;
use data_pipeline::pipeline::types::Handler;
use data_pipeline::reporting::sink_from_config;
use data_pipeline::store::FsStore;

const USAGE: &str = "usage: data-pipeline <process_file|uncompress_file|convert_file|unpack_attachments> <bucket> <key>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [handler, bucket, key] = args.as_slice() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let handler: Handler = handler.parse()?;

    let config = PipelineConfig::from_env()?;

    let store_root =
        std::env::var("PIPELINE_STORE_ROOT").unwrap_or_else(|_| "./data/buckets".to_string());
    let store = Arc::new(FsStore::new(&store_root));

    let sink = sink_from_config(&config);
    let fetcher = Arc::new(HttpFetcher::new(config.download_timeout)?);

    eprintln!("data-pipeline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {store_root}");
    eprintln!("   Handler: {}", handler.name());

    let pipeline = Pipeline::new(config, store, Arc::clone(&sink), fetcher);
    let result = pipeline.handle(bucket, key, handler).await?;

    // Deliver queued error reports before exiting
    for delivery in sink.take_pending() {
        if let Err(e) = delivery.await {
            tracing::warn!(error = %e, "Error report delivery task failed");
        }
    }

    println!("{}", serde_json::to_string_pretty(&result.to_response())?);
    Ok(())
}
