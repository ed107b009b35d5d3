//! Tipwatch binary entrypoint.

use anyhow::{anyhow, Result};
use argh::from_env;
use bitcoin::{constants::genesis_block, params::Params};
use tipwatch_btcio::reader::{BlockAnnouncer, BlockTracker, BlockTrackerBuilder, ChainEvent};
use tipwatch_common::logging;
use tipwatch_config::Config;
use tokio::{runtime, sync::mpsc};
use tracing::{info, warn};

use crate::{args::Args, context::create_bitcoin_rpc_client, errors::InitError};

mod args;
mod context;
mod errors;

fn main() -> Result<()> {
    let args: Args = from_env();

    let config =
        context::load_config(&args).map_err(|e| anyhow!("Failed to load configuration: {e}"))?;

    init_logging(&config);

    let rt = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tipwatch-rt")
        .build()
        .map_err(InitError::RuntimeBuild)?;

    rt.block_on(run(config))?;

    info!("Exiting tipwatch");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let client = create_bitcoin_rpc_client(&config.bitcoind)
        .map_err(|e| anyhow!("Failed to initialize bitcoin client: {e}"))?;

    let network = config.bitcoind.network;
    let genesis_hash = genesis_block(Params::from(network)).block_hash();
    let reader_config = &config.btcio.reader;

    let mut tracker = BlockTracker::new(client, genesis_hash)
        .with_max_reorg_depth(reader_config.max_reorg_depth);
    let events = tracker.subscribe();

    // Nothing in this binary announces blocks yet. The announcer is the hook a
    // P2P or ZMQ listener would feed to step before the next poll.
    let announcer = BlockAnnouncer::new(reader_config.announcement_capacity);

    let handle = BlockTrackerBuilder::new(tracker)
        .with_poll_interval(reader_config.poll_interval())
        .with_announcer(&announcer)
        .start();
    let sink = tokio::spawn(log_chain_events(events));

    info!(
        %network,
        rpc_url = %config.bitcoind.rpc_url,
        max_reorg_depth = reader_config.max_reorg_depth,
        "tracking chain tip"
    );

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");

    let status_rx = handle.status_watcher();
    handle.stop().await;
    // The tracker is gone, so the event stream ends once drained.
    sink.await?;

    let status = status_rx.borrow().clone();
    info!(status = %serde_json::to_string(&status)?, "final tracker status");

    Ok(())
}

async fn log_chain_events(mut events: mpsc::UnboundedReceiver<ChainEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ChainEvent::BlockAdded(block) => info!(
                hash = %block.block_hash(),
                prev = %block.header.prev_blockhash,
                txs = block.txdata.len(),
                "block added"
            ),
            ChainEvent::Reorged(header) => warn!(
                hash = %header.block_hash(),
                prev = %header.prev_blockhash,
                "block reorged out"
            ),
        }
    }
}

fn init_logging(config: &Config) {
    logging::init_logging_from_config(logging::LoggingInitConfig {
        service_base_name: "tipwatch",
        service_label: config.logging.service_label.as_deref(),
        log_dir: config.logging.log_dir.as_ref(),
        log_file_prefix: config.logging.log_file_prefix.as_deref(),
        json_format: config.logging.json_format,
        default_log_prefix: "tipwatch",
    });
}
