//! QDB server: resolves cluster membership and keeps the cluster metadata
//! repository connected until interrupted.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod data_dir;
mod error;

use config::Args;
use data_dir::DataDirectory;
use error::Result;

use clap::Parser;
use qdb_coordination_memory::MemoryCoordination;
use qdb_metadata::Repository;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(args.log_level)
            .finish(),
    )?;

    let data_dir = DataDirectory::open(&args.data_dir)?;

    let membership = args.membership()?;
    info!("Cluster membership: {}", membership.status());
    membership.announce();

    // Only the in-process coordination service is built in; the connect
    // string is still validated and reported.
    let options = args.repository_options()?;
    warn!(
        "Using in-process coordination service in place of [{}]",
        options.session.connect_string
    );

    let repository = Repository::new(MemoryCoordination::new(), options)?;
    let mut status = repository.subscribe();
    repository.start().await?;

    info!(
        "Server {} started with data in {}",
        membership.own_identity(),
        data_dir.path().display()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            update = status.recv() => {
                let Some(update) = update else {
                    break;
                };
                info!(ready = update.ready, "Repository status: {}", update.summary());
            }
        }
    }

    repository.shutdown().await;
    membership.close().await?;

    Ok(())
}
