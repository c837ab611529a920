//! tollgate-worker: proof-of-work worker daemon.
//!
//! Single OS process running a Tokio async runtime. Hosts connect over a
//! Unix socket; heavy computation runs on the blocking pool.

use tracing::{error, info};

use tollgate_worker::{Server, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!("tollgate worker starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let socket_path = config.socket_path(&data_dir);
    let server = Server::new(socket_path.clone(), config.limits);
    info!(
        max_steps = config.limits.max_steps,
        default_yield_every = config.limits.default_yield_every,
        "limits loaded"
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    let _ = std::fs::remove_file(&socket_path);

    info!("tollgate worker stopped");
    Ok(())
}
