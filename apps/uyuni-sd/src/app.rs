//! Wires discovery, the refresh runner and file output together.

use std::path::Path;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uyuni_sd_discovery::{Discovery, Runner, TargetGroup};

use crate::config::Config;
use crate::output;

/// Runs the daemon until SIGINT.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let interval = config.uyuni.refresh_interval;

    let discovery = Discovery::new(config.uyuni)?;
    let mut runner = Runner::new(discovery, interval);
    let updates = runner
        .take_updates()
        .ok_or_else(|| anyhow::anyhow!("update receiver already taken"))?;

    let runner_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { runner.run(cancel).await }
    });
    let writer_task = tokio::spawn(write_updates(updates, config.output.path));

    tracing::info!(?interval, "uyuni-sd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, shutting down");
    cancel.cancel();

    // The writer drains once the runner drops its sender.
    runner_task.await?;
    writer_task.await?;
    Ok(())
}

/// Runs one refresh, writes the result and returns.
pub async fn run_once(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let discovery = Discovery::new(config.uyuni)?;

    let refresh = discovery.refresh(&cancel);
    tokio::pin!(refresh);

    // On SIGINT the refresh is cancelled, not dropped, so its session is released.
    let groups = tokio::select! {
        result = &mut refresh => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, cancelling refresh");
            cancel.cancel();
            refresh.await?
        }
    };

    output::write(&config.output.path, &groups).await
}

async fn write_updates(mut updates: mpsc::Receiver<Vec<TargetGroup>>, path: impl AsRef<Path>) {
    while let Some(groups) = updates.recv().await {
        if let Err(e) = output::write(path.as_ref(), &groups).await {
            tracing::error!("failed to write targets: {e:#}");
        }
    }
}
