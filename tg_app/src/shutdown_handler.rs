use tokio::sync::watch;

/// Installs a Ctrl+C handler and returns a receiver that flips to `true` on shutdown
pub fn setup() -> Result<watch::Receiver<bool>, ctrlc::Error> {
    let (tx, rx) = watch::channel(false);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        let _ = tx.send(true);
    })?;

    Ok(rx)
}

/// Resolves once the shutdown flag is raised or its sender is gone
pub async fn wait(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|&stop| stop).await;
}
