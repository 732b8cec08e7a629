use tokio::sync::mpsc;

use vaani_client::app_composite::AppComposite;
use vaani_client::backend::push;
use vaani_client::logger::with_logger;
use vaani_client::{config, console};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize rustls crypto provider, for the websocket and HTTPS connections
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("A rustls crypto provider is already installed"))?;

    let config = config::from_env()?;

    let AppComposite {
        assistant,
        notices,
        logger,
    } = AppComposite::new(&config)?;
    with_logger(&logger, |l| l.debug(&format!("Using backend at {}", config.backend_url)));

    let pushes = push::spawn_listener(
        config.push_url.clone(),
        config.poll_interval,
        logger.clone(),
    );

    let (inputs, inputs_rx) = mpsc::channel(16);
    tokio::spawn(console::render_states(assistant.subscribe()));
    tokio::spawn(console::render_status(assistant.status()));
    tokio::spawn(console::render_notices(notices, logger.clone()));
    let reader = tokio::spawn(console::read_commands(inputs, assistant.status(), logger.clone()));

    assistant.run(inputs_rx, pushes).await;

    reader.await??;
    Ok(())
}
