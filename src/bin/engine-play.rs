use anyhow::Context;
use engine_play::{
    config::AppConfig,
    server,
    store::{self, FileStore},
    AnalysisChannel, Controller, ProcessWorker, SnapshotView,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(engine = %config.engine_path, save_dir = %config.save_dir.display(), "starting");

    let store = FileStore::open(&config.save_dir)
        .with_context(|| format!("cannot use save directory {}", config.save_dir.display()))?;
    let game = store::open_game(&store).context("saved game could not be read")?;
    let settings = match store::load_settings(&store) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "saved settings ignored");
            Default::default()
        }
    };

    let link = ProcessWorker::spawn(&config.engine_path)
        .await
        .context("engine failed to start")?;
    let channel = AnalysisChannel::spawn(link);

    let (view, snapshot) = SnapshotView::new();
    let (controller, events) = Controller::new(game, view, channel, config.timing);
    let mut controller = controller
        .with_settings(settings)
        .with_settings_store(store);

    tokio::spawn(async move {
        controller.run_with_retry().await;
        tracing::info!("game controller stopped");
    });

    let app = server::router(events, snapshot);
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
