use std::sync::Arc;

use log::{error, info};

use obs_scheduler::{
    config::Settings,
    control::LogOnlySurface,
    http::{AppState, build_router},
    persist::sqlite::SqliteOpSink,
    runtime::handle::spawn_scheduler,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    let sink = SqliteOpSink::open(&settings.database_path)?;
    let store = sink.load_store()?;
    let handle = spawn_scheduler(store, Some(Box::new(sink)), settings.runtime_config());

    info!(
        "control surface {}:{} not driven; commands are logged only",
        settings.control.host, settings.control.port
    );
    let state = AppState::new(
        handle.clone(),
        Arc::new(LogOnlySurface::new()),
        settings.database_path.display().to_string(),
    );

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    info!("listening on {}", settings.bind_addr);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    handle.shutdown().await?;
    Ok(())
}
