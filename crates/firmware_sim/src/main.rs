mod api;
mod config;
mod firmware;
mod pneumatics;
mod regulator;
mod setpoints;

use std::{net::SocketAddr, time::Instant};

use anyhow::Context;
use tracing::info;

use crate::{
    api::{build_router, AppState},
    config::load_settings,
    firmware::Firmware,
    pneumatics::Pneumatics,
    regulator::RegulatorTuning,
    setpoints::SetpointStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let settings = load_settings();

    let store = SetpointStore::open(&settings.setpoints_path).await;
    info!(path = %store.path().display(), setpoints = ?store.get().await, "setpoints loaded");

    let firmware = Firmware::new(
        Pneumatics::new(
            settings.initial_psi,
            settings.fill_rate_psi_per_sec,
            settings.vent_rate_psi_per_sec,
            Instant::now(),
        ),
        store,
        RegulatorTuning::default(),
    );
    let app = build_router(AppState { firmware });

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "firmware simulator listening");
    axum::serve(listener, app).await?;
    Ok(())
}
