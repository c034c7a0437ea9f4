//! Device Model Daemon
//!
//! Serves one or more simulated peripherals, each on its own Unix socket,
//! with a background activity simulator per device. Runs until Ctrl-C.

mod settings;

use anyhow::Context;
use regmodel_server::ModelServer;
use regmodel_sim::{run_activity_task, ActivityCommand};
use settings::Settings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A started server and its activity simulator
struct RunningDevice {
    server: ModelServer,
    activity_tx: mpsc::Sender<ActivityCommand>,
    activity: JoinHandle<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "regmodel=info,regmodel_protocol=info,regmodel_sim=info,regmodel_server=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting device model daemon");

    let settings = Settings::load();
    let mut running = Vec::with_capacity(settings.devices.len());

    for device_settings in &settings.devices {
        let device = device_settings.model.build();
        let mut server = ModelServer::new(device_settings.server.clone(), device.clone());
        server.start().await.with_context(|| {
            format!(
                "failed to start model server on {}",
                device_settings.server.socket_path.display()
            )
        })?;

        let (activity_tx, activity_rx) = mpsc::channel(8);
        let activity = tokio::spawn(run_activity_task(
            device,
            device_settings.activity.clone(),
            server.interrupt_sender(),
            activity_rx,
        ));

        running.push(RunningDevice {
            server,
            activity_tx,
            activity,
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    for mut device in running {
        let _ = device.activity_tx.send(ActivityCommand::Shutdown).await;
        if let Err(e) = device.activity.await {
            tracing::warn!("Activity task failed: {}", e);
        }
        device.server.stop().await;
    }

    Ok(())
}
