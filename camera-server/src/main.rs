//! Observatory camera server binary.
//!
//! Wires the simulated camera, the filter wheel client, and the HTTP layer
//! together. Deployments with the vendor SDK swap the driver at this one
//! construction site.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use camera_server::controller::{AcquisitionController, ControllerConfig};
use camera_server::routes::{router, AppState};
use camera_server::sequencer::FileSequencer;
use hardware::camera::{CameraSession, SimulatedCamera};
use hardware::filter_wheel::FilterWheelClient;

#[derive(Parser, Debug)]
#[command(about = "HTTP acquisition server for the observatory camera")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Directory images are written under, bucketed by UTC date
    #[arg(long, default_value = "images")]
    data_dir: String,

    /// File name prefix for sequenced images
    #[arg(long, default_value = "img")]
    prefix: String,

    /// Filter wheel daemon address
    #[arg(long, default_value = "127.0.0.1:5503")]
    wheel_addr: String,

    /// Sensor cooling target in Celsius; omit to leave the cooler off
    #[arg(long)]
    target_temp: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let wheel = FilterWheelClient::new(args.wheel_addr.clone());
    let session = CameraSession::new(SimulatedCamera::new());
    let sequencer = FileSequencer::new(&args.data_dir, args.prefix.clone());
    let controller = Arc::new(AcquisitionController::new(
        session,
        sequencer,
        Some(wheel.clone()),
        ControllerConfig::default(),
    ));

    {
        let controller = controller.clone();
        let target = args.target_temp;
        tokio::task::spawn_blocking(move || controller.startup(target))
            .await?
            .context("camera startup failed")?;
    }

    let state = AppState {
        controller: controller.clone(),
        wheel,
    };
    let app = router(state, args.data_dir.as_ref());

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("could not bind {}", args.listen))?;
    info!(listen = %args.listen, data_dir = %args.data_dir, "camera server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    tokio::task::spawn_blocking(move || controller.shutdown())
        .await?
        .context("camera shutdown failed")?;
    Ok(())
}
