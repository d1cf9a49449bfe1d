#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod ui;

use anyhow::Result;
use gpui::Application;
use sports_coach::config::Config;

fn main() -> Result<()> {
    env_logger::init();

    let config = Config::load_or_default();
    log_cameras();

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn log_cameras() {
    match sports_coach::pipeline::available_cameras() {
        Ok(cameras) if cameras.is_empty() => log::warn!("no cameras detected"),
        Ok(cameras) => {
            for camera in cameras {
                log::info!("camera {:?}: {}", camera.index, camera.label);
            }
        }
        Err(err) => log::warn!("failed to enumerate cameras: {err:?}"),
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
fn log_cameras() {}
