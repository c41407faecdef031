// pinlay - Pin an image as a click-through overlay on Wayland
// Shows the image unscaled, centered and above normal windows until Escape is pressed

mod app;
mod cli;
mod error;
mod image_loader;
mod key_monitor;
mod overlay;
mod wayland;
mod wgpu_renderer;

use error::OverlayError;
use log::info;
use overlay::OverlayConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), OverlayError> {
    let image_path = cli::parse_args()?;
    info!("Starting pinlay with image: {:?}", image_path);

    let image_data = image_loader::load_image(&image_path)?;
    info!(
        "Image loaded: {}x{} pixels",
        image_data.width, image_data.height
    );

    wayland::run(image_data, OverlayConfig::default())?;
    Ok(())
}
