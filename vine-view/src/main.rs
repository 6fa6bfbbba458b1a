//! Application entry point for the vine growth viewer.
//!
//! This binary sets up logging and eframe/egui, and delegates all
//! interactive logic and rendering to [`Viewer`] from the `viewer` module.

mod viewer;

use viewer::Viewer;

/// Starts the native eframe application.
///
/// Log output is controlled through `RUST_LOG` (for example
/// `RUST_LOG=vine_core=debug`).
///
/// ### Returns
/// - `Ok(())` if the application runs to completion without errors.
/// - `Err` if eframe fails to create the native window or event loop.
fn main() -> eframe::Result<()> {
    env_logger::init();
    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "Vine Growth",
        options,
        Box::new(|_cc| Ok(Box::new(Viewer::new()?))),
    )
}
