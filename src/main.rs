//! Warden CLI - runs the bot against the attached Android device
//!
//! Keys while running: `p` pause, `u` toggle upgrades, `1`-`3` troop,
//! `s` gold won so far, `d` verbose logging, `q` quit.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use warden::android::AdbDevice;
use warden::config::{BotConfig, Settings};
use warden::game::Controller;
use warden::operator::spawn_console;
use warden::vision::{FrameSource, TemplateLibrary, TesseractOcr, VisualMatcher};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Screen-driven battle and upgrade automation over adb")]
struct Cli {
    /// Settings file (JSON). Takes precedence over --preset
    #[arg(long)]
    config: Option<PathBuf>,
    /// Settings preset: classic or light
    #[arg(long, default_value = "classic")]
    preset: String,
    /// Directory holding the template images
    #[arg(long, default_value = "assets")]
    assets: PathBuf,
    /// Serial of the device to drive when several are attached
    #[arg(long)]
    serial: Option<String>,
    /// Troop to create during battle (1-3)
    #[arg(long)]
    troop: Option<u8>,
    /// Start with production upgrades disabled
    #[arg(long)]
    no_upgrade: bool,
    /// Start with verbose logging
    #[arg(long)]
    debug: bool,
    /// Do not read keys from the terminal
    #[arg(long)]
    no_console: bool,
    /// adb executable
    #[arg(long, default_value = "adb")]
    adb: PathBuf,
    /// tesseract executable
    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,
}

/// Returns true when `RUST_LOG` fixes the level for the whole run
fn init_logging(debug: bool) -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        // The console runs the terminal in raw mode
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}\r",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    // Verbose logging is toggled at runtime through the max level
    if std::env::var_os("RUST_LOG").is_some() {
        return true;
    }
    log::set_max_level(if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    false
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    if let Some(path) = &cli.config {
        return Settings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }

    match Settings::preset(&cli.preset) {
        Some(settings) => Ok(settings),
        None => bail!("Unknown preset '{}'. Available: classic, light", cli.preset),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_pinned = init_logging(cli.debug);

    let settings = load_settings(&cli)?;
    let config = Arc::new(BotConfig::new(
        cli.troop.unwrap_or(settings.unit_to_create),
        settings.upgrade_production && !cli.no_upgrade,
    ));
    config.set_debug(cli.debug);
    config.set_log_pinned(log_pinned);

    let device = Arc::new(
        AdbDevice::connect(cli.adb.clone(), cli.serial.as_deref())
            .context("Failed to connect to device")?,
    );
    log::info!("Connected to {}", device.serial());

    let library = TemplateLibrary::load(
        &cli.assets,
        &settings.layout.templates.names(),
        settings.matching.threshold,
    )
    .context("Failed to load templates")?;
    log::info!("Loaded {} templates", library.len());

    let ocr = TesseractOcr::new(cli.tesseract.clone());
    if !ocr.is_available() {
        log::warn!(
            "{} is not runnable; every gold reading will be 0",
            cli.tesseract.display()
        );
    }

    let timings = &settings.timings;
    let frames = FrameSource::new(
        device.clone(),
        settings.stuck.history_capacity,
        Duration::from_millis(timings.frame_max_age_ms),
    );
    let capture = frames.spawn_capture_loop(
        Duration::from_millis(timings.capture_period_ms),
        Arc::clone(&config),
    );

    let mut controller = Controller::new(
        settings,
        Arc::clone(&config),
        device,
        frames,
        VisualMatcher::new(library),
        Arc::new(ocr),
    );

    let console = if cli.no_console {
        None
    } else {
        match spawn_console(Arc::clone(&config), controller.status()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Console unavailable, keys are disabled: {}", e);
                None
            }
        }
    };

    controller.run();
    config.stop();

    if capture.join().is_err() {
        log::error!("Capture thread panicked");
    }
    if let Some(console) = console {
        if console.join().is_err() {
            log::error!("Console thread panicked");
        }
    }

    Ok(())
}
