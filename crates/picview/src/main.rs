//! picview command line front end
//!
//! Opens images in a headless window, runs one command against them and
//! prints the resulting window state as JSON.
//!
//! Usage:
//!   picview ~/Pictures show
//!   picview --all a.jpg b.jpg rotate --save
//!   picview ~/Pictures slideshow --rounds 2

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use picview_core::config::{ConfigManager, ConfigSection};
use picview_core::images::{collect_pictures, ImageRef, Picture};
use picview_core::jobs::{FsJobRunner, SaveAsTarget, WorkerQueue};
use picview_core::logging::{init_tracing, LogLevel};
use picview_core::window::{
    CloseOutcome, CloseResponse, LogToolkit, PluginRegistry, StartupFlags, TrashMode,
    WindowController,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Images or folders to open
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, overriding the config file
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Select every image before running the command
    #[arg(short, long, default_value_t = false)]
    all: bool,

    /// Answer confirmations with yes
    #[arg(short, long, default_value_t = false)]
    yes: bool,

    /// Start in fullscreen
    #[arg(long, default_value_t = false)]
    fullscreen: bool,

    /// Start a slideshow
    #[arg(long, default_value_t = false)]
    slideshow: bool,

    /// Never show the gallery
    #[arg(long, default_value_t = false)]
    disable_gallery: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Load the selection and print the window state
    Show,
    /// Rotate the selected images by 90 degrees
    Rotate {
        #[arg(long, default_value_t = false)]
        counter_clockwise: bool,
        /// Save after rotating
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Mirror the selected images
    Flip {
        #[arg(long, default_value_t = false)]
        vertical: bool,
        /// Save after flipping
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Write the selected images to another file or folder
    SaveAs {
        dest: PathBuf,
        /// Output extension when `dest` is a folder
        #[arg(long)]
        ext: Option<String>,
    },
    /// Set the selected image as desktop wallpaper
    Wallpaper,
    /// Move the selected images to the trash
    Trash {
        /// Delete permanently instead
        #[arg(long, default_value_t = false)]
        delete: bool,
    },
    /// Display every image in turn
    Walk,
    /// Run a slideshow
    Slideshow {
        #[arg(long, default_value_t = 1)]
        rounds: usize,
    },
    /// Watch the opened files and reload them when they change
    Watch {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "picview")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from("picview.toml"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = ConfigManager::new(&config_path);
    config
        .load_or_create()
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    init_tracing(cli.log_level.unwrap_or(config.settings().logging.level));
    tracing::debug!("picview {} using {}", picview_core::version(), config_path.display());

    let pictures = collect_pictures(&cli.paths).context("collecting images")?;
    if pictures.is_empty() {
        bail!("no supported images found");
    }

    let queue = Arc::new(WorkerQueue::new(Arc::new(FsJobRunner)).context("starting job worker")?);
    let mut toolkit = LogToolkit::new().assume_yes(cli.yes);
    if let Cmd::SaveAs { dest, .. } = &cli.command {
        toolkit = toolkit.with_save_as_folder(dest.clone());
    }

    let startup = StartupFlags {
        disable_gallery: cli.disable_gallery,
        fullscreen: cli.fullscreen,
        slideshow: cli.slideshow,
    };
    let mut window = WindowController::with_startup(
        config.settings().clone(),
        startup,
        queue,
        Box::new(toolkit),
        PluginRegistry::new(),
    );
    window.open(pictures.iter().map(|p| Arc::clone(p) as ImageRef).collect());
    window.wait_idle().await;

    if cli.all {
        window.select_many((0..window.gallery().len()).collect())?;
        window.wait_idle().await;
    }

    run_command(&mut window, &cli.command, &pictures).await?;
    window.wait_idle().await;

    println!("{}", serde_json::to_string_pretty(&window.snapshot())?);

    if window.settings().paths != config.settings().paths {
        config.settings_mut().paths = window.settings().paths.clone();
        config
            .update_section(ConfigSection::Paths)
            .context("saving paths")?;
    }

    if let CloseOutcome::ConfirmUnsaved(images) = window.close().await {
        tracing::warn!("Discarding unsaved changes to {} image(s)", images.len());
        window.close_response(CloseResponse::Discard)?;
    }
    Ok(())
}

async fn run_command(
    window: &mut WindowController,
    command: &Cmd,
    pictures: &[Arc<Picture>],
) -> Result<()> {
    match command {
        Cmd::Show => {}
        Cmd::Rotate {
            counter_clockwise,
            save,
        } => {
            if *counter_clockwise {
                window.rotate_270()?;
            } else {
                window.rotate_90()?;
            }
            save_if(window, *save).await?;
        }
        Cmd::Flip { vertical, save } => {
            if *vertical {
                window.flip_vertical()?;
            } else {
                window.flip_horizontal()?;
            }
            save_if(window, *save).await?;
        }
        Cmd::SaveAs { dest, ext } => {
            let target = if dest.is_dir() || window.gallery().n_selected() > 1 {
                SaveAsTarget::Folder {
                    dir: dest.clone(),
                    extension: ext.clone(),
                }
            } else {
                SaveAsTarget::File(dest.clone())
            };
            window.save_as(target)?;
        }
        Cmd::Wallpaper => window.set_as_wallpaper()?,
        Cmd::Trash { delete } => {
            let mode = if *delete {
                TrashMode::Delete
            } else {
                TrashMode::Trash
            };
            let report = window.move_to_trash(mode)?;
            if report.declined {
                println!("Nothing removed; pass --yes to confirm");
            }
            for failure in &report.failures {
                eprintln!("{failure}");
            }
        }
        Cmd::Walk => {
            for position in 0..window.gallery().len() {
                window.select(position)?;
                window.wait_idle().await;
                let snapshot = window.snapshot();
                println!(
                    "{}  {}",
                    snapshot.image_position.unwrap_or_default(),
                    snapshot.status_text
                );
            }
        }
        Cmd::Slideshow { rounds } => {
            window.start_slideshow()?;
            let mut remaining = rounds * window.gallery().len();
            while remaining > 0 {
                let Some(interval) = window.slideshow_interval() else {
                    break;
                };
                tokio::time::sleep(interval).await;
                if !window.slideshow_tick() {
                    break;
                }
                window.wait_idle().await;
                remaining -= 1;
            }
            window.stop_fullscreen()?;
        }
        Cmd::Watch { seconds } => {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(*seconds);
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            while tokio::time::Instant::now() < deadline {
                ticker.tick().await;
                for picture in pictures {
                    picture.check_for_changes();
                }
                window.process_pending();
                window.wait_idle().await;
            }
        }
    }
    Ok(())
}

async fn save_if(window: &mut WindowController, save: bool) -> Result<()> {
    if !save {
        return Ok(());
    }
    // The transform must land before the save reads the pixels.
    window.wait_idle().await;
    window.save()?;
    Ok(())
}
