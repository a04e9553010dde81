//! ALFA Photo Capture - CLI
//!
//! Drives capture sessions against the virtual camera.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Context;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;

use alfa_photo_capture::media::{VirtualCamera, VirtualSink};
use alfa_photo_capture::{
    CaptureConfig, CaptureSession, FacingMode, Photo, SessionOptions, SharedRoute,
    StreamConstraints, TeardownCoordinator,
};

#[derive(Parser)]
#[command(name = "alfa-capture")]
#[command(author = "Karen Tonoyan")]
#[command(version = alfa_photo_capture::VERSION)]
#[command(about = "ALFA Photo Capture - Camera capture sessions for property photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full capture session against the virtual camera
    Demo {
        /// Camera to open first (front/rear)
        #[arg(short, long)]
        facing: Option<FacingMode>,

        /// Number of shots to take
        #[arg(short, long, default_value_t = 3)]
        shots: u32,

        /// Reject every K-th shot (0 keeps all)
        #[arg(long, default_value_t = 0)]
        reject_every: u32,

        /// Switch camera after shot M
        #[arg(long)]
        switch_after: Option<u32>,

        /// Write delivered photos here
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the media request sent for a camera
    Constraints {
        /// Camera (front/rear)
        #[arg(short, long, default_value = "front")]
        facing: FacingMode,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CaptureConfig> {
    match path {
        Some(path) => CaptureConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(CaptureConfig::default()),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Demo {
            facing,
            shots,
            reject_every,
            switch_after,
            out,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            println!("🎮 ALFA Photo Capture - Demo Mode");
            println!("{:-<40}", "");

            let delivered = demo(config, facing, shots, reject_every, switch_after).await?;

            if let Some(dir) = out {
                for path in export_photos(&dir, &delivered)? {
                    println!("💾 {}", path.display());
                }
            }
        }

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Constraints { facing } => {
            let constraints = StreamConstraints::new(facing, &CaptureConfig::default());
            println!("{}", serde_json::to_string_pretty(&constraints.to_json())?);
        }
    }

    Ok(())
}

async fn demo(
    config: CaptureConfig,
    facing: Option<FacingMode>,
    shots: u32,
    reject_every: u32,
    switch_after: Option<u32>,
) -> anyhow::Result<Vec<Photo>> {
    let camera = Arc::new(VirtualCamera::new().with_resolution(config.ideal_width, config.ideal_height));
    let sink = Arc::new(VirtualSink::new().mounted_after(2));
    let route = SharedRoute::new(config.capture_route.clone());

    let delivered: Arc<Mutex<Vec<Photo>>> = Arc::new(Mutex::new(Vec::new()));
    let slot = delivered.clone();
    let options = SessionOptions {
        facing,
        initial_photos: Vec::new(),
        on_complete: Some(Box::new(move |photos: Vec<Photo>| *slot.lock() = photos)),
    };

    let session = Arc::new(CaptureSession::new(config, camera.clone(), sink, options));
    let coordinator = TeardownCoordinator::new(session.clone());
    coordinator.watch_route(Arc::new(route));

    println!("📷 Opening {} camera...", session.facing());
    session.mount().await?;
    println!("✅ Camera live");

    for shot in 1..=shots {
        let preview = session.capture().await?;
        if reject_every > 0 && shot % reject_every == 0 {
            session.reject()?;
            println!("🗑️ Shot {} rejected ({})", shot, preview);
        } else {
            let id = session.accept()?;
            println!("✅ Shot {} accepted as photo #{}", shot, id);
        }

        if switch_after == Some(shot) {
            session.switch_facing().await?;
            println!("🔄 Switched to {} camera", session.facing());
        }
    }

    let snapshot = session.snapshot();
    println!("🖼️ Gallery ({}):", snapshot.photos.len());
    for photo in &snapshot.photos {
        println!(
            "   #{} {} - {}x{} ({} bytes)",
            photo.sequence_id, photo.file_name, photo.width, photo.height, photo.size
        );
    }

    let count = coordinator.finish();
    let stats = session.stats();

    println!("📊 Session Statistics");
    println!("{:-<40}", "");
    println!("Photos delivered:  {}", count);
    println!("Streams acquired:  {}", stats.streams_acquired);
    println!("Streams stopped:   {}", stats.streams_stopped);
    println!("Tracks stopped:    {}", stats.tracks_stopped);
    println!("Capture attempts:  {}", stats.capture_attempts);
    println!("Releases:          {}", stats.releases_performed);
    println!("Live tracks left:  {}", camera.ledger().live_tracks());

    let photos = std::mem::take(&mut *delivered.lock());
    Ok(photos)
}

/// Write `photos` into `dir`, never overwriting an existing file
fn export_photos(dir: &Path, photos: &[Photo]) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::with_capacity(photos.len());
    for photo in photos {
        let path = export_path(dir, photo);
        std::fs::write(&path, photo.bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// First free name of `<stem>.jpg`, `<stem>-<seq>.jpg`, `<stem>-<seq>-<n>.jpg`
fn export_path(dir: &Path, photo: &Photo) -> PathBuf {
    let path = dir.join(photo.file_name());
    if !path.exists() {
        return path;
    }

    let file_name = photo.file_name();
    let stem = file_name.trim_end_matches(".jpg");
    let mut candidate = dir.join(format!("{}-{}.jpg", stem, photo.sequence_id()));
    let mut n = 2;
    while candidate.exists() {
        candidate = dir.join(format!("{}-{}-{}.jpg", stem, photo.sequence_id(), n));
        n += 1;
    }
    candidate
}
