//! Modvote - group voting on game mods
//!
//! Headless client. Runs a scripted room against the in-process backend:
//! a host opens a room, guests join and propose mods, everyone swipes, and
//! the exported results are printed.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use modvote_core::{Decision, ItemDraft, Participant, RoomStatus, Settings};
use modvote_sync::{MemoryBackend, RoomService};
use rand::Rng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod session;

use session::RoomSession;

#[derive(Debug, Parser)]
#[command(name = "modvote")]
#[command(about = "Modvote - group voting on game mods", long_about = None)]
struct Cli {
    /// Print the results as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Settings file to load instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging; RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!("Starting Modvote");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(settings, cli.json)) {
        tracing::error!(error = %e, "Session failed");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(settings: Settings, json: bool) -> modvote_core::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let service = RoomService::with_settings(backend, &settings);

    let mut host = RoomSession::host(service.clone(), participant("Host")).await?;
    tracing::info!(room_code = %host.room_code(), "Room ready");

    let mut guests = Vec::new();
    for nickname in ["Mira", "Tobias", "Quinn"] {
        guests.push(RoomSession::join(service.clone(), participant(nickname), host.room_code()).await?);
    }

    let proposals = [
        ("Better Lighting", "Volumetric fog and softer shadows", Some("https://mods.example/lighting")),
        ("Minimap", "Corner minimap with waypoints", None),
        ("Hardcore Mode", "One life, no saves", None),
    ];
    for (guest, (name, description, url)) in guests.iter().zip(proposals) {
        let mut draft = ItemDraft::new(name, description);
        if let Some(url) = url {
            draft = draft.with_url(url);
        }
        guest.propose(draft).await?;
    }

    host.advance(RoomStatus::Voting).await?;
    for guest in &guests {
        guest.refresh_room().await?;
    }
    settle().await;

    let mut rng = rand::thread_rng();
    for session in std::iter::once(&host).chain(guests.iter()) {
        while let Some(item) = session.next_item() {
            let decision = if rng.gen_bool(0.6) {
                Decision::Like
            } else {
                Decision::Dislike
            };
            session.swipe(&item.id, decision, None).await?;
        }
    }

    host.advance(RoomStatus::Results).await?;
    settle().await;

    let export = host.export();
    if json {
        println!("{}", export.to_json()?);
    } else {
        print!("{}", export);
    }

    for guest in &mut guests {
        guest.dispose().await;
    }
    host.dispose().await;
    Ok(())
}

fn participant(nickname: &str) -> Participant {
    Participant::new(Uuid::new_v4().to_string(), nickname.to_string())
}

/// Give pushed snapshots a moment to reach every session
async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
