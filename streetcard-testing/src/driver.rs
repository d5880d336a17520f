use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use log::{info, warn};
use streetcard_logic::{
    Card, CardApi, CardController, CardSettings, CardUiState, LocationSource, Position, Session,
    load_cached_card, persist_card,
};
use streetcard_test_shared::{FileStore, LogUpdateSender, TrackPlatform, load_track, prelude::*};
use streetcard_transport::{HttpCardApi, SERVER_HTTP_URL};

#[derive(Parser)]
struct Cli {
    /// Base URL of the card server
    #[arg(long, global = true, default_value = SERVER_HTTP_URL)]
    base_url: String,

    /// Directory the last card is cached in
    #[arg(long, global = true, default_value = ".streetcard")]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the card server is up
    Health,
    /// Fetch the card for a single location and cache it
    Fetch {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Horizontal accuracy in meters, raised to the minimum the server accepts
        #[arg(long, default_value_t = 10.0)]
        acc: f64,
    },
    /// Walk a recorded track through the full app pipeline
    Replay {
        /// JSON array of `{lat, lon, accuracy?, after_ms?}` points
        track: PathBuf,
        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// Show the cached card
    Cache,
}

fn print_card(card: &Card) -> Result {
    println!("{}", card.title());
    if let Some(subtitle) = card.subtitle() {
        println!("{subtitle}");
    }
    if let Some(fact) = &card.did_you_know {
        println!("Did you know? {fact}");
    }
    for item in &card.nearby {
        println!("  {}", item.display_line());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(card).context("Failed to serialize card")?
    );
    Ok(())
}

fn print_state(state: &CardUiState) -> Result {
    println!("Phase: {:?}", state.phase);
    if let Some(why) = &state.error {
        println!("Error: {why}");
    }
    match &state.card {
        Some(card) => print_card(card),
        None => {
            println!("No card");
            Ok(())
        }
    }
}

async fn health(api: &HttpCardApi) -> Result {
    if api.health().await? {
        println!("{} is up", api.base_url());
        Ok(())
    } else {
        bail!("{} is not healthy", api.base_url())
    }
}

async fn fetch(api: &HttpCardApi, store: &FileStore, position: Position) -> Result {
    let settings = CardSettings::default();
    let card = api
        .fetch_card(
            position.lat,
            position.lon,
            position.request_accuracy(settings.min_accuracy_m),
        )
        .await?;
    persist_card(store, &card);
    print_card(&card)
}

async fn replay(api: HttpCardApi, store: FileStore, track: PathBuf, speed: f64) -> Result {
    let settings = CardSettings::default();
    let platform = TrackPlatform::new(load_track(&track)?, speed)?;

    let source = LocationSource::new(platform, &settings, LogUpdateSender("Location"));
    let controller = CardController::new(&settings, api, store, LogUpdateSender("Card"));
    let session = Arc::new(Session::new(Arc::new(source), Arc::new(controller)));

    let quitter = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping replay");
            quitter.quit();
        }
    });

    session.source().request_permission_and_start().await;
    session.main_loop().await;

    info!(
        "Replay finished, last significant location {:?}",
        session.source().last_significant().await
    );
    print_state(&session.controller().ui_state().await)
}

#[tokio::main]
async fn main() -> Result {
    colog::init();
    let cli = Cli::parse();

    let store = FileStore::new(&cli.cache_dir);

    match cli.command {
        Commands::Cache => match load_cached_card(&store) {
            Some(card) => print_card(&card),
            None => {
                println!("Nothing cached in {}", store.dir().display());
                Ok(())
            }
        },
        Commands::Health => health(&HttpCardApi::new(cli.base_url)?).await,
        Commands::Fetch { lat, lon, acc } => {
            fetch(
                &HttpCardApi::new(cli.base_url)?,
                &store,
                Position::new(lat, lon, acc),
            )
            .await
        }
        Commands::Replay { track, speed } => {
            replay(HttpCardApi::new(cli.base_url)?, store, track, speed).await
        }
    }
}
