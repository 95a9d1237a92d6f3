use std::sync::{Arc, Mutex};
use tracing::info;

mod ai;
mod api;
mod bus;
mod chat;
mod connect;
mod echo;
mod events;
mod mentor;
mod session;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("CampusFlow daemon starting...");

    // Initialize the Store at ~/.campusflow/campusflow.db
    let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    let db_path = std::path::Path::new(&home_dir)
        .join(".campusflow")
        .join("campusflow.db");

    info!("Initializing store at {}", db_path.display());
    let store = store::Store::new(&db_path).await?;
    store.init().await?;

    let bus = Arc::new(bus::EventBus::new());

    let session = Arc::new(session::SessionStore::load(store.clone()).await?);
    if session.is_logged_in() {
        info!("Resuming persisted session");
    }

    let directory = Arc::new(connect::Directory::load(store).await?);

    let gemini = Arc::new(ai::GeminiClient::from_env());
    let mentor = Arc::new(mentor::MentorController::new(gemini));

    let geocoder: Arc<dyn connect::geocode::PlaceSource> =
        Arc::new(connect::geocode::NominatimClient::from_env());
    let autocomplete = connect::geocode::LocationAutocomplete::new(geocoder);

    let state = Arc::new(api::AppState {
        session,
        mentor,
        directory,
        autocomplete,
        feed: Arc::new(echo::EchoFeed::new()),
        events: events::seed_events(),
        registration: Mutex::new(None),
        bus,
    });

    let app = api::router(state);

    let port: u16 = std::env::var("CAMPUSFLOW_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    info!("Starting API server on port {}", port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                info!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
