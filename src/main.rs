use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use disk_explorer::{
    config::{Args, Policy},
    disk::NativeProbe,
    registry::{ShareRegistry, ShareStore},
    router, AppState,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // No registry, no service.
    let store = match ShareStore::open(&args.database) {
        Ok(store) => store,
        Err(e) => {
            error!(
                "Failed to open database '{}': {}. Exiting.",
                args.database.display(),
                e
            );
            eprintln!(
                "Error: Failed to open database '{}': {}",
                args.database.display(),
                e
            );
            std::process::exit(1);
        }
    };
    let registry = ShareRegistry::load(store);

    let policy = Policy::from(&args);
    if policy.allow_downloads_without_shares {
        info!("Downloads are open to the whole host while no folder is shared");
    }
    if policy.open_directory_browsing {
        info!("/directory may browse the whole host");
    }

    let state = Arc::new(AppState {
        registry,
        probe: Box::new(NativeProbe),
        policy,
        static_dir: args.static_dir.clone(),
    });
    let app = router(state);

    info!("Serving static assets from: {}", args.static_dir.display());
    info!("Listening on: {}", args.bind_addr);

    let listener = match tokio::net::TcpListener::bind(args.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {}: {}", args.bind_addr, e);
            eprintln!("Error: Failed to bind to address {}: {}", args.bind_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
