//! # lifeline-node
//!
//! Headless Lifeline node.
//!
//! This binary provides:
//! - **SOS transmission** over the rescue backend, falling back to the local
//!   peer group when the backend is unreachable
//! - **Receiver session** (`LIFELINE_HOST_GROUP=true`): hosts the peer group,
//!   stores inbound SOS messages and raises alerts
//! - **Emergency feed** aggregated from USGS, Met Norway and community
//!   reports, cached in SQLite and refreshed in the background
//! - **Local REST API** (axum) for a UI shell

mod api;
mod config;
mod device;
mod error;
mod receiver;

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lifeline_client::{HttpBackend, ReportSubmitter, SosCoordinator};
use lifeline_feed::sources::{CommunityReports, MetNorwayStorms, SosBoard, UsgsEarthquakes};
use lifeline_feed::{EmergencySource, FeedAggregator, Region};
use lifeline_net::{LanRole, LanTransport, PeerGroupManager};
use lifeline_shared::capabilities::{AllowAll, PersistentCache};
use lifeline_shared::config::Tunables;
use lifeline_store::{Database, SqliteCache};

use crate::api::AppState;
use crate::config::NodeConfig;
use crate::device::{AlertInbox, FixedLocation, HttpReachability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,lifeline_net=debug,lifeline_client=debug")
            }),
        )
        .init();

    info!("Starting Lifeline node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    let tunables = Tunables::from_env();
    info!(?config, "Loaded configuration");
    info!(
        host_group = config.host_group,
        has_location = config.device_location.is_some(),
        peer_port = tunables.peer_port,
        "Node role"
    );

    // Storage
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(database));
    let cache: Arc<dyn PersistentCache> = Arc::new(SqliteCache::new(db.clone()));
    let alerts = Arc::new(AlertInbox::new(config.alert_history));

    // Peer group
    let role = if config.host_group {
        LanRole::Host
    } else {
        LanRole::Client
    };
    let transport = Arc::new(LanTransport::new(
        role,
        config.peers_path.clone(),
        tunables.peer_port,
        tunables.peer_connect_timeout,
    ));
    let peers = PeerGroupManager::new(
        transport,
        Arc::new(AllowAll),
        alerts.clone(),
        tunables.clone(),
    );

    // SOS path
    let backend = Arc::new(HttpBackend::new(&config.backend_url, config.http_timeout)?);
    let reachability = Arc::new(HttpReachability::new(
        config.backend_url.clone(),
        tunables.source_timeout,
    )?);
    let coordinator = SosCoordinator::new(
        reachability,
        Arc::new(FixedLocation::new(config.device_location)),
        backend.clone(),
        peers.clone(),
        alerts.clone(),
        tunables.clone(),
    );

    // Feed
    let region = region_for(&config.region);
    let client = lifeline_feed::http::build_client(tunables.source_timeout)?;
    let sources: Vec<Arc<dyn EmergencySource>> = vec![
        Arc::new(UsgsEarthquakes::new(client.clone(), region.clone())),
        Arc::new(MetNorwayStorms::new(client.clone(), region.cities.clone())),
        Arc::new(CommunityReports::new(
            client.clone(),
            &config.backend_url,
            region.name.clone(),
        )),
    ];
    let feed = Arc::new(FeedAggregator::new(sources, cache.clone(), tunables.clone()));
    let sos_board: Arc<dyn EmergencySource> = Arc::new(SosBoard::new(client, &config.backend_url));
    let reports = Arc::new(ReportSubmitter::new(backend, cache));

    // Receiver session
    let receiver = if config.host_group {
        if let Err(e) = peers.ensure_group().await {
            warn!(error = %e, "Peer group not up yet");
        }
        peers
            .start_inbound()
            .map(|events| receiver::spawn_receiver(events, db.clone(), alerts.clone()))
    } else {
        None
    };

    // Periodic feed refresh
    let refresher = feed.clone();
    let refresh_every = config.feed_refresh_interval;
    let feed_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_every);
        loop {
            interval.tick().await;
            let result = refresher.refresh().await;
            if result.success {
                info!(count = result.count, "Background feed refresh done");
            } else {
                warn!(error = ?result.error, "Background feed refresh returned no data");
            }
        }
    });

    let app_state = AppState {
        coordinator,
        feed,
        sos_board,
        reports,
        alerts,
        db,
        auto_send: Arc::new(Mutex::new(None)),
        tunables,
    };

    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                peers.teardown().await;
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    feed_task.abort();
    if let Some(handle) = receiver {
        handle.abort();
    }
    peers.teardown().await;

    Ok(())
}

fn region_for(name: &str) -> Region {
    match name {
        "myanmar" | "burma" => Region::myanmar(),
        other => {
            warn!(region = %other, "Unknown region, using Myanmar");
            Region::myanmar()
        }
    }
}
