//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use cachegate_core::{Clock, SystemClock};
use cachegate_storage::{Federation, MemoryStore, ObjectStore};

use crate::auth::{AcceptanceCache, TokenGate, TokenOrigin};
use crate::config::GatewayConfig;
use crate::services::{CacheIndex, CredentialBroker, UploadCoordinator};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub gate: TokenGate,
    pub index: CacheIndex,
    pub coordinator: UploadCoordinator,
    pub broker: CredentialBroker,
    pub config: Arc<GatewayConfig>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services over the given backends, with in-memory session and
    /// acceptance tables.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn ObjectStore>,
        federation: Arc<dyn Federation>,
        origin: Arc<dyn TokenOrigin>,
    ) -> Self {
        Self::with_clock(config, store, federation, origin, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: GatewayConfig,
        store: Arc<dyn ObjectStore>,
        federation: Arc<dyn Federation>,
        origin: Arc<dyn TokenOrigin>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let acceptance = AcceptanceCache::new(
            Arc::new(MemoryStore::new()),
            clock,
            config.acceptance_ttl,
        );

        Self {
            gate: TokenGate::new(origin, acceptance),
            index: CacheIndex::new(store.clone(), config.presign_ttl),
            coordinator: UploadCoordinator::new(
                store,
                Arc::new(MemoryStore::new()),
                config.part_wait_timeout,
            ),
            broker: CredentialBroker::new(
                federation,
                config.bucket.clone(),
                config.role_arn.clone(),
                config.credential_duration_secs,
            ),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(TokenGate, gate);
crate::impl_from_ref!(CacheIndex, index);
crate::impl_from_ref!(UploadCoordinator, coordinator);
crate::impl_from_ref!(CredentialBroker, broker);
crate::impl_from_ref!(Arc<GatewayConfig>, config);
crate::impl_from_ref!(Instant, start_time);
