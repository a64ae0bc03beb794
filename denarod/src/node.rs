//! The node context: every component, created once and wired together.
//!
//! There are no ambient singletons; the chain lock lives in the engine, the
//! per-peer locks in the registry, and everything reaches its dependencies
//! through this struct.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use denaro_consensus::ChainEngine;
use denaro_network::protocol::{RootInfo, StatusResponse};
use denaro_network::{NetworkError, NodeIdentity, PeerRegistry, RateLimiter, Synchroniser};
use denaro_state::{LedgerState, StateError, MEMPOOL_EXPIRY_SECS};

use crate::config::{Bootstrap, Config, ConfigError};

/// How often expired pending transactions are swept.
const MEMPOOL_GC_INTERVAL: Duration = Duration::from_secs(600);

/// How often the health ticker reports.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// The upstream repository advertised on the service banner.
const GITHUB_REPOSITORY: &str = "https://github.com/denaro-coin/denaro";

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage failed to open: {0}")]
    Storage(#[from] StateError),

    #[error("node identity failed to load: {0}")]
    Identity(NetworkError),
}

impl NodeError {
    /// The process exit code this failure maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            NodeError::Config(_) => 1,
            NodeError::Storage(_) => 2,
            NodeError::Identity(_) => 3,
        }
    }
}

pub struct Node {
    pub config: Config,
    pub identity: Arc<NodeIdentity>,
    pub engine: Arc<ChainEngine>,
    pub registry: Arc<PeerRegistry>,
    pub sync: Arc<Synchroniser>,
    pub rate_limiter: Arc<RateLimiter>,
    started: Instant,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("network", &self.config.network)
            .finish()
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Startup failures below the network layer are storage trouble (exit 2),
/// not identity trouble (exit 3).
fn storage_error(error: NetworkError) -> NodeError {
    match error {
        NetworkError::State(error) => NodeError::Storage(error),
        other => NodeError::Identity(other),
    }
}

impl Node {
    /// Open storage, load or create the node identity, and assemble every
    /// component. `data_dir` overrides the default cache location;
    /// `ephemeral` runs fully throwaway (tests, local experiments).
    pub fn init(
        config: Config,
        data_dir: Option<PathBuf>,
        ephemeral: bool,
    ) -> Result<Node, NodeError> {
        let mut state_config = denaro_state::Config {
            database_name: config.database_name.clone(),
            ephemeral,
            ..denaro_state::Config::default()
        };
        if let Some(dir) = &data_dir {
            state_config.cache_dir = dir.clone();
        }

        let ledger = LedgerState::new(&state_config, config.network)?;
        let peer_store = ledger.peer_store();

        let identity = if ephemeral {
            Arc::new(NodeIdentity::ephemeral())
        } else {
            let key_path = state_config
                .cache_dir
                .join(&config.database_name)
                .join("node_key");
            Arc::new(NodeIdentity::load_or_generate(&key_path).map_err(NodeError::Identity)?)
        };

        let engine = Arc::new(ChainEngine::new(ledger, config.network));
        let registry =
            Arc::new(PeerRegistry::load(peer_store, unix_now()).map_err(storage_error)?);
        let sync = Arc::new(
            Synchroniser::new(engine.clone(), registry.clone(), identity.clone())
                .map_err(storage_error)?,
        );
        let (shutdown, _) = watch::channel(false);

        info!(node_id = %identity.node_id(), network = %config.network, "node initialized");
        Ok(Node {
            config,
            identity,
            engine,
            registry,
            sync,
            rate_limiter: Arc::new(RateLimiter::new()),
            started: Instant::now(),
            shutdown,
        })
    }

    /// The `GET /` service banner.
    pub fn root_info(&self) -> RootInfo {
        RootInfo {
            node_version: denaro_network::constants::NODE_VERSION.to_string(),
            github_repository: GITHUB_REPOSITORY.to_string(),
            api_docs: self
                .config
                .advertised_url()
                .map(|url| format!("{}/docs", url.trim_end_matches('/'))),
        }
    }

    /// The `get_status` document for this node.
    pub async fn status(&self) -> StatusResponse {
        let tip = self.engine.tip().await.ok().flatten();
        StatusResponse {
            node_id: self.identity.node_id().to_hex(),
            pubkey: self.identity.pubkey_hex(),
            url: self.config.advertised_url(),
            is_public: self.config.advertised_url().is_some(),
            node_version: denaro_network::constants::NODE_VERSION.to_string(),
            height: tip.map(|(height, _)| height.0).unwrap_or(0),
            last_block_hash: tip.map(|(_, hash)| hash.to_hex()),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Contact the configured bootstrap peer, if any.
    pub async fn bootstrap(&self) {
        match &self.config.bootstrap {
            Bootstrap::SelfOnly => info!("bootstrap: standalone"),
            Bootstrap::Discover => {
                info!("bootstrap: probing persisted peers");
                for peer in self.registry.sample(4, unix_now(), None) {
                    if let Err(error) = self.sync.handshake(&peer.url).await {
                        debug!(peer = %peer.node_id, %error, "bootstrap handshake failed");
                    }
                }
            }
            Bootstrap::Url(url) => match self.sync.handshake(url).await {
                Ok(status) => info!(peer = %status.node_id, height = status.height, "bootstrap handshake done"),
                Err(error) => warn!(%error, url = url.as_str(), "bootstrap handshake failed"),
            },
        }
    }

    /// Spawn the background loops: discovery, mempool GC, health ticker.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(
            self.sync.clone().run_discovery(self.shutdown.subscribe()),
        ));

        let engine = self.engine.clone();
        let mut gc_shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(MEMPOOL_GC_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match engine.collect_mempool_garbage(MEMPOOL_EXPIRY_SECS).await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "mempool garbage collected"),
                            Err(error) => warn!(%error, "mempool garbage collection failed"),
                        }
                    }
                    _ = gc_shutdown.changed() => break,
                }
            }
        }));

        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let mut health_shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let height = engine
                            .tip()
                            .await
                            .ok()
                            .flatten()
                            .map(|(height, _)| height.0)
                            .unwrap_or(0);
                        let pending = engine.pending_transactions().await.len();
                        info!(height, pending, peers = registry.len(), "health");
                    }
                    _ = health_shutdown.changed() => break,
                }
            }
        }));

        tasks
    }

    /// Signal the background loops to drain and flush storage.
    pub async fn graceful_shutdown(&self) {
        info!("shutting down: draining background tasks");
        let _ = self.shutdown.send(true);
        if let Err(error) = self.engine.flush().await {
            warn!(%error, "flush on shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3006,
            self_url: None,
            bootstrap: Bootstrap::SelfOnly,
            database_host: None,
            database_name: "test".to_string(),
            database_user: None,
            database_password: None,
            network: denaro_chain::parameters::Network::Regtest,
            log: crate::config::LogConfig {
                level: "info".to_string(),
                format: LogFormat::Plain,
                date_format: None,
                console_highlighting: false,
                include_request_content: false,
                include_response_content: false,
                include_block_sync_messages: true,
            },
        }
    }

    #[tokio::test]
    async fn ephemeral_node_reports_status() {
        denaro_test::init();

        let node = Node::init(test_config(), None, true).expect("ephemeral node initializes");
        let status = node.status().await;

        assert_eq!(status.node_id.len(), 64);
        assert_eq!(status.height, 0);
        assert!(status.last_block_hash.is_none());
        assert!(!status.is_public);

        node.graceful_shutdown().await;
    }
}
