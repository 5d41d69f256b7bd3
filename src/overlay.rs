//! Manages the set of locally hosted nodes: spins up a node's transport
//! listener and periodic maintenance task on join, tears both down on
//! leave, and exposes overlay-wide operations (publish/lookup/delete,
//! print-ring) that pick an arbitrary local node to act through.

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info, warn};
use rand::seq::IteratorRandom;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::Server;

use crate::config::Config;
use crate::error::ChordError;
use crate::identifier::{HashRingKey, Key};
use crate::node::{Node, NodeSummary};
use crate::node_info::NodeInfo;
use crate::periodic::PeriodicMaintenance;
use crate::rpc::proto::chord_server::ChordServer;
use crate::rpc::service::ChordRpcService;

struct HostedNode {
    node: Arc<Node>,
    periodic: PeriodicMaintenance,
    server_shutdown: Option<oneshot::Sender<()>>,
    server_task: JoinHandle<()>,
}

pub struct Overlay {
    ip: String,
    config: Config,
    nodes: HashMap<u16, HostedNode>,
}

impl Overlay {
    pub fn new(ip: impl Into<String>, config: Config) -> Self {
        Overlay { ip: ip.into(), config, nodes: HashMap::new() }
    }

    fn random_bootstrap_peer(&self) -> Option<NodeInfo> {
        self.nodes
            .values()
            .map(|h| h.node.self_info().clone())
            .choose(&mut rand::thread_rng())
    }

    async fn spawn_listener(
        &self,
        node: Arc<Node>,
    ) -> Result<(oneshot::Sender<()>, JoinHandle<()>), ChordError> {
        let addr = node.self_info().address().parse().map_err(|_| ChordError::InvalidPort {
            port: node.self_info().port as u32,
        })?;
        let (tx, rx) = oneshot::channel();
        let service = ChordRpcService::new(node.clone());
        let server = Server::builder().add_service(ChordServer::new(service));
        let task = tokio::spawn(async move {
            if let Err(e) = server
                .serve_with_shutdown(addr, async {
                    let _ = rx.await;
                })
                .await
            {
                error!("transport listener exited with error: {e}");
            }
        });
        Ok((tx, task))
    }

    /// Constructs and initializes a node on `port`, retrying
    /// initialization up to `max_node_init_retries` times on
    /// `impossible-init`, then starts its listener and periodic task.
    pub async fn join(&mut self, port: u16) -> Result<(), ChordError> {
        if self.nodes.contains_key(&port) {
            return Err(ChordError::PortInUse { port });
        }

        let self_info = NodeInfo::new(self.ip.clone(), port);
        let bootstrap = self.random_bootstrap_peer();

        let node = match bootstrap {
            None => Node::init_alone(self_info, self.config.clone()),
            Some(bootstrap) => {
                let mut last_err = None;
                let mut built = None;
                for attempt in 1..=self.config.max_node_init_retries {
                    match Node::init_with_bootstrap(
                        self_info.clone(),
                        self.config.clone(),
                        bootstrap.clone(),
                    )
                    .await
                    {
                        Ok(n) => {
                            built = Some(n);
                            break;
                        }
                        Err(e) => {
                            warn!("join attempt {attempt} on port {port} failed: {e}");
                            last_err = Some(e);
                        }
                    }
                }
                built.ok_or_else(|| {
                    last_err.unwrap_or(ChordError::ImpossibleInit {
                        attempts: self.config.max_node_init_retries,
                    })
                })?
            }
        };

        let node = Arc::new(node);
        let (server_shutdown, server_task) = self.spawn_listener(node.clone()).await?;
        let periodic = PeriodicMaintenance::spawn(node.clone(), self.config.periodic_interval_ms);

        self.nodes.insert(
            port,
            HostedNode { node, periodic, server_shutdown: Some(server_shutdown), server_task },
        );
        info!("node on port {port} joined the overlay");
        Ok(())
    }

    /// Gracefully removes the node hosted on `port`: stops its periodic
    /// task, runs the Chord-level leave protocol, then tears down its
    /// transport listener.
    pub async fn leave(&mut self, port: u16) -> Result<(), ChordError> {
        let mut hosted = self.nodes.remove(&port).ok_or(ChordError::NoNodeFoundOnPort { port })?;

        hosted.periodic.stop().await;
        hosted.node.terminate().await;
        if let Some(tx) = hosted.server_shutdown.take() {
            let _ = tx.send(());
        }
        let _ = hosted.server_task.await;

        info!("node on port {port} left the overlay");
        Ok(())
    }

    /// Fault-injection hook: removes the node hosted on `port` without
    /// running the graceful leave protocol or notifying its neighbors,
    /// simulating an ungraceful process death. Not part of the core
    /// join/leave API (§4.12); exists to exercise successor-list and
    /// predecessor repair under node failure.
    pub fn kill_ungracefully(&mut self, port: u16) -> Result<(), ChordError> {
        let mut hosted = self.nodes.remove(&port).ok_or(ChordError::NoNodeFoundOnPort { port })?;
        hosted.periodic.abort();
        if let Some(tx) = hosted.server_shutdown.take() {
            let _ = tx.send(());
        }
        hosted.server_task.abort();
        info!("node on port {port} killed ungracefully (no notification)");
        Ok(())
    }

    pub async fn leave_all(&mut self) {
        let ports: Vec<u16> = self.nodes.keys().copied().collect();
        for port in ports {
            if let Err(e) = self.leave(port).await {
                warn!("error leaving node on port {port}: {e}");
            }
        }
    }

    fn arbitrary_node(&self) -> Result<&Arc<Node>, ChordError> {
        self.nodes.values().next().map(|h| &h.node).ok_or(ChordError::ChordIsEmpty)
    }

    pub async fn publish(&self, name: &str, value: String) -> Result<Key, ChordError> {
        let node = self.arbitrary_node()?;
        let key = Key::hash(name);
        node.publish(key, value).await?;
        Ok(key)
    }

    pub async fn lookup(&self, key: Key) -> Result<Option<String>, ChordError> {
        let node = self.arbitrary_node()?;
        node.lookup(key).await
    }

    pub async fn delete(&self, key: Key) -> Result<(), ChordError> {
        let node = self.arbitrary_node()?;
        node.delete(key).await
    }

    pub fn node_summary(&self, port: u16) -> Result<NodeSummary, ChordError> {
        self.nodes.get(&port).map(|h| h.node.summary()).ok_or(ChordError::NoNodeFoundOnPort { port })
    }

    /// Snapshot of the key set locally stored on the node hosted at
    /// `port`, used by `print-node-status` and by tests asserting on key
    /// ownership/distribution (P3, S3, S4).
    pub fn node_file_keys(&self, port: u16) -> Result<Vec<Key>, ChordError> {
        self.nodes
            .get(&port)
            .map(|h| h.node.file_store_keys())
            .ok_or(ChordError::NoNodeFoundOnPort { port })
    }

    /// Snapshot of the finger table of the node hosted at `port`, used by
    /// `print-node-status` (gated behind `--dev-mode` at the CLI layer).
    pub fn node_finger_table(&self, port: u16) -> Result<Vec<Option<NodeInfo>>, ChordError> {
        self.nodes
            .get(&port)
            .map(|h| h.node.finger_table_snapshot())
            .ok_or(ChordError::NoNodeFoundOnPort { port })
    }

    /// Lists every locally hosted node's port and id, ordered by id.
    pub fn print_ring(&self) -> Vec<(u16, Key)> {
        let mut entries: Vec<(u16, Key)> =
            self.nodes.iter().map(|(port, h)| (*port, h.node.self_info().id)).collect();
        entries.sort_by_key(|(_, id)| *id);
        entries
    }

    /// Validates and applies a new `periodic_interval_ms`, restarting
    /// every locally hosted node's maintenance task with the new tick
    /// interval.
    pub async fn set_periodic_interval_ms(&mut self, value: u64) -> Result<(), ChordError> {
        self.config.set_periodic_interval_ms(value)?;
        for hosted in self.nodes.values_mut() {
            hosted.periodic.stop().await;
            hosted.periodic = PeriodicMaintenance::spawn(hosted.node.clone(), value);
        }
        Ok(())
    }
}
