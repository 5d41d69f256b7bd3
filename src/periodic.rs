//! The single cooperative maintenance task every node runs: stabilize,
//! check-predecessor, fix-successor-list, fix-finger, loneliness-check,
//! once per tick, skipped entirely while the node believes it is alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::task::JoinHandle;

use crate::node::Node;

pub struct PeriodicMaintenance {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicMaintenance {
    /// Spawns the maintenance loop for `node`, ticking every
    /// `interval_ms`. `fix_finger` runs on every tick — unlike one
    /// retrieved revision of the source, which left it commented out.
    pub fn spawn(node: Arc<Node>, interval_ms: u64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                if stop_clone.load(Ordering::SeqCst) {
                    break;
                }
                if node.is_alone().await {
                    trace!("{}: alone, skipping periodic tick", node.self_info());
                    continue;
                }
                debug!("{}: running periodic maintenance tick", node.self_info());
                node.stabilize().await;
                node.check_predecessor().await;
                node.fix_successor_list().await;
                node.fix_finger().await;
                node.check_if_im_alone().await;
            }
        });
        PeriodicMaintenance { stop, handle: Some(handle) }
    }

    /// Signals the task to stop and waits for the current tick (if any) to
    /// finish. Idempotent — calling this more than once is a no-op after
    /// the first call.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Aborts the task immediately, with no cooperative shutdown. Used to
    /// simulate an ungraceful process death in tests; production code
    /// should use `stop` instead.
    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
