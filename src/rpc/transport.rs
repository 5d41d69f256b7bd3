//! Outbound connection helper: one short-lived channel per call site, with
//! bounded retries on connection failure.

use std::time::Duration;

use log::warn;
use tonic::transport::Channel;

use crate::error::ChordError;
use crate::node_info::NodeInfo;
use crate::rpc::proto::chord_client::ChordClient;

const CONNECTION_RETRY_SLEEP_MILLIS: u64 = 100;

/// Connects to `target`, retrying on failure up to `max_retries` times with
/// a short sleep between attempts. This is the realization of the
/// "transport client opens a fresh connection per message, bounded
/// retries" contract: tonic's channel is reused for exactly one RPC call
/// and then dropped by the caller.
pub async fn connect_with_retry(
    target: &NodeInfo,
    max_retries: u32,
) -> Result<ChordClient<Channel>, ChordError> {
    let mut attempt = 0;
    loop {
        match ChordClient::connect(target.grpc_uri()).await {
            Ok(client) => return Ok(client),
            Err(err) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    "connection attempt {attempt}/{max_retries} to {} failed: {err}",
                    target.address()
                );
                tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_SLEEP_MILLIS)).await;
            }
            Err(err) => {
                return Err(ChordError::SendFailure {
                    destination: target.address(),
                    source: Box::new(err),
                })
            }
        }
    }
}
