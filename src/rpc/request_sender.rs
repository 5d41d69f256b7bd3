//! Issues typed RPCs to remote peers, allocating a ticket per request and
//! bounding each call with `rpc_timeout_ms`.
//!
//! Because each RPC is realized as a single tonic unary call (§2A), the
//! "pending-reply slot" described by the wire protocol is just the call's
//! own future: `tokio::time::timeout` is the wait, and the ticket counter
//! below exists purely so every envelope on the wire carries a unique,
//! monotonically increasing ticket for logging and test assertions — no
//! separate ticket → reply table is maintained.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::ChordError;
use crate::identifier::Key;
use crate::node_info::NodeInfo;
use crate::rpc::proto::{self, *};
use crate::rpc::transport::connect_with_retry;

pub struct RequestSender {
    self_info: NodeInfo,
    next_ticket: AtomicU64,
    rpc_timeout_ms: u64,
    max_connect_retries: u32,
}

impl RequestSender {
    pub fn new(self_info: NodeInfo, rpc_timeout_ms: u64, max_connect_retries: u32) -> Self {
        RequestSender {
            self_info,
            next_ticket: AtomicU64::new(0),
            rpc_timeout_ms,
            max_connect_retries,
        }
    }

    fn allocate_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    async fn with_timeout<T>(
        &self,
        destination: &NodeInfo,
        fut: impl std::future::Future<Output = Result<T, tonic::Status>>,
    ) -> Result<T, ChordError> {
        match tokio::time::timeout(Duration::from_millis(self.rpc_timeout_ms), fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(status)) => Err(ChordError::SendFailure {
                destination: destination.address(),
                source: Box::new(status),
            }),
            Err(_elapsed) => Err(ChordError::TimerExpired {
                destination: destination.address(),
                timeout_ms: self.rpc_timeout_ms,
            }),
        }
    }

    pub async fn ping(&self, destination: &NodeInfo) -> Result<(), ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        self.with_timeout(destination, client.ping(PingRequest { envelope: Some(envelope) }))
            .await?;
        Ok(())
    }

    pub async fn get_predecessor(
        &self,
        destination: &NodeInfo,
    ) -> Result<Option<NodeInfo>, ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        let reply = self
            .with_timeout(
                destination,
                client.get_predecessor(GetPredecessorRequest { envelope: Some(envelope) }),
            )
            .await?
            .into_inner();
        Ok(optional_reply_to_node(reply.present, reply.node))
    }

    pub async fn get_first_successor(
        &self,
        destination: &NodeInfo,
    ) -> Result<Option<NodeInfo>, ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        let reply = self
            .with_timeout(
                destination,
                client.get_first_successor(GetFirstSuccessorRequest { envelope: Some(envelope) }),
            )
            .await?
            .into_inner();
        Ok(optional_reply_to_node(reply.present, reply.node))
    }

    pub async fn find_key_successor(
        &self,
        destination: &NodeInfo,
        key: Key,
    ) -> Result<Option<NodeInfo>, ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        let reply = self
            .with_timeout(
                destination,
                client.find_key_successor(FindKeySuccessorRequest {
                    envelope: Some(envelope),
                    key: proto::key_to_bytes(key),
                }),
            )
            .await?
            .into_inner();
        Ok(optional_reply_to_node(reply.present, reply.node))
    }

    pub async fn notify(
        &self,
        destination: &NodeInfo,
    ) -> Result<HashMap<Key, String>, ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        let reply = self
            .with_timeout(destination, client.notify(NotifyRequest { envelope: Some(envelope) }))
            .await?
            .into_inner();
        Ok(proto::entries_to_file_map(&reply.transferred))
    }

    pub async fn leaving_predecessor(
        &self,
        destination: &NodeInfo,
        new_predecessor: Option<&NodeInfo>,
        files: &HashMap<Key, String>,
    ) -> Result<(), ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, false);
        let (has_new_predecessor, new_predecessor_msg) = proto::optional_node_info(new_predecessor);
        self.with_timeout(
            destination,
            client.leaving_predecessor(LeavingPredecessorRequest {
                envelope: Some(envelope),
                has_new_predecessor,
                new_predecessor: Some(new_predecessor_msg),
                files: proto::file_map_to_entries(files),
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn leaving_successor(
        &self,
        destination: &NodeInfo,
        new_successor: &NodeInfo,
    ) -> Result<(), ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, false);
        self.with_timeout(
            destination,
            client.leaving_successor(LeavingSuccessorRequest {
                envelope: Some(envelope),
                new_successor: Some(NodeInfoMsg::from(new_successor)),
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn youre_not_alone_anymore(
        &self,
        destination: &NodeInfo,
    ) -> Result<bool, ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        let reply = self
            .with_timeout(
                destination,
                client.youre_not_alone_anymore(YoureNotAloneRequest { envelope: Some(envelope) }),
            )
            .await?
            .into_inner();
        Ok(reply.was_alone)
    }

    pub async fn publish(
        &self,
        destination: &NodeInfo,
        key: Key,
        value: String,
    ) -> Result<(), ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, false);
        self.with_timeout(
            destination,
            client.publish(PublishRequest {
                envelope: Some(envelope),
                key: proto::key_to_bytes(key),
                value,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn file_get(
        &self,
        destination: &NodeInfo,
        key: Key,
    ) -> Result<Option<String>, ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, true);
        let reply = self
            .with_timeout(
                destination,
                client.file_get(FileGetRequest {
                    envelope: Some(envelope),
                    key: proto::key_to_bytes(key),
                }),
            )
            .await?
            .into_inner();
        Ok(if reply.present { Some(reply.value) } else { None })
    }

    pub async fn file_delete(&self, destination: &NodeInfo, key: Key) -> Result<(), ChordError> {
        let ticket = self.allocate_ticket();
        let mut client = connect_with_retry(destination, self.max_connect_retries).await?;
        let envelope = proto::make_envelope(&self.self_info, destination, ticket, false);
        self.with_timeout(
            destination,
            client.file_delete(FileDeleteRequest {
                envelope: Some(envelope),
                key: proto::key_to_bytes(key),
            }),
        )
        .await?;
        Ok(())
    }
}

fn optional_reply_to_node(present: bool, node: Option<NodeInfoMsg>) -> Option<NodeInfo> {
    if present {
        node.as_ref().map(NodeInfo::from)
    } else {
        None
    }
}
