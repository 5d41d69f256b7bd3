//! The gRPC-facing side of `ReceivedMessagesHandler`: a thin dispatcher
//! that unwraps the envelope, calls the matching `Node` operation, and
//! wraps the result back up with a reply envelope echoing the same
//! ticket. No routing logic lives here — it is all in `Node`.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::node::Node;
use crate::rpc::proto::chord_server::Chord;
use crate::rpc::proto::{self, *};

pub struct ChordRpcService {
    node: Arc<Node>,
}

impl ChordRpcService {
    pub fn new(node: Arc<Node>) -> Self {
        ChordRpcService { node }
    }
}

fn envelope_of<T>(req: &Request<T>) -> Option<&Envelope>
where
    T: EnvelopeCarrier,
{
    req.get_ref().envelope()
}

/// Small helper trait so `envelope_of` can pull the `Envelope` out of any
/// of the per-method request messages uniformly.
trait EnvelopeCarrier {
    fn envelope(&self) -> Option<&Envelope>;
}

macro_rules! impl_envelope_carrier {
    ($t:ty) => {
        impl EnvelopeCarrier for $t {
            fn envelope(&self) -> Option<&Envelope> {
                self.envelope.as_ref()
            }
        }
    };
}

impl_envelope_carrier!(PingRequest);
impl_envelope_carrier!(GetPredecessorRequest);
impl_envelope_carrier!(GetFirstSuccessorRequest);
impl_envelope_carrier!(FindKeySuccessorRequest);
impl_envelope_carrier!(NotifyRequest);
impl_envelope_carrier!(LeavingPredecessorRequest);
impl_envelope_carrier!(LeavingSuccessorRequest);
impl_envelope_carrier!(YoureNotAloneRequest);
impl_envelope_carrier!(PublishRequest);
impl_envelope_carrier!(FileGetRequest);
impl_envelope_carrier!(FileDeleteRequest);

fn missing_envelope() -> Status {
    Status::invalid_argument("empty-message: request carried no envelope")
}

#[tonic::async_trait]
impl Chord for ChordRpcService {
    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(PingReply { envelope: Some(reply_envelope) }))
    }

    async fn get_predecessor(
        &self,
        request: Request<GetPredecessorRequest>,
    ) -> Result<Response<OptionalNodeInfoReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let predecessor = self.node.handle_get_predecessor().await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        let (present, node) = proto::optional_node_info(predecessor.as_ref());
        Ok(Response::new(OptionalNodeInfoReply { envelope: Some(reply_envelope), present, node: Some(node) }))
    }

    async fn get_first_successor(
        &self,
        request: Request<GetFirstSuccessorRequest>,
    ) -> Result<Response<OptionalNodeInfoReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let successor = self.node.handle_get_first_successor().await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        let (present, node) = proto::optional_node_info(successor.as_ref());
        Ok(Response::new(OptionalNodeInfoReply { envelope: Some(reply_envelope), present, node: Some(node) }))
    }

    async fn find_key_successor(
        &self,
        request: Request<FindKeySuccessorRequest>,
    ) -> Result<Response<OptionalNodeInfoReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let key = proto::key_from_bytes(&request.get_ref().key);
        let successor = self
            .node
            .handle_find_key_successor(key)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        let (present, node) = proto::optional_node_info(successor.as_ref());
        Ok(Response::new(OptionalNodeInfoReply { envelope: Some(reply_envelope), present, node: Some(node) }))
    }

    async fn notify(
        &self,
        request: Request<NotifyRequest>,
    ) -> Result<Response<NotifyReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let sender = envelope
            .sender
            .as_ref()
            .map(crate::node_info::NodeInfo::from)
            .ok_or_else(missing_envelope)?;
        let transferred = self.node.handle_notify(sender).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(NotifyReply {
            envelope: Some(reply_envelope),
            transferred: proto::file_map_to_entries(&transferred),
        }))
    }

    async fn leaving_predecessor(
        &self,
        request: Request<LeavingPredecessorRequest>,
    ) -> Result<Response<EmptyReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let body = request.get_ref();
        let new_predecessor = if body.has_new_predecessor {
            body.new_predecessor.as_ref().map(crate::node_info::NodeInfo::from)
        } else {
            None
        };
        let files = proto::entries_to_file_map(&body.files);
        self.node.handle_leaving_predecessor(new_predecessor, files).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(EmptyReply { envelope: Some(reply_envelope) }))
    }

    async fn leaving_successor(
        &self,
        request: Request<LeavingSuccessorRequest>,
    ) -> Result<Response<EmptyReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let new_successor = request
            .get_ref()
            .new_successor
            .as_ref()
            .map(crate::node_info::NodeInfo::from)
            .ok_or_else(missing_envelope)?;
        self.node.handle_leaving_successor(new_successor).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(EmptyReply { envelope: Some(reply_envelope) }))
    }

    async fn youre_not_alone_anymore(
        &self,
        request: Request<YoureNotAloneRequest>,
    ) -> Result<Response<WasAloneReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let sender = envelope
            .sender
            .as_ref()
            .map(crate::node_info::NodeInfo::from)
            .ok_or_else(missing_envelope)?;
        let was_alone = self.node.handle_youre_not_alone_anymore(sender).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(WasAloneReply { envelope: Some(reply_envelope), was_alone }))
    }

    async fn publish(
        &self,
        request: Request<PublishRequest>,
    ) -> Result<Response<EmptyReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let body = request.get_ref();
        let key = proto::key_from_bytes(&body.key);
        self.node.handle_publish(key, body.value.clone()).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(EmptyReply { envelope: Some(reply_envelope) }))
    }

    async fn file_get(
        &self,
        request: Request<FileGetRequest>,
    ) -> Result<Response<OptionalValueReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let key = proto::key_from_bytes(&request.get_ref().key);
        let value = self.node.handle_file_get(key).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        let present = value.is_some();
        Ok(Response::new(OptionalValueReply {
            envelope: Some(reply_envelope),
            present,
            value: value.unwrap_or_default(),
        }))
    }

    async fn file_delete(
        &self,
        request: Request<FileDeleteRequest>,
    ) -> Result<Response<EmptyReply>, Status> {
        let envelope = envelope_of(&request).ok_or_else(missing_envelope)?.clone();
        let key = proto::key_from_bytes(&request.get_ref().key);
        self.node.handle_file_delete(key).await;
        let reply_envelope = proto::reply_envelope(self.node.self_info(), &envelope);
        Ok(Response::new(EmptyReply { envelope: Some(reply_envelope) }))
    }
}
