//! Generated protobuf/gRPC types for the `Chord` service, plus the
//! conversions between them and the crate's own domain types.

tonic::include_proto!("chord");

use std::collections::HashMap;

use crate::identifier::Key;
use crate::node_info::NodeInfo;

pub fn key_to_bytes(key: Key) -> Vec<u8> {
    let mut buf = [0u8; 32];
    key.to_big_endian(&mut buf);
    buf[12..].to_vec()
}

pub fn key_from_bytes(bytes: &[u8]) -> Key {
    Key::from_big_endian(bytes)
}

impl From<&NodeInfo> for NodeInfoMsg {
    fn from(info: &NodeInfo) -> Self {
        NodeInfoMsg {
            ip: info.ip.clone(),
            port: info.port as u32,
            id: key_to_bytes(info.id),
        }
    }
}

impl From<&NodeInfoMsg> for NodeInfo {
    fn from(msg: &NodeInfoMsg) -> Self {
        NodeInfo {
            ip: msg.ip.clone(),
            port: msg.port as u16,
            id: key_from_bytes(&msg.id),
        }
    }
}

pub fn optional_node_info(node: Option<&NodeInfo>) -> (bool, NodeInfoMsg) {
    match node {
        Some(n) => (true, NodeInfoMsg::from(n)),
        None => (false, NodeInfoMsg::default()),
    }
}

pub fn file_map_to_entries(map: &HashMap<Key, String>) -> Vec<FileMapEntry> {
    map.iter()
        .map(|(k, v)| FileMapEntry { key: key_to_bytes(*k), value: v.clone() })
        .collect()
}

pub fn entries_to_file_map(entries: &[FileMapEntry]) -> HashMap<Key, String> {
    entries
        .iter()
        .map(|e| (key_from_bytes(&e.key), e.value.clone()))
        .collect()
}

/// Builds the envelope every outbound request carries: sender info, the
/// destination being addressed, a freshly allocated ticket, and whether a
/// reply is expected.
pub fn make_envelope(
    sender: &NodeInfo,
    destination: &NodeInfo,
    ticket: u64,
    ack_expected: bool,
) -> Envelope {
    Envelope {
        sender: Some(NodeInfoMsg::from(sender)),
        destination: Some(NodeInfoMsg::from(destination)),
        ticket,
        ack_expected,
        error: String::new(),
    }
}

/// Builds the reply envelope, echoing the request's ticket.
pub fn reply_envelope(local: &NodeInfo, request_envelope: &Envelope) -> Envelope {
    Envelope {
        sender: Some(NodeInfoMsg::from(local)),
        destination: request_envelope.sender.clone(),
        ticket: request_envelope.ticket,
        ack_expected: false,
        error: String::new(),
    }
}
