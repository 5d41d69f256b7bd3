//! Immutable identity of a peer on the ring.

use std::fmt;

use serde::Serialize;

use crate::identifier::{HashRingKey, Key};

/// `{ip, port, id}`, where `id = H(ip||port)`. Equality and ordering are by
/// `id` only — two `NodeInfo` values with the same id are the same peer.
#[derive(Clone, Debug, Eq, Serialize)]
pub struct NodeInfo {
    pub ip: String,
    pub port: u16,
    #[serde(serialize_with = "crate::identifier::serialize_key")]
    pub id: Key,
}

impl NodeInfo {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        let ip = ip.into();
        let id = Key::hash(&format!("{ip}{port}"));
        NodeInfo { ip, port, id }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn grpc_uri(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (id={})", self.ip, self.port, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic_from_ip_and_port() {
        let a = NodeInfo::new("127.0.0.1", 50000);
        let b = NodeInfo::new("127.0.0.1", 50000);
        assert_eq!(a, b);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_ports_get_different_ids() {
        let a = NodeInfo::new("127.0.0.1", 50000);
        let b = NodeInfo::new("127.0.0.1", 50001);
        assert_ne!(a, b);
    }

    #[test]
    fn address_formats_as_host_colon_port() {
        let a = NodeInfo::new("127.0.0.1", 50000);
        assert_eq!(a.address(), "127.0.0.1:50000");
        assert_eq!(a.grpc_uri(), "http://127.0.0.1:50000");
    }
}
