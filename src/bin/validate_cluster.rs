//! Read-only cluster diagnostic: connects to a list of already-running
//! nodes' gRPC addresses and checks ring closure (P1) and predecessor
//! consistency (P2) across them, printing any discrepancy. Grounded in
//! the donor crate's own standalone cluster validator, rebuilt against
//! this crate's actual wire protocol rather than a bespoke summary RPC:
//! `GetFirstSuccessor` alone is enough to walk the ring, and
//! `GetPredecessor` + `GetFirstSuccessor` together are enough to check
//! predecessor/successor agreement, so no additional message type is
//! needed beyond the eleven the protocol already defines.

use std::collections::HashMap;

use clap::Parser;
use tonic::transport::Channel;

use chord::node_info::NodeInfo;
use chord::rpc::proto::chord_client::ChordClient;
use chord::rpc::proto::{self, GetFirstSuccessorRequest, GetPredecessorRequest};

#[derive(Parser, Debug)]
#[command(name = "validate-cluster", about = "Check ring closure and predecessor consistency across a running Chord cluster")]
struct Args {
    /// gRPC addresses of every node to include in the check, e.g.
    /// 127.0.0.1:50000 127.0.0.1:50001 127.0.0.1:50002
    #[arg(required = true)]
    addresses: Vec<String>,
}

/// Synthetic sender identity for envelopes this tool issues; it is not a
/// ring member, so any fixed identity works — only the node's own replies
/// carry routing-significant data.
fn validator_identity() -> NodeInfo {
    NodeInfo::new("validate-cluster", 0)
}

async fn fetch_predecessor_and_successor(
    address: &str,
) -> Result<(Option<NodeInfo>, Option<NodeInfo>), Box<dyn std::error::Error>> {
    let mut client: ChordClient<Channel> = ChordClient::connect(format!("http://{address}")).await?;
    let self_info = validator_identity();

    let pred_envelope = proto::make_envelope(&self_info, &self_info, 0, true);
    let pred_reply = client
        .get_predecessor(GetPredecessorRequest { envelope: Some(pred_envelope) })
        .await?
        .into_inner();
    let predecessor = pred_reply.present.then(|| NodeInfo::from(&pred_reply.node.unwrap_or_default()));

    let succ_envelope = proto::make_envelope(&self_info, &self_info, 1, true);
    let succ_reply = client
        .get_first_successor(GetFirstSuccessorRequest { envelope: Some(succ_envelope) })
        .await?
        .into_inner();
    let successor = succ_reply.present.then(|| NodeInfo::from(&succ_reply.node.unwrap_or_default()));

    Ok((predecessor, successor))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut by_address: HashMap<String, (Option<NodeInfo>, Option<NodeInfo>)> = HashMap::new();
    for address in &args.addresses {
        let result = fetch_predecessor_and_successor(address).await?;
        by_address.insert(address.clone(), result);
    }

    let mut problems = Vec::new();

    // P1: ring closure. Walk first-successor links from the first address
    // and confirm every supplied node is visited before the walk loops.
    let start = &args.addresses[0];
    let mut visited = vec![start.clone()];
    let mut current = start.clone();
    for _ in 0..args.addresses.len() {
        let Some((_, successor)) = by_address.get(&current) else { break };
        let Some(successor) = successor else {
            problems.push(format!("{current}: has no successor, ring walk stalled"));
            break;
        };
        let next_address = successor.address();
        if next_address == start.as_str() {
            break;
        }
        visited.push(next_address.clone());
        current = next_address;
    }
    for address in &args.addresses {
        if !visited.contains(address) {
            problems.push(format!("{address}: unreachable by following successor links from {start}"));
        }
    }

    // P2: predecessor consistency. For each node N with predecessor P,
    // P's first successor should be N (unless P is outside the set we
    // were given, which we can't check further).
    for address in &args.addresses {
        let Some((predecessor, _)) = by_address.get(address) else { continue };
        let Some(predecessor) = predecessor else { continue };
        let pred_address = predecessor.address();
        if let Some((_, pred_successor)) = by_address.get(&pred_address) {
            match pred_successor {
                Some(s) if s.address() == *address => {}
                Some(s) => problems.push(format!(
                    "{address}: predecessor {pred_address}'s first successor is {}, not {address}",
                    s.address()
                )),
                None => problems.push(format!(
                    "{address}: predecessor {pred_address} has no successor at all"
                )),
            }
        }
    }

    if problems.is_empty() {
        println!("cluster looks consistent across {} node(s)", args.addresses.len());
        Ok(())
    } else {
        for problem in &problems {
            eprintln!("INCONSISTENCY: {problem}");
        }
        Err(format!("{} inconsistenc{} found", problems.len(), if problems.len() == 1 { "y" } else { "ies" }).into())
    }
}
