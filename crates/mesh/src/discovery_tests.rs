// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use loopsy_core::NodeId;

fn identity() -> NodeIdentity {
    NodeIdentity {
        node_id: NodeId::new("self-node"),
        hostname: "here".into(),
        platform: "linux".into(),
        version: "1.0.0".into(),
        port: 19532,
        capabilities: vec!["execute".into(), "context".into()],
    }
}

fn props(node_id: &str) -> HashMap<String, String> {
    HashMap::from([
        ("nodeId".to_string(), node_id.to_string()),
        ("version".to_string(), "1.0.0".to_string()),
        ("platform".to_string(), "darwin".to_string()),
        ("capabilities".to_string(), "execute,transfer".to_string()),
    ])
}

#[test]
fn test_txt_properties_layout() {
    let properties = txt_properties(&identity());
    let map: HashMap<_, _> = properties.into_iter().collect();
    assert_eq!(map.get("nodeId").unwrap(), "self-node");
    assert_eq!(map.get("version").unwrap(), "1.0.0");
    assert_eq!(map.get("platform").unwrap(), "linux");
    assert_eq!(map.get("capabilities").unwrap(), "execute,context");
}

#[test]
fn test_own_record_ignored() {
    let update = peer_update_from_record(
        &NodeId::new("self-node"),
        &["192.168.1.5".parse().unwrap()],
        19532,
        "here".into(),
        &props("self-node"),
    );
    assert!(update.is_none());
}

#[test]
fn test_resolved_record_becomes_online_upsert() {
    let update = peer_update_from_record(
        &NodeId::new("self-node"),
        &["192.168.1.7".parse().unwrap()],
        19533,
        "neighbor".into(),
        &props("other-node"),
    )
    .unwrap();

    assert_eq!(update.node_id, "other-node");
    assert_eq!(update.address.as_deref(), Some("192.168.1.7"));
    assert_eq!(update.port, Some(19533));
    assert_eq!(update.status, Some(PeerStatus::Online));
    assert_eq!(update.platform.as_deref(), Some("darwin"));
    assert_eq!(
        update.capabilities.as_deref(),
        Some(["execute".to_string(), "transfer".to_string()].as_slice())
    );
}

#[test]
fn test_record_without_node_id_ignored() {
    let update = peer_update_from_record(
        &NodeId::new("self-node"),
        &["192.168.1.7".parse().unwrap()],
        1,
        "x".into(),
        &HashMap::new(),
    );
    assert!(update.is_none());
}

#[test]
fn test_ipv4_preferred_over_ipv6() {
    let update = peer_update_from_record(
        &NodeId::new("self-node"),
        &["fe80::1".parse().unwrap(), "10.0.0.3".parse().unwrap()],
        1,
        "x".into(),
        &props("other"),
    )
    .unwrap();
    assert_eq!(update.address.as_deref(), Some("10.0.0.3"));
}

#[test]
fn test_record_without_addresses_ignored() {
    let update = peer_update_from_record(&NodeId::new("self"), &[], 1, "x".into(), &props("other"));
    assert!(update.is_none());
}
