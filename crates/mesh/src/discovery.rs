// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mDNS discovery: advertise this node, absorb the neighbors.
//!
//! Service type `_loopsy._tcp`, instance `loopsy-<short nodeId>`, TXT
//! carrying identity. Discovered records (other than our own) are
//! upserted into the registry as online peers; record removal is left
//! to the health checker, which demotes unreachable peers anyway.
//! Discovery is optional - sibling sessions disable it to avoid
//! advertising the same instance name twice.

use loopsy_core::{Clock, NodeIdentity, PeerStatus};
use loopsy_storage::registry::{PeerRegistry, PeerUpsert};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// mDNS service type for loopsy daemons.
pub const SERVICE_TYPE: &str = "_loopsy._tcp.local.";

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mdns error: {0}")]
    Mdns(String),
}

impl From<mdns_sd::Error> for DiscoveryError {
    fn from(e: mdns_sd::Error) -> Self {
        Self::Mdns(e.to_string())
    }
}

/// Running advertiser + browser. Stop with [`Discovery::shutdown`].
pub struct Discovery {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Discovery {
    /// Register our service record and start browsing for siblings.
    pub fn start<C: Clock>(
        identity: &NodeIdentity,
        registry: Arc<PeerRegistry<C>>,
    ) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;

        let instance = identity.instance_name();
        let host_label = format!("{}.local.", instance);
        let properties = txt_properties(identity);
        let property_refs: Vec<(&str, &str)> = properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &instance,
            &host_label,
            "",
            identity.port,
            &property_refs[..],
        )?
        .enable_addr_auto();
        let fullname = service.get_fullname().to_string();
        daemon.register(service)?;
        tracing::info!(instance = %instance, port = identity.port, "mDNS service registered");

        let receiver = daemon.browse(SERVICE_TYPE)?;
        let self_node_id = identity.node_id.clone();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let properties: HashMap<String, String> = info
                            .get_properties()
                            .iter()
                            .map(|p| (p.key().to_string(), p.val_str().to_string()))
                            .collect();
                        let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
                        let hostname = info.get_hostname().trim_end_matches('.').to_string();

                        if let Some(update) = peer_update_from_record(
                            &self_node_id,
                            &addresses,
                            info.get_port(),
                            hostname,
                            &properties,
                        ) {
                            tracing::info!(
                                peer = %update.node_id,
                                address = update.address.as_deref().unwrap_or(""),
                                "peer discovered via mDNS"
                            );
                            registry.upsert(update);
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        // Liveness is the health checker's call, not mDNS's
                        tracing::debug!(fullname = %fullname, "mDNS record removed");
                    }
                    _ => {}
                }
            }
        });

        Ok(Self { daemon, fullname })
    }

    /// Unpublish our record and stop the daemon.
    pub fn shutdown(&self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            tracing::debug!(error = %e, "mDNS unregister failed");
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!(error = %e, "mDNS shutdown failed");
        }
    }
}

/// TXT record payload for our service.
pub fn txt_properties(identity: &NodeIdentity) -> Vec<(String, String)> {
    vec![
        ("nodeId".to_string(), identity.node_id.to_string()),
        ("version".to_string(), identity.version.clone()),
        ("platform".to_string(), identity.platform.clone()),
        (
            "capabilities".to_string(),
            identity.capabilities.join(","),
        ),
    ]
}

/// Build the registry update for a resolved record.
///
/// Returns `None` for our own record or records without a nodeId.
pub fn peer_update_from_record(
    self_node_id: &loopsy_core::NodeId,
    addresses: &[IpAddr],
    port: u16,
    hostname: String,
    properties: &HashMap<String, String>,
) -> Option<PeerUpsert> {
    let node_id = properties.get("nodeId")?;
    if node_id == self_node_id.as_str() {
        return None;
    }

    // Prefer IPv4; mixed-stack LANs advertise both
    let address = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())?
        .to_string();

    let capabilities = properties
        .get("capabilities")
        .map(|joined| joined.split(',').map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut update = PeerUpsert::new(loopsy_core::NodeId::new(node_id.clone()));
    update.hostname = Some(hostname);
    update.address = Some(address);
    update.port = Some(port);
    update.platform = properties.get("platform").cloned();
    update.version = properties.get("version").cloned();
    update.capabilities = Some(capabilities);
    update.status = Some(PeerStatus::Online);
    Some(update)
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
