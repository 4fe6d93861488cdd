//! Request and snapshot types for the subscription registry.

use crate::callback::ScanResultsCallback;
use crate::error::{RegistryError, Result};
use crate::liveness::PeerHandle;
use crate::types::{Frequency, Owner, Ssid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A validated request to occupy the subscription slot.
pub struct SubscribeRequest {
    pub(crate) owner: Owner,
    pub(crate) peer: Arc<dyn PeerHandle>,
    pub(crate) callback: Box<dyn ScanResultsCallback>,
    pub(crate) target_names: BTreeSet<String>,
    pub(crate) target_frequencies: BTreeSet<Frequency>,
}

impl SubscribeRequest {
    /// Build a request. Fails with `EmptyTargets` when `ssids` is empty.
    pub fn new(
        owner: Owner,
        peer: Arc<dyn PeerHandle>,
        callback: Box<dyn ScanResultsCallback>,
        ssids: &[Ssid],
        frequencies: &[i32],
    ) -> Result<Self> {
        if ssids.is_empty() {
            return Err(RegistryError::EmptyTargets);
        }

        Ok(Self {
            owner,
            peer,
            callback,
            target_names: ssids.iter().map(Ssid::canonical).collect(),
            target_frequencies: frequencies.iter().copied().map(Frequency).collect(),
        })
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }
}

impl std::fmt::Debug for SubscribeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeRequest")
            .field("owner", &self.owner)
            .field("peer", &self.peer)
            .field("callback", &self.callback)
            .field("target_names", &self.target_names)
            .field("target_frequencies", &self.target_frequencies)
            .finish()
    }
}

/// Notice posted by a death hook when the subscribing peer goes away.
///
/// `generation` identifies the subscription the hook was linked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerLost {
    pub generation: u64,
}

/// Serializable view of the active subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub owner: Owner,
    /// Debug identity of the peer handle.
    pub peer: String,
    /// Debug identity of the callback sink.
    pub callback: String,
    pub target_names: Vec<String>,
    pub target_frequencies: Vec<Frequency>,
    /// Result batches examined since the subscription became active.
    pub delivery_cycles: u64,
}

impl SubscriptionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
