//! Subscription registry state machine.

use crate::callback::ScanResultsCallback;
use crate::liveness::{DeathHook, LinkId, PeerHandle};
use crate::types::{Frequency, Owner, RegisterFailure, RemovalReason, ScanResult};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::types::{PeerLost, SubscribeRequest, SubscriptionSnapshot};

/// The active subscription.
struct Subscription {
    owner: Owner,
    peer: Arc<dyn PeerHandle>,
    /// Death hook registration on `peer`.
    link: LinkId,
    generation: u64,
    callback: Box<dyn ScanResultsCallback>,
    target_names: BTreeSet<String>,
    target_frequencies: BTreeSet<Frequency>,
}

impl Subscription {
    /// Only the name gates delivery; frequencies are informational.
    fn matches(&self, result: &ScanResult) -> bool {
        self.target_names.contains(&result.ssid.canonical())
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.target_names.iter().map(String::as_str).collect();
        let freqs: Vec<String> = self
            .target_frequencies
            .iter()
            .map(|freq| freq.0.to_string())
            .collect();
        write!(
            f,
            "owner={}, peer={:?}, callback={:?}, target_names=[{}], frequencies=[{}]",
            self.owner,
            self.peer,
            self.callback,
            names.join(", "),
            freqs.join(", ")
        )
    }
}

/// Holds at most one background-scan subscription.
///
/// Not thread safe: every method takes `&mut self` or `&self` and
/// is expected to run on one serial context. Peer-death hooks may fire on
/// other threads; they only queue a `PeerLost` notice, which the owner of
/// the registry applies through `process_peer_events` or `on_peer_lost`.
pub struct SubscriptionRegistry {
    current: Option<Subscription>,
    /// Result batches examined while the current subscription was active.
    delivery_cycles: u64,
    /// Generation assigned to the next admitted subscription.
    next_generation: u64,
    death_tx: Sender<PeerLost>,
    death_rx: Receiver<PeerLost>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (death_tx, death_rx) = unbounded();
        Self {
            current: None,
            delivery_cycles: 0,
            next_generation: 1,
            death_tx,
            death_rx,
        }
    }

    /// Try to occupy the slot.
    ///
    /// Returns `false` if the slot is taken (the requester is told why via
    /// `on_register_failed`), if the peer cannot be linked for liveness, or
    /// if the success acknowledgement cannot be delivered.
    pub fn subscribe(&mut self, request: SubscribeRequest) -> bool {
        if let Some(active) = &self.current {
            let reason = if active.owner == request.owner {
                RegisterFailure::AlreadyRegistered
            } else {
                RegisterFailure::ResourceBusy
            };
            debug!(
                owner = %request.owner,
                active_owner = %active.owner,
                ?reason,
                "rejecting subscription, slot occupied"
            );
            if let Err(e) = request.callback.on_register_failed(reason) {
                warn!(owner = %request.owner, "failed to send register failure: {}", e);
            }
            return false;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let death_tx = self.death_tx.clone();
        let hook = DeathHook::new(move || {
            // Registry may already be gone; nothing left to clean up then.
            let _ = death_tx.send(PeerLost { generation });
        });

        let link = match request.peer.link_to_death(hook) {
            Ok(link) => link,
            Err(e) => {
                error!(owner = %request.owner, "link_to_death failed: {}", e);
                return false;
            }
        };

        if let Err(e) = request.callback.on_register_success() {
            warn!(owner = %request.owner, "failed to send register success: {}", e);
            if let Err(e) = request.peer.unlink_to_death(link) {
                debug!(owner = %request.owner, "unlink after failed ack: {}", e);
            }
            return false;
        }

        debug!(owner = %request.owner, generation, "subscription active");
        self.current = Some(Subscription {
            owner: request.owner,
            peer: request.peer,
            link,
            generation,
            callback: request.callback,
            target_names: request.target_names,
            target_frequencies: request.target_frequencies,
        });
        true
    }

    /// Cancel the active subscription on behalf of `owner`.
    ///
    /// Returns `false` when the slot is empty or owned by someone else.
    pub fn unsubscribe(&mut self, owner: Owner) -> bool {
        let active = match &self.current {
            Some(active) if active.owner == owner => active,
            _ => return false,
        };

        if let Err(e) = active.callback.on_removed(RemovalReason::Unregistered) {
            warn!(owner = %owner, "failed to send removal: {}", e);
        }
        debug!(owner = %owner, "subscription unregistered");
        self.retire();
        true
    }

    /// Match a batch of newly observed results against the active filter.
    ///
    /// On the first non-empty match the results are delivered and the
    /// subscription is retired. An empty match leaves it waiting.
    pub fn deliver_results(&mut self, batch: &[ScanResult]) {
        let Some(active) = self.current.as_ref() else {
            return;
        };
        self.delivery_cycles += 1;

        let matched: Vec<ScanResult> = batch
            .iter()
            .filter(|result| active.matches(result))
            .cloned()
            .collect();
        if matched.is_empty() {
            return;
        }

        debug!(owner = %active.owner, matched = matched.len(), "delivering scan results");
        let delivered = active
            .callback
            .on_scan_results_available(&matched)
            .and_then(|()| active.callback.on_removed(RemovalReason::ResultsDelivered));
        if let Err(e) = delivered {
            warn!(owner = %active.owner, "failed to deliver scan results: {}", e);
        }
        self.retire();
    }

    /// Retire the subscription whose peer died.
    ///
    /// Notices left over from an already-retired subscription are ignored.
    pub fn on_peer_lost(&mut self, notice: PeerLost) {
        let Some(active) = self.current.as_ref() else {
            return;
        };
        if active.generation != notice.generation {
            debug!(
                stale = notice.generation,
                current = active.generation,
                "ignoring stale peer death"
            );
            return;
        }

        debug!(owner = %active.owner, "peer lost, retiring subscription");
        self.retire();
    }

    /// Apply every queued peer-death notice. Returns how many were queued.
    pub fn process_peer_events(&mut self) -> usize {
        let notices: Vec<PeerLost> = self.death_rx.try_iter().collect();
        for notice in &notices {
            self.on_peer_lost(*notice);
        }
        notices.len()
    }

    /// Receiver of peer-death notices, for selecting alongside other work.
    pub fn peer_events(&self) -> Receiver<PeerLost> {
        self.death_rx.clone()
    }

    /// Clear the slot and release its liveness registration.
    fn retire(&mut self) {
        if let Some(active) = self.current.take() {
            if let Err(e) = active.peer.unlink_to_death(active.link) {
                debug!(owner = %active.owner, "unlink_to_death: {}", e);
            }
        }
        self.delivery_cycles = 0;
    }

    // --- Introspection ---

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn active_owner(&self) -> Option<Owner> {
        self.current.as_ref().map(|active| active.owner)
    }

    /// Copy of the target names of the active subscription (empty if none).
    pub fn target_names(&self) -> BTreeSet<String> {
        self.current
            .as_ref()
            .map(|active| active.target_names.clone())
            .unwrap_or_default()
    }

    /// Copy of the target frequencies of the active subscription (empty if none).
    pub fn target_frequencies(&self) -> BTreeSet<Frequency> {
        self.current
            .as_ref()
            .map(|active| active.target_frequencies.clone())
            .unwrap_or_default()
    }

    pub fn delivery_cycles(&self) -> u64 {
        self.delivery_cycles
    }

    // --- Diagnostics ---

    pub fn snapshot(&self) -> Option<SubscriptionSnapshot> {
        self.current.as_ref().map(|active| SubscriptionSnapshot {
            owner: active.owner,
            peer: format!("{:?}", active.peer),
            callback: format!("{:?}", active.callback),
            target_names: active.target_names.iter().cloned().collect(),
            target_frequencies: active.target_frequencies.iter().copied().collect(),
            delivery_cycles: self.delivery_cycles,
        })
    }

    /// Write a human-readable dump of the registry state.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Dump of SubscriptionRegistry")?;
        writeln!(out, "SubscriptionRegistry - Log Begin ----")?;
        match &self.current {
            Some(active) => {
                writeln!(out, "Current external scan subscription:")?;
                writeln!(out, "{}", active)?;
            }
            None => writeln!(out, "No external scan subscription set.")?,
        }
        writeln!(out, "delivery_cycles: {}", self.delivery_cycles)?;
        writeln!(out, "SubscriptionRegistry - Log End ----")
    }

    /// `dump` into a string.
    pub fn dump_to_string(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = self.dump(&mut buf) {
            warn!("dump failed: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{callback_channel, CallbackEvent, CallbackReceiver};
    use crate::liveness::LocalPeer;
    use crate::types::Ssid;

    const OWNER_A: Owner = Owner(10001);
    const OWNER_B: Owner = Owner(10002);

    fn request(
        owner: Owner,
        peer: &Arc<LocalPeer>,
        names: &[&str],
        freqs: &[i32],
    ) -> (SubscribeRequest, CallbackReceiver) {
        let (callback, receiver) = callback_channel(16);
        let ssids: Vec<Ssid> = names.iter().map(|n| Ssid::from_utf8(n).unwrap()).collect();
        let peer: Arc<dyn PeerHandle> = peer.clone();
        let req = SubscribeRequest::new(owner, peer, Box::new(callback), &ssids, freqs).unwrap();
        (req, receiver)
    }

    fn result(name: &str) -> ScanResult {
        ScanResult::new(name, "aa:bb:cc:dd:ee:ff", 2412, -55).unwrap()
    }

    #[test]
    fn test_subscribe_occupies_slot() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[2412, 5180]);

        assert!(registry.subscribe(req));
        assert_eq!(registry.active_owner(), Some(OWNER_A));
        assert_eq!(peer.linked_count(), 1);
        assert_eq!(events.drain(), vec![CallbackEvent::RegisterSuccess]);

        let names: Vec<String> = registry.target_names().into_iter().collect();
        assert_eq!(names, vec!["\"Net-A\"".to_string()]);
        let freqs: Vec<Frequency> = registry.target_frequencies().into_iter().collect();
        assert_eq!(freqs, vec![Frequency(2412), Frequency(5180)]);
    }

    #[test]
    fn test_second_subscribe_rejected_with_reason() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (first, _first_events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(first));

        let (same_owner, same_events) = request(OWNER_A, &peer, &["Net-B"], &[]);
        assert!(!registry.subscribe(same_owner));
        assert_eq!(
            same_events.drain(),
            vec![CallbackEvent::RegisterFailed {
                reason: RegisterFailure::AlreadyRegistered
            }]
        );

        let other_peer = LocalPeer::new("other");
        let (other_owner, other_events) = request(OWNER_B, &other_peer, &["Net-C"], &[]);
        assert!(!registry.subscribe(other_owner));
        assert_eq!(
            other_events.drain(),
            vec![CallbackEvent::RegisterFailed {
                reason: RegisterFailure::ResourceBusy
            }]
        );

        // First subscription untouched, no extra liveness links.
        let names: Vec<String> = registry.target_names().into_iter().collect();
        assert_eq!(names, vec!["\"Net-A\"".to_string()]);
        assert_eq!(peer.linked_count(), 1);
        assert_eq!(other_peer.linked_count(), 0);
    }

    #[test]
    fn test_subscribe_dead_peer_fails_silently() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        peer.kill();

        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(!registry.subscribe(req));
        assert!(!registry.is_active());
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_subscribe_unreachable_callback_releases_link() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        drop(events);

        assert!(!registry.subscribe(req));
        assert!(!registry.is_active());
        assert_eq!(peer.linked_count(), 0);
    }

    #[test]
    fn test_deliver_matching_results_once() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));
        events.drain();

        registry.deliver_results(&[result("Other"), result("Net-A")]);

        assert_eq!(
            events.drain(),
            vec![
                CallbackEvent::ScanResultsAvailable {
                    results: vec![result("Net-A")]
                },
                CallbackEvent::Removed {
                    reason: RemovalReason::ResultsDelivered
                },
            ]
        );
        assert!(!registry.is_active());
        assert_eq!(registry.delivery_cycles(), 0);
        assert_eq!(peer.linked_count(), 0);

        // Slot is empty, later matches go nowhere.
        registry.deliver_results(&[result("Net-A")]);
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_non_matching_batch_keeps_subscription() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[2412]);
        assert!(registry.subscribe(req));
        events.drain();

        registry.deliver_results(&[result("Net-B"), result("net-a")]);
        registry.deliver_results(&[]);

        assert!(registry.is_active());
        assert_eq!(registry.delivery_cycles(), 2);
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_frequency_does_not_gate_delivery() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[5180]);
        assert!(registry.subscribe(req));
        events.drain();

        // Result on 2412 MHz still matches a subscription listing only 5180.
        registry.deliver_results(&[result("Net-A")]);
        assert!(!registry.is_active());
        assert_eq!(events.drain().len(), 2);
    }

    #[test]
    fn test_delivery_to_unreachable_peer_still_retires() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));
        drop(events);

        registry.deliver_results(&[result("Net-A")]);
        assert!(!registry.is_active());
        assert_eq!(peer.linked_count(), 0);
    }

    #[test]
    fn test_unsubscribe_requires_owner() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));
        events.drain();

        assert!(!registry.unsubscribe(OWNER_B));
        assert!(registry.is_active());
        assert!(events.drain().is_empty());

        assert!(registry.unsubscribe(OWNER_A));
        assert!(!registry.is_active());
        assert_eq!(peer.linked_count(), 0);
        assert_eq!(
            events.drain(),
            vec![CallbackEvent::Removed {
                reason: RemovalReason::Unregistered
            }]
        );
    }

    #[test]
    fn test_unsubscribe_unreachable_peer_still_retires() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));
        drop(events);

        assert!(registry.unsubscribe(OWNER_A));
        assert!(!registry.is_active());
        assert_eq!(peer.linked_count(), 0);
    }

    #[test]
    fn test_rejected_subscribe_unreachable_peer() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, _events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));

        let other_peer = LocalPeer::new("other");
        let (rejected, rejected_events) = request(OWNER_B, &other_peer, &["Net-B"], &[]);
        drop(rejected_events);

        assert!(!registry.subscribe(rejected));
        assert!(registry.is_active());
        assert_eq!(registry.active_owner(), Some(OWNER_A));
        assert!(registry.target_names().contains("\"Net-A\""));
        assert_eq!(peer.linked_count(), 1);
        assert_eq!(other_peer.linked_count(), 0);
    }

    #[test]
    fn test_removal_failure_after_delivery_still_retires() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        // Room for the success ack and the results only.
        let (callback, events) = callback_channel(2);
        let dyn_peer: Arc<dyn PeerHandle> = peer.clone();
        let req = SubscribeRequest::new(
            OWNER_A,
            dyn_peer,
            Box::new(callback),
            &[Ssid::from_utf8("Net-A").unwrap()],
            &[],
        )
        .unwrap();
        assert!(registry.subscribe(req));

        registry.deliver_results(&[result("Net-A")]);

        assert!(!registry.is_active());
        assert_eq!(peer.linked_count(), 0);
        assert_eq!(
            events.drain(),
            vec![
                CallbackEvent::RegisterSuccess,
                CallbackEvent::ScanResultsAvailable {
                    results: vec![result("Net-A")]
                },
            ]
        );
    }

    #[test]
    fn test_unsubscribe_empty_slot() {
        let mut registry = SubscriptionRegistry::new();
        assert!(!registry.unsubscribe(OWNER_A));
        assert!(!registry.is_active());
        assert_eq!(registry.delivery_cycles(), 0);
    }

    #[test]
    fn test_peer_death_retires_without_notification() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));
        events.drain();
        registry.deliver_results(&[result("Net-B")]);

        peer.kill();
        // Hook only queued a notice; state changes on the serial context.
        assert!(registry.is_active());
        assert_eq!(registry.process_peer_events(), 1);

        assert!(!registry.is_active());
        assert_eq!(registry.delivery_cycles(), 0);
        assert!(events.drain().is_empty());

        let other_peer = LocalPeer::new("other");
        let (next, _next_events) = request(OWNER_B, &other_peer, &["Net-C"], &[]);
        assert!(registry.subscribe(next));
    }

    #[test]
    fn test_stale_peer_death_ignored() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, _events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(req));
        let stale = PeerLost { generation: 1 };
        assert!(registry.unsubscribe(OWNER_A));

        let (again, _again_events) = request(OWNER_A, &peer, &["Net-A"], &[]);
        assert!(registry.subscribe(again));

        registry.on_peer_lost(stale);
        assert!(registry.is_active());
    }

    #[test]
    fn test_introspection_returns_copies() {
        let mut registry = SubscriptionRegistry::new();
        let peer = LocalPeer::new("app");
        let (req, _events) = request(OWNER_A, &peer, &["Net-A", "Net-B"], &[2412]);
        assert!(registry.subscribe(req));

        let mut names = registry.target_names();
        names.clear();
        names.insert("intruder".to_string());
        let mut freqs = registry.target_frequencies();
        freqs.insert(Frequency(1));

        assert_eq!(registry.target_names().len(), 2);
        assert!(!registry.target_names().contains("intruder"));
        assert_eq!(registry.target_frequencies().len(), 1);
    }

    #[test]
    fn test_introspection_empty_slot() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.target_names().is_empty());
        assert!(registry.target_frequencies().is_empty());
        assert!(registry.snapshot().is_none());
    }

    #[test]
    fn test_dump() {
        let mut registry = SubscriptionRegistry::new();
        let empty = registry.dump_to_string();
        assert!(empty.contains("No external scan subscription set."));
        assert!(empty.contains("delivery_cycles: 0"));

        let peer = LocalPeer::new("app");
        let (req, _events) = request(OWNER_A, &peer, &["Net-A"], &[2412]);
        assert!(registry.subscribe(req));
        registry.deliver_results(&[result("Net-B")]);

        let dump = registry.dump_to_string();
        assert!(dump.contains("Current external scan subscription:"));
        assert!(dump.contains("owner=10001"));
        assert!(dump.contains("peer=LocalPeer(app)"));
        assert!(dump.contains("target_names=[\"Net-A\"]"));
        assert!(dump.contains("frequencies=[2412]"));
        assert!(dump.contains("delivery_cycles: 1"));
        assert!(dump.ends_with("SubscriptionRegistry - Log End ----\n"));
    }

    #[test]
    fn test_drop_releases_link() {
        let peer = LocalPeer::new("app");
        {
            let mut registry = SubscriptionRegistry::new();
            let (req, _events) = request(OWNER_A, &peer, &["Net-A"], &[]);
            assert!(registry.subscribe(req));
            assert_eq!(peer.linked_count(), 1);
        }
        assert_eq!(peer.linked_count(), 0);
    }
}
