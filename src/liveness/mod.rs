//! Peer liveness tracking.
//!
//! The registry never inspects the transport that connects it to a remote
//! client. It only needs a handle that can tell it when the peer goes away:
//! - `link_to_death` registers a one-shot hook fired when the peer dies
//! - `unlink_to_death` releases a hook that has not fired yet
//!
//! Hooks may fire on any thread, so a hook must not touch registry state
//! directly. The registry's hooks only post a notice onto its own queue.

mod local;

pub use local::LocalPeer;

use crate::error::Result;
use std::fmt;

/// Identifies a registered death hook on a peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({})", self.0)
    }
}

/// One-shot callback invoked when a peer dies.
pub struct DeathHook(Box<dyn FnOnce() + Send>);

impl DeathHook {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        DeathHook(Box::new(f))
    }

    /// Consume the hook and run it.
    pub fn fire(self) {
        (self.0)()
    }
}

impl fmt::Debug for DeathHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeathHook")
    }
}

/// Liveness-tracking handle tied to a remote peer's lifetime.
pub trait PeerHandle: Send + Sync + fmt::Debug {
    /// Register a hook fired once when the peer dies.
    ///
    /// Fails with `PeerDead` if the peer is already gone.
    fn link_to_death(&self, hook: DeathHook) -> Result<LinkId>;

    /// Release a previously registered hook.
    ///
    /// Fails with `NotLinked` if the hook already fired or was never
    /// registered. Callers treat that as benign.
    fn unlink_to_death(&self, link: LinkId) -> Result<()>;
}
