//! In-process peer whose death is triggered explicitly.

use super::{DeathHook, LinkId, PeerHandle};
use crate::error::{RegistryError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct PeerState {
    alive: bool,
    hooks: HashMap<LinkId, DeathHook>,
    next_link: u64,
}

/// A peer living in the same process.
///
/// `kill` may be called from any thread; registered hooks run on the
/// calling thread after the internal lock is released.
pub struct LocalPeer {
    name: String,
    state: Mutex<PeerState>,
}

impl LocalPeer {
    /// Create a live peer.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(PeerState {
                alive: true,
                hooks: HashMap::new(),
                next_link: 1,
            }),
        })
    }

    /// Mark the peer dead and fire every linked hook.
    ///
    /// Killing an already-dead peer does nothing.
    pub fn kill(&self) {
        let hooks: Vec<DeathHook> = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            state.hooks.drain().map(|(_, hook)| hook).collect()
        };

        tracing::debug!(peer = %self.name, hooks = hooks.len(), "peer died");
        for hook in hooks {
            hook.fire();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    /// Number of hooks currently linked.
    pub fn linked_count(&self) -> usize {
        self.state.lock().hooks.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PeerHandle for LocalPeer {
    fn link_to_death(&self, hook: DeathHook) -> Result<LinkId> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(RegistryError::PeerDead);
        }
        let link = LinkId(state.next_link);
        state.next_link += 1;
        state.hooks.insert(link, hook);
        Ok(link)
    }

    fn unlink_to_death(&self, link: LinkId) -> Result<()> {
        match self.state.lock().hooks.remove(&link) {
            Some(_) => Ok(()),
            None => Err(RegistryError::NotLinked(link.0)),
        }
    }
}

impl fmt::Debug for LocalPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalPeer({})", self.name)
    }
}
