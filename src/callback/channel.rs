//! Channel-backed callback sink.

use super::ScanResultsCallback;
use crate::error::{RegistryError, Result};
use crate::types::{RegisterFailure, RemovalReason, ScanResult};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter for callback identities shown in diagnostics.
static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Notifications delivered to the peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackEvent {
    RegisterSuccess,
    RegisterFailed { reason: RegisterFailure },
    ScanResultsAvailable { results: Vec<ScanResult> },
    Removed { reason: RemovalReason },
}

/// Sending half handed to the registry.
///
/// Dropping the paired `CallbackReceiver` makes every notification fail
/// with `PeerUnreachable`.
pub struct ChannelCallback {
    id: u64,
    sender: Sender<CallbackEvent>,
}

impl ChannelCallback {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, event: CallbackEvent) -> Result<()> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RegistryError::CallbackBufferFull),
            Err(TrySendError::Disconnected(_)) => Err(RegistryError::PeerUnreachable),
        }
    }
}

impl ScanResultsCallback for ChannelCallback {
    fn on_register_success(&self) -> Result<()> {
        self.send(CallbackEvent::RegisterSuccess)
    }

    fn on_register_failed(&self, reason: RegisterFailure) -> Result<()> {
        self.send(CallbackEvent::RegisterFailed { reason })
    }

    fn on_scan_results_available(&self, results: &[ScanResult]) -> Result<()> {
        self.send(CallbackEvent::ScanResultsAvailable {
            results: results.to_vec(),
        })
    }

    fn on_removed(&self, reason: RemovalReason) -> Result<()> {
        self.send(CallbackEvent::Removed { reason })
    }
}

impl fmt::Debug for ChannelCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelCallback#{}", self.id)
    }
}

/// Receiving half held by the peer.
pub struct CallbackReceiver {
    receiver: Receiver<CallbackEvent>,
}

impl CallbackReceiver {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<CallbackEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<CallbackEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<CallbackEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every event currently buffered.
    pub fn drain(&self) -> Vec<CallbackEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Create a callback sink with room for `buffer_size` pending events.
pub fn callback_channel(buffer_size: usize) -> (ChannelCallback, CallbackReceiver) {
    let (sender, receiver) = bounded(buffer_size);
    let callback = ChannelCallback {
        id: NEXT_CALLBACK_ID.fetch_add(1, Ordering::SeqCst),
        sender,
    };
    (callback, CallbackReceiver { receiver })
}
