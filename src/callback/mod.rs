//! Notification sink back to the subscribing peer.
//!
//! The registry reports four kinds of notification:
//! - registration succeeded
//! - registration failed, with a reason code
//! - matching scan results are available
//! - the subscription was removed, with a reason code
//!
//! Every call may fail when the peer is unreachable. The registry logs and
//! swallows such failures.

mod channel;

pub use channel::{callback_channel, CallbackEvent, CallbackReceiver, ChannelCallback};

use crate::error::Result;
use crate::types::{RegisterFailure, RemovalReason, ScanResult};
use std::fmt;

/// Callback interface implemented by the remote peer's transport.
pub trait ScanResultsCallback: Send + fmt::Debug {
    fn on_register_success(&self) -> Result<()>;

    fn on_register_failed(&self, reason: RegisterFailure) -> Result<()>;

    fn on_scan_results_available(&self, results: &[ScanResult]) -> Result<()>;

    fn on_removed(&self, reason: RemovalReason) -> Result<()>;
}
