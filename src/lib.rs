//! # Scan Watch
//!
//! Manages the single background-scan subscription a remote client may
//! hold, delivers the first matching batch of scan results to it, and
//! cleans up when the client goes away.
//!
//! ## Core Concepts
//!
//! - **Subscription**: one owner, one callback, a set of target SSIDs
//! - **Registry**: a single-slot store; a second subscriber is rejected
//! - **Liveness**: a death hook on the peer retires a crashed client's slot
//! - **Service**: a worker thread that serializes every registry operation
//!
//! ## Example
//!
//! ```ignore
//! use scanwatch::{
//!     callback_channel, LocalPeer, Owner, RegistryConfig, RegistryService, ScanResult,
//!     Ssid, SubscribeRequest,
//! };
//!
//! let client = RegistryService::spawn(RegistryConfig::default())?;
//!
//! let (callback, events) = callback_channel(16);
//! let request = SubscribeRequest::new(
//!     Owner(10001),
//!     LocalPeer::new("com.example.app"),
//!     Box::new(callback),
//!     &[Ssid::from_utf8("Net-A")?],
//!     &[2412, 5180],
//! )?;
//! assert!(client.subscribe(request)?);
//!
//! // Result feed
//! client.deliver_results(vec![ScanResult::new("Net-A", "aa:bb:cc:dd:ee:ff", 2412, -50)?])?;
//! ```

pub mod callback;
pub mod error;
pub mod liveness;
pub mod registry;
pub mod service;
pub mod types;

// Re-exports
pub use callback::{
    callback_channel, CallbackEvent, CallbackReceiver, ChannelCallback, ScanResultsCallback,
};
pub use error::{RegistryError, Result};
pub use liveness::{DeathHook, LinkId, LocalPeer, PeerHandle};
pub use registry::{PeerLost, SubscribeRequest, SubscriptionRegistry, SubscriptionSnapshot};
pub use service::{RegistryClient, RegistryConfig, RegistryService};
pub use types::*;
