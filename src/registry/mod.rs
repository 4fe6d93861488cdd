//! Single-slot subscription registry.
//!
//! At most one subscription exists at a time. Its lifecycle:
//! - `subscribe` admits a request when the slot is empty
//! - `deliver_results` hands matching results to the owner exactly once,
//!   then retires the subscription
//! - `unsubscribe` lets the owner cancel
//! - a peer-death notice retires the subscription silently
//!
//! # Example
//!
//! ```ignore
//! let mut registry = SubscriptionRegistry::new();
//! let peer = LocalPeer::new("com.example.app");
//! let (callback, events) = callback_channel(16);
//!
//! let request = SubscribeRequest::new(
//!     Owner(10001),
//!     peer,
//!     Box::new(callback),
//!     &[Ssid::from_utf8("Net-A")?],
//!     &[2412],
//! )?;
//! assert!(registry.subscribe(request));
//!
//! registry.deliver_results(&[ScanResult::new("Net-A", "aa:bb:cc:dd:ee:ff", 2412, -50)?]);
//! // events: RegisterSuccess, ScanResultsAvailable, Removed(ResultsDelivered)
//! ```

mod manager;
mod types;

pub use manager::SubscriptionRegistry;
pub use types::{PeerLost, SubscribeRequest, SubscriptionSnapshot};
