//! Core types for scan subscriptions.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum SSID length in bytes.
pub const MAX_SSID_BYTES: usize = 32;

/// Identifier of the principal that requested a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(pub u32);

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owner({})", self.0)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel frequency in MHz.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Frequency(pub i32);

impl fmt::Debug for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MHz", self.0)
    }
}

/// A network name as raw bytes.
///
/// The canonical string form (used for matching) is the UTF-8 text wrapped
/// in double quotes when the bytes decode, and lowercase hex otherwise.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>")]
pub struct Ssid(Vec<u8>);

impl Ssid {
    /// Create an SSID from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() > MAX_SSID_BYTES {
            return Err(RegistryError::InvalidSsid(format!(
                "{} bytes exceeds maximum of {}",
                bytes.len(),
                MAX_SSID_BYTES
            )));
        }
        Ok(Ssid(bytes))
    }

    /// Create an SSID from UTF-8 text.
    pub fn from_utf8(text: &str) -> Result<Self> {
        Self::from_bytes(text.as_bytes())
    }

    /// Raw bytes of the SSID.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Canonical string form used as the match key.
    pub fn canonical(&self) -> String {
        match std::str::from_utf8(&self.0) {
            Ok(text) => format!("\"{}\"", text),
            Err(_) => hex::encode(&self.0),
        }
    }
}

impl TryFrom<Vec<u8>> for Ssid {
    type Error = RegistryError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssid({})", self.canonical())
    }
}

/// A single observed network, as handed over by the result feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ssid: Ssid,
    pub bssid: String,
    pub frequency: Frequency,
    /// Signal strength in dBm.
    pub rssi: i32,
}

impl ScanResult {
    /// Create a result for a UTF-8 network name.
    pub fn new(ssid: &str, bssid: &str, frequency: i32, rssi: i32) -> Result<Self> {
        Ok(Self {
            ssid: Ssid::from_utf8(ssid)?,
            bssid: bssid.to_string(),
            frequency: Frequency(frequency),
            rssi,
        })
    }
}

/// Why a subscribe request was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterFailure {
    /// The caller already owns the active subscription.
    AlreadyRegistered,
    /// Another owner holds the only slot.
    ResourceBusy,
}

impl RegisterFailure {
    /// Numeric reason code reported to the peer.
    pub fn code(self) -> i32 {
        match self {
            RegisterFailure::AlreadyRegistered => 1,
            RegisterFailure::ResourceBusy => 2,
        }
    }
}

/// Why a subscription was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Matching results were delivered; the subscription is consumed.
    ResultsDelivered,
    /// The owner cancelled the subscription.
    Unregistered,
}

impl RemovalReason {
    /// Numeric reason code reported to the peer.
    pub fn code(self) -> i32 {
        match self {
            RemovalReason::ResultsDelivered => 1,
            RemovalReason::Unregistered => 2,
        }
    }
}
