//! Contains logic for talking to the tracker. [DeviceLink] is the contract a transport has to
//! implement, [session::SessionManager] keeps one device connected on top of it.

#[cfg(feature = "ble")]
pub mod btle;
pub mod codec;
#[cfg(test)]
pub mod fake;
pub mod session;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Device {0} was not found")]
    DeviceUnreachable(String),
    #[error("Couldn't enable notifications: {0}")]
    SubscriptionFailed(String),
    #[error("Connection to the device was lost")]
    LinkLost,
    #[error("Not connected to a device")]
    NotConnected,
    #[error("Bluetooth backend error: {0}")]
    Backend(String),
}

/// Characteristics of the tracker the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Orientation,
    BatteryLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub characteristic: Characteristic,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: Option<String>,
}

/// Capability set of a wireless transport. Implementations only move bytes; retrying and state
/// tracking happen in [session::SessionManager].
#[async_trait]
pub trait DeviceLink: Send {
    /// Scans for up to `window` and reports whether `address` was seen.
    async fn discover(&mut self, address: &str, window: Duration) -> Result<bool, LinkError>;

    async fn connect(&mut self, address: &str) -> Result<(), LinkError>;

    async fn subscribe(&mut self, characteristic: Characteristic) -> Result<(), LinkError>;

    /// Waits up to `timeout` for the next notification. `Ok(None)` means the timeout passed,
    /// [LinkError::LinkLost] that the connection is gone.
    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RawNotification>, LinkError>;

    async fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Lists every device seen during `window`.
    async fn scan(&mut self, window: Duration) -> Result<Vec<DiscoveredDevice>, LinkError>;
}

/// Creates the transport compiled into this build.
pub async fn default_link() -> Result<Box<dyn DeviceLink>> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "ble")] {
            Ok(Box::new(btle::BtleLink::new().await?))
        } else {
            Err(anyhow::anyhow!("No device transport was compiled in, rebuild with the `ble` feature"))
        }
    }
}
