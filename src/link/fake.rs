//! Scripted [DeviceLink] used by tests of the session manager and the polling module.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use super::{Characteristic, DeviceLink, DiscoveredDevice, LinkError, RawNotification};

#[derive(Debug, Default)]
pub struct LinkLog {
    pub discoveries: usize,
    pub connects: usize,
    pub disconnects: usize,
    pub subscriptions: Vec<Characteristic>,
}

#[derive(Default)]
pub struct ScriptedLink {
    /// Outcome of each discovery in order, an exhausted script means the device is visible.
    pub discoverable: VecDeque<bool>,
    /// Outcome of each wait in order, an exhausted script waits out the timeout.
    pub notifications: VecDeque<Result<Option<RawNotification>, LinkError>>,
    /// Delay before each scripted notification is delivered.
    pub pace: Duration,
    /// Connecting "succeeds" on the device side and then fails with this error.
    pub failing_connect: Option<LinkError>,
    pub failing_subscription: Option<Characteristic>,
    pub failing_disconnect: bool,
    pub log: Arc<Mutex<LinkLog>>,
}

impl ScriptedLink {
    pub fn orientation(face: u8) -> Result<Option<RawNotification>, LinkError> {
        Ok(Some(RawNotification {
            characteristic: Characteristic::Orientation,
            payload: vec![face],
        }))
    }

    pub fn with_notifications(
        notifications: impl IntoIterator<Item = Result<Option<RawNotification>, LinkError>>,
    ) -> Self {
        Self {
            notifications: notifications.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DeviceLink for ScriptedLink {
    async fn discover(&mut self, _address: &str, _window: Duration) -> Result<bool, LinkError> {
        self.log.lock().unwrap().discoveries += 1;
        Ok(self.discoverable.pop_front().unwrap_or(true))
    }

    async fn connect(&mut self, _address: &str) -> Result<(), LinkError> {
        self.log.lock().unwrap().connects += 1;
        match &self.failing_connect {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn subscribe(&mut self, characteristic: Characteristic) -> Result<(), LinkError> {
        if self.failing_subscription == Some(characteristic) {
            return Err(LinkError::Backend("rejected".into()));
        }
        self.log.lock().unwrap().subscriptions.push(characteristic);
        Ok(())
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RawNotification>, LinkError> {
        if self.notifications.is_empty() || self.pace > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        self.notifications.pop_front().unwrap_or(Ok(None))
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.log.lock().unwrap().disconnects += 1;
        if self.failing_disconnect {
            return Err(LinkError::Backend("teardown failed".into()));
        }
        Ok(())
    }

    async fn scan(&mut self, _window: Duration) -> Result<Vec<DiscoveredDevice>, LinkError> {
        Ok(vec![])
    }
}
