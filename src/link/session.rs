use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{Characteristic, DeviceLink, LinkError, RawNotification};

/// The tracker advertises often, a couple of seconds of scanning is enough to spot it.
const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(2);
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Discovering,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Notification(RawNotification),
    Timeout,
    LinkLost,
}

/// Keeps a single device connected. Owns the transport exclusively, so it is meant to live in
/// one task.
pub struct SessionManager {
    link: Box<dyn DeviceLink>,
    address: Option<String>,
    state: LinkState,
    scan_window: Duration,
    attempt_timeout: Duration,
    retry_delay: Duration,
}

impl SessionManager {
    pub fn new(link: Box<dyn DeviceLink>) -> Self {
        Self {
            link,
            address: None,
            state: LinkState::Disconnected,
            scan_window: DEFAULT_SCAN_WINDOW,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_timings(
        self,
        scan_window: Duration,
        attempt_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            scan_window,
            attempt_timeout,
            retry_delay,
            ..self
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Address used by the last [Self::connect] call. Reconnection always targets it.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Finds the device, connects and enables orientation notifications.
    #[instrument(skip(self))]
    pub async fn connect(&mut self, address: &str) -> Result<(), LinkError> {
        self.address = Some(address.to_string());
        self.state = LinkState::Discovering;

        match self.establish(address).await {
            Ok(()) => {
                self.state = LinkState::Connected;
                info!("Connected to {address}");
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                Err(e)
            }
        }
    }

    async fn establish(&mut self, address: &str) -> Result<(), LinkError> {
        if !self.link.discover(address, self.scan_window).await? {
            return Err(LinkError::DeviceUnreachable(address.to_string()));
        }
        // Anything past discovery may have left a half open connection behind.
        if let Err(e) = self.open(address).await {
            self.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    async fn open(&mut self, address: &str) -> Result<(), LinkError> {
        self.link.connect(address).await?;
        self.link
            .subscribe(Characteristic::Orientation)
            .await
            .map_err(|e| match e {
                LinkError::SubscriptionFailed(_) => e,
                other => LinkError::SubscriptionFailed(other.to_string()),
            })?;
        if let Err(e) = self.link.subscribe(Characteristic::BatteryLevel).await {
            warn!("Battery level notifications are unavailable: {e}");
        }
        Ok(())
    }

    /// Blocks up to `timeout`. A lost link leaves the manager [LinkState::Disconnected]; the
    /// caller is expected to [Self::reconnect].
    pub async fn wait_for_notification(&mut self, timeout: Duration) -> WaitOutcome {
        if self.state != LinkState::Connected {
            return WaitOutcome::LinkLost;
        }
        match self.link.wait_for_notification(timeout).await {
            Ok(Some(notification)) => WaitOutcome::Notification(notification),
            Ok(None) => WaitOutcome::Timeout,
            Err(e) => {
                warn!("Lost connection: {e}");
                self.disconnect().await;
                WaitOutcome::LinkLost
            }
        }
    }

    /// Rediscovers the last address until it connects again. Returns false only when `shutdown`
    /// fires first.
    pub async fn reconnect(&mut self, shutdown: &CancellationToken) -> bool {
        let Some(address) = self.address.clone() else {
            error!("Reconnect requested before any connection was made");
            return false;
        };

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            debug!("Reconnect attempt {attempt} to {address}");
            let result = select! {
                _ = shutdown.cancelled() => return false,
                result = tokio::time::timeout(self.attempt_timeout, self.connect(&address)) => result,
            };
            match result {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => warn!("Reconnect attempt {attempt} failed: {e}"),
                Err(_) => {
                    warn!("Reconnect attempt {attempt} timed out");
                    self.disconnect().await;
                }
            }

            select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.retry_delay) => (),
            }
        }
    }

    /// Best-effort close. Never fails, can be called any number of times.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.link.disconnect().await {
            warn!("Error while closing connection {e}");
        }
        self.state = LinkState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::link::{fake::ScriptedLink, Characteristic, LinkError};

    use super::{LinkState, SessionManager, WaitOutcome};

    const ADDRESS: &str = "f1:05:a5:9c:2e:9b";

    #[tokio::test]
    async fn connect_subscribes_orientation_and_battery() {
        let link = ScriptedLink::default();
        let log = link.log.clone();
        let mut session = SessionManager::new(Box::new(link));

        session.connect(ADDRESS).await.unwrap();

        assert!(session.is_alive());
        assert_eq!(session.address(), Some(ADDRESS));
        assert_eq!(
            log.lock().unwrap().subscriptions,
            vec![Characteristic::Orientation, Characteristic::BatteryLevel]
        );
    }

    #[tokio::test]
    async fn missing_device_is_unreachable() {
        let link = ScriptedLink {
            discoverable: [false].into(),
            ..ScriptedLink::default()
        };
        let log = link.log.clone();
        let mut session = SessionManager::new(Box::new(link));

        let result = session.connect(ADDRESS).await;

        assert_eq!(result, Err(LinkError::DeviceUnreachable(ADDRESS.into())));
        assert_eq!(session.state(), LinkState::Disconnected);
        assert_eq!(log.lock().unwrap().connects, 0);
    }

    #[tokio::test]
    async fn rejected_orientation_subscription_fails_connect() {
        let link = ScriptedLink {
            failing_subscription: Some(Characteristic::Orientation),
            ..ScriptedLink::default()
        };
        let log = link.log.clone();
        let mut session = SessionManager::new(Box::new(link));

        let result = session.connect(ADDRESS).await;

        assert!(matches!(result, Err(LinkError::SubscriptionFailed(_))));
        assert!(!session.is_alive());
        assert_eq!(log.lock().unwrap().disconnects, 1);
    }

    #[tokio::test]
    async fn failure_after_connecting_closes_the_link() {
        let link = ScriptedLink {
            failing_connect: Some(LinkError::Backend("services unavailable".into())),
            ..ScriptedLink::default()
        };
        let log = link.log.clone();
        let mut session = SessionManager::new(Box::new(link));

        let result = session.connect(ADDRESS).await;

        assert_eq!(
            result,
            Err(LinkError::Backend("services unavailable".into()))
        );
        assert_eq!(session.state(), LinkState::Disconnected);
        let log = log.lock().unwrap();
        assert_eq!(log.connects, 1);
        assert_eq!(log.disconnects, 1);
    }

    #[tokio::test]
    async fn battery_subscription_is_optional() {
        let link = ScriptedLink {
            failing_subscription: Some(Characteristic::BatteryLevel),
            ..ScriptedLink::default()
        };
        let mut session = SessionManager::new(Box::new(link));

        session.connect(ADDRESS).await.unwrap();
        assert!(session.is_alive());
    }

    #[tokio::test]
    async fn link_error_during_wait_is_link_lost() {
        let link = ScriptedLink::with_notifications([
            ScriptedLink::orientation(2),
            Err(LinkError::Backend("disconnected".into())),
        ]);
        let mut session = SessionManager::new(Box::new(link));
        session.connect(ADDRESS).await.unwrap();

        assert!(matches!(
            session.wait_for_notification(Duration::from_millis(10)).await,
            WaitOutcome::Notification(_)
        ));
        assert_eq!(
            session.wait_for_notification(Duration::from_millis(10)).await,
            WaitOutcome::LinkLost
        );
        assert_eq!(session.state(), LinkState::Disconnected);
        assert_eq!(
            session.wait_for_notification(Duration::from_millis(10)).await,
            WaitOutcome::LinkLost
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_link_times_out() {
        let mut session = SessionManager::new(Box::new(ScriptedLink::default()));
        session.connect(ADDRESS).await.unwrap();
        assert_eq!(
            session.wait_for_notification(Duration::from_secs(1)).await,
            WaitOutcome::Timeout
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_retries_until_device_is_back() {
        let link = ScriptedLink {
            discoverable: [true, false, false, true].into(),
            ..ScriptedLink::default()
        };
        let log = link.log.clone();
        let mut session = SessionManager::new(Box::new(link));
        session.connect(ADDRESS).await.unwrap();

        assert!(session.reconnect(&CancellationToken::new()).await);
        assert!(session.is_alive());
        let log = log.lock().unwrap();
        assert_eq!(log.discoveries, 4);
        assert_eq!(log.connects, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_stops_on_shutdown() {
        let link = ScriptedLink {
            discoverable: std::iter::once(true)
                .chain(std::iter::repeat(false).take(1000))
                .collect(),
            ..ScriptedLink::default()
        };
        let mut session = SessionManager::new(Box::new(link));
        session.connect(ADDRESS).await.unwrap();

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        assert!(!session.reconnect(&shutdown).await);
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn reconnect_without_address_gives_up() {
        let mut session = SessionManager::new(Box::new(ScriptedLink::default()));
        assert!(!session.reconnect(&CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn disconnect_swallows_errors_and_is_idempotent() {
        let link = ScriptedLink {
            failing_disconnect: true,
            ..ScriptedLink::default()
        };
        let log = link.log.clone();
        let mut session = SessionManager::new(Box::new(link));
        session.connect(ADDRESS).await.unwrap();

        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.state(), LinkState::Disconnected);
        assert_eq!(log.lock().unwrap().disconnects, 2);
    }
}
