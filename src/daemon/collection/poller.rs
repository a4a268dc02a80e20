use std::time::Duration;

use anyhow::Result;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    daemon::engine::events::{EngineEvent, LinkEvent},
    link::{
        codec::{self, Face},
        session::{SessionManager, WaitOutcome},
        Characteristic, RawNotification,
    },
};

struct Settled {
    face: Face,
    link_lost: bool,
}

/// Owns the device session. Waits for notifications with a short timeout, decodes them and
/// posts orientation changes to the engine. Reconnects on its own whenever the link drops.
pub struct LinkPollingModule {
    next: mpsc::Sender<EngineEvent>,
    session: SessionManager,
    address: String,
    shutdown: CancellationToken,
    poll_timeout: Duration,
    debounce: Duration,
}

impl LinkPollingModule {
    pub fn new(
        next: mpsc::Sender<EngineEvent>,
        session: SessionManager,
        address: String,
        shutdown: CancellationToken,
        poll_timeout: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            next,
            session,
            address,
            shutdown,
            poll_timeout,
            debounce,
        }
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        let span = info_span!("Forwarding link event");
        debug!("Sending event {:?}", event);
        self.next
            .send(event)
            .instrument(span)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }

    async fn connected(&self) -> Result<()> {
        self.send(EngineEvent::Link(LinkEvent::Connected {
            address: self.address.clone(),
        }))
        .await
    }

    /// First connection. Falls back to the reconnect loop when the device isn't around yet.
    async fn connect_first(&mut self) -> bool {
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return false,
            result = self.session.connect(&self.address) => result,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Couldn't connect to {}: {e}", self.address);
                self.session.reconnect(&self.shutdown).await
            }
        }
    }

    /// Reports the loss and blocks until the device is back. False means shutdown.
    async fn recover(&mut self) -> Result<bool> {
        self.send(EngineEvent::Link(LinkEvent::Lost)).await?;
        if self.session.reconnect(&self.shutdown).await {
            self.connected().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Waits until the orientation stops changing for `debounce` and returns the last face.
    async fn settle(&mut self, face: Face) -> Settled {
        let mut settled = Settled {
            face,
            link_lost: false,
        };
        if self.debounce.is_zero() {
            return settled;
        }

        let mut deadline = Instant::now() + self.debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                outcome = self.session.wait_for_notification(remaining) => outcome,
            };
            match outcome {
                WaitOutcome::Notification(RawNotification {
                    characteristic: Characteristic::Orientation,
                    payload,
                }) => {
                    if let Ok(face) = codec::decode(&payload) {
                        if face != settled.face {
                            debug!("Orientation still moving, now {face}");
                            settled.face = face;
                            deadline = Instant::now() + self.debounce;
                        }
                    }
                }
                WaitOutcome::Notification(other) => log_battery(&other),
                WaitOutcome::Timeout => break,
                WaitOutcome::LinkLost => {
                    settled.link_lost = true;
                    break;
                }
            }
        }
        settled
    }

    /// Returns false when polling should stop.
    async fn forward(&mut self, notification: RawNotification) -> Result<bool> {
        if notification.characteristic != Characteristic::Orientation {
            log_battery(&notification);
            return Ok(true);
        }

        match codec::decode(&notification.payload) {
            Ok(face) => {
                info!("Current side up is {face}");
                let settled = self.settle(face).await;
                self.send(EngineEvent::FaceChanged(settled.face)).await?;
                if settled.link_lost {
                    return self.recover().await;
                }
            }
            Err(e) => warn!(
                "Dropping orientation notification {:?}: {e}",
                notification.payload
            ),
        }
        Ok(true)
    }

    /// Executes the polling loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        if self.connect_first().await {
            self.connected().await?;

            loop {
                let outcome = tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    outcome = self.session.wait_for_notification(self.poll_timeout) => outcome,
                };

                let keep_polling = match outcome {
                    WaitOutcome::Notification(notification) => self.forward(notification).await?,
                    WaitOutcome::Timeout => true,
                    WaitOutcome::LinkLost => self.recover().await?,
                };
                if !keep_polling {
                    break;
                }
            }
        }

        self.session.disconnect().await;
        self.send(EngineEvent::Link(LinkEvent::Closed)).await?;
        Ok(())
    }
}

fn log_battery(notification: &RawNotification) {
    match codec::decode_battery(&notification.payload) {
        Ok(level) => info!("Battery level is {level}%"),
        Err(e) => warn!("Dropping battery notification: {e}"),
    }
}
