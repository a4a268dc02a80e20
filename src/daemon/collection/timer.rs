use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    daemon::engine::events::EngineEvent, remote::RemoteTracking, utils::clock::Clock,
};

/// Periodically asks the engine to report elapsed time and, every `resync_every` ticks, what the
/// remote service is currently tracking. A failed fetch is simply retried on a later tick.
pub struct SyncTimerModule {
    next: mpsc::Sender<EngineEvent>,
    remote: Arc<dyn RemoteTracking>,
    shutdown: CancellationToken,
    interval: Duration,
    resync_every: u32,
    time_provider: Box<dyn Clock>,
}

impl SyncTimerModule {
    pub fn new(
        next: mpsc::Sender<EngineEvent>,
        remote: Arc<dyn RemoteTracking>,
        shutdown: CancellationToken,
        interval: Duration,
        resync_every: u32,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            remote,
            shutdown,
            interval,
            resync_every: resync_every.max(1),
            time_provider,
        }
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        self.next
            .send(event)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }

    async fn resync(&self) -> Result<()> {
        let observed_at = self.time_provider.time();
        match self.remote.get_current_tracking().await {
            Ok(session) => {
                debug!("Remote is tracking {:?}", session);
                self.send(EngineEvent::ExternalTrackingObserved {
                    session,
                    observed_at,
                })
                .await
            }
            Err(e) => {
                warn!("Couldn't fetch current tracking, retrying later: {e}");
                Ok(())
            }
        }
    }

    /// Executes the timer loop. The first tick resynchronizes immediately.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.time_provider.instant();
        let mut tick: u64 = 0;
        loop {
            if tick % u64::from(self.resync_every) == 0 {
                self.resync().await?;
            }
            self.send(EngineEvent::Tick).await?;

            tick += 1;
            tick_point += self.interval;
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::engine::events::EngineEvent,
        remote::{ActivityId, MockRemoteTracking, RemoteError, TrackingSession},
        utils::clock::TestClock,
    };

    use super::SyncTimerModule;

    #[tokio::test(start_paused = true)]
    async fn ticks_and_resyncs_periodically() {
        let mut remote = MockRemoteTracking::new();
        let mut calls = 0;
        remote.expect_get_current_tracking().times(3).returning(move || {
            calls += 1;
            if calls == 2 {
                return Err(RemoteError::Transport("offline".into()));
            }
            Ok(Some(TrackingSession {
                activity_id: ActivityId::from("a"),
                started_at: None,
            }))
        });

        let (sender, mut receiver) = mpsc::channel(100);
        let shutdown = CancellationToken::new();
        let timer = SyncTimerModule::new(
            sender,
            Arc::new(remote),
            shutdown.clone(),
            Duration::from_secs(2),
            3,
            Box::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap(),
            )),
        );

        let (result, _) = tokio::join!(timer.run(), async {
            // Ticks at 0, 2, ..., 16 seconds: resyncs on ticks 0, 3 and 6.
            tokio::time::sleep(Duration::from_secs(17)).await;
            shutdown.cancel();
        });
        result.unwrap();

        let mut ticks = 0;
        let mut observations = 0;
        while let Ok(event) = receiver.try_recv() {
            match event {
                EngineEvent::Tick => ticks += 1,
                EngineEvent::ExternalTrackingObserved { session, .. } => {
                    assert_eq!(session.unwrap().activity_id, ActivityId::from("a"));
                    observations += 1;
                }
                other => panic!("Unexpected event {other:?}"),
            }
        }
        assert_eq!(ticks, 9);
        assert_eq!(observations, 2);
    }
}
