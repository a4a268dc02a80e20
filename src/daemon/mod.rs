use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use collection::{poller::LinkPollingModule, timer::SyncTimerModule};
use engine::{
    events::EngineEvent,
    reconcile::Reconciler,
    status::{Status, StatusSink, TracingSink},
    EngineModule,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::Settings,
    link::{default_link, session::SessionManager, DeviceLink},
    remote::{remote_from_settings, RemoteTracking},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod engine;
pub mod shutdown;

const EVENT_QUEUE_SIZE: usize = 32;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    let settings = Settings::load(&dir);
    info!("Starting engine with settings from {:?}", Settings::path(&dir));

    let sink = TracingSink;
    let link = match settings.device_address() {
        Ok(_) => match default_link().await {
            Ok(link) => Some(link),
            Err(e) => {
                sink.publish(Status::Unavailable(format!("device link: {e}")));
                None
            }
        },
        Err(e) => {
            sink.publish(Status::Unavailable(e.to_string()));
            None
        }
    };
    let remote = remote_from_settings(&settings);

    let shutdown_token = CancellationToken::new();
    let modules = create_modules(
        &settings,
        link,
        remote,
        Box::new(sink),
        &shutdown_token,
        DefaultClock,
    );
    run_modules(modules, shutdown::detect_shutdown(shutdown_token)).await;
    Ok(())
}

struct Modules {
    poller: Option<LinkPollingModule>,
    timer: SyncTimerModule,
    engine: EngineModule,
}

fn create_modules(
    settings: &Settings,
    link: Option<Box<dyn DeviceLink>>,
    remote: Arc<dyn RemoteTracking>,
    sink: Box<dyn StatusSink>,
    shutdown_token: &CancellationToken,
    clock: impl Clock + Clone,
) -> Modules {
    let (sender, receiver) = mpsc::channel::<EngineEvent>(EVENT_QUEUE_SIZE);

    let poller = link.zip(settings.device_address().ok()).map(|(link, address)| {
        LinkPollingModule::new(
            sender.clone(),
            SessionManager::new(link).with_timings(
                settings.scan_window(),
                settings.reconnect_timeout(),
                settings.reconnect_delay(),
            ),
            address.to_string(),
            shutdown_token.clone(),
            settings.poll_timeout(),
            settings.debounce(),
        )
    });

    let timer = SyncTimerModule::new(
        sender,
        remote.clone(),
        shutdown_token.clone(),
        settings.tick_interval(),
        settings.resync_every,
        Box::new(clock.clone()),
    );

    let reconciler = Reconciler::new(remote, sink, Box::new(clock))
        .with_stop_on_link_loss(settings.stop_on_link_loss);

    Modules {
        poller,
        timer,
        engine: EngineModule::new(receiver, reconciler),
    }
}

async fn run_modules(modules: Modules, shutdown: impl std::future::Future<Output = ()>) {
    let Modules {
        poller,
        timer,
        engine,
    } = modules;

    let (_, polling_result, timer_result, engine_result) = tokio::join!(
        shutdown,
        async {
            match poller {
                Some(poller) => poller.run().await,
                None => Ok(()),
            }
        },
        timer.run(),
        engine.run(),
    );

    if let Err(polling_result) = polling_result {
        error!("Link polling module got an error {:?}", polling_result);
    }

    if let Err(timer_result) = timer_result {
        error!("Timer module got an error {:?}", timer_result);
    }

    if let Err(engine_result) = engine_result {
        error!("Engine module got an error {:?}", engine_result);
    }
}

#[cfg(test)]
mod daemon_tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use mockall::Sequence;
    use tokio_util::sync::CancellationToken;

    use crate::{
        config::Settings,
        daemon::{
            create_modules,
            engine::status::{ChannelSink, Status},
            run_modules,
        },
        link::{codec::Face, fake::ScriptedLink, DeviceLink, LinkError},
        remote::{Activity, ActivityId, MockRemoteTracking},
        utils::{clock::TestClock, logging::TEST_LOGGING},
    };

    fn activity(id: &str, face: u8) -> Activity {
        Activity {
            id: ActivityId::from(id),
            name: id.to_uppercase(),
            assigned_face: Some(Face(face)),
        }
    }

    fn expect_call(
        remote: &mut MockRemoteTracking,
        seq: &mut Sequence,
        start: bool,
        id: &'static str,
    ) {
        if start {
            remote
                .expect_start_tracking()
                .withf(move |v, _| v.as_str() == id)
                .times(1)
                .in_sequence(seq)
                .returning(|_, _| Ok(()));
        } else {
            remote
                .expect_stop_tracking()
                .withf(move |v, _| v.as_str() == id)
                .times(1)
                .in_sequence(seq)
                .returning(|_, _| Ok(()));
        }
    }

    /// Runs every module against a scripted device and a mocked service: rotate to "a", repeat,
    /// rotate to "b", lose the link, come back on an unassigned side.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_daemon() {
        *TEST_LOGGING;
        let mut remote = MockRemoteTracking::new();
        remote.expect_lookup_activity_by_face().returning(|face| {
            Ok(match face.0 {
                1 => Some(activity("a", 1)),
                2 => Some(activity("b", 2)),
                _ => None,
            })
        });
        remote.expect_get_current_tracking().returning(|| Ok(None));
        let mut seq = Sequence::new();
        expect_call(&mut remote, &mut seq, true, "a");
        expect_call(&mut remote, &mut seq, false, "a");
        expect_call(&mut remote, &mut seq, true, "b");
        expect_call(&mut remote, &mut seq, false, "b");

        let link = ScriptedLink::with_notifications([
            ScriptedLink::orientation(1),
            ScriptedLink::orientation(1),
            ScriptedLink::orientation(2),
            Err(LinkError::LinkLost),
            ScriptedLink::orientation(3),
        ]);
        let settings = Settings {
            device_mac: "f1:05:a5:9c:2e:9b".into(),
            ..Settings::default()
        };
        let (sink, mut statuses) = ChannelSink::channel();
        let shutdown_token = CancellationToken::new();
        let modules = create_modules(
            &settings,
            Some(Box::new(link) as Box<dyn DeviceLink>),
            std::sync::Arc::new(remote),
            Box::new(sink),
            &shutdown_token,
            TestClock::starting_at(Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap()),
        );

        run_modules(modules, async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            shutdown_token.cancel();
        })
        .await;

        let mut lines = vec![];
        while let Ok(status) = statuses.try_recv() {
            if !matches!(status, Status::Elapsed(_)) {
                lines.push(status.to_string());
            }
        }
        let address = "Connected to f1:05:a5:9c:2e:9b".to_string();
        assert_eq!(
            lines,
            vec![
                address.clone(),
                "Tracking activity: [a] A".into(),
                "Stopped activity: [a]".into(),
                "Tracking activity: [b] B".into(),
                "The connection was lost".into(),
                "Stopped activity: [b]".into(),
                "Paused!".into(),
                address,
                "Paused!".into(),
                "Closed connection".into(),
            ]
        );
    }
}
