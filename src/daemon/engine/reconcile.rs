use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    link::codec::Face,
    remote::{Activity, ActivityId, RemoteError, RemoteTracking, TrackingSession},
    utils::clock::Clock,
};

use super::{
    elapsed::elapsed_since,
    events::{EngineEvent, LinkEvent},
    status::{Status, StatusSink},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Most recently decoded orientation, assigned or not.
    pub last_face: Option<Face>,
    /// Activity started (or adopted) and not stopped yet.
    pub active_activity_id: Option<ActivityId>,
    pub session_started_at: Option<DateTime<Utc>>,
}

/// Turns orientation changes and remote observations into start/stop calls.
///
/// Not safe to drive from several tasks: exactly one consumer owns it and feeds it events in
/// order. Remote failures never abort processing, they are published as statuses.
pub struct Reconciler {
    state: EngineState,
    /// Set when `last_face` must not be used to skip the next identical face, e.g. after a
    /// failed start or after tracking was stopped because of a lost link.
    face_stale: bool,
    last_transition: Option<DateTime<Utc>>,
    stop_on_link_loss: bool,
    remote: Arc<dyn RemoteTracking>,
    sink: Box<dyn StatusSink>,
    clock: Box<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteTracking>,
        sink: Box<dyn StatusSink>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            state: EngineState::default(),
            face_stale: false,
            last_transition: None,
            stop_on_link_loss: true,
            remote,
            sink,
            clock,
        }
    }

    pub fn with_stop_on_link_loss(self, stop_on_link_loss: bool) -> Self {
        Self {
            stop_on_link_loss,
            ..self
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub async fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::FaceChanged(face) => self.on_face_changed(face).await,
            EngineEvent::ExternalTrackingObserved {
                session,
                observed_at,
            } => self.adopt(session, observed_at).await,
            EngineEvent::Link(link) => self.on_link(link).await,
            EngineEvent::Tick => self.on_tick(),
        }
    }

    fn publish(&self, status: Status) {
        self.sink.publish(status);
    }

    fn publish_failure(&self, action: &str, error: &RemoteError) {
        warn!("Failed to {action}: {error}");
        self.publish(Status::from(error));
    }

    #[instrument(skip(self))]
    async fn on_face_changed(&mut self, face: Face) {
        if self.state.last_face == Some(face) && !self.face_stale {
            debug!("Face {face} is already handled");
            return;
        }
        self.face_stale = false;
        let previous_face = self.state.last_face.replace(face);

        let activity = match self.remote.lookup_activity_by_face(face).await {
            Ok(v) => v,
            Err(e) => {
                self.face_stale = true;
                self.publish_failure("look up activity", &e);
                return;
            }
        };

        match activity {
            Some(activity) => self.switch_to(activity).await,
            None => {
                if let Some(active) = self.state.active_activity_id.take() {
                    let now = self.clock.time();
                    self.stop(active, now).await;
                    self.publish(Status::Paused);
                } else if previous_face.is_none() {
                    self.publish(Status::NotDefined);
                } else {
                    self.publish(Status::Paused);
                }
            }
        }
    }

    async fn switch_to(&mut self, activity: Activity) {
        if self.state.active_activity_id.as_ref() == Some(&activity.id) {
            debug!("{} is already tracked", activity.id);
            return;
        }

        let now = self.clock.time();
        if let Some(active) = self.state.active_activity_id.take() {
            self.stop(active, now).await;
        }

        self.last_transition = Some(now);
        match self.remote.start_tracking(&activity.id, now).await {
            Ok(()) => {
                info!("Started {} ({})", activity.name, activity.id);
                self.state.active_activity_id = Some(activity.id.clone());
                self.state.session_started_at = Some(now);
                self.publish(Status::Tracking {
                    id: activity.id,
                    name: Some(activity.name),
                });
            }
            Err(e) => {
                self.face_stale = true;
                self.publish_failure("start tracking", &e);
            }
        }
    }

    /// `id` must already be taken out of the state, so a failing stop is never retried.
    async fn stop(&mut self, id: ActivityId, at: DateTime<Utc>) {
        self.state.session_started_at = None;
        self.last_transition = Some(at);
        match self.remote.stop_tracking(&id, at).await {
            Ok(()) => self.publish(Status::Stopped(id)),
            Err(e) => self.publish_failure("stop tracking", &e),
        }
    }

    async fn adopt(&mut self, session: Option<TrackingSession>, observed_at: DateTime<Utc>) {
        if self.last_transition.is_some_and(|v| observed_at <= v) {
            debug!("Ignoring tracking observed at {observed_at}, state changed since");
            return;
        }

        let Some(session) = session else {
            if let Some(id) = self.state.active_activity_id.take() {
                info!("{id} is no longer tracked remotely");
                self.state.session_started_at = None;
                self.last_transition = Some(observed_at);
                self.publish(Status::NotTracking);
            }
            return;
        };

        if self.state.active_activity_id.as_ref() == Some(&session.activity_id) {
            if session.started_at.is_some() {
                self.state.session_started_at = session.started_at;
            }
            return;
        }

        info!("Adopting running session of {}", session.activity_id);
        let name = match self.remote.lookup_activity_by_id(&session.activity_id).await {
            Ok(activity) => activity.map(|v| v.name),
            Err(e) => {
                warn!("Couldn't resolve adopted activity: {e}");
                None
            }
        };
        self.state.active_activity_id = Some(session.activity_id.clone());
        self.state.session_started_at = session.started_at;
        self.last_transition = Some(observed_at);
        self.publish(Status::Tracking {
            id: session.activity_id,
            name,
        });
    }

    async fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { address } => {
                self.publish(Status::Connected(address));
                let observed_at = self.clock.time();
                match self.remote.get_current_tracking().await {
                    Ok(session) => self.adopt(session, observed_at).await,
                    Err(e) => self.publish_failure("fetch current tracking", &e),
                }
            }
            LinkEvent::Lost => {
                self.publish(Status::LinkLost);
                if self.stop_on_link_loss {
                    self.face_stale = true;
                    if let Some(active) = self.state.active_activity_id.take() {
                        let now = self.clock.time();
                        self.stop(active, now).await;
                        self.publish(Status::Paused);
                    }
                }
            }
            LinkEvent::Closed => self.publish(Status::ClosedConnection),
        }
    }

    fn on_tick(&self) {
        if self.state.active_activity_id.is_none() {
            return;
        }
        if let Some(elapsed) = elapsed_since(self.state.session_started_at, self.clock.time()) {
            self.publish(Status::Elapsed(elapsed));
        }
    }
}
