use chrono::{DateTime, Utc};

use crate::{link::codec::Face, remote::TrackingSession};

/// Everything the engine reacts to. Produced by the link polling and timer modules, consumed by
/// a single [super::EngineModule].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    FaceChanged(Face),
    /// Result of asking the remote service what it is tracking. `observed_at` is taken before
    /// the request was sent.
    ExternalTrackingObserved {
        session: Option<TrackingSession>,
        observed_at: DateTime<Utc>,
    },
    Link(LinkEvent),
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected { address: String },
    Lost,
    Closed,
}
