//! Contract of the remote time tracking service. [RemoteTracking] is everything the engine
//! needs from it; [timeular::TimeularClient] is the HTTP realization and [UnavailableRemote]
//! stands in when no credentials are configured.

pub mod entities;
pub mod timeular;

use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{
    config::Settings,
    link::codec::Face,
    notes::{Note, Tag},
};

/// Identifier assigned by the remote service. The service returns it either as a string or a
/// number, it is kept as a string either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ActivityId(pub String);

impl ActivityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActivityId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ActivityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(v) => ActivityId(v),
            Raw::Number(v) => ActivityId(v.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub assigned_face: Option<Face>,
}

/// The session currently running on the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSession {
    pub activity_id: ActivityId,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Transport(String),
    #[error("Error [{code}]: {message}")]
    Application { code: u16, message: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Remote tracking unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(value: reqwest::Error) -> Self {
        RemoteError::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(value: serde_json::Error) -> Self {
        RemoteError::Decode(value.to_string())
    }
}

/// Operations of the remote tracking service. Every call may fail with [RemoteError]; callers
/// are not expected to distinguish transport failures from rejected requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTracking: Send + Sync {
    async fn lookup_activity_by_face(&self, face: Face) -> Result<Option<Activity>, RemoteError>;

    async fn lookup_activity_by_id(
        &self,
        id: &ActivityId,
    ) -> Result<Option<Activity>, RemoteError>;

    async fn start_tracking(&self, id: &ActivityId, at: DateTime<Utc>)
        -> Result<(), RemoteError>;

    async fn stop_tracking(&self, id: &ActivityId, at: DateTime<Utc>) -> Result<(), RemoteError>;

    async fn get_current_tracking(&self) -> Result<Option<TrackingSession>, RemoteError>;

    async fn patch_note(&self, id: &ActivityId, note: &Note) -> Result<(), RemoteError>;

    async fn list_tags(&self) -> Result<Vec<Tag>, RemoteError>;
}

/// Used when the remote service can't be reached at all, for example because the credentials
/// are missing. Every call fails with the stored reason.
pub struct UnavailableRemote {
    reason: String,
}

impl UnavailableRemote {
    pub fn new(reason: impl Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    fn fail<T>(&self) -> Result<T, RemoteError> {
        Err(RemoteError::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl RemoteTracking for UnavailableRemote {
    async fn lookup_activity_by_face(&self, _face: Face) -> Result<Option<Activity>, RemoteError> {
        self.fail()
    }

    async fn lookup_activity_by_id(
        &self,
        _id: &ActivityId,
    ) -> Result<Option<Activity>, RemoteError> {
        self.fail()
    }

    async fn start_tracking(
        &self,
        _id: &ActivityId,
        _at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        self.fail()
    }

    async fn stop_tracking(&self, _id: &ActivityId, _at: DateTime<Utc>) -> Result<(), RemoteError> {
        self.fail()
    }

    async fn get_current_tracking(&self) -> Result<Option<TrackingSession>, RemoteError> {
        self.fail()
    }

    async fn patch_note(&self, _id: &ActivityId, _note: &Note) -> Result<(), RemoteError> {
        self.fail()
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, RemoteError> {
        self.fail()
    }
}

/// Builds the client described by `settings`, or an [UnavailableRemote] when that's impossible.
pub fn remote_from_settings(settings: &Settings) -> Arc<dyn RemoteTracking> {
    let client = settings
        .credentials()
        .map_err(|e| e.to_string())
        .and_then(|credentials| {
            timeular::TimeularClient::new(&settings.base_url, credentials)
                .map(|client| client.with_activity_ttl(settings.activity_ttl()))
                .map_err(|e| e.to_string())
        });
    match client {
        Ok(client) => Arc::new(client),
        Err(reason) => {
            warn!("Remote tracking is disabled: {reason}");
            Arc::new(UnavailableRemote::new(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{config::ConfigError, link::codec::Face};

    use super::{ActivityId, RemoteError, RemoteTracking, UnavailableRemote};

    #[test]
    fn activity_id_accepts_numbers() {
        let id: ActivityId = serde_json::from_str("123").unwrap();
        assert_eq!(id, ActivityId::from("123"));
        let id: ActivityId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn application_error_formats_like_status_line() {
        let error = RemoteError::Application {
            code: 404,
            message: "Activity not found".into(),
        };
        assert_eq!(error.to_string(), "Error [404]: Activity not found");
    }

    #[tokio::test]
    async fn unavailable_remote_fails_every_call() {
        let remote = UnavailableRemote::new(ConfigError::MissingCredentials);
        let result = remote.lookup_activity_by_face(Face(1)).await;
        assert!(matches!(result, Err(RemoteError::Unavailable(reason)) if reason.contains("API key")));
        assert!(remote.get_current_tracking().await.is_err());
    }
}
