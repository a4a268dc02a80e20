use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{Mutex, OnceCell, RwLock},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::Credentials,
    link::codec::Face,
    notes::{Note, Tag},
    utils::time::to_api_timestamp,
};

use super::{
    entities::{
        ActivitiesResponse, CurrentTrackingResponse, NoteEntity, PatchTrackingRequest,
        SignInRequest, SignInResponse, StartRequest, StopRequest, TagsResponse,
    },
    Activity, ActivityId, RemoteError, RemoteTracking, TrackingSession,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ACTIVITY_TTL: Duration = Duration::from_secs(60);

/// Anything in this range is a success, everything else is reported as an application error.
const SUCCESS_CODES: std::ops::RangeInclusive<u16> = 200..=226;

struct CachedActivities {
    fetched: Instant,
    activities: Arc<[Activity]>,
}

/// HTTP client for the Timeular v2 API. Signs in lazily and signs in again whenever the
/// service answers with 401.
pub struct TimeularClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    token: RwLock<Option<String>>,
    activities: Mutex<Option<CachedActivities>>,
    activity_ttl: Duration,
    tags: OnceCell<Vec<Tag>>,
}

impl TimeularClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: RwLock::new(None),
            activities: Mutex::new(None),
            activity_ttl: DEFAULT_ACTIVITY_TTL,
            tags: OnceCell::new(),
        })
    }

    pub fn with_activity_ttl(self, activity_ttl: Duration) -> Self {
        Self {
            activity_ttl,
            ..self
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    #[instrument(skip(self))]
    async fn sign_in(&self) -> Result<String, RemoteError> {
        let response = self
            .http
            .post(self.url("/developer/sign-in"))
            .json(&SignInRequest {
                api_key: &self.credentials.api_key,
                api_secret: &self.credentials.api_secret,
            })
            .send()
            .await?;
        let SignInResponse { token } = serde_json::from_str(&read_body(response).await?)?;
        *self.token.write().await = Some(token.clone());
        info!("Signed in to {}", self.base_url);
        Ok(token)
    }

    async fn token(&self) -> Result<String, RemoteError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.sign_in().await
    }

    async fn send(
        &self,
        method: Method,
        route: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<Response, RemoteError> {
        let mut request = self.http.request(method, self.url(route)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn request(
        &self,
        method: Method,
        route: &str,
        body: Option<impl Serialize>,
    ) -> Result<String, RemoteError> {
        let body = body.map(serde_json::to_value).transpose()?;
        let token = self.token().await?;
        debug!("{method} {route}");
        let mut response = self.send(method.clone(), route, body.as_ref(), &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Token was rejected, signing in again");
            let token = self.sign_in().await?;
            response = self.send(method, route, body.as_ref(), &token).await?;
        }
        read_body(response).await
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, RemoteError> {
        let body = self.request(Method::GET, route, None::<()>).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn activities(&self) -> Result<Arc<[Activity]>, RemoteError> {
        let mut cache = self.activities.lock().await;
        if let Some(cached) = cache
            .as_ref()
            .filter(|v| v.fetched.elapsed() < self.activity_ttl)
        {
            return Ok(cached.activities.clone());
        }

        let response: ActivitiesResponse = self.get("/activities").await?;
        let activities: Arc<[Activity]> = response
            .activities
            .into_iter()
            .map(Activity::from)
            .collect();
        debug!("Fetched {} activities", activities.len());
        *cache = Some(CachedActivities {
            fetched: Instant::now(),
            activities: activities.clone(),
        });
        Ok(activities)
    }
}

#[async_trait]
impl RemoteTracking for TimeularClient {
    async fn lookup_activity_by_face(&self, face: Face) -> Result<Option<Activity>, RemoteError> {
        Ok(self
            .activities()
            .await?
            .iter()
            .find(|v| v.assigned_face == Some(face))
            .cloned())
    }

    async fn lookup_activity_by_id(
        &self,
        id: &ActivityId,
    ) -> Result<Option<Activity>, RemoteError> {
        Ok(self
            .activities()
            .await?
            .iter()
            .find(|v| &v.id == id)
            .cloned())
    }

    async fn start_tracking(
        &self,
        id: &ActivityId,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let body = StartRequest {
            started_at: to_api_timestamp(at),
        };
        self.request(Method::POST, &format!("/tracking/{id}/start"), Some(body))
            .await?;
        Ok(())
    }

    async fn stop_tracking(&self, id: &ActivityId, at: DateTime<Utc>) -> Result<(), RemoteError> {
        let body = StopRequest {
            stopped_at: to_api_timestamp(at),
        };
        self.request(Method::POST, &format!("/tracking/{id}/stop"), Some(body))
            .await?;
        Ok(())
    }

    async fn get_current_tracking(&self) -> Result<Option<TrackingSession>, RemoteError> {
        let response: CurrentTrackingResponse = self.get("/tracking").await?;
        Ok(response.current_tracking.map(TrackingSession::from))
    }

    async fn patch_note(&self, id: &ActivityId, note: &Note) -> Result<(), RemoteError> {
        let body = PatchTrackingRequest {
            note: NoteEntity::from(note),
        };
        self.request(Method::PATCH, &format!("/tracking/{id}"), Some(body))
            .await?;
        Ok(())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, RemoteError> {
        self.tags
            .get_or_try_init(|| async {
                let response: TagsResponse = self.get("/tags-and-mentions").await?;
                Ok::<_, RemoteError>(response.tags.into_iter().map(Tag::from).collect())
            })
            .await
            .cloned()
    }
}

async fn read_body(response: Response) -> Result<String, RemoteError> {
    let code = response.status().as_u16();
    let text = response.text().await?;
    if SUCCESS_CODES.contains(&code) {
        Ok(text)
    } else {
        Err(RemoteError::Application {
            code,
            message: error_message(&text),
        })
    }
}

/// The service describes failures as `{"message": "..."}`. Anything else is passed through.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
