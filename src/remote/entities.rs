//! Shapes of the JSON documents exchanged with the tracking service.

use serde::{Deserialize, Serialize};

use crate::{
    link::codec::Face,
    notes::{Note, Tag, TagKey},
    utils::time::parse_api_timestamp,
};

use super::{Activity, ActivityId, TrackingSession};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest<'a> {
    pub api_key: &'a str,
    pub api_secret: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SignInResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<ActivityEntity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntity {
    pub id: ActivityId,
    pub name: String,
    #[serde(default)]
    pub device_side: Option<u8>,
}

impl From<ActivityEntity> for Activity {
    fn from(ActivityEntity { id, name, device_side }: ActivityEntity) -> Self {
        Activity {
            id,
            name,
            assigned_face: device_side.map(Face),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub started_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub stopped_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTrackingResponse {
    #[serde(default)]
    pub current_tracking: Option<CurrentTrackingEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTrackingEntity {
    pub activity: ActivityRefEntity,
    #[serde(default)]
    pub started_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityRefEntity {
    pub id: ActivityId,
}

impl From<CurrentTrackingEntity> for TrackingSession {
    fn from(value: CurrentTrackingEntity) -> Self {
        TrackingSession {
            activity_id: value.activity.id,
            started_at: value.started_at.as_deref().and_then(parse_api_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatchTrackingRequest<'a> {
    pub note: NoteEntity<'a>,
}

#[derive(Debug, Serialize)]
pub struct NoteEntity<'a> {
    pub text: &'a str,
    pub tags: Vec<NoteTagEntity<'a>>,
    pub mentions: Vec<NoteTagEntity<'a>>,
}

#[derive(Debug, Serialize)]
pub struct NoteTagEntity<'a> {
    pub indices: [usize; 2],
    pub key: &'a str,
}

impl<'a> From<&'a Note> for NoteEntity<'a> {
    fn from(note: &'a Note) -> Self {
        NoteEntity {
            text: &note.text,
            tags: note
                .tags
                .iter()
                .map(|span| NoteTagEntity {
                    indices: [span.start, span.end],
                    key: span.tag_key.as_str(),
                })
                .collect(),
            mentions: vec![],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub tags: Vec<TagEntity>,
}

#[derive(Debug, Deserialize)]
pub struct TagEntity {
    pub key: String,
    pub label: String,
}

impl From<TagEntity> for Tag {
    fn from(TagEntity { key, label }: TagEntity) -> Self {
        Tag {
            key: TagKey(key),
            label,
        }
    }
}
