use ansi_term::Colour;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    daemon::engine::elapsed::elapsed_since,
    notes::{Note, TagTable},
    remote::RemoteTracking,
    utils::time::format_hms,
};

/// Describes what the remote service is tracking right now. Returns the lines to print.
pub async fn describe_current_tracking(
    remote: &dyn RemoteTracking,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let Some(session) = remote.get_current_tracking().await? else {
        return Ok(vec![Colour::Yellow.paint("Not tracking").to_string()]);
    };

    let name = remote
        .lookup_activity_by_id(&session.activity_id)
        .await?
        .map(|v| format!(" {}", v.name))
        .unwrap_or_default();

    let mut lines = vec![format!(
        "{} [{}]{name}",
        Colour::Green.paint("Tracking activity:"),
        session.activity_id
    )];
    if let Some(elapsed) = elapsed_since(session.started_at, now) {
        lines.push(format!("Tracking time: {}", format_hms(elapsed)));
    }
    Ok(lines)
}

/// Resolves `#tags` of `text` against the tags of the account and attaches the note to the
/// current tracking.
pub async fn attach_note(remote: &dyn RemoteTracking, text: &str) -> Result<Note> {
    let session = remote
        .get_current_tracking()
        .await?
        .ok_or_else(|| anyhow!("Nothing is tracked, there is nothing to attach a note to"))?;
    let table: TagTable = remote.list_tags().await?.into_iter().collect();
    if table.is_empty() {
        warn!("The account has no tags, the note is stored as plain text");
    } else {
        debug!("Resolving tags against {} labels", table.len());
    }
    let note = Note::parse(text, &table);
    remote.patch_note(&session.activity_id, &note).await?;
    Ok(note)
}
