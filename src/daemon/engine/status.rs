use std::fmt::Display;

use chrono::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    remote::{ActivityId, RemoteError},
    utils::time::format_hms,
};

/// Human readable state changes of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Tracking {
        id: ActivityId,
        name: Option<String>,
    },
    Stopped(ActivityId),
    Paused,
    NotDefined,
    NotTracking,
    Elapsed(Duration),
    RemoteFailure {
        code: Option<u16>,
        message: String,
    },
    Connected(String),
    LinkLost,
    ClosedConnection,
    Unavailable(String),
}

impl From<&RemoteError> for Status {
    fn from(value: &RemoteError) -> Self {
        match value {
            RemoteError::Application { code, message } => Status::RemoteFailure {
                code: Some(*code),
                message: message.clone(),
            },
            other => Status::RemoteFailure {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Tracking { id, name: Some(name) } => {
                write!(f, "Tracking activity: [{id}] {name}")
            }
            Status::Tracking { id, name: None } => write!(f, "Tracking activity: [{id}]"),
            Status::Stopped(id) => write!(f, "Stopped activity: [{id}]"),
            Status::Paused => write!(f, "Paused!"),
            Status::NotDefined => write!(f, "Not defined!"),
            Status::NotTracking => write!(f, "Not tracking"),
            Status::Elapsed(duration) => write!(f, "Tracking time: {}", format_hms(*duration)),
            Status::RemoteFailure {
                code: Some(code),
                message,
            } => write!(f, "Error [{code}]: {message}"),
            Status::RemoteFailure {
                code: None,
                message,
            } => write!(f, "Error: {message}"),
            Status::Connected(address) => write!(f, "Connected to {address}"),
            Status::LinkLost => write!(f, "The connection was lost"),
            Status::ClosedConnection => write!(f, "Closed connection"),
            Status::Unavailable(reason) => write!(f, "Unavailable: {reason}"),
        }
    }
}

/// Receives statuses of the engine. Display layers implement this.
pub trait StatusSink: Send + Sync {
    fn publish(&self, status: Status);
}

/// Writes statuses into the log.
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn publish(&self, status: Status) {
        match status {
            Status::Elapsed(_) => debug!("{status}"),
            Status::RemoteFailure { .. } | Status::LinkLost | Status::Unavailable(_) => {
                warn!("{status}")
            }
            _ => info!("{status}"),
        }
    }
}

/// Forwards statuses to whoever holds the receiving half, e.g. a display.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Status>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Status>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl StatusSink for ChannelSink {
    fn publish(&self, status: Status) {
        if self.sender.send(status).is_err() {
            debug!("Status receiver is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::remote::{ActivityId, RemoteError};

    use super::Status;

    #[test]
    fn status_lines() {
        let tracking = Status::Tracking {
            id: ActivityId::from("12"),
            name: Some("Coding".into()),
        };
        assert_eq!(tracking.to_string(), "Tracking activity: [12] Coding");
        assert_eq!(Status::Paused.to_string(), "Paused!");
        assert_eq!(Status::NotDefined.to_string(), "Not defined!");
        assert_eq!(Status::ClosedConnection.to_string(), "Closed connection");
        assert_eq!(
            Status::Elapsed(Duration::seconds(75)).to_string(),
            "Tracking time: 00:01:15"
        );
    }

    #[test]
    fn remote_errors_keep_their_code() {
        let application = RemoteError::Application {
            code: 400,
            message: "Tracking already started".into(),
        };
        assert_eq!(
            Status::from(&application).to_string(),
            "Error [400]: Tracking already started"
        );
        let transport = RemoteError::Transport("connection refused".into());
        assert_eq!(
            Status::from(&transport).to_string(),
            "Error: connection refused"
        );
    }
}
