//! Action/state enums and the pipeline payload models.
//!
//! The payload structs mirror the subjects CI/CD stage handlers talk about: projects,
//! their extensions (databases, buckets, load balancers), releases, git syncs,
//! heartbeats and notifications.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Action & State
// =============================================================================

/// What an event asks for (or reports on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Status => "status",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "status" => Ok(Action::Status),
            other => Err(EventError::UnknownAction(other.to_string())),
        }
    }
}

/// Progress of the logical operation an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Waiting,
    Running,
    Complete,
    Failed,
    Deleted,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Waiting => "waiting",
            State::Running => "running",
            State::Complete => "complete",
            State::Failed => "failed",
            State::Deleted => "deleted",
        }
    }

    /// Complete, failed and deleted are terminal; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Complete | State::Failed | State::Deleted)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(State::Waiting),
            "running" => Ok(State::Running),
            "complete" => Ok(State::Complete),
            "failed" => Ok(State::Failed),
            "deleted" => Ok(State::Deleted),
            other => Err(EventError::UnknownState(other.to_string())),
        }
    }
}

// =============================================================================
// Shared Models
// =============================================================================

/// A project as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub repository: String,
}

/// Repository coordinates for a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Git {
    #[serde(rename = "gitUrl")]
    pub url: String,
    pub protocol: String,
    pub branch: String,
    #[serde(default)]
    pub workdir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_hash: Option<String>,
}

/// A commit range endpoint of a release.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub hash: String,
    #[serde(default)]
    pub parent_hash: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub message: String,
}

/// A secret handed to a release. Never logged by the bus.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Secret {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("key", &self.key)
            .field("value", &"******")
            .field("kind", &self.kind)
            .finish()
    }
}

// =============================================================================
// Payload Models
// =============================================================================

/// A project-scoped extension (database, bucket, load balancer, ...).
///
/// `extension` is the extension key; the event type becomes `project:<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExtension {
    pub id: String,
    pub extension: String,
    pub project: Project,
    pub environment: String,
}

/// A release-scoped extension (image build, deployment, status check, ...).
///
/// The event type becomes `release:<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseExtension {
    pub id: String,
    pub extension: String,
    pub project: Project,
    pub release: Release,
    pub environment: String,
}

/// A release of a project to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: String,
    pub project: Project,
    pub environment: String,
    #[serde(default)]
    pub git: Git,
    #[serde(default)]
    pub head_feature: Feature,
    #[serde(default)]
    pub tail_feature: Feature,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub is_rollback: bool,
}

/// One commit reported by a git sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommit {
    pub repository: String,
    pub user: String,
    pub message: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub hash: String,
    #[serde(default)]
    pub parent_hash: String,
    #[serde(default)]
    pub head: bool,
    pub created: DateTime<Utc>,
}

/// New commits discovered on a project's tracked branch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSync {
    pub project: Project,
    pub git: Git,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub commits: Vec<GitCommit>,
}

/// A periodic tick. The tick name ("minute", "hour") becomes the event slug.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub tick: String,
}

/// A message for humans (chat, email) about a project or release.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub project: Project,
    pub environment: String,
    pub channel: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_and_display() {
        for action in [Action::Create, Action::Update, Action::Delete, Action::Status] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
        assert_eq!(
            "launch".parse::<Action>(),
            Err(EventError::UnknownAction("launch".to_string()))
        );
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&State::Complete).unwrap(), "\"complete\"");
        assert_eq!("deleted".parse::<State>().unwrap(), State::Deleted);
        assert!("done".parse::<State>().is_err());
        assert_eq!(State::default(), State::Waiting);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!State::Waiting.is_terminal());
        assert!(!State::Running.is_terminal());
        assert!(State::Complete.is_terminal());
        assert!(State::Failed.is_terminal());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret {
            key: "DB_PASSWORD".to_string(),
            value: "hunter2".to_string(),
            kind: "env".to_string(),
        };
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("DB_PASSWORD"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_git_url_field_name() {
        let git = Git {
            url: "git@github.com:acme/api.git".to_string(),
            protocol: "SSH".to_string(),
            branch: "main".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&git).unwrap();
        assert_eq!(json["gitUrl"], "git@github.com:acme/api.git");
        assert!(json.get("headHash").is_none());
    }
}
