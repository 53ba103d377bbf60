use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::progression::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Hack,
    Routine,
    Level,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 3] = [SubjectKind::Hack, SubjectKind::Routine, SubjectKind::Level];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Hack => "hack",
            SubjectKind::Routine => "routine",
            SubjectKind::Level => "level",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hack" | "hacks" | "h" => Some(SubjectKind::Hack),
            "routine" | "routines" | "r" => Some(SubjectKind::Routine),
            "level" | "levels" | "l" => Some(SubjectKind::Level),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubjectKind::Hack => "Hack",
            SubjectKind::Routine => "Routine",
            SubjectKind::Level => "Level",
        }
    }

    /// Section name used by the anonymous local store payload.
    pub fn section(&self) -> &'static str {
        match self {
            SubjectKind::Hack => "hacks",
            SubjectKind::Routine => "routines",
            SubjectKind::Level => "levels",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: i64,
}

impl SubjectRef {
    pub fn new(kind: SubjectKind, id: i64) -> Self {
        Self { kind, id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub kind: SubjectKind,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub level_id: Option<i64>,
    pub created_at: String,
}

impl Subject {
    pub fn subject_ref(&self) -> SubjectRef {
        SubjectRef::new(self.kind, self.id)
    }
}

/// `subject_id` stays locked until `required_id` is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrerequisiteEdge {
    pub subject_id: i64,
    pub required_id: i64,
}

impl PrerequisiteEdge {
    pub fn new(subject_id: i64, required_id: i64) -> Self {
        Self {
            subject_id,
            required_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Actor {
    User(String),
    Anonymous,
}

impl Actor {
    pub fn from_user(user: Option<String>) -> Self {
        match user {
            Some(id) if !id.trim().is_empty() => Actor::User(id.trim().to_string()),
            _ => Actor::Anonymous,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::User(id) => Some(id),
            Actor::Anonymous => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Actor::Anonymous)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user '{}'", id),
            Actor::Anonymous => f.write_str("anonymous visitor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub actor_id: String,
    pub subject_id: i64,
    pub completion_count: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: i64,
    pub subject_id: i64,
    pub title: String,
    pub position: i64,
    pub checked: bool,
}

// Everything a list or detail view needs for one subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectStatus {
    pub subject: Subject,
    pub locked: bool,
    pub missing_prerequisites: Vec<i64>,
    pub completion_count: u32,
    pub tier: Tier,
    pub formatted_count: String,
    pub cooldown_remaining: i64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl SubjectStatus {
    pub fn is_ready(&self) -> bool {
        !self.locked && self.cooldown_remaining == 0
    }
}

pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
