use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

pub const NO_TITLE: &str = "NO_TITLE";
pub const NO_LINK: &str = "NO_LINK";

/// Optional per-account overrides read from the account descriptor (`*.json`).
///
/// Unknown keys are ignored. `app_id` is kept raw because descriptors in the wild
/// carry it both as a number and as a string.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AccountMeta {
    #[serde(default)]
    pub app_id: Option<serde_json::Value>,
    #[serde(default)]
    pub app_hash: Option<String>,
    #[serde(default)]
    pub session_file: Option<String>,
}

/// One discovered account: a session file plus optional descriptor metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub session_path: PathBuf,
    pub descriptor_path: Option<PathBuf>,
    pub meta_app_id: Option<serde_json::Value>,
    pub meta_app_hash: Option<String>,
}

impl Account {
    pub fn new(session_path: PathBuf, descriptor_path: Option<PathBuf>, meta: AccountMeta) -> Self {
        Self {
            session_path,
            descriptor_path,
            meta_app_id: meta.app_id,
            meta_app_hash: meta.app_hash,
        }
    }

    /// Human label for logs: the descriptor path when known, else the session path.
    pub fn label(&self) -> String {
        self.descriptor_path
            .as_ref()
            .unwrap_or(&self.session_path)
            .display()
            .to_string()
    }

    /// Resolve API credentials. Account metadata wins over the process-wide
    /// defaults; `None` when no usable id/hash pair results.
    pub fn credentials(&self, defaults: &CredentialDefaults) -> Option<Credentials> {
        let api_id = match &self.meta_app_id {
            Some(v) => parse_app_id(v),
            None => defaults.api_id,
        };
        let api_hash = match &self.meta_app_hash {
            Some(h) => Some(h.clone()),
            None => defaults.api_hash.clone(),
        };

        let api_id = api_id.filter(|id| *id != 0)?;
        let api_hash = api_hash.filter(|h| !h.trim().is_empty())?;
        Some(Credentials { api_id, api_hash })
    }
}

fn parse_app_id(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Platform API credentials (app id + app hash) used to open one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: i64,
    pub api_hash: String,
}

/// Process-wide credentials from configuration; either half may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialDefaults {
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
}

/// Classification signals exposed by the platform for a chat-like entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityFlags {
    /// Entity is a channel-type object (broadcast channel or supergroup).
    pub channel: bool,
    pub broadcast: bool,
    pub megagroup: bool,
    /// Entity is a legacy basic group.
    pub basic_group: bool,
}

/// Entity classification, resolved once at ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    Megagroup,
    Chat,
    Other,
}

impl EntityKind {
    pub fn classify(flags: EntityFlags) -> Self {
        if flags.channel && flags.broadcast {
            EntityKind::Channel
        } else if flags.channel && flags.megagroup {
            EntityKind::Megagroup
        } else if flags.basic_group {
            EntityKind::Chat
        } else {
            EntityKind::Other
        }
    }

    /// Output partition for this kind. Everything that is not a broadcast
    /// channel lands in the chat partition.
    pub fn partition(self) -> Partition {
        match self {
            EntityKind::Channel => Partition::Channels,
            EntityKind::Megagroup | EntityKind::Chat | EntityKind::Other => Partition::Chats,
        }
    }
}

/// A search hit, already classified.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: Option<i64>,
    pub title: Option<String>,
    pub username: Option<String>,
    /// Member count carried on the search hit itself, if any.
    pub participants_hint: Option<u64>,
}

impl Entity {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NO_TITLE)
    }

    /// Public link: `https://t.me/<username>` when a username exists, else `id:<id>`.
    pub fn public_link(&self) -> Option<String> {
        if let Some(u) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return Some(format!("https://t.me/{u}"));
        }
        self.id.map(|id| format!("id:{id}"))
    }
}

/// Which entity kinds a run collects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    All,
    Channel,
    Chat,
}

impl SearchType {
    pub fn admits(self, kind: EntityKind) -> bool {
        match self {
            SearchType::All => true,
            SearchType::Channel => kind == EntityKind::Channel,
            SearchType::Chat => matches!(kind, EntityKind::Megagroup | EntityKind::Chat),
        }
    }
}

impl FromStr for SearchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(SearchType::All),
            "channel" => Ok(SearchType::Channel),
            "chat" => Ok(SearchType::Chat),
            other => Err(Error::Config(format!(
                "SEARCH_TYPE must be one of all|channel|chat, got {other:?}"
            ))),
        }
    }
}

/// Output partition of the result sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Channels,
    Chats,
}

/// One output line: `<title> | <participant_count> | <link>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    pub title: String,
    pub participants: u64,
    pub link: String,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Titles may contain line breaks; one record is one line.
        let title = self.title.replace(['\r', '\n'], " ");
        write!(f, "{} | {} | {}", title, self.participants, self.link)
    }
}

/// Why an account was quarantined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub account: String,
    pub reason: String,
}
