use crate::constants::{Language, Scenario};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time as an ISO-8601 string with millisecond precision.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// A single message in a conversation, in turn order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    // Remote records carry no per-message timestamp
    #[serde(default)]
    pub timestamp: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: iso_now(),
        }
    }
}

/// Message shape the server expects in `history` / `conversation`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub session_id: Uuid,
    pub language: Language,
    pub scenario: Scenario,
    pub message: String,
    pub history: Vec<ChatTurn>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: String,
}

/// Events emitted by the streaming chat endpoint.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Chunk {
        content: String,
    },
    Done {
        #[serde(default)]
        session_id: Option<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ReportRequest {
    pub session_id: Uuid,
    pub language: Language,
    pub scenario: Scenario,
    pub conversation: Vec<ChatTurn>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ReportEnvelope {
    pub report: Report,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ConversationOverview {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub word_count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorAnalysis {
    pub error: String,
    pub correction: String,
    pub explanation: String,
    #[serde(default)]
    pub error_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VocabularyIssue {
    pub original: String,
    pub suggestion: String,
    pub explanation: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NaturalnessIssue {
    pub unnatural: String,
    pub natural: String,
    pub context: String,
}

/// Feedback report generated for a finished conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Report {
    #[serde(default)]
    pub overview: ConversationOverview,
    #[serde(default)]
    pub grammar_errors: Vec<ErrorAnalysis>,
    #[serde(default)]
    pub vocabulary_issues: Vec<VocabularyIssue>,
    #[serde(default)]
    pub naturalness: Vec<NaturalnessIssue>,
    #[serde(default)]
    pub positive_feedback: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Clone, Debug)]
pub struct LoginForm<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Conversation record as stored by the server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RemoteConversation {
    #[serde(default)]
    pub id: Option<String>,
    pub session_id: String,
    pub language: Language,
    pub scenario: Scenario,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub report: Option<Report>,
    pub created_at: String,
}

/// A past conversation as shown in the history list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    // Server-side primary key, used for deletes; absent for local entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub language: Language,
    pub scenario: Scenario,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub report: Option<Report>,
    pub timestamp: String,
}

impl From<RemoteConversation> for HistoryEntry {
    fn from(remote: RemoteConversation) -> Self {
        Self {
            id: remote.session_id,
            remote_id: remote.id,
            language: remote.language,
            scenario: remote.scenario,
            messages: remote.messages.unwrap_or_default(),
            report: remote.report,
            timestamp: remote.created_at,
        }
    }
}

/// Snapshot of the active session handed to the history store.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationData {
    pub session_id: Uuid,
    pub language: Language,
    pub scenario: Scenario,
    pub messages: Vec<Message>,
    pub timestamp: String,
}

/// One local conversation in the shape the migrate endpoint accepts.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MigratedConversation {
    pub session_id: String,
    pub language: Language,
    pub scenario: Scenario,
    pub messages: Vec<ChatTurn>,
    pub report: Option<Report>,
}

impl From<&HistoryEntry> for MigratedConversation {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            session_id: entry.id.clone(),
            language: entry.language,
            scenario: entry.scenario,
            messages: entry.messages.iter().map(ChatTurn::from).collect(),
            report: entry.report.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub(crate) struct MigrationRequest {
    pub conversations: Vec<MigratedConversation>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct MigrationSummary {
    #[serde(default)]
    pub message: String,
    pub migrated_count: u32,
}
