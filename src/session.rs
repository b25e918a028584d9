//! In-memory state of the one conversation currently being practised.

use crate::constants::{Language, Scenario};
use crate::models::{iso_now, ChatRequest, ChatTurn, ConversationData, Message, ReportRequest, Role};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No conversation has been started")]
    NotStarted,

    #[error("No streamed reply is in progress")]
    NotStreaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Active,
    Streaming,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStore {
    session_id: Option<Uuid>,
    language: Option<Language>,
    scenario: Option<Scenario>,
    messages: Vec<Message>,
    is_loading: bool,
    is_streaming: bool,
    streaming_content: String,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a fresh conversation, discarding any previous one.
    pub fn start(&mut self, language: Language, scenario: Scenario) -> Uuid {
        let session_id = Uuid::new_v4();
        log::info!(
            "Starting conversation {} ({}, {})",
            session_id,
            language,
            scenario
        );
        self.session_id = Some(session_id);
        self.language = Some(language);
        self.scenario = Some(scenario);
        self.messages.clear();
        self.is_streaming = false;
        self.streaming_content.clear();
        session_id
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> Result<(), SessionError> {
        if self.session_id.is_none() {
            return Err(SessionError::NotStarted);
        }
        self.messages.push(Message::new(role, content));
        Ok(())
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    /// Turning streaming off clears the accumulated partial reply.
    pub fn set_streaming(&mut self, streaming: bool) -> Result<(), SessionError> {
        if streaming && self.session_id.is_none() {
            return Err(SessionError::NotStarted);
        }
        self.is_streaming = streaming;
        if !streaming {
            self.streaming_content.clear();
        }
        Ok(())
    }

    pub fn accumulate_streamed_content(&mut self, fragment: &str) -> Result<(), SessionError> {
        if !self.is_streaming {
            return Err(SessionError::NotStreaming);
        }
        self.streaming_content.push_str(fragment);
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> SessionState {
        match (self.session_id, self.is_streaming) {
            (None, _) => SessionState::Empty,
            (Some(_), false) => SessionState::Active,
            (Some(_), true) => SessionState::Streaming,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn scenario(&self) -> Option<Scenario> {
        self.scenario
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn streaming_content(&self) -> &str {
        &self.streaming_content
    }

    pub fn user_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::User)
    }

    pub fn turn_count(&self) -> usize {
        self.user_messages().count()
    }

    pub fn has_conversation(&self) -> bool {
        !self.messages.is_empty()
    }

    fn identity(&self) -> Result<(Uuid, Language, Scenario), SessionError> {
        match (self.session_id, self.language, self.scenario) {
            (Some(id), Some(language), Some(scenario)) => Ok((id, language, scenario)),
            _ => Err(SessionError::NotStarted),
        }
    }

    pub fn conversation_data(&self) -> Result<ConversationData, SessionError> {
        let (session_id, language, scenario) = self.identity()?;
        Ok(ConversationData {
            session_id,
            language,
            scenario,
            messages: self.messages.clone(),
            timestamp: iso_now(),
        })
    }

    /// Request for `message` with every message so far as history.
    ///
    /// Build it before recording `message` itself, so it is not sent twice.
    pub fn chat_request(&self, message: &str) -> Result<ChatRequest, SessionError> {
        let (session_id, language, scenario) = self.identity()?;
        Ok(ChatRequest {
            session_id,
            language,
            scenario,
            message: message.to_string(),
            history: self.messages.iter().map(ChatTurn::from).collect(),
        })
    }

    pub fn report_request(&self) -> Result<ReportRequest, SessionError> {
        let (session_id, language, scenario) = self.identity()?;
        Ok(ReportRequest {
            session_id,
            language,
            scenario,
            conversation: self.messages.iter().map(ChatTurn::from).collect(),
        })
    }
}
