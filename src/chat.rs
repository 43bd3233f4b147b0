//! Conversations with a local language model about the journal.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::error::{ChatError, JournalError};
use crate::journal::{DiaryEntry, Journal};
use crate::store::DocumentStore;

/// Entries dated within this many days before today are shared as context.
pub const CONTEXT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Receives the cumulative reply text while a completion streams.
pub type PartialReply<'a> = &'a mut (dyn FnMut(&str) + Send);

/// A chat completion backend.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Completes the conversation. `on_partial` may be called any number of
    /// times with the reply so far before the final text is returned.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        on_partial: PartialReply<'_>,
    ) -> Result<String, ChatError>;

    /// Releases the model. Called once by [`EngineHandle::shutdown`].
    async fn shutdown(&self) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Shared handle to an initialized engine.
///
/// Clones refer to the same engine; once any clone shuts it down every
/// further completion fails with [`ChatError::ShutDown`].
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn ChatEngine>,
    running: Arc<AtomicBool>,
}

impl EngineHandle {
    pub fn init(engine: impl ChatEngine + 'static) -> Self {
        info!("chat engine ready");
        Self {
            engine: Arc::new(engine),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        on_partial: PartialReply<'_>,
    ) -> Result<String, ChatError> {
        if !self.is_running() {
            return Err(ChatError::ShutDown);
        }
        self.engine.complete(messages, on_partial).await
    }

    /// Shuts the engine down. Later calls are no-ops.
    pub async fn shutdown(&self) -> Result<(), ChatError> {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("shutting down chat engine");
            self.engine.shutdown().await?;
        }
        Ok(())
    }
}

/// The entry for `selected` followed by entries dated within
/// [`CONTEXT_DAYS`] before `today`, without duplicates, newest first.
pub fn relevant_entries(
    entries: &[DiaryEntry],
    selected: NaiveDate,
    today: NaiveDate,
) -> Vec<&DiaryEntry> {
    let cutoff = today - Duration::days(CONTEXT_DAYS);

    let mut recent: Vec<&DiaryEntry> = entries.iter().filter(|e| e.date > cutoff).collect();
    recent.sort_by(|a, b| b.date.cmp(&a.date));

    let mut seen = HashSet::new();
    entries
        .iter()
        .find(|e| e.date == selected)
        .into_iter()
        .chain(recent)
        .filter(|e| seen.insert(e.id.as_str()))
        .collect()
}

/// The system prompt carrying `entries` as context.
pub fn context_prompt(entries: &[&DiaryEntry]) -> ChatMessage {
    let context = entries
        .iter()
        .map(|e| format!("[{}]: {}", e.date.format("%Y-%m-%d"), e.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    ChatMessage::new(
        Role::System,
        format!(
            "You are an AI assistant helping with journal entries. Here are some relevant entries for context:\n\
             {context}\n\n\
             Please use this context to provide insightful responses. Be empathetic and helpful."
        ),
    )
}

/// Talks to the engine on behalf of one journal and keeps the transcript.
pub struct Companion<'a, S: DocumentStore> {
    journal: &'a Journal<S>,
    engine: EngineHandle,
}

/// What the companion needs to know about the conversation so far.
pub struct Conversation<'a> {
    pub owner_id: &'a str,
    pub secret: &'a str,
    pub history: &'a [ChatMessage],
    pub entries: &'a [DiaryEntry],
    pub selected: NaiveDate,
    pub today: NaiveDate,
}

impl<'a, S: DocumentStore> Companion<'a, S> {
    pub fn new(journal: &'a Journal<S>, engine: EngineHandle) -> Self {
        Self { journal, engine }
    }

    /// Sends `text`, streams the reply through `on_partial`, and persists the
    /// extended transcript. Returns the new transcript.
    ///
    /// If the engine fails nothing is saved.
    pub async fn send_message(
        &self,
        conversation: Conversation<'_>,
        text: &str,
        on_partial: PartialReply<'_>,
    ) -> Result<Vec<ChatMessage>, JournalError> {
        if text.trim().is_empty() {
            return Err(JournalError::EmptyMessage);
        }

        let user = ChatMessage::new(Role::User, text);
        let context = relevant_entries(
            conversation.entries,
            conversation.selected,
            conversation.today,
        );
        debug!(
            owner_id = conversation.owner_id,
            context_entries = context.len(),
            "sending chat message"
        );

        let mut prompt = Vec::with_capacity(conversation.history.len() + 2);
        prompt.push(context_prompt(&context));
        prompt.extend_from_slice(conversation.history);
        prompt.push(user.clone());

        let reply = self.engine.complete(&prompt, on_partial).await?;

        let mut transcript = conversation.history.to_vec();
        transcript.push(user);
        transcript.push(ChatMessage::new(Role::Assistant, reply.trim()));

        self.journal
            .save_chat_history(conversation.owner_id, &transcript, conversation.secret)
            .await?;
        Ok(transcript)
    }

    /// One-shot reflection on a single entry. Nothing is persisted.
    pub async fn insight(
        &self,
        content: &str,
        on_partial: PartialReply<'_>,
    ) -> Result<String, ChatError> {
        let prompt = [ChatMessage::new(
            Role::User,
            format!("Analyze this diary entry: {content}"),
        )];
        let reply = self.engine.complete(&prompt, on_partial).await?;
        Ok(reply.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    /// Streams a canned reply word by word and records what it was asked.
    #[derive(Default)]
    struct ScriptedEngine {
        reply: String,
        fail: bool,
        seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
        shutdowns: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl ChatEngine for ScriptedEngine {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            on_partial: PartialReply<'_>,
        ) -> Result<String, ChatError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            if self.fail {
                return Err(ChatError::Engine("model crashed".into()));
            }
            let mut so_far = String::new();
            for word in self.reply.split_inclusive(' ') {
                so_far.push_str(word);
                on_partial(&so_far);
            }
            Ok(so_far)
        }

        async fn shutdown(&self) -> Result<(), ChatError> {
            *self.shutdowns.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn entry(id: &str, date: NaiveDate) -> DiaryEntry {
        DiaryEntry {
            id: id.into(),
            content: format!("entry {id}"),
            date,
            owner_id: "u1".into(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn journal() -> Journal<MemoryStore> {
        Journal::with_kdf(Arc::new(MemoryStore::new()), KdfParams::new(1_000).unwrap())
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn relevant_entries_puts_selected_first_without_duplicates() {
        let entries = vec![
            entry("old", day(1)),
            entry("a", day(18)),
            entry("b", day(20)),
            entry("edge", day(13)),
        ];

        let ids: Vec<_> = relevant_entries(&entries, day(18), day(20))
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b"]);

        let ids: Vec<_> = relevant_entries(&entries, day(1), day(20))
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, ["old", "b", "a"]);
    }

    #[test]
    fn context_prompt_lists_entries_by_date() {
        let e = entry("x", day(5));
        let prompt = context_prompt(&[&e]);
        assert_eq!(prompt.role, Role::System);
        assert!(prompt.content.contains("[2024-03-05]: entry x"));
    }

    #[tokio::test]
    async fn send_message_streams_and_persists_transcript() {
        let j = journal();
        let engine = ScriptedEngine {
            reply: "That sounds lovely. ".into(),
            ..Default::default()
        };
        let seen = engine.seen.clone();
        let companion = Companion::new(&j, EngineHandle::init(engine));

        let history = vec![ChatMessage::new(Role::User, "earlier")];
        let entries = vec![entry("today", day(20))];
        let mut partials = Vec::new();
        let transcript = companion
            .send_message(
                Conversation {
                    owner_id: "u1",
                    secret: "s",
                    history: &history,
                    entries: &entries,
                    selected: day(20),
                    today: day(20),
                },
                "I went to the sea",
                &mut |p: &str| partials.push(p.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(partials, ["That ", "That sounds ", "That sounds lovely. "]);
        assert_eq!(
            transcript,
            [
                ChatMessage::new(Role::User, "earlier"),
                ChatMessage::new(Role::User, "I went to the sea"),
                ChatMessage::new(Role::Assistant, "That sounds lovely."),
            ]
        );
        assert_eq!(j.load_chat_history("u1", "s").await.unwrap(), transcript);

        let asked = seen.lock().unwrap()[0].clone();
        assert_eq!(asked.len(), 3);
        assert_eq!(asked[0].role, Role::System);
        assert!(asked[0].content.contains("entry today"));
        assert_eq!(asked[2].content, "I went to the sea");
    }

    #[tokio::test]
    async fn failed_completion_saves_nothing() {
        let j = journal();
        let companion = Companion::new(
            &j,
            EngineHandle::init(ScriptedEngine {
                fail: true,
                ..Default::default()
            }),
        );

        let result = companion
            .send_message(
                Conversation {
                    owner_id: "u1",
                    secret: "s",
                    history: &[],
                    entries: &[],
                    selected: day(1),
                    today: day(1),
                },
                "hello",
                &mut |_: &str| {},
            )
            .await;

        assert!(matches!(result, Err(JournalError::Chat(ChatError::Engine(_)))));
        assert!(j.load_chat_history("u1", "s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let j = journal();
        let companion = Companion::new(&j, EngineHandle::init(ScriptedEngine::default()));
        let result = companion
            .send_message(
                Conversation {
                    owner_id: "u1",
                    secret: "s",
                    history: &[],
                    entries: &[],
                    selected: day(1),
                    today: day(1),
                },
                "   ",
                &mut |_: &str| {},
            )
            .await;
        assert!(matches!(result, Err(JournalError::EmptyMessage)));
    }

    #[tokio::test]
    async fn insight_wraps_entry_in_prompt() {
        let j = journal();
        let engine = ScriptedEngine {
            reply: " You seem rested. ".into(),
            ..Default::default()
        };
        let seen = engine.seen.clone();
        let companion = Companion::new(&j, EngineHandle::init(engine));

        let text = companion
            .insight("Slept well", &mut |_: &str| {})
            .await
            .unwrap();

        assert_eq!(text, "You seem rested.");
        assert_eq!(
            seen.lock().unwrap()[0][0].content,
            "Analyze this diary entry: Slept well"
        );
    }

    #[tokio::test]
    async fn shutdown_is_shared_and_idempotent() {
        let engine = ScriptedEngine::default();
        let shutdowns = engine.shutdowns.clone();
        let handle = EngineHandle::init(engine);
        let other = handle.clone();

        handle.shutdown().await.unwrap();
        other.shutdown().await.unwrap();

        assert!(!other.is_running());
        assert_eq!(*shutdowns.lock().unwrap(), 1);
        assert!(matches!(
            other.complete(&[], &mut |_: &str| {}).await,
            Err(ChatError::ShutDown)
        ));
    }
}
