//! Chat session over a persisted record
//!
//! A `Session` owns one analysis record and drives follow-up turns against
//! it. Streamed replies commit to history and storage only once the stream
//! is fully drained; dropping a turn mid-stream discards the partial reply
//! and leaves both the record and its file exactly as they were.

use tracing::debug;

use crate::ai::{BackendClient, ChatBackend, ReplyStream};
use crate::error::Result;
use crate::models::{current_timestamp, AnalysisRecord, ChatTurn};
use crate::store::RecordStore;

/// One record's live chat session
pub struct Session {
    client: BackendClient,
    store: RecordStore,
    record: AnalysisRecord,
}

impl Session {
    /// Start a session over an already-loaded record
    pub fn new(client: BackendClient, store: RecordStore, record: AnalysisRecord) -> Self {
        Self {
            client,
            store,
            record,
        }
    }

    /// Resume a session for a stored record id
    pub fn resume(client: BackendClient, store: RecordStore, id: &str) -> Result<Self> {
        let record = store.load(id)?;
        Ok(Self::new(client, store, record))
    }

    /// The record this session is driving
    pub fn record(&self) -> &AnalysisRecord {
        &self.record
    }

    /// Send a turn and wait for the complete reply
    ///
    /// Drains the delta stream internally; on completion the turn is
    /// committed to history and the record re-saved.
    pub async fn send_turn(&mut self, system_prompt: &str, user_text: &str) -> Result<String> {
        let mut stream = self.stream_turn(system_prompt, user_text).await?;
        while stream.next().await?.is_some() {}
        Ok(stream.into_text())
    }

    /// Send a turn and consume the reply delta by delta
    ///
    /// The stream commits the turn when it reports the end of the reply.
    /// Dropping it earlier cancels the turn: nothing is appended and
    /// nothing is written.
    pub async fn stream_turn<'a>(
        &'a mut self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<TurnStream<'a>> {
        debug!(
            "Chat turn: record={} history_len={}",
            self.record.id,
            self.record.chat_history.len()
        );

        let inner = self
            .client
            .chat(
                system_prompt,
                &self.record.chat_history,
                user_text,
                &self.record.image_base64,
            )
            .await?;

        Ok(TurnStream {
            session: self,
            inner,
            user_text: user_text.to_string(),
            acc: String::new(),
            finished: false,
        })
    }

    /// Append a completed turn and persist the record.
    ///
    /// A failed save must not leave the in-memory turn half-committed, so
    /// the history and timestamp roll back if the write fails.
    fn commit_turn(&mut self, user_text: &str, assistant_text: &str) -> Result<()> {
        let history_len = self.record.chat_history.len();
        let previous_stamp =
            std::mem::replace(&mut self.record.timestamp, current_timestamp());

        self.record.chat_history.push(ChatTurn::user(user_text));
        self.record
            .chat_history
            .push(ChatTurn::assistant(assistant_text));

        if let Err(e) = self.store.save(&mut self.record) {
            self.record.chat_history.truncate(history_len);
            self.record.timestamp = previous_stamp;
            return Err(e);
        }
        Ok(())
    }
}

/// An in-flight chat turn
///
/// Yields reply deltas in arrival order, each observed exactly once. The
/// owning session commits the turn when `next` returns `None`; dropping the
/// stream before that point is a no-op on session and storage state.
pub struct TurnStream<'a> {
    session: &'a mut Session,
    inner: ReplyStream,
    user_text: String,
    acc: String,
    finished: bool,
}

impl TurnStream<'_> {
    /// Next reply delta, or None once the reply is complete and committed
    pub async fn next(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        match self.inner.next().await? {
            Some(delta) => {
                self.acc.push_str(&delta);
                Ok(Some(delta))
            }
            None => {
                self.finished = true;
                self.session.commit_turn(&self.user_text, &self.acc)?;
                Ok(None)
            }
        }
    }

    /// The reply text accumulated so far
    pub fn partial(&self) -> &str {
        &self.acc
    }

    /// Consume the stream, keeping the accumulated reply text
    pub fn into_text(self) -> String {
        self.acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::{Analysis, Role, UsageStats};
    use tempfile::TempDir;

    fn setup_session(mock: MockBackend) -> (TempDir, RecordStore, Session) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("history")).unwrap();

        let mut record = AnalysisRecord {
            id: String::new(),
            timestamp: "14-03-25-0932".to_string(),
            merchant: "ACME".to_string(),
            image_base64: "aGVsbG8=".to_string(),
            image_sha256: String::new(),
            analysis: Analysis::default(),
            chat_history: Vec::new(),
            usage_stats: UsageStats::default(),
            timings: Default::default(),
        };
        store.save(&mut record).unwrap();

        let session = Session::new(BackendClient::Mock(mock), store.clone(), record);
        (dir, store, session)
    }

    #[tokio::test]
    async fn test_send_turn_commits_and_persists() {
        let mock = MockBackend::new().with_chat_deltas(&["Hel", "lo"]);
        let (_dir, store, mut session) = setup_session(mock);

        let reply = session
            .send_turn("be concise", "is this receipt legit?")
            .await
            .unwrap();
        assert_eq!(reply, "Hello");

        let history = &session.record().chat_history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "is this receipt legit?");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello");

        let on_disk = store.load(&session.record().id).unwrap();
        assert_eq!(on_disk.chat_history, session.record().chat_history);
    }

    #[tokio::test]
    async fn test_stream_turn_yields_deltas_then_commits() {
        let mock = MockBackend::new().with_chat_deltas(&["one ", "two ", "three"]);
        let (_dir, _store, mut session) = setup_session(mock);

        let mut stream = session.stream_turn("be concise", "count").await.unwrap();
        assert_eq!(stream.next().await.unwrap(), Some("one ".to_string()));
        assert_eq!(stream.partial(), "one ");
        assert_eq!(stream.next().await.unwrap(), Some("two ".to_string()));
        assert_eq!(stream.next().await.unwrap(), Some("three".to_string()));
        assert_eq!(stream.next().await.unwrap(), None);
        // Idempotent after the end
        assert_eq!(stream.next().await.unwrap(), None);
        assert_eq!(stream.into_text(), "one two three");

        assert_eq!(session.record().chat_history.len(), 2);
        assert_eq!(session.record().chat_history[1].content, "one two three");
    }

    #[tokio::test]
    async fn test_abandoned_stream_commits_nothing() {
        let mock =
            MockBackend::new().with_chat_deltas(&["a", "b", "c", "d", "e"]);
        let (_dir, store, mut session) = setup_session(mock);

        {
            let mut stream = session.stream_turn("be concise", "tell me").await.unwrap();
            assert!(stream.next().await.unwrap().is_some());
            assert!(stream.next().await.unwrap().is_some());
            // Dropped after 2 of 5 deltas
        }

        assert_eq!(session.record().chat_history.len(), 0);
        let on_disk = store.load(&session.record().id).unwrap();
        assert_eq!(on_disk.chat_history.len(), 0);
        assert_eq!(on_disk.timestamp, "14-03-25-0932");
    }

    #[tokio::test]
    async fn test_chat_failure_aborts_turn_only() {
        let mock = MockBackend::new().with_chat_failure();
        let (_dir, store, mut session) = setup_session(mock);

        assert!(session.send_turn("be concise", "hello").await.is_err());
        assert_eq!(session.record().chat_history.len(), 0);
        assert_eq!(
            store.load(&session.record().id).unwrap().chat_history.len(),
            0
        );
    }

    #[tokio::test]
    async fn test_turns_append_in_order() {
        let mock = MockBackend::new().with_chat_deltas(&["reply"]);
        let (_dir, _store, mut session) = setup_session(mock);

        session.send_turn("be concise", "first").await.unwrap();
        session.send_turn("be concise", "second").await.unwrap();

        let history = &session.record().chat_history;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[2].content, "second");
        // Completed turns always leave an even-length history
        assert_eq!(history.len() % 2, 0);
    }

    #[tokio::test]
    async fn test_resume_loads_stored_record() {
        let mock = MockBackend::new();
        let (_dir, store, session) = setup_session(mock);
        let id = session.record().id.clone();
        drop(session);

        let resumed = Session::resume(BackendClient::mock(), store, &id).unwrap();
        assert_eq!(resumed.record().id, id);
        assert_eq!(resumed.record().merchant, "ACME");

        assert!(Session::resume(
            BackendClient::mock(),
            RecordStore::new(TempDir::new().unwrap().path().join("empty")).unwrap(),
            "14-03-25-0932-Missing"
        )
        .is_err());
    }
}
