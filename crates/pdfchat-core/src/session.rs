//! Conversation state and the single-flight request lifecycle.
//!
//! A [`ChatSession`] is driven in two halves so an event loop never has to
//! hold it across an await: [`ChatSession::begin_submit`] records the user
//! message and hands back a [`PendingQuery`], and [`ChatSession::settle`]
//! applies the endpoint's outcome. [`ChatSession::submit`] runs both halves
//! for callers that can await in place.

use std::any::Any;
use std::mem;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, info, warn};

use crate::client::QaEndpoint;
use crate::error::AskError;
use crate::message::Message;

/// Shown as the bot reply whenever a query fails, whatever the cause.
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble connecting to the server. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Awaiting,
}

/// Outcome of applying a settlement to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The endpoint's answer was appended.
    Answered,
    /// The fallback reply was appended.
    Failed,
    /// Nothing changed: the session was torn down or the ticket is stale.
    Discarded,
}

/// The one request a session has in flight. Settling consumes it.
#[derive(Debug)]
pub struct PendingQuery {
    ticket: u64,
    query: String,
}

impl PendingQuery {
    /// The raw draft as it was when submitted, surrounding whitespace included.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// Read-only projection of the session for drawing.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub messages: &'a [Message],
    pub draft: &'a str,
    /// Show a busy indicator after the last message
    pub busy: bool,
    /// Whether a submit right now would be accepted
    pub can_submit: bool,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<Message>,
    draft: String,
    in_flight: Option<u64>,
    next_ticket: u64,
    torn_down: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_awaiting(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn phase(&self) -> Phase {
        if self.is_awaiting() {
            Phase::Awaiting
        } else {
            Phase::Idle
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Accept the draft if it is not blank and nothing is in flight.
    ///
    /// Returns `None` (and changes nothing) otherwise.
    pub fn begin_submit(&mut self) -> Option<PendingQuery> {
        if self.torn_down || self.in_flight.is_some() || self.draft.trim().is_empty() {
            return None;
        }

        let query = mem::take(&mut self.draft);
        self.messages.push(Message::user(query.clone()));

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);

        debug!(ticket, chars = query.chars().count(), "query submitted");
        Some(PendingQuery { ticket, query })
    }

    /// Apply the endpoint's outcome for `pending` and return to idle.
    pub fn settle(
        &mut self,
        pending: PendingQuery,
        outcome: Result<String, AskError>,
    ) -> Settlement {
        if self.torn_down {
            debug!(ticket = pending.ticket, "session torn down, discarding response");
            return Settlement::Discarded;
        }
        if self.in_flight != Some(pending.ticket) {
            warn!(ticket = pending.ticket, "stale settlement ignored");
            return Settlement::Discarded;
        }

        self.in_flight = None;
        match outcome {
            Ok(answer) => {
                info!(ticket = pending.ticket, chars = answer.chars().count(), "answer received");
                self.messages.push(Message::bot(answer));
                Settlement::Answered
            }
            Err(e) => {
                warn!(ticket = pending.ticket, error = %e, "query failed");
                self.messages.push(Message::bot(FALLBACK_REPLY));
                Settlement::Failed
            }
        }
    }

    /// Run a whole submit round-trip against `endpoint`.
    ///
    /// Returns `None` when the submit was rejected. If the returned future is
    /// dropped before the endpoint answers, the request settles as cancelled.
    pub async fn submit(&mut self, endpoint: &dyn QaEndpoint) -> Option<Settlement> {
        let pending = self.begin_submit()?;
        let query = pending.query.clone();

        let mut guard = SettleGuard {
            session: self,
            pending: Some(pending),
        };
        let outcome = ask_guarded(endpoint, &query).await;
        Some(guard.finish(outcome))
    }

    /// Stop accepting submits and discard any settlement from now on.
    pub fn teardown(&mut self) {
        if !self.torn_down {
            debug!(messages = self.messages.len(), "session torn down");
            self.torn_down = true;
        }
    }

    pub fn render(&self) -> SessionView<'_> {
        let busy = self.is_awaiting();
        SessionView {
            messages: &self.messages,
            draft: &self.draft,
            busy,
            can_submit: !busy && !self.draft.trim().is_empty(),
        }
    }
}

/// Settles the pending query on drop if the submit future was cancelled.
struct SettleGuard<'a> {
    session: &'a mut ChatSession,
    pending: Option<PendingQuery>,
}

impl SettleGuard<'_> {
    fn finish(&mut self, outcome: Result<String, AskError>) -> Settlement {
        match self.pending.take() {
            Some(pending) => self.session.settle(pending, outcome),
            None => Settlement::Discarded,
        }
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.session.settle(pending, Err(AskError::Cancelled));
        }
    }
}

/// Ask `endpoint`, turning a panic inside the request into an error.
pub async fn ask_guarded(endpoint: &dyn QaEndpoint, query: &str) -> Result<String, AskError> {
    match AssertUnwindSafe(endpoint.ask(query)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(AskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers from a script and records every query it sees.
    struct ScriptedEndpoint {
        replies: Mutex<Vec<Result<String, AskError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedEndpoint {
        fn new(replies: Vec<Result<String, AskError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QaEndpoint for ScriptedEndpoint {
        async fn ask(&self, query: &str) -> Result<String, AskError> {
            self.seen.lock().unwrap().push(query.to_string());
            self.replies.lock().unwrap().remove(0)
        }
    }

    struct PanickingEndpoint;

    #[async_trait]
    impl QaEndpoint for PanickingEndpoint {
        async fn ask(&self, _query: &str) -> Result<String, AskError> {
            panic!("backend exploded");
        }
    }

    struct HangingEndpoint {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QaEndpoint for HangingEndpoint {
        async fn ask(&self, _query: &str) -> Result<String, AskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures_util::future::pending().await
        }
    }

    fn status_error(status: u16) -> AskError {
        AskError::Status {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_new_session_is_idle_and_empty() {
        let session = ChatSession::new();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.is_empty());
        assert_eq!(session.draft(), "");
    }

    #[test]
    fn test_update_draft_replaces_text() {
        let mut session = ChatSession::new();
        session.update_draft("first");
        session.update_draft("second");
        assert_eq!(session.draft(), "second");
        assert!(session.is_empty());
    }

    #[test]
    fn test_successful_round_trip() {
        let mut session = ChatSession::new();
        session.update_draft("What is chapter 2 about?");

        let pending = session.begin_submit().unwrap();
        assert_eq!(pending.query(), "What is chapter 2 about?");
        assert_eq!(session.phase(), Phase::Awaiting);
        assert_eq!(session.draft(), "");

        let result = session.settle(pending, Ok("Chapter 2 covers **onboarding**.".to_string()));
        assert_eq!(result, Settlement::Answered);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(
            session.messages(),
            &[
                Message::user("What is chapter 2 about?"),
                Message::bot("Chapter 2 covers **onboarding**."),
            ]
        );
    }

    #[test]
    fn test_failure_appends_fallback() {
        let mut session = ChatSession::new();
        session.update_draft("hello");

        let pending = session.begin_submit().unwrap();
        let result = session.settle(pending, Err(status_error(500)));

        assert_eq!(result, Settlement::Failed);
        assert!(!session.is_awaiting());
        assert_eq!(
            session.messages(),
            &[Message::user("hello"), Message::bot(FALLBACK_REPLY)]
        );
    }

    #[test]
    fn test_blank_draft_is_ignored() {
        let mut session = ChatSession::new();
        for draft in ["", "   ", "\t\n "] {
            session.update_draft(draft);
            assert!(session.begin_submit().is_none());
            assert!(session.is_empty());
            assert!(!session.is_awaiting());
            assert_eq!(session.draft(), draft);
        }
    }

    #[test]
    fn test_raw_draft_is_sent_and_recorded() {
        let mut session = ChatSession::new();
        session.update_draft("  padded question \n");

        let pending = session.begin_submit().unwrap();
        assert_eq!(pending.query(), "  padded question \n");
        assert_eq!(session.messages()[0].content, "  padded question \n");
    }

    #[test]
    fn test_submit_while_awaiting_is_ignored() {
        let mut session = ChatSession::new();
        session.update_draft("a");
        let pending = session.begin_submit().unwrap();

        session.update_draft("b");
        assert!(session.begin_submit().is_none());
        assert_eq!(session.len(), 1);
        assert_eq!(session.draft(), "b");

        session.settle(pending, Ok("answer to a".to_string()));
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[0].content, "a");
        assert_eq!(session.messages()[1].content, "answer to a");
    }

    #[test]
    fn test_each_round_trip_adds_two_messages() {
        let mut session = ChatSession::new();
        for i in 0..5 {
            session.update_draft(format!("question {i}"));
            let pending = session.begin_submit().unwrap();
            let outcome = if i % 2 == 0 {
                Ok(format!("answer {i}"))
            } else {
                Err(status_error(503))
            };
            session.settle(pending, outcome);

            assert_eq!(session.len(), 2 * (i + 1));
            assert_eq!(session.phase(), Phase::Idle);
        }

        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert!(roles.chunks(2).all(|pair| pair == [Role::User, Role::Bot]));
    }

    #[test]
    fn test_stale_ticket_is_discarded() {
        let mut session = ChatSession::new();
        session.update_draft("one");
        let first = session.begin_submit().unwrap();
        let stale = PendingQuery {
            ticket: first.ticket() + 10,
            query: "ghost".to_string(),
        };

        assert_eq!(session.settle(stale, Ok("x".to_string())), Settlement::Discarded);
        assert!(session.is_awaiting());
        assert_eq!(session.settle(first, Ok("y".to_string())), Settlement::Answered);
    }

    #[test]
    fn test_settle_after_teardown_is_discarded() {
        let mut session = ChatSession::new();
        session.update_draft("late");
        let pending = session.begin_submit().unwrap();

        session.teardown();
        assert_eq!(session.settle(pending, Ok("too late".to_string())), Settlement::Discarded);
        assert_eq!(session.len(), 1);

        session.update_draft("again");
        assert!(session.begin_submit().is_none());
    }

    #[test]
    fn test_render_projection() {
        let mut session = ChatSession::new();
        let view = session.render();
        assert!(!view.busy);
        assert!(!view.can_submit);

        // Blank drafts would be ignored, so the control stays disabled
        session.update_draft("   ");
        assert!(!session.render().can_submit);
        assert!(session.begin_submit().is_none());

        session.update_draft("q");
        let pending = session.begin_submit().unwrap();
        session.update_draft("next");
        let view = session.render();
        assert!(view.busy);
        assert!(!view.can_submit);
        assert_eq!(view.messages.len(), 1);

        session.settle(pending, Ok("a".to_string()));
        let view = session.render();
        assert!(!view.busy);
        assert!(view.can_submit);
        assert_eq!(view.messages.last().unwrap().content, "a");
    }

    #[tokio::test]
    async fn test_submit_round_trip_with_endpoint() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok("first answer".to_string()),
            Err(status_error(500)),
        ]);
        let mut session = ChatSession::new();

        session.update_draft("first");
        assert_eq!(session.submit(&endpoint).await, Some(Settlement::Answered));
        session.update_draft("second");
        assert_eq!(session.submit(&endpoint).await, Some(Settlement::Failed));
        session.update_draft(" ");
        assert_eq!(session.submit(&endpoint).await, None);

        assert_eq!(endpoint.seen(), vec!["first", "second"]);
        assert_eq!(session.len(), 4);
        assert_eq!(session.messages()[3].content, FALLBACK_REPLY);
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_panicking_endpoint_settles_as_failure() {
        let mut session = ChatSession::new();
        session.update_draft("boom");

        assert_eq!(session.submit(&PanickingEndpoint).await, Some(Settlement::Failed));
        assert!(!session.is_awaiting());
        assert_eq!(session.messages()[1].content, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_cancelled_submit_still_settles() {
        let endpoint = HangingEndpoint {
            calls: AtomicUsize::new(0),
        };
        let mut session = ChatSession::new();
        session.update_draft("slow");

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), session.submit(&endpoint)).await;
        assert!(timed_out.is_err());

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(
            session.messages(),
            &[Message::user("slow"), Message::bot(FALLBACK_REPLY)]
        );
    }
}
