use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::gateway::EventsContext;
use crate::handlers::vote::{Outcome, VotingSession};
use crate::handlers::UiEvent;

/// A [`VotingSession`] that can receive events from concurrently spawned tasks.
///
/// Events are handled one at a time. An event that arrives while another is
/// still being handled is dropped with [`Outcome::Ignored`].
pub struct SharedSession<C> {
    session: Mutex<VotingSession<C>>,
    loading: AtomicBool,
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C: EventsContext> SharedSession<C> {
    pub fn new(session: VotingSession<C>) -> Self {
        Self {
            session: Mutex::new(session),
            loading: AtomicBool::new(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn dispatch(&self, event: UiEvent) -> Result<Outcome> {
        if self.loading.swap(true, Ordering::AcqRel) {
            debug!("Dropping {:?} while a submission is in flight", event);
            return Ok(Outcome::Ignored);
        }
        let _loading = LoadingGuard(&self.loading);
        self.session.lock().await.handle(event).await
    }

    /// Run `f` against the session once no event is being handled.
    pub async fn with_session<R>(&self, f: impl FnOnce(&VotingSession<C>) -> R) -> R {
        f(&*self.session.lock().await)
    }

    pub fn into_inner(self) -> VotingSession<C> {
        self.session.into_inner()
    }
}
