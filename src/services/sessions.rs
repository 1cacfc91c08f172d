use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::BookingContext;

/// In-memory booking dialogues keyed by session id. Entries expire after
/// `ttl` without activity.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, (BookingContext, Instant)>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Stores a new dialogue and returns its session id.
    pub fn create(&self, context: BookingContext) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.put(&id, context);
        id
    }

    pub fn get(&self, session_id: &str) -> Option<BookingContext> {
        let mut sessions = self.lock();
        let now = Instant::now();
        match sessions.get(session_id) {
            Some((_, expires)) if *expires <= now => {
                sessions.remove(session_id);
                None
            }
            Some((context, _)) => Some(context.clone()),
            None => None,
        }
    }

    pub fn put(&self, session_id: &str, context: BookingContext) {
        let mut sessions = self.lock();
        let now = Instant::now();
        sessions.retain(|_, (_, expires)| *expires > now);
        sessions.insert(session_id.to_string(), (context, now + self.ttl));
    }

    pub fn remove(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are replaced whole, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, (BookingContext, Instant)>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
