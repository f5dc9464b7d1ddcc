use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct Session {
    user_id: Uuid,
    expires_at: Instant,
}

/// Session token -> user id. Tokens live until logout or until `ttl` has
/// passed since login, whichever comes first.
#[derive(Clone)]
pub struct SessionRepository {
    sessions: Arc<DashMap<Uuid, Session>>,
    ttl: Duration,
}

impl SessionRepository {
    pub fn new(ttl: Duration) -> Self {
        SessionRepository {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn create(&self, user_id: Uuid) -> Uuid {
        let token = Uuid::new_v4();
        self.sessions.insert(
            token,
            Session {
                user_id,
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    pub fn get(&self, token: Uuid) -> Option<Uuid> {
        let now = Instant::now();
        let user_id = self
            .sessions
            .get(&token)
            .map(|session| (session.user_id, session.expires_at > now))?;
        match user_id {
            (user_id, true) => Some(user_id),
            (_, false) => {
                self.sessions
                    .remove_if(&token, |_, session| session.expires_at <= now);
                None
            }
        }
    }

    pub fn remove(&self, token: Uuid) {
        self.sessions.remove(&token);
    }

    /// Removes every expired session and returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRepository {
    fn default() -> Self {
        SessionRepository::new(DEFAULT_SESSION_TTL)
    }
}
