use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eyre::{bail, Result};
use uuid::Uuid;

use crate::domain::user::User;
use crate::error::Error;

pub const ADMIN_USERNAME: &str = "admin";

/// Lookup and insert over wherever username/password-hash pairs live.
///
/// `insert` must reject a taken username atomically with
/// [`Error::UsernameAlreadyExists`]; a pre-check in the caller is not enough
/// when two registrations race.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn insert(&self, username: String, hashed_password: String) -> Result<User>;

    async fn update_latest_image(&self, id: Uuid, image: String) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        MemoryUserStore {
            users: DashMap::new(),
        }
    }

    pub fn with_admin(hashed_password: String) -> Self {
        let store = MemoryUserStore::new();
        store.users.insert(
            ADMIN_USERNAME.to_string(),
            User::new(ADMIN_USERNAME.to_string(), hashed_password),
        );
        store
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.get(username).map(|user| user.clone()))
    }

    async fn insert(&self, username: String, hashed_password: String) -> Result<User> {
        match self.users.entry(username.clone()) {
            Entry::Occupied(_) => bail!(Error::UsernameAlreadyExists),
            Entry::Vacant(entry) => {
                let user = User::new(username, hashed_password);
                entry.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn update_latest_image(&self, id: Uuid, image: String) -> Result<()> {
        let mut user = self
            .users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(Error::UserNotFound)?;
        user.latest_image = Some(image);
        Ok(())
    }
}
