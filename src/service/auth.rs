use std::sync::Arc;

use bcrypt::{hash, verify};
use eyre::{ensure, Result};
use log::{info, warn};
use uuid::Uuid;

use crate::domain::user::User;
use crate::error::Error;
use crate::repository::sessions::SessionRepository;
use crate::repository::users::UserStore;

const DUMMY_PASSWORD: &str = "not-a-real-password";

#[derive(Clone)]
pub struct AuthService {
    pub user_store: Arc<dyn UserStore>,
    pub session_repository: SessionRepository,
    pub bcrypt_cost: u32,
    /// Verified against on unknown usernames so both login failures cost one bcrypt check.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        session_repository: SessionRepository,
        bcrypt_cost: u32,
    ) -> Result<Self> {
        Ok(AuthService {
            user_store,
            session_repository,
            bcrypt_cost,
            dummy_hash: hash(DUMMY_PASSWORD, bcrypt_cost)?,
        })
    }

    /// Creates the account and logs it in straight away.
    pub async fn signup(&self, username: String, password: String) -> Result<(User, Uuid)> {
        ensure!(
            self.user_store.find_by_username(&username).await?.is_none(),
            Error::UsernameAlreadyExists
        );
        let hashed_password = hash(password, self.bcrypt_cost)?;
        let user = self.user_store.insert(username, hashed_password).await?;
        let token = self.session_repository.create(user.id);
        info!("User {} registered", user.username);
        Ok((user, token))
    }

    pub async fn login(&self, username: String, password: String) -> Result<(User, Uuid)> {
        // unknown user and wrong password are indistinguishable to the caller
        let Some(user) = self.user_store.find_by_username(&username).await? else {
            let _ = verify(password, &self.dummy_hash);
            warn!("Login attempt for unknown user");
            return Err(Error::InvalidCredentials.into());
        };
        if !verify(password, &user.hashed_password)? {
            warn!("Wrong password for user {}", user.username);
            return Err(Error::InvalidCredentials.into());
        }
        let token = self.session_repository.create(user.id);
        info!("User {} logged in", user.username);
        Ok((user, token))
    }

    pub fn logout(&self, token: Uuid) {
        self.session_repository.remove(token);
    }

    pub async fn get_user_by_session_token(&self, token: Uuid) -> Result<Option<User>> {
        match self.session_repository.get(token) {
            Some(user_id) => self.user_store.find_by_id(user_id).await,
            None => Ok(None),
        }
    }
}
