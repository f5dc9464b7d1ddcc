use std::time::Duration;

use eyre::Result;
use uuid::Uuid;
use validator::Validate;

use crate::domain::auth::{LoginRequest, SignupRequest};
use crate::domain::image::{GenerationOutcome, PromptRequest};
use crate::domain::user::User;
use crate::error::Error;
use crate::service::auth::AuthService;
use crate::service::images::ImageService;

#[derive(Clone)]
pub struct Api {
    pub auth_service: AuthService,
    pub image_service: ImageService,
}

impl Api {
    /// Returns the session token of the newly created, already logged-in user.
    pub async fn signup(&self, request: SignupRequest) -> Result<Uuid> {
        let request = request.trimmed();
        request.validate().map_err(|_| Error::MissingField)?;
        let (_, token) = self
            .auth_service
            .signup(request.username, request.password)
            .await?;
        Ok(token)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Uuid> {
        let request = request.trimmed();
        request.validate().map_err(|_| Error::MissingField)?;
        let (_, token) = self
            .auth_service
            .login(request.username, request.password)
            .await?;
        Ok(token)
    }

    pub fn session_ttl(&self) -> Duration {
        self.auth_service.session_repository.ttl()
    }

    pub fn logout(&self, token: Uuid) {
        self.auth_service.logout(token)
    }

    pub async fn get_user_by_session_token(&self, token: Uuid) -> Result<Option<User>> {
        self.auth_service.get_user_by_session_token(token).await
    }

    pub async fn generate_image(
        &self,
        user_id: Uuid,
        request: PromptRequest,
    ) -> Result<GenerationOutcome> {
        self.image_service.generate(user_id, request.image).await
    }

    pub async fn latest_image(&self, user_id: Uuid) -> Result<Option<Vec<u8>>> {
        self.image_service.latest_image(user_id).await
    }
}
