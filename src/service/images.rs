use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use eyre::{ensure, Result};
use log::{info, warn};
use uuid::Uuid;

use crate::client::ImageClient;
use crate::domain::image::GenerationOutcome;
use crate::error::Error;
use crate::repository::users::UserStore;

#[derive(Clone)]
pub struct ImageService {
    pub image_client: Arc<ImageClient>,
    pub user_store: Arc<dyn UserStore>,
}

impl ImageService {
    /// Generates an image for `prompt` and stores it as the user's latest
    /// image. A rejected request leaves the stored image untouched.
    pub async fn generate(&self, user_id: Uuid, prompt: String) -> Result<GenerationOutcome> {
        let prompt = prompt.trim().to_string();
        ensure!(!prompt.is_empty(), Error::EmptyPrompt);

        let outcome = self.image_client.generate(prompt).await?;
        match &outcome {
            GenerationOutcome::Generated(image) => {
                ensure!(STANDARD.decode(image).is_ok(), Error::MalformedApiResponse);
                self.user_store
                    .update_latest_image(user_id, image.clone())
                    .await?;
                info!("Stored new image for user {}", user_id);
            }
            GenerationOutcome::Rejected(status) => {
                warn!(
                    "Image API rejected request for user {} with status {}",
                    user_id, status
                );
            }
        }
        Ok(outcome)
    }

    /// Decoded PNG bytes of the user's latest image, if there is one.
    pub async fn latest_image(&self, user_id: Uuid) -> Result<Option<Vec<u8>>> {
        let user = self
            .user_store
            .find_by_id(user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        match user.latest_image {
            Some(image) if !image.is_empty() => {
                let bytes = STANDARD.decode(image).map_err(|_| Error::CorruptImage)?;
                Ok(Some(bytes))
            }
            _ => Ok(None),
        }
    }
}
