use eyre::Result;
use log::debug;
use reqwest::Client as ReqwestClient;
use reqwest::StatusCode;

use crate::domain::image::{
    GenerateImageRequest, GenerateImageResponse, GenerationOutcome, IMAGE_SIZE,
};
use crate::error::Error;

pub const VENICE_API_URL: &str = "https://api.venice.ai/api/v1/image/generate";
pub const DEFAULT_MODEL: &str = "flux-dev";

#[cfg_attr(test, faux::create)]
pub struct ImageClient {
    client: ReqwestClient,
    api_url: String,
    api_key: String,
    model: String,
}

#[cfg_attr(test, faux::methods)]
impl ImageClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: ReqwestClient::new(),
            api_url,
            api_key,
            model,
        }
    }

    /// Sends one generation request. Only a 200 yields an image; any other
    /// status comes back as [`GenerationOutcome::Rejected`] instead of an
    /// error so callers can keep their previous image.
    pub async fn generate(&self, prompt: String) -> Result<GenerationOutcome> {
        let request = GenerateImageRequest {
            model: self.model.clone(),
            prompt,
            width: IMAGE_SIZE,
            height: IMAGE_SIZE,
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        debug!("Image API responded with {}", status);
        match status {
            StatusCode::OK => {
                let body: GenerateImageResponse = response
                    .json()
                    .await
                    .map_err(|_| Error::MalformedApiResponse)?;
                let image = body
                    .images
                    .into_iter()
                    .next()
                    .ok_or(Error::MalformedApiResponse)?;
                Ok(GenerationOutcome::Generated(image))
            }
            _ => Ok(GenerationOutcome::Rejected(status.as_u16())),
        }
    }
}
