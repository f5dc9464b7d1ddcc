use serde::{Deserialize, Serialize};

pub const IMAGE_SIZE: u32 = 512;

/// Form posted from the home page; the field keeps the name `image`.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptRequest {
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateImageRequest {
    pub model: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateImageResponse {
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// First image of a 200 response, still base64 encoded.
    Generated(String),
    /// Any other status; the caller keeps whatever image it had.
    Rejected(u16),
}
