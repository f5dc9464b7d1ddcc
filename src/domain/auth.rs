use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Validate, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub csrf_token: String,
}

#[derive(Debug, Default, Validate, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub csrf_token: String,
}

impl LoginRequest {
    pub fn trimmed(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self
    }
}

impl SignupRequest {
    pub fn trimmed(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self
    }
}
