use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub hashed_password: String,
    /// Base64 PNG of the most recent generation, overwritten on every success.
    pub latest_image: Option<String>,
}

impl User {
    pub fn new(username: String, hashed_password: String) -> Self {
        User {
            id: Uuid::new_v4(),
            username,
            hashed_password,
            latest_image: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.latest_image
            .as_deref()
            .is_some_and(|image| !image.is_empty())
    }
}
