use std::str::FromStr;

use async_trait::async_trait;
use eyre::{bail, ensure, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::user::User;
use crate::error::Error;
use crate::repository::users::UserStore;

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteUserStore { pool }
    }

    /// Opens (creating if needed) the database file and brings the schema up
    /// to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(SqliteUserStore::new(pool))
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        // every connection to `:memory:` is a fresh database, so keep just one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(SqliteUserStore::new(pool))
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn insert(&self, username: String, hashed_password: String) -> Result<User> {
        let result: Result<User, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO users (id, username, hashed_password)
            VALUES (?1, ?2, ?3) RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                bail!(Error::UsernameAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_latest_image(&self, id: Uuid, image: String) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET latest_image = ?1
            WHERE id = ?2
            "#,
        )
        .bind(image)
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure!(result.rows_affected() == 1, Error::UserNotFound);
        Ok(())
    }
}
