use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. `refresh_token` is the single live session
/// slot: overwritten on login/refresh, cleared on logout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub avatar_url: &'a str,
    pub cover_image_url: Option<&'a str>,
    pub password_hash: &'a str,
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, avatar_url, cover_image_url,
                   password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Look a user up by username or email. A `None` identifier never
    /// matches (`= NULL` is not true in SQL).
    pub async fn find_by_username_or_email(
        db: &PgPool,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, avatar_url, cover_image_url,
                   password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE username = $1 OR email = $2
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn exists_with_username_or_email(
        db: &PgPool,
        username: &str,
        email: &str,
    ) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)"#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(db)
        .await?;
        Ok(exists)
    }

    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, full_name, avatar_url, cover_image_url, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, email, full_name, avatar_url, cover_image_url,
                      password_hash, refresh_token, created_at, updated_at
            "#,
        )
        .bind(new.username)
        .bind(new.email)
        .bind(new.full_name)
        .bind(new.avatar_url)
        .bind(new.cover_image_url)
        .bind(new.password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Install a fresh refresh token (login). Single-column write, no other
    /// fields touched.
    pub async fn store_refresh_token(db: &PgPool, id: Uuid, token: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Rotate the refresh slot, but only if the presented token still
    /// occupies it. Returns false when another rotation (or a logout) won
    /// the race; the caller must treat that as a replayed token.
    pub async fn rotate_refresh_token(
        db: &PgPool,
        id: Uuid,
        presented: &str,
        replacement: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $3, updated_at = now()
            WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(presented)
        .bind(replacement)
        .execute(db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop the stored refresh token. Idempotent.
    pub async fn clear_refresh_token(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET refresh_token = NULL, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Partial profile update: absent fields keep their current value.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                email = COALESCE($3, email),
                updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, full_name, avatar_url, cover_image_url,
                      password_hash, refresh_token, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(full_name)
        .bind(email)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn set_avatar_url(db: &PgPool, id: Uuid, url: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET avatar_url = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, full_name, avatar_url, cover_image_url,
                      password_hash, refresh_token, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(url)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn set_cover_image_url(db: &PgPool, id: Uuid, url: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET cover_image_url = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, full_name, avatar_url, cover_image_url,
                      password_hash, refresh_token, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(url)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "ann".into(),
            email: "a@x.com".into(),
            full_name: "Ann".into(),
            avatar_url: "https://cdn.fake.local/avatars/a.png".into(),
            cover_image_url: None,
            password_hash: "$argon2id$fake".into(),
            refresh_token: Some("tok".into()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn sensitive_fields_never_serialize() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("refresh_token"));
        assert!(json.contains("ann"));
    }
}
