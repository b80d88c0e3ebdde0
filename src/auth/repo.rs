use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{CreateOutcome, User};

/// Storage of user records, keyed by normalized email with a unique
/// secondary index on the user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Inserts `user` unless its email is already present.
    async fn create(&self, user: &User) -> anyhow::Result<CreateOutcome>;
    /// Writes names and `updated_at` only. Returns false when no record matched.
    async fn update_profile(&self, user: &User) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
    table: String,
}

impl PgUserDirectory {
    /// `table` must already be a validated identifier (see `AppConfig`).
    pub fn new(db: PgPool, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    /// Creates the users table and its id index if they are missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                email         TEXT PRIMARY KEY,
                id            UUID NOT NULL,
                password_hash TEXT NOT NULL,
                first_name    TEXT NOT NULL,
                last_name     TEXT NOT NULL,
                created_at    TIMESTAMPTZ NOT NULL,
                updated_at    TIMESTAMPTZ
            )
            "#,
            t = self.table
        );
        sqlx::query(&create_table)
            .execute(&self.db)
            .await
            .context("create users table")?;

        let create_index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {t}_id_idx ON {t} (id)",
            t = self.table
        );
        sqlx::query(&create_index)
            .execute(&self.db)
            .await
            .context("create users id index")?;
        Ok(())
    }

    fn select_where(&self, column: &str) -> String {
        format!(
            r#"
            SELECT id, email, password_hash, first_name, last_name, created_at, updated_at
            FROM {}
            WHERE {} = $1
            "#,
            self.table, column
        )
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let sql = self.select_where("email");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = self.select_where("id");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, user: &User) -> anyhow::Result<CreateOutcome> {
        let sql = format!(
            r#"
            INSERT INTO {} (email, id, password_hash, first_name, last_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (email) DO NOTHING
            "#,
            self.table
        );
        let res = sqlx::query(&sql)
            .bind(&user.email)
            .bind(user.id)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.db)
            .await
            .context("insert user")?;
        Ok(if res.rows_affected() == 0 {
            CreateOutcome::EmailTaken
        } else {
            CreateOutcome::Created
        })
    }

    async fn update_profile(&self, user: &User) -> anyhow::Result<bool> {
        let sql = format!(
            r#"
            UPDATE {}
               SET first_name = $1, last_name = $2, updated_at = $3
             WHERE email = $4
            "#,
            self.table
        );
        let res = sqlx::query(&sql)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.updated_at)
            .bind(&user.email)
            .execute(&self.db)
            .await
            .context("update user profile")?;
        Ok(res.rows_affected() > 0)
    }
}
