//! Local account model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use entrasync_connector::account::{LocalAccount, NewLocalAccount};
use entrasync_connector::directory::AttributeValue;
use entrasync_connector::mapping::AccountStatus;

use crate::error::DbError;

const COLUMNS: &str = "id, name, mail, status, roles, fields, created_at";

/// One row of `local_accounts`. The password hash is never read back.
#[derive(Debug, Clone, FromRow)]
pub struct LocalAccountRow {
    pub id: i64,
    pub name: String,
    pub mail: String,
    pub status: String,
    pub roles: Vec<String>,
    pub fields: Json<BTreeMap<String, AttributeValue>>,
    pub created_at: DateTime<Utc>,
}

impl LocalAccountRow {
    /// Every account in id order.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM local_accounts ORDER BY id"))
            .fetch_all(pool)
            .await
    }

    /// The account whose name or mail matches a normalized identity key.
    pub async fn find_by_identity(
        pool: &PgPool,
        identity_key: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(&format!(
            r"
            SELECT {COLUMNS} FROM local_accounts
            WHERE lower(name) = $1 OR lower(mail) = $1
            ORDER BY id
            LIMIT 1
            "
        ))
        .bind(identity_key)
        .fetch_optional(pool)
        .await
    }

    /// Insert unless the name or mail is already taken.
    ///
    /// Relies on the case-insensitive unique indexes; `None` means a
    /// conflicting row exists.
    pub async fn insert_if_absent(
        pool: &PgPool,
        account: &NewLocalAccount,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(&format!(
            r"
            INSERT INTO local_accounts (name, mail, password_hash, status, roles, fields)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {COLUMNS}
            "
        ))
        .bind(account.name())
        .bind(account.mail())
        .bind(account.password_hash())
        .bind(account.status().as_str())
        .bind(account.roles())
        .bind(Json(account.fields()))
        .fetch_optional(pool)
        .await
    }

    /// Convert into the domain account.
    pub fn into_account(self) -> Result<LocalAccount, DbError> {
        let status = self
            .status
            .parse::<AccountStatus>()
            .map_err(|e| DbError::InvalidData(format!("account {}: {e}", self.id)))?;
        Ok(LocalAccount {
            id: self.id,
            name: self.name,
            mail: self.mail,
            status,
            roles: self.roles,
            fields: self.fields.0,
            created_at: self.created_at,
        })
    }
}
