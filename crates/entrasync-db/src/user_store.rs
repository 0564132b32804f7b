//! `PostgreSQL` local user store.

use async_trait::async_trait;
use tracing::{debug, instrument};

use entrasync_connector::account::{LocalAccount, NewLocalAccount};
use entrasync_connector::directory::normalize_identity_key;
use entrasync_connector::error::StoreResult;
use entrasync_connector::mapping::LocalFieldSchema;
use entrasync_connector::traits::LocalUserStore;

use crate::error::DbError;
use crate::models::LocalAccountRow;
use crate::pool::DbPool;

/// Local accounts stored in the `local_accounts` table.
///
/// Name and mail are unique ignoring case, so `create_if_absent` is a
/// single conflict-tolerant insert.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: DbPool,
    schema: LocalFieldSchema,
}

impl PgUserStore {
    pub fn new(pool: DbPool, schema: LocalFieldSchema) -> Self {
        Self { pool, schema }
    }
}

#[async_trait]
impl LocalUserStore for PgUserStore {
    fn schema(&self) -> &LocalFieldSchema {
        &self.schema
    }

    async fn list_accounts(&self) -> StoreResult<Vec<LocalAccount>> {
        let rows = LocalAccountRow::list(self.pool.inner())
            .await
            .map_err(DbError::query)?;
        Ok(rows
            .into_iter()
            .map(LocalAccountRow::into_account)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_by_identity(&self, identity_key: &str) -> StoreResult<Option<LocalAccount>> {
        let row = LocalAccountRow::find_by_identity(
            self.pool.inner(),
            &normalize_identity_key(identity_key),
        )
        .await
        .map_err(DbError::query)?;
        Ok(row.map(LocalAccountRow::into_account).transpose()?)
    }

    #[instrument(skip(self, account), fields(name = %account.name()))]
    async fn create_if_absent(
        &self,
        account: NewLocalAccount,
    ) -> StoreResult<Option<LocalAccount>> {
        account.validate()?;

        let row = LocalAccountRow::insert_if_absent(self.pool.inner(), &account)
            .await
            .map_err(DbError::query)?;
        match row {
            Some(row) => Ok(Some(row.into_account()?)),
            None => {
                debug!("Account already present, skipping insert");
                Ok(None)
            }
        }
    }
}
