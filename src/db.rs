use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use std::borrow::Cow;

use crate::credentials::{CredentialStore, PartialCloudApiCredentials, UazapiCredentials};
use crate::error::ProviderResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

pub fn db_kind_from_url(url: &str) -> DbKind {
    let lower = url.to_lowercase();
    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        DbKind::Postgres
    } else {
        DbKind::Sqlite
    }
}

pub fn rewrite_sql<'a>(sql: &'a str, kind: DbKind) -> Cow<'a, str> {
    match kind {
        DbKind::Sqlite => Cow::Borrowed(sql),
        DbKind::Postgres => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut idx = 1;
            for ch in sql.chars() {
                if ch == '?' {
                    out.push('$');
                    out.push_str(&idx.to_string());
                    idx += 1;
                } else {
                    out.push(ch);
                }
            }
            Cow::Owned(out)
        }
    }
}

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<AnyPool> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Reads instance credentials from the `instances` table maintained by the
/// instances repository. The schema belongs to that layer; only the columns
/// below are read.
#[derive(Clone)]
pub struct SqlCredentialStore {
    pool: AnyPool,
    kind: DbKind,
}

impl SqlCredentialStore {
    pub fn new(pool: AnyPool, kind: DbKind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn uazapi_credentials(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Option<UazapiCredentials>> {
        let sql = rewrite_sql(
            "SELECT uaz_token, phone_number FROM instances WHERE id = ?",
            self.kind,
        );
        let row = sqlx::query(sql.as_ref())
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let token: Option<String> = row.try_get("uaz_token")?;
        let phone_number: Option<String> = row.try_get("phone_number")?;
        Ok(token
            .filter(|t| !t.trim().is_empty())
            .map(|token| UazapiCredentials {
                token,
                phone_number,
            }))
    }

    async fn cloudapi_credentials(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Option<PartialCloudApiCredentials>> {
        let sql = rewrite_sql(
            r#"SELECT cloud_api_access_token, cloud_api_phone_number_id, cloud_api_waba_id
               FROM instances WHERE id = ?"#,
            self.kind,
        );
        let row = sqlx::query(sql.as_ref())
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(PartialCloudApiCredentials {
            access_token: row.try_get("cloud_api_access_token")?,
            phone_number_id: row.try_get("cloud_api_phone_number_id")?,
            waba_id: row.try_get("cloud_api_waba_id")?,
        }))
    }

    async fn cloudapi_token_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> ProviderResult<Option<String>> {
        let sql = rewrite_sql(
            "SELECT cloud_api_access_token FROM instances WHERE cloud_api_phone_number_id = ? LIMIT 1",
            self.kind,
        );
        let row = sqlx::query(sql.as_ref())
            .bind(phone_number_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("cloud_api_access_token")?),
            None => Ok(None),
        }
    }
}
