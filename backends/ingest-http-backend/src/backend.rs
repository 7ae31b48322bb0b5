/*!
[`HttpBackend`]: the [`Backend`](cur_ingest::Backend) implementation over
an HTTP SQL warehouse. This family of backends reads object storage
directly through its own table functions, so `supports_native_object_store()`
is `true`, `data_reader()` is always `None`, and loads go through
[`writer::ingest_native`] rather than a local `RowStream`.
*/

use std::sync::Arc;

use async_trait::async_trait;
use cur_ingest::{
    registry::{BackendConfig, BackendFactory},
    reader::FileFormat,
    store::Credentials,
    Backend, DataReader, Error as IngestError, RowStream, StateStore, WriteDisposition,
};
use tokio::sync::OnceCell;
use url::Url;

use crate::{client::HttpSqlClient, error::Error, schema, state_store::HttpStateStore, writer};

/// An HTTP-SQL-fronted warehouse, reachable from the registry as `"http"`.
pub struct HttpBackend {
    base_url: Url,
    database: String,
    user: Option<String>,
    password: Option<String>,
    client: OnceCell<HttpSqlClient>,
    state_store: OnceCell<Arc<dyn StateStore>>,
}

impl HttpBackend {
    /// Build a backend targeting `base_url`/`database`, connecting
    /// lazily on first use (consistent with `ingest-sql-backend`).
    pub fn new(base_url: Url, database: impl Into<String>, user: Option<String>, password: Option<String>) -> Self {
        HttpBackend {
            base_url,
            database: database.into(),
            user,
            password,
            client: OnceCell::new(),
            state_store: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&HttpSqlClient, Error> {
        self.client
            .get_or_try_init(|| async {
                HttpSqlClient::new(self.base_url.clone(), self.database.clone(), self.user.clone(), self.password.clone())
            })
            .await
    }
}

/// A [`BackendFactory`] reading `url`, `database`, `user`, and `password`
/// from the resolved backend config.
pub fn factory() -> BackendFactory {
    Arc::new(|config: &BackendConfig| {
        let url = config
            .get("url")
            .ok_or_else(|| IngestError::ConfigInvalid("http backend requires a 'url' setting".to_string()))?;
        let base_url = Url::parse(url)
            .map_err(|err| IngestError::ConfigInvalid(format!("invalid http backend url '{url}': {err}")))?;
        let database = config.get("database").cloned().unwrap_or_else(|| "default".to_string());
        let user = config.get("user").cloned();
        let password = config.get("password").cloned();
        Ok(Arc::new(HttpBackend::new(base_url, database, user, password)) as Arc<dyn Backend>)
    })
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn connection_descriptor(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn table_reference(&self, dataset: &str, table: &str) -> String {
        schema::qualified(dataset, table)
    }

    fn supports_native_object_store(&self) -> bool {
        true
    }

    async fn state_store(&self) -> Result<Arc<dyn StateStore>, IngestError> {
        if let Some(store) = self.state_store.get() {
            return Ok(Arc::clone(store));
        }
        let client = self.client().await.map_err(IngestError::from)?;
        let store: Arc<dyn StateStore> = Arc::new(HttpStateStore::new(client.clone()).await.map_err(Error::from)?);
        let _ = self.state_store.set(Arc::clone(&store));
        Ok(store)
    }

    fn data_reader(&self) -> Option<Arc<dyn DataReader>> {
        None
    }

    async fn write_table(
        &self,
        dataset: &str,
        table: &str,
        disposition: WriteDisposition,
        rows: RowStream,
    ) -> Result<i64, IngestError> {
        let client = self.client().await.map_err(IngestError::from)?;
        writer::write_table(client, dataset, table, disposition, rows).await
    }

    async fn ingest_native(
        &self,
        dataset: &str,
        table: &str,
        disposition: WriteDisposition,
        bucket: &str,
        data_files: &[String],
        format: FileFormat,
        credentials: &Credentials,
    ) -> Result<i64, IngestError> {
        let client = self.client().await.map_err(IngestError::from)?;
        writer::ingest_native(client, dataset, table, disposition, bucket, data_files, format, credentials).await
    }

    async fn refresh_unified_view(&self, dataset: &str, export_sanitized: &str) -> Result<(), IngestError> {
        let client = self.client().await.map_err(IngestError::from)?;
        let table_names = schema::tables_for_export(client, dataset, export_sanitized).await.map_err(Error::from)?;
        if table_names.is_empty() {
            return Ok(());
        }

        let mut all_columns: Vec<String> = Vec::new();
        let mut per_table_columns: Vec<(String, Vec<String>)> = Vec::new();
        for name in &table_names {
            let columns = schema::table_columns(client, dataset, name).await.map_err(Error::from)?;
            for column in &columns {
                if !all_columns.contains(column) {
                    all_columns.push(column.clone());
                }
            }
            per_table_columns.push((name.clone(), columns));
        }

        let selects: Vec<String> = per_table_columns
            .iter()
            .map(|(name, columns)| {
                let projected: Vec<String> = all_columns
                    .iter()
                    .map(|col| {
                        if columns.contains(col) {
                            schema::quote_ident(col)
                        } else {
                            format!("NULL AS {}", schema::quote_ident(col))
                        }
                    })
                    .collect();
                format!("SELECT {} FROM {}", projected.join(", "), schema::qualified(dataset, name))
            })
            .collect();

        let view = schema::qualified(dataset, &format!("{export_sanitized}_unified"));
        let sql = format!("CREATE OR REPLACE VIEW {view} AS {}", selects.join(" UNION ALL "));
        client.execute(&sql).await.map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_descriptor_includes_database() {
        let backend = HttpBackend::new(Url::parse("http://localhost:8123").unwrap(), "aws_billing", None, None);
        assert_eq!(backend.connection_descriptor(), "http://localhost:8123/aws_billing");
    }

    #[test]
    fn table_reference_backtick_quotes() {
        let backend = HttpBackend::new(Url::parse("http://localhost:8123").unwrap(), "aws_billing", None, None);
        assert_eq!(backend.table_reference("aws_billing", "acme_2024_01"), "`aws_billing`.`acme_2024_01`");
    }
}
