/*!
A thin client for a ClickHouse-style HTTP SQL interface: every statement
is a single `POST` of the raw SQL text to the base URL, with the target
database passed as a query parameter and credentials as request headers.
There is no connection pooling to manage — `reqwest::Client` already
keeps its own connection pool — so this wraps a client plus the fixed
per-request parameters.
*/

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::Error;

#[derive(Clone)]
/// A connection to one ClickHouse-style HTTP SQL endpoint.
pub struct HttpSqlClient {
    http: reqwest::Client,
    base_url: Url,
    database: String,
    user: Option<String>,
    password: Option<String>,
}

impl HttpSqlClient {
    /// Build a client for `base_url` (e.g. `http://localhost:8123`),
    /// targeting `database` by default.
    pub fn new(
        base_url: Url,
        database: impl Into<String>,
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(HttpSqlClient {
            http,
            base_url,
            database: database.into(),
            user,
            password,
        })
    }

    /// The database this client targets.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Execute a statement with no result rows (DDL, INSERT, ALTER, …).
    pub async fn execute(&self, sql: &str) -> Result<(), Error> {
        self.post(sql).await?;
        Ok(())
    }

    /// Execute a SELECT and parse each result row as a JSON object.
    /// Appends `FORMAT JSONEachRow` to `sql`, matching the convention the
    /// rest of this client's callers use for reading back catalog state.
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Value>, Error> {
        let body = self.post(&format!("{sql} FORMAT JSONEachRow")).await?;
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Value>(line).map_err(|err| Error::UnexpectedResponse(err.to_string())))
            .collect()
    }

    async fn post(&self, sql: &str) -> Result<String, Error> {
        let mut request = self
            .http
            .post(self.base_url.clone())
            .query(&[("database", self.database.as_str())])
            .body(sql.to_string());
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::QueryFailed {
                status: status.as_u16(),
                body: truncate(&body, 2048),
            });
        }
        Ok(body)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn truncate_clips_long_strings() {
        let long = "a".repeat(20);
        assert_eq!(truncate(&long, 5).chars().count(), 6);
    }
}
