/*!
Layered configuration: a TOML file, overlaid with `CUR_INGEST_*`
environment variables, overlaid with parsed CLI flags — each layer only
filling in fields the previous layer left unset, modeled on the original
Python implementation's `core/config.py::Config.load` /
`merge_cli_args`. Every field is optional until [`Config::validate`]
checks required ones, so missing configuration is reported as one
`ConfigInvalid` error listing every missing field rather than failing on
the first.
*/

use std::path::Path;

use cur_ingest::Error;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// The `[sql]` table: connection settings for `ingest-sql-backend`.
pub struct SqlConfig {
    /// `postgres://...` or `sqlite:...` connection string
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// The `[http]` table: connection settings for `ingest-http-backend`.
pub struct HttpConfig {
    /// Base URL of the HTTP SQL endpoint
    pub url: Option<String>,
    /// Target database name
    pub database: Option<String>,
    /// Basic-auth user
    pub user: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// The `[aws]` table: S3 credentials, falling back to the standard
/// `AWS_*` environment variables when unset.
pub struct AwsCredsConfig {
    /// Access key id
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Session token
    pub session_token: Option<String>,
    /// Bucket region
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// The `[azure]` table: Blob Storage credentials.
pub struct AzureCredsConfig {
    /// Storage account name
    pub account: Option<String>,
    /// Storage account access key
    pub access_key: Option<String>,
    /// A full connection string, takes precedence over account/access_key
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// The full shape of `config.toml`. Every field is optional: a layer
/// only supplies what it knows, and later layers (env, then CLI) only
/// override fields they actually set.
pub struct Config {
    /// Which backend adapter to use: `"sql"` or `"http"`
    pub backend: Option<String>,
    /// `"aws"` or `"azure"`
    pub vendor: Option<String>,
    /// Source bucket or container
    pub bucket: Option<String>,
    /// Path prefix (AWS) or directory (Azure)
    pub prefix: Option<String>,
    /// Caller-supplied logical export name
    pub export_name: Option<String>,
    /// Manifest schema version, `"v1"` or `"v2"` (a.k.a. `cur_version`)
    pub format_version: Option<String>,
    /// `csv|parquet|auto`
    pub export_format: Option<String>,
    /// Inclusive start month, `YYYY-MM`
    pub start_date: Option<String>,
    /// Inclusive end month, `YYYY-MM`
    pub end_date: Option<String>,
    /// Force reload regardless of recorded state
    pub reset: Option<bool>,
    /// `separate` (default) or `single`
    pub strategy: Option<String>,
    /// Azure only: whether the export is partitioned
    pub azure_partitioned: Option<bool>,
    /// Scratch directory root for Azure's CSV→Parquet convert step
    pub data_dir: Option<String>,
    /// Collect per-manifest errors and continue instead of aborting on
    /// the first
    pub continue_on_error: Option<bool>,
    /// `ingest-sql-backend` settings
    pub sql: SqlConfig,
    /// `ingest-http-backend` settings
    pub http: HttpConfig,
    /// AWS object-store credentials
    pub aws: AwsCredsConfig,
    /// Azure object-store credentials
    pub azure: AzureCredsConfig,
}

impl Config {
    /// Load `path` if it exists; an absent file is not an error (the
    /// original behaves the same way with its default `./config.toml`).
    pub fn from_file(path: &Path) -> Result<Config, Error> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| Error::ConfigInvalid(format!("{}: {err}", path.display())))
    }

    /// Overlay `CUR_INGEST_*` environment variables onto unset fields.
    pub fn apply_env(&mut self) {
        macro_rules! env_str {
            ($field:expr, $key:literal) => {
                if $field.is_none() {
                    $field = std::env::var($key).ok();
                }
            };
        }
        macro_rules! env_bool {
            ($field:expr, $key:literal) => {
                if $field.is_none() {
                    $field = std::env::var($key).ok().and_then(|v| v.parse().ok());
                }
            };
        }

        env_str!(self.backend, "CUR_INGEST_BACKEND");
        env_str!(self.vendor, "CUR_INGEST_VENDOR");
        env_str!(self.bucket, "CUR_INGEST_BUCKET");
        env_str!(self.prefix, "CUR_INGEST_PREFIX");
        env_str!(self.export_name, "CUR_INGEST_EXPORT_NAME");
        env_str!(self.format_version, "CUR_INGEST_FORMAT_VERSION");
        env_str!(self.export_format, "CUR_INGEST_EXPORT_FORMAT");
        env_str!(self.start_date, "CUR_INGEST_START_DATE");
        env_str!(self.end_date, "CUR_INGEST_END_DATE");
        env_bool!(self.reset, "CUR_INGEST_RESET");
        env_str!(self.strategy, "CUR_INGEST_STRATEGY");
        env_bool!(self.azure_partitioned, "CUR_INGEST_AZURE_PARTITIONED");
        env_str!(self.data_dir, "CUR_INGEST_DATA_DIR");
        env_bool!(self.continue_on_error, "CUR_INGEST_CONTINUE_ON_ERROR");

        env_str!(self.sql.url, "CUR_INGEST_SQL_URL");
        env_str!(self.http.url, "CUR_INGEST_HTTP_URL");
        env_str!(self.http.database, "CUR_INGEST_HTTP_DATABASE");
        env_str!(self.http.user, "CUR_INGEST_HTTP_USER");
        env_str!(self.http.password, "CUR_INGEST_HTTP_PASSWORD");

        // AWS credentials fall back to the vendor SDK's own standard
        // names, not just CUR_INGEST_-prefixed ones, since operators
        // already set these for every other AWS tool.
        env_str!(self.aws.access_key_id, "AWS_ACCESS_KEY_ID");
        env_str!(self.aws.secret_access_key, "AWS_SECRET_ACCESS_KEY");
        env_str!(self.aws.session_token, "AWS_SESSION_TOKEN");
        env_str!(self.aws.region, "AWS_DEFAULT_REGION");

        env_str!(self.azure.account, "AZURE_STORAGE_ACCOUNT");
        env_str!(self.azure.access_key, "AZURE_STORAGE_KEY");
        env_str!(self.azure.connection_string, "AZURE_STORAGE_CONNECTION_STRING");
    }

    /// Overlay another `Config` (typically parsed from CLI flags) onto
    /// unset fields; CLI flags are the highest-precedence layer.
    pub fn apply_overlay(&mut self, overlay: Config) {
        macro_rules! take {
            ($field:ident) => {
                if overlay.$field.is_some() {
                    self.$field = overlay.$field;
                }
            };
        }
        take!(backend);
        take!(vendor);
        take!(bucket);
        take!(prefix);
        take!(export_name);
        take!(format_version);
        take!(export_format);
        take!(start_date);
        take!(end_date);
        take!(reset);
        take!(strategy);
        take!(azure_partitioned);
        take!(data_dir);
        take!(continue_on_error);

        if overlay.sql.url.is_some() {
            self.sql.url = overlay.sql.url;
        }
        if overlay.http.url.is_some() {
            self.http.url = overlay.http.url;
        }
        if overlay.http.database.is_some() {
            self.http.database = overlay.http.database;
        }
    }

    /// Required-field validation, mirroring `validate_aws_config`: every
    /// missing field is reported together, and this runs before any
    /// state mutation (spec.md §7 rule 1).
    pub fn validate(&self) -> Result<(), Error> {
        let mut missing = Vec::new();
        if self.backend.is_none() {
            missing.push("backend");
        }
        if self.vendor.is_none() {
            missing.push("vendor");
        }
        if self.bucket.is_none() {
            missing.push("bucket");
        }
        if self.prefix.is_none() {
            missing.push("prefix");
        }
        if self.export_name.is_none() {
            missing.push("export_name");
        }

        match self.backend.as_deref() {
            Some("sql") if self.sql.url.is_none() => missing.push("sql.url"),
            Some("http") if self.http.url.is_none() => missing.push("http.url"),
            _ => {}
        }

        if !missing.is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "missing required configuration: {}. Set these in config.toml, environment variables, or CLI flags.",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// A narrower check for subcommands (`list-exports`) that only need a
    /// backend connection, not a source (vendor/bucket/prefix/export_name).
    pub fn validate_backend_only(&self) -> Result<(), Error> {
        let mut missing = Vec::new();
        if self.backend.is_none() {
            missing.push("backend");
        }
        match self.backend.as_deref() {
            Some("sql") if self.sql.url.is_none() => missing.push("sql.url"),
            Some("http") if self.http.url.is_none() => missing.push("http.url"),
            _ => {}
        }
        if !missing.is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "missing required configuration: {}. Set these in config.toml, environment variables, or CLI flags.",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_every_missing_field_together() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("backend"));
        assert!(message.contains("vendor"));
        assert!(message.contains("bucket"));
    }

    #[test]
    fn apply_overlay_only_overrides_set_fields() {
        let mut base = Config {
            bucket: Some("base-bucket".to_string()),
            prefix: Some("base-prefix".to_string()),
            ..Config::default()
        };
        let overlay = Config {
            prefix: Some("cli-prefix".to_string()),
            ..Config::default()
        };
        base.apply_overlay(overlay);
        assert_eq!(base.bucket.as_deref(), Some("base-bucket"));
        assert_eq!(base.prefix.as_deref(), Some("cli-prefix"));
    }

    #[test]
    fn from_file_missing_path_is_not_an_error() {
        let config = Config::from_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(config.backend.is_none());
    }

    #[test]
    fn from_file_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            backend = "sql"
            vendor = "aws"
            bucket = "my-bucket"

            [sql]
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.backend.as_deref(), Some("sql"));
        assert_eq!(config.sql.url.as_deref(), Some("sqlite::memory:"));
    }
}
