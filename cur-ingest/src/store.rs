/*!
The Object-Store Client: credentials and construction of an
[`ObjectStore`] for a vendor's bucket/container, plus the small set of
list/fetch helpers the rest of the crate builds on.
*/

use std::sync::Arc;

use object_store::{aws::AmazonS3Builder, azure::MicrosoftAzureBuilder, path::Path, ObjectStore};

use crate::error::Error;

#[derive(Debug, Clone, Default)]
/// AWS credentials for an S3 bucket. Empty fields fall back to the
/// object_store crate's default credential chain (env vars, instance
/// profile, etc).
pub struct AwsCredentials {
    /// Access key id
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Session token, for temporary credentials
    pub session_token: Option<String>,
    /// Region the bucket lives in
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default)]
/// Azure credentials for a blob container.
pub struct AzureCredentials {
    /// Storage account name
    pub account: Option<String>,
    /// Storage account access key
    pub access_key: Option<String>,
    /// A full connection string, taking precedence over account/access_key
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone)]
/// Vendor-tagged object-store credentials.
pub enum Credentials {
    /// AWS S3
    Aws(AwsCredentials),
    /// Azure Blob Storage
    Azure(AzureCredentials),
}

/// Build an [`ObjectStore`] for the given bucket/container using the
/// supplied credentials.
pub fn build_object_store(
    bucket_or_container: &str,
    credentials: &Credentials,
) -> Result<Arc<dyn ObjectStore>, Error> {
    match credentials {
        Credentials::Aws(creds) => {
            let mut builder = AmazonS3Builder::new().with_bucket_name(bucket_or_container);
            if let Some(key) = &creds.access_key_id {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = &creds.secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }
            if let Some(token) = &creds.session_token {
                builder = builder.with_token(token);
            }
            if let Some(region) = &creds.region {
                builder = builder.with_region(region);
            }
            Ok(Arc::new(builder.build()?))
        }
        Credentials::Azure(creds) => {
            let mut builder =
                MicrosoftAzureBuilder::new().with_container_name(bucket_or_container);
            if let Some(conn) = &creds.connection_string {
                builder = builder.with_connection_string(conn);
            } else {
                if let Some(account) = &creds.account {
                    builder = builder.with_account(account);
                }
                if let Some(key) = &creds.access_key {
                    builder = builder.with_access_key(key);
                }
            }
            Ok(Arc::new(builder.build()?))
        }
    }
}

/// List every object under `prefix`, paginating internally (the
/// `object_store` crate's `list` already streams pages; we collect here
/// because manifest sets are small relative to data files).
pub async fn list_under_prefix(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<object_store::ObjectMeta>, Error> {
    use futures::StreamExt;

    let path: Path = prefix.into();
    let mut out = Vec::new();
    let mut stream = store.list(Some(&path));
    while let Some(meta) = stream.next().await {
        match meta {
            Ok(meta) => out.push(meta),
            Err(err) => return Err(Error::Transport(err.to_string())),
        }
    }
    Ok(out)
}

/// Fetch the full bytes of a small object (manifests only — never call
/// this on a data file; those are read through [`crate::reader`] instead).
pub async fn get_bytes(store: &dyn ObjectStore, key: &str) -> Result<bytes::Bytes, Error> {
    let path: Path = key.into();
    match store.get(&path).await {
        Ok(result) => Ok(result.bytes().await?),
        Err(object_store::Error::NotFound { path, .. }) => {
            Err(Error::ObjectNotFound(path.to_string()))
        }
        Err(err) => Err(Error::ObjectStore(err)),
    }
}
