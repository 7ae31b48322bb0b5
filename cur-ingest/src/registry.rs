/*!
The Backend Registry: a process-wide, read-only-after-init map from
backend name to adapter factory. No reflection or import-time side
effects — adapters are registered explicitly by whoever assembles the
binary (the CLI crate, or a test).
*/

use std::collections::HashMap;
use std::sync::Arc;

use crate::{backend::Backend, error::Error};

/// A backend's configuration, as a flat string map — by the time it
/// reaches the registry, the layered file/env/CLI precedence that
/// produced it has already been resolved.
pub type BackendConfig = HashMap<String, String>;

/// Builds a `Backend` from its resolved configuration.
pub type BackendFactory =
    Arc<dyn Fn(&BackendConfig) -> Result<Arc<dyn Backend>, Error> + Send + Sync>;

#[derive(Clone, Default)]
/// Name → adapter-factory lookup. Tests construct their own instance
/// rather than touching process-global state.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        BackendRegistry {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under `name`, overwriting any prior registration.
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Names of every registered backend, for error messages.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the named backend from `config`.
    pub fn create(&self, name: &str, config: &BackendConfig) -> Result<Arc<dyn Backend>, Error> {
        match self.factories.get(name) {
            Some(factory) => factory(config),
            None => Err(Error::BackendNotAvailable {
                requested: name.to_string(),
                available: self.available(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{StateStore, WriteDisposition};
    use crate::reader::{DataReader, FileFormat, RowStream};
    use crate::store::Credentials;
    use async_trait::async_trait;

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        fn name(&self) -> &'static str {
            "null"
        }
        fn connection_descriptor(&self) -> String {
            "null".into()
        }
        fn table_reference(&self, dataset: &str, table: &str) -> String {
            format!("{dataset}.{table}")
        }
        fn supports_native_object_store(&self) -> bool {
            false
        }
        async fn state_store(&self) -> Result<Arc<dyn StateStore>, Error> {
            unimplemented!()
        }
        fn data_reader(&self) -> Option<Arc<dyn DataReader>> {
            None
        }
        async fn write_table(
            &self,
            _dataset: &str,
            _table: &str,
            _disposition: WriteDisposition,
            _rows: RowStream,
        ) -> Result<i64, Error> {
            Ok(0)
        }
        async fn ingest_native(
            &self,
            _dataset: &str,
            _table: &str,
            _disposition: WriteDisposition,
            _bucket: &str,
            _data_files: &[String],
            _format: FileFormat,
            _credentials: &Credentials,
        ) -> Result<i64, Error> {
            Ok(0)
        }
        async fn refresh_unified_view(&self, _dataset: &str, _export_sanitized: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn unknown_backend_lists_available_names() {
        let mut registry = BackendRegistry::new();
        registry.register("null", Arc::new(|_cfg: &BackendConfig| Ok(Arc::new(NullBackend) as Arc<dyn Backend>)));

        let err = registry.create("missing", &BackendConfig::new()).unwrap_err();
        match err {
            Error::BackendNotAvailable { requested, available } => {
                assert_eq!(requested, "missing");
                assert_eq!(available, vec!["null".to_string()]);
            }
            other => panic!("expected BackendNotAvailable, got {other:?}"),
        }
    }

    #[test]
    fn registered_backend_constructs() {
        let mut registry = BackendRegistry::new();
        registry.register("null", Arc::new(|_cfg: &BackendConfig| Ok(Arc::new(NullBackend) as Arc<dyn Backend>)));

        let backend = registry.create("null", &BackendConfig::new()).unwrap();
        assert_eq!(backend.name(), "null");
    }
}
