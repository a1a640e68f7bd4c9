//! CLI command implementations.

pub mod changes;
pub mod checkpoint;
pub mod compact;
pub mod rectify;
pub mod records;
pub mod replicate;

use relica_core::TrackedModel;
use relica_storage::{FileStore, Filter};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Which store and model a command works on.
#[derive(Debug, Clone)]
pub struct StoreArgs {
    /// Store log file.
    pub path: PathBuf,
    /// Connector name reported by the store.
    pub connector: String,
    /// Tracked model name.
    pub model: String,
}

impl StoreArgs {
    /// Resolves the connector name, falling back to the file stem.
    pub fn new(path: PathBuf, connector: Option<String>, model: String) -> Self {
        let connector = connector
            .or_else(|| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "file".to_string());
        Self {
            path,
            connector,
            model,
        }
    }

    /// Opens the store, creating it if missing.
    pub fn open_store(&self) -> CommandResult<Arc<FileStore>> {
        Ok(Arc::new(FileStore::open_named(&self.path, &self.connector)?))
    }

    /// Opens the tracked model.
    pub fn open_model(&self) -> CommandResult<TrackedModel> {
        Ok(TrackedModel::new(self.open_store()?, self.model.as_str()))
    }
}

/// Parses `FIELD=VALUE` conditions into an equality filter.
///
/// Values are read as JSON when they parse as JSON, otherwise as strings.
pub fn parse_conditions(conditions: &[String]) -> CommandResult<Filter> {
    conditions.iter().try_fold(Filter::new(), |filter, condition| -> CommandResult<Filter> {
        let (field, raw) = condition
            .split_once('=')
            .ok_or_else(|| format!("Invalid condition {condition:?}, expected FIELD=VALUE"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Ok(filter.where_eq(field, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relica_storage::Record;
    use serde_json::json;

    #[test]
    fn connector_defaults_to_file_stem() {
        let args = StoreArgs::new(PathBuf::from("/tmp/client.log"), None, "todo".into());
        assert_eq!(args.connector, "client");

        let args = StoreArgs::new(PathBuf::from("/tmp/client.log"), Some("phone".into()), "todo".into());
        assert_eq!(args.connector, "phone");
    }

    #[test]
    fn conditions_parse_json_or_string() {
        let filter = parse_conditions(&["owner=ann".into(), "done=false".into()]).unwrap();
        let matching = Record::new("1")
            .with_field("owner", "ann")
            .with_field("done", json!(false));
        let other = Record::new("2")
            .with_field("owner", "ann")
            .with_field("done", json!(true));
        assert!(filter.matches(&matching));
        assert!(!filter.matches(&other));

        assert!(parse_conditions(&["nonsense".into()]).is_err());
    }
}
