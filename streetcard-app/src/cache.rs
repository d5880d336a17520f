use serde_json::Value;
use streetcard_logic::{CardStore, PersistenceError};
use tauri::AppHandle;
use tauri_plugin_store::StoreExt;

const STORE_NAME: &str = "card";

/// [CardStore] on top of the store plugin, values are kept as JSON text
pub struct TauriCardStore(AppHandle);

impl TauriCardStore {
    pub fn new(app: AppHandle) -> Self {
        Self(app)
    }
}

fn store_err(err: impl ToString) -> PersistenceError {
    PersistenceError(err.to_string())
}

impl CardStore for TauriCardStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let store = self.0.store(STORE_NAME).map_err(store_err)?;

        let bytes = match store.get(key) {
            None => None,
            Some(Value::String(text)) => Some(text.into_bytes()),
            Some(other) => {
                return Err(PersistenceError(format!(
                    "Expected text under {key}, found {other}"
                )));
            }
        };

        Ok(bytes)
    }

    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), PersistenceError> {
        let store = self.0.store(STORE_NAME).map_err(store_err)?;
        let text = String::from_utf8(bytes).map_err(store_err)?;
        store.set(key, Value::String(text));
        store.save().map_err(store_err)
    }
}
