// In-memory key-value storage tools

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use toolbridge_core::{
    ParamSpec, ToolArgs, ToolDescriptor, ToolEntry, ToolError, ToolHandler, ToolOutput,
};

/// Key-value store shared by every storage tool.
///
/// Safe for concurrent use from any number of executor threads: every
/// operation holds the mutex for its full read-modify-write, so a `store`
/// is visible to any `retrieve` that locks after it.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self, key: &str, value: &str) -> Result<String, ToolError> {
        check_key(key)?;
        self.entries().insert(key.to_string(), value.to_string());
        Ok(format!("Stored value under key '{}'", key))
    }

    /// Returns the stored value, or a "not found" message (not an error)
    pub fn retrieve(&self, key: &str) -> Result<String, ToolError> {
        check_key(key)?;
        Ok(self
            .entries()
            .get(key)
            .cloned()
            .unwrap_or_else(|| not_found(key)))
    }

    pub fn delete(&self, key: &str) -> Result<String, ToolError> {
        check_key(key)?;
        Ok(match self.entries().remove(key) {
            Some(_) => format!("Deleted value for key '{}'", key),
            None => not_found(key),
        })
    }

    pub fn list_keys(&self) -> String {
        let entries = self.entries();
        if entries.is_empty() {
            return "No keys stored".to_string();
        }
        let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
        format!("Stored keys: {}", keys.join(", "))
    }

    pub fn clear(&self) -> String {
        let mut entries = self.entries();
        let size = entries.len();
        entries.clear();
        format!("Cleared {} entries from storage", size)
    }

    pub fn count(&self) -> String {
        format!("Storage contains {} entries", self.len())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

fn check_key(key: &str) -> Result<(), ToolError> {
    if key.trim().is_empty() {
        return Err(ToolError::domain("Key cannot be empty"));
    }
    Ok(())
}

fn not_found(key: &str) -> String {
    format!("No value found for key '{}'", key)
}

fn entry(
    descriptor: ToolDescriptor,
    store: &Arc<KeyValueStore>,
    f: fn(&KeyValueStore, &ToolArgs) -> Result<String, ToolError>,
) -> ToolEntry {
    let store = store.clone();
    let handler: Arc<dyn ToolHandler> =
        Arc::new(move |args: &ToolArgs| -> Result<ToolOutput, ToolError> {
            f(&store, args).map(ToolOutput::Text)
        });
    (descriptor, handler)
}

/// Storage registration list, all bound to the same `store`
pub fn tools(store: Arc<KeyValueStore>) -> Vec<ToolEntry> {
    vec![
        entry(
            ToolDescriptor::new("store", "Store a value with the given key in memory")
                .param(ParamSpec::string("key"))
                .param(ParamSpec::string("value")),
            &store,
            |s, args| s.store(args.text("key")?, args.text("value")?),
        ),
        entry(
            ToolDescriptor::new("retrieve", "Retrieve a value by key from memory storage")
                .param(ParamSpec::string("key")),
            &store,
            |s, args| s.retrieve(args.text("key")?),
        ),
        entry(
            ToolDescriptor::new("delete", "Delete a value by key from memory storage")
                .param(ParamSpec::string("key")),
            &store,
            |s, args| s.delete(args.text("key")?),
        ),
        entry(
            ToolDescriptor::new("listKeys", "List all stored keys in memory"),
            &store,
            |s, _| Ok(s.list_keys()),
        ),
        entry(
            ToolDescriptor::new("clear", "Clear all stored data from memory"),
            &store,
            |s, _| Ok(s.clear()),
        ),
        entry(
            ToolDescriptor::new("count", "Get the count of stored entries in memory"),
            &store,
            |s, _| Ok(s.count()),
        ),
    ]
}
