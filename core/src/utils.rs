use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generates a document-unique element identifier of the form `<prefix>_<uuid>`.
pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// A plugin list as accepted by editor configuration, either a
/// space-separated string or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginList {
    Spaced(String),
    List(Vec<String>),
}

impl From<&str> for PluginList {
    fn from(value: &str) -> Self {
        Self::Spaced(value.to_string())
    }
}

impl From<Vec<String>> for PluginList {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

pub fn normalize_plugin_list(plugins: Option<&PluginList>) -> Vec<String> {
    match plugins {
        None => vec![],
        Some(PluginList::Spaced(s)) if s.is_empty() => vec![],
        Some(PluginList::Spaced(s)) => s.split(' ').map(str::to_string).collect(),
        Some(PluginList::List(list)) => list.clone(),
    }
}

/// Concatenates the initial plugin list with the input one, initial plugins first.
pub fn merge_plugins(init: Option<&PluginList>, input: Option<&PluginList>) -> Vec<String> {
    let mut merged = normalize_plugin_list(init);
    merged.extend(normalize_plugin_list(input));
    merged
}
