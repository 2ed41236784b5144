use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ID_PREFIX: &str = "tiny";
pub const DEFAULT_SCRIPT_TYPE: &str = "application/javascript";
pub const DEFAULT_REFERRER_POLICY: &str = "origin";

/// Settings shared by every document loader a [`ScriptLoader`](crate::loader::registry::ScriptLoader) creates.
///
/// Every field is optional when deserializing.
///
/// # Examples
///
/// ```json
/// {
///     "id_prefix": "editor",
///     "script_type": "module",
///     "referrer_policy": "no-referrer"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoaderConfig {
    /// Prefix of the generated element identifiers, `<prefix>_<uuid>`.
    pub id_prefix: String,
    /// Value of the injected node's `type` attribute.
    pub script_type: String,
    /// Value of the injected node's `referrerpolicy` attribute.
    pub referrer_policy: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            script_type: DEFAULT_SCRIPT_TYPE.to_string(),
            referrer_policy: DEFAULT_REFERRER_POLICY.to_string(),
        }
    }
}

impl LoaderConfig {
    /// Parses and validates a JSON config.
    ///
    /// # Errors
    /// * `ConfigError::Json` - malformed JSON or unknown fields
    /// * `ConfigError::EmptyIdPrefix` - `id_prefix` is an empty string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_prefix.is_empty() {
            return Err(ConfigError::EmptyIdPrefix);
        }
        Ok(())
    }
}
