pub mod document_loader;
pub(crate) mod injector;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

/// Called once when every script of a batch loaded.
pub type SuccessFn = Box<dyn FnOnce() + Send>;
/// Called at most once with the first error a batch observes.
pub type FailureFn = Box<dyn FnOnce(LoaderError) + Send>;

/// One script to load.
///
/// `async` and `defer` default to `false`. `src` is accepted as an alias of `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(alias = "src")]
    pub url: String,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub defer: bool,
}

impl ResourceDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_async: false,
            defer: false,
        }
    }

    #[must_use] pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    #[must_use] pub fn with_defer(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }
}

impl From<&str> for ResourceDescriptor {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

pub(crate) fn fail_or_log(on_failure: Option<FailureFn>, err: LoaderError) {
    match on_failure {
        Some(failure) => failure(err),
        None => tracing::error!(error = %err, "script load failed"),
    }
}
