use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{
    document_loader::DocumentScriptLoader, fail_or_log, FailureFn, ResourceDescriptor,
};
use crate::{
    config::LoaderConfig,
    document::Document,
    error::{ConfigError, LoaderError},
    utils::lock,
};

/// A builder for constructing a [`ScriptLoader`].
pub struct ScriptLoaderBuilder {
    config: LoaderConfig,
}

impl ScriptLoaderBuilder {
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
        }
    }

    /// Replaces the whole config, e.g. one parsed with [`LoaderConfig::from_json`].
    #[must_use] pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Prefix of generated element identifiers, `tiny` by default
    #[must_use] pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.id_prefix = prefix.into();
        self
    }

    /// `type` attribute of injected nodes, `application/javascript` by default
    #[must_use] pub fn script_type(mut self, script_type: impl Into<String>) -> Self {
        self.config.script_type = script_type.into();
        self
    }

    /// `referrerpolicy` attribute of injected nodes, `origin` by default
    #[must_use] pub fn referrer_policy(mut self, policy: impl Into<String>) -> Self {
        self.config.referrer_policy = policy.into();
        self
    }

    /// # Errors
    /// `ConfigError::EmptyIdPrefix` if the identifier prefix is empty.
    pub fn build<D: Document>(self) -> Result<ScriptLoader<D>, ConfigError> {
        self.config.validate()?;
        Ok(ScriptLoader {
            loaders: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(self.config),
        })
    }
}

impl Default for ScriptLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns one [`DocumentScriptLoader`] per document.
///
/// Document loaders are created on first use and compared by the identity of
/// the `Arc` they were created for, never by value. Clones share the same set
/// of loaders, the registry lives as long as its last clone unless
/// [`ScriptLoader::reinitialize`] empties it.
pub struct ScriptLoader<D: Document> {
    loaders: Arc<Mutex<Vec<Arc<DocumentScriptLoader<D>>>>>,
    config: Arc<LoaderConfig>,
}

impl<D: Document> Clone for ScriptLoader<D> {
    fn clone(&self) -> Self {
        Self {
            loaders: Arc::clone(&self.loaders),
            config: Arc::clone(&self.config),
        }
    }
}

impl<D: Document> Default for ScriptLoader<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> ScriptLoader<D> {
    pub fn new() -> Self {
        Self {
            loaders: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(LoaderConfig::default()),
        }
    }

    pub fn builder() -> ScriptLoaderBuilder {
        ScriptLoaderBuilder::new()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the loader scoped to `document`, creating it if needed.
    pub fn document_loader(&self, document: &Arc<D>) -> Arc<DocumentScriptLoader<D>> {
        let mut loaders = lock(&self.loaders);
        if let Some(loader) = loaders
            .iter()
            .find(|loader| Arc::ptr_eq(loader.document(), document))
        {
            return Arc::clone(loader);
        }
        let loader = Arc::new(DocumentScriptLoader::with_config(
            Arc::clone(document),
            Arc::clone(&self.config),
        ));
        loaders.push(Arc::clone(&loader));
        debug!(loaders = loaders.len(), "created document script loader");
        loader
    }

    /// Number of documents currently holding a loader.
    pub fn document_count(&self) -> usize {
        lock(&self.loaders).len()
    }

    /// Loads `items` into `document`.
    ///
    /// With a zero `delay` the batch starts before this returns. Otherwise a
    /// single-shot task is spawned on the current tokio runtime that starts it
    /// once `delay` elapsed; it can not be cancelled. Outside of a runtime the
    /// batch fails with `LoaderError::SchedulerUnavailable`.
    pub fn load_list(
        &self,
        document: &Arc<D>,
        items: Vec<ResourceDescriptor>,
        delay: Duration,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: Option<FailureFn>,
    ) {
        if delay.is_zero() {
            self.document_loader(document)
                .load_scripts(&items, on_success, on_failure);
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            fail_or_log(on_failure, LoaderError::SchedulerUnavailable);
            return;
        };
        let registry = self.clone();
        let document = Arc::clone(document);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            registry
                .document_loader(&document)
                .load_scripts(&items, on_success, on_failure);
        });
    }

    /// Future flavoured [`ScriptLoader::load_list`].
    ///
    /// Resolves with the batch outcome. If the loader is torn down while the
    /// batch is pending this yields `LoaderError::Abandoned`; a script the host
    /// never reports on keeps it pending forever.
    pub async fn load(
        &self,
        document: &Arc<D>,
        items: Vec<ResourceDescriptor>,
        delay: Duration,
    ) -> Result<(), LoaderError> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let failure_tx = Arc::clone(&tx);

        self.load_list(
            document,
            items,
            delay,
            move || {
                if let Some(sender) = lock(&tx).take() {
                    let _ = sender.send(Ok(()));
                }
            },
            Some(Box::new(move |err: LoaderError| {
                if let Some(sender) = lock(&failure_tx).take() {
                    let _ = sender.send(Err(err));
                }
            })),
        );

        rx.await.unwrap_or(Err(LoaderError::Abandoned))
    }

    /// Tears down every document loader, most recently created first, and
    /// empties the registry.
    pub fn reinitialize(&self) {
        let mut removed = 0usize;
        loop {
            let next = lock(&self.loaders).pop();
            let Some(loader) = next else {
                break;
            };
            loader.delete_scripts();
            removed += 1;
        }
        info!(removed, "script loader reinitialized");
    }
}
