pub use crate::{
    config::LoaderConfig,
    document::{memory::MemoryDocument, Document, Element},
    error::{ConfigError, HostError, LoaderError},
    loader::{
        document_loader::DocumentScriptLoader,
        registry::{ScriptLoader, ScriptLoaderBuilder},
        FailureFn, ResourceDescriptor, SuccessFn,
    },
};
