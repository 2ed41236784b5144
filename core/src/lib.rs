//! # scriptloader - Core API Documentation
//!
//! scriptloader injects external scripts into a host document, fetching every
//! URL at most once per document and reporting one aggregate outcome per batch
//! of scripts.
//!
//! ## Features
//!
//! - **Deduplication**: a URL requested again while it loads joins the pending
//!   load, a URL that already finished resolves right away
//! - **Modular Architecture** with clearly defined components:
//!   - **Documents**: the host the scripts are injected into, behind the `Document` trait
//!   - **Document loaders**: per-document bookkeeping of every requested URL
//!   - **Registry**: lazily creates one document loader per document, supports delayed loads
//!
//! ## Examples
//!
//! ### Loading a batch
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//! use scriptloader::prelude::*;
//!
//! let loader = ScriptLoader::new();
//! let doc = Arc::new(MemoryDocument::new());
//!
//! loader.load_list(
//!     &doc,
//!     vec![
//!         ResourceDescriptor::new("/tinymce/tinymce.min.js"),
//!         ResourceDescriptor::new("/plugins/code.js").with_defer(true),
//!     ],
//!     Duration::ZERO,
//!     || println!("all scripts loaded"),
//!     Some(Box::new(|err: LoaderError| eprintln!("{err}"))),
//! );
//!
//! // the in-memory host only reports completion when told to
//! doc.fire_load("/tinymce/tinymce.min.js");
//! doc.fire_load("/plugins/code.js");
//! ```
//!
//! ### Awaiting a batch
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use scriptloader::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LoaderError> {
//!     let loader = ScriptLoaderBuilder::new()
//!         .id_prefix("editor")
//!         .build()
//!         .expect("valid config");
//!     let doc = Arc::new(MemoryDocument::new());
//!
//!     loader
//!         .load(&doc, vec!["/tinymce/tinymce.min.js".into()], Duration::from_millis(100))
//!         .await
//! }
//! ```
//!
//! ## Callback ordering
//!
//! A batch whose scripts are all already loaded resolves synchronously, before
//! `load_list` returns. Callers must not assume callbacks always run later.

/// Configuration shared by every loader of a registry
pub mod config;

/// Host document traits and the builtin in-memory document
pub mod document;

/// Error types for all library operations
pub mod error;

/// Script loading: per-document loaders and the registry owning them
pub mod loader;

/// Convenience prelude exports
pub mod prelude;

/// Identifier generation and plugin list helpers
pub mod utils;
