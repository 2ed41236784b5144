use std::sync::{Arc, Mutex, Weak};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use super::{
    fail_or_log,
    injector::{self, Release},
    FailureFn, ResourceDescriptor, SuccessFn,
};
use crate::{
    config::LoaderConfig,
    document::{Document, Element},
    error::{HostError, LoaderError},
    utils::{lock, unique_id},
};

type Waiter = Arc<dyn Fn(&str, Option<&HostError>) + Send + Sync>;
type Lookup = DashMap<String, LoadRecord>;

/// Bookkeeping for one URL requested in a document.
#[derive(Default)]
struct LoadRecord {
    id: String,
    url: String,
    done: bool,
    error: Option<HostError>,
    /// Only non-empty while `done` is false.
    waiters: Vec<Waiter>,
    /// Listeners of the injected node, set while `done` is false.
    release: Option<Release>,
}

struct BatchState {
    succeeded: usize,
    failed: bool,
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

/// Aggregates the per-item completions of one `load_scripts` call.
struct Batch {
    expected: usize,
    state: Mutex<BatchState>,
}

enum Outcome {
    Pending,
    Succeeded(SuccessFn),
    Failed(Option<FailureFn>, LoaderError),
}

impl Batch {
    fn new(expected: usize, on_success: SuccessFn, on_failure: Option<FailureFn>) -> Self {
        Self {
            expected,
            state: Mutex::new(BatchState {
                succeeded: 0,
                failed: false,
                on_success: Some(on_success),
                on_failure,
            }),
        }
    }

    fn item_loaded(&self, url: &str, error: Option<&HostError>) {
        let outcome = {
            let mut state = lock(&self.state);
            if state.failed {
                return;
            }
            match error {
                Some(err) => {
                    state.failed = true;
                    Outcome::Failed(
                        state.on_failure.take(),
                        LoaderError::resource_load(url, Arc::clone(err)),
                    )
                }
                None => {
                    state.succeeded += 1;
                    if state.succeeded == self.expected {
                        state.on_success.take().map_or(Outcome::Pending, Outcome::Succeeded)
                    } else {
                        Outcome::Pending
                    }
                }
            }
        };

        match outcome {
            Outcome::Pending => {}
            Outcome::Succeeded(on_success) => on_success(),
            Outcome::Failed(on_failure, err) => fail_or_log(on_failure, err),
        }
    }
}

/// Loads scripts into a single document, fetching each URL at most once.
///
/// Completion of an already loaded URL is reported synchronously, from within
/// [`DocumentScriptLoader::load_scripts`]. Everything else is reported when the
/// host delivers the node's load or error event.
pub struct DocumentScriptLoader<D: Document> {
    document: Arc<D>,
    config: Arc<LoaderConfig>,
    lookup: Arc<Lookup>,
}

impl<D: Document> DocumentScriptLoader<D> {
    pub fn new(document: Arc<D>) -> Self {
        Self::with_config(document, Arc::new(LoaderConfig::default()))
    }

    pub(crate) fn with_config(document: Arc<D>, config: Arc<LoaderConfig>) -> Self {
        Self {
            document,
            config,
            lookup: Arc::new(DashMap::new()),
        }
    }

    /// The document this loader injects into.
    pub fn document(&self) -> &Arc<D> {
        &self.document
    }

    /// Number of distinct URLs requested since creation or the last teardown.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Whether `url` finished loading without an error.
    pub fn is_loaded(&self, url: &str) -> bool {
        self.lookup
            .get(url)
            .is_some_and(|record| record.done && record.error.is_none())
    }

    /// Loads every script in `items`.
    ///
    /// `on_success` runs once all of them loaded. The first failure is handed
    /// to `on_failure` (or logged when it is `None`) and every later completion
    /// of this batch is ignored. An empty `items` fails with `LoaderError::EmptyBatch`.
    pub fn load_scripts(
        &self,
        items: &[ResourceDescriptor],
        on_success: impl FnOnce() + Send + 'static,
        on_failure: Option<FailureFn>,
    ) {
        if items.is_empty() {
            fail_or_log(on_failure, LoaderError::EmptyBatch);
            return;
        }

        let batch = Arc::new(Batch::new(items.len(), Box::new(on_success), on_failure));
        let waiter: Waiter =
            Arc::new(move |url: &str, error: Option<&HostError>| batch.item_loaded(url, error));

        for item in items {
            match self.lookup.entry(item.url.clone()) {
                Entry::Occupied(mut entry) => {
                    let record = entry.get_mut();
                    if record.done {
                        let error = record.error.clone();
                        drop(entry);
                        debug!(url = %item.url, "script already loaded");
                        waiter(&item.url, error.as_ref());
                    } else {
                        record.waiters.push(Arc::clone(&waiter));
                    }
                }
                Entry::Vacant(entry) => {
                    let id = unique_id(&self.config.id_prefix);
                    entry.insert(LoadRecord {
                        id: id.clone(),
                        url: item.url.clone(),
                        waiters: vec![Arc::clone(&waiter)],
                        ..LoadRecord::default()
                    });
                    self.inject(item, id);
                }
            }
        }
    }

    fn inject(&self, item: &ResourceDescriptor, id: String) {
        let lookup = Arc::downgrade(&self.lookup);
        let record_id = id.clone();
        let Some(release) = injector::inject(
            self.document.as_ref(),
            item,
            &id,
            &self.config,
            Box::new(move |url: &str, error: Option<HostError>| {
                script_loaded(&lookup, &record_id, url, error)
            }),
        ) else {
            return;
        };

        // the host may have completed or the loader torn down the record meanwhile
        let leftover = match self.lookup.get_mut(&item.url) {
            Some(mut record) if record.id == id && !record.done => {
                record.release = Some(release);
                None
            }
            _ => Some(release),
        };
        if let Some(release) = leftover {
            release.release();
        }
    }

    /// Removes every injected script node and forgets all URLs.
    ///
    /// Pending batches are abandoned, their callbacks never run. Scripts still
    /// being fetched by the host are not cancelled.
    pub fn delete_scripts(&self) {
        let mut removed: Vec<LoadRecord> = Vec::new();
        self.lookup.retain(|_, record| {
            removed.push(std::mem::take(record));
            false
        });

        for record in &mut removed {
            if let Some(release) = record.release.take() {
                release.release();
            }
            let Some(element) = self.document.get_element_by_id(&record.id) else {
                continue;
            };
            if element.tag_name().eq_ignore_ascii_case("script") {
                element.detach();
                debug!(url = %record.url, id = %record.id, "removed script");
            }
        }
    }
}

fn script_loaded(lookup: &Weak<Lookup>, id: &str, url: &str, error: Option<HostError>) {
    let Some(lookup) = lookup.upgrade() else {
        return;
    };
    let (waiters, release) = match lookup.get_mut(url) {
        Some(mut record) if record.id == id => {
            record.done = true;
            record.error = error.clone();
            (std::mem::take(&mut record.waiters), record.release.take())
        }
        _ => {
            debug!(url, id, "ignoring completion of a removed script");
            return;
        }
    };

    drop(release);

    for waiter in waiters {
        waiter(url, error.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{memory::MemoryDocument, LoadEvent};
    use crate::loader::test_support::{NetworkDown, Outcomes};

    fn items(urls: &[&str]) -> Vec<ResourceDescriptor> {
        urls.iter().map(|u| ResourceDescriptor::new(*u)).collect()
    }

    fn loader() -> (Arc<MemoryDocument>, DocumentScriptLoader<MemoryDocument>) {
        let doc = Arc::new(MemoryDocument::new());
        let loader = DocumentScriptLoader::new(Arc::clone(&doc));
        (doc, loader)
    }

    #[test]
    fn test_batch_succeeds_once_all_items_loaded() {
        let (doc, loader) = loader();
        let outcomes = Outcomes::default();
        loader.load_scripts(&items(&["a.js", "b.js"]), outcomes.on_success(), outcomes.on_failure());

        assert_eq!(doc.head_children().len(), 2);
        doc.fire_load("a.js");
        assert_eq!(outcomes.successes(), 0);
        doc.fire_load("b.js");
        assert_eq!(outcomes.successes(), 1);
        assert!(outcomes.failures().is_empty());
        assert!(loader.is_loaded("a.js") && loader.is_loaded("b.js"));
    }

    #[test]
    fn test_empty_batch_fails_immediately() {
        let (doc, loader) = loader();
        let outcomes = Outcomes::default();
        loader.load_scripts(&[], outcomes.on_success(), outcomes.on_failure());

        assert_eq!(outcomes.successes(), 0);
        let failures = outcomes.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], LoaderError::EmptyBatch));
        assert_eq!(doc.created_count(), 0);

        // without a failure handler the error is only logged
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        loader.load_scripts(&[], outcomes.on_success(), None);
        assert_eq!(outcomes.successes(), 0);
    }

    #[test]
    fn test_concurrent_batches_share_one_injection() {
        let (doc, loader) = loader();
        let (first, second) = (Outcomes::default(), Outcomes::default());
        loader.load_scripts(&items(&["a.js"]), first.on_success(), first.on_failure());
        loader.load_scripts(&items(&["a.js"]), second.on_success(), second.on_failure());

        assert_eq!(doc.created_count(), 1);
        assert_eq!(loader.len(), 1);
        doc.fire_load("a.js");
        assert_eq!(first.successes(), 1);
        assert_eq!(second.successes(), 1);
    }

    #[test]
    fn test_loaded_script_resolves_synchronously() {
        let (doc, loader) = loader();
        let first = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), first.on_success(), first.on_failure());
        doc.fire_load("a.js");

        let second = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), second.on_success(), second.on_failure());
        assert_eq!(second.successes(), 1);
        assert_eq!(doc.created_count(), 1);
    }

    #[test]
    fn test_only_first_error_is_reported() {
        let (doc, loader) = loader();
        let outcomes = Outcomes::default();
        loader.load_scripts(
            &items(&["a.js", "b.js", "c.js"]),
            outcomes.on_success(),
            outcomes.on_failure(),
        );

        doc.fire_error("b.js", Arc::new(NetworkDown));
        doc.fire_error("a.js", Arc::new(NetworkDown));
        doc.fire_load("c.js");

        assert_eq!(outcomes.successes(), 0);
        let failures = outcomes.failures();
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            LoaderError::ResourceLoad { url, source } => {
                assert_eq!(url, "b.js");
                assert_eq!(source.to_string(), "network down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_cached_error_is_replayed() {
        let (doc, loader) = loader();
        let first = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), first.on_success(), first.on_failure());
        doc.fire_error("a.js", Arc::new(NetworkDown));
        assert_eq!(first.failures().len(), 1);
        assert!(!loader.is_loaded("a.js"));

        let second = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), second.on_success(), second.on_failure());
        assert_eq!(second.failures().len(), 1);
        assert_eq!(doc.created_count(), 1);
    }

    #[test]
    fn test_duplicate_url_within_batch() {
        let (doc, loader) = loader();
        let outcomes = Outcomes::default();
        loader.load_scripts(&items(&["a.js", "a.js"]), outcomes.on_success(), outcomes.on_failure());

        assert_eq!(doc.created_count(), 1);
        doc.fire_load("a.js");
        assert_eq!(outcomes.successes(), 1);
    }

    #[test]
    fn test_waiters_notified_in_registration_order() {
        let (doc, loader) = loader();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            loader.load_scripts(&items(&["a.js"]), move || order.lock().unwrap().push(n), None);
        }
        doc.fire_load("a.js");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_scripts_removes_nodes_and_abandons_waiters() {
        let (doc, loader) = loader();
        let first = Outcomes::default();
        loader.load_scripts(&items(&["a.js", "b.js"]), first.on_success(), first.on_failure());
        doc.fire_load("b.js");

        loader.delete_scripts();
        assert!(loader.is_empty());
        assert!(doc.head_children().is_empty());

        let second = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), second.on_success(), second.on_failure());
        assert_eq!(doc.created_count(), 3);

        let elements = doc.elements_with_src("a.js");
        assert_eq!(elements.len(), 2);
        // the node removed by teardown completes late
        elements[0].dispatch(&LoadEvent::Load);
        assert_eq!(first.successes(), 0);
        assert_eq!(second.successes(), 0);
        assert!(!loader.is_loaded("a.js"));

        elements[1].dispatch(&LoadEvent::Load);
        assert_eq!(second.successes(), 1);
        assert_eq!(first.successes(), 0);
    }

    #[test]
    fn test_delete_scripts_frees_nodes_that_never_loaded() {
        let (doc, loader) = loader();
        let outcomes = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), outcomes.on_success(), outcomes.on_failure());

        let el = doc.elements_with_src("a.js").remove(0);
        assert_eq!(el.listener_count(), 2);
        let weak = el.downgrade();
        drop(el);

        loader.delete_scripts();
        let el = weak.upgrade().unwrap();
        assert_eq!(el.listener_count(), 0);
        assert!(!el.is_attached());
        drop(el);

        drop(loader);
        drop(doc);
        assert!(weak.upgrade().is_none());
        assert_eq!(outcomes.successes(), 0);
        assert!(outcomes.failures().is_empty());
    }

    #[test]
    fn test_completed_record_drops_its_release_handle() {
        let (doc, loader) = loader();
        loader.load_scripts(&items(&["a.js"]), || {}, None);
        doc.fire_load("a.js");

        assert!(loader.lookup.get("a.js").unwrap().release.is_none());
        assert_eq!(doc.elements_with_src("a.js")[0].listener_count(), 0);
    }

    #[test]
    fn test_delete_scripts_concurrent_with_loads_leaves_no_half_state() {
        let (doc, loader) = loader();
        let loader = Arc::new(loader);
        let urls: Vec<String> = (0..64).map(|i| format!("s{i}.js")).collect();

        let writer = {
            let (loader, urls) = (Arc::clone(&loader), urls.clone());
            std::thread::spawn(move || {
                for url in &urls {
                    loader.load_scripts(&[ResourceDescriptor::new(url.as_str())], || {}, None);
                }
            })
        };
        for _ in 0..16 {
            loader.delete_scripts();
        }
        writer.join().unwrap();
        loader.delete_scripts();

        // nodes appended after their record was torn down stay, but nothing listens on them
        assert!(loader.is_empty());
        for url in &urls {
            for el in doc.elements_with_src(url) {
                assert_eq!(el.listener_count(), 0);
            }
        }
    }

    #[test]
    fn test_delete_scripts_skips_foreign_nodes() {
        let (doc, loader) = loader();
        loader.load_scripts(&items(&["a.js"]), || {}, None);
        let id = doc.elements_with_src("a.js")[0].attribute("id").unwrap();

        // a non-script node that happens to carry the same id
        let foreign = doc.create_element("div");
        foreign.set_attribute("id", &id);
        doc.elements_with_src("a.js")[0].detach();
        doc.append_to_head(&foreign);

        loader.delete_scripts();
        assert_eq!(doc.head_children().len(), 1);
        assert!(foreign.is_attached());
    }

    #[test]
    fn test_success_callback_may_reenter_loader() {
        let (doc, loader) = loader();
        let loader = Arc::new(loader);
        let inner = Outcomes::default();

        let (reentrant, inner_c) = (Arc::clone(&loader), inner.clone());
        loader.load_scripts(
            &items(&["a.js"]),
            move || reentrant.load_scripts(&items(&["a.js"]), inner_c.on_success(), None),
            None,
        );
        doc.fire_load("a.js");
        assert_eq!(inner.successes(), 1);
    }

    #[test]
    fn test_headless_document_never_resolves() {
        let doc = Arc::new(MemoryDocument::without_head());
        let loader = DocumentScriptLoader::new(Arc::clone(&doc));
        let outcomes = Outcomes::default();
        loader.load_scripts(&items(&["a.js"]), outcomes.on_success(), outcomes.on_failure());

        assert_eq!(doc.fire_load("a.js"), 0);
        assert_eq!(outcomes.successes(), 0);
        assert!(outcomes.failures().is_empty());
        assert_eq!(loader.len(), 1);
    }
}
