use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::{Document, Element, EventKind, ListenerId, Listener, LoadEvent};
use crate::{error::HostError, utils::lock};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type Head = Mutex<Vec<MemoryElement>>;

/// A document kept entirely in memory.
///
/// Nothing is fetched: load completion is driven by the embedder through
/// [`MemoryDocument::fire_load`] and [`MemoryDocument::fire_error`].
pub struct MemoryDocument {
    head: Option<Arc<Head>>,
    created: Mutex<Vec<MemoryElement>>,
    created_count: AtomicUsize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            head: Some(Arc::new(Mutex::new(Vec::new()))),
            created: Mutex::new(Vec::new()),
            created_count: AtomicUsize::new(0),
        }
    }

    /// A document with no `<head>`, scripts can not be attached to it.
    pub fn without_head() -> Self {
        Self {
            head: None,
            ..Self::new()
        }
    }

    /// Number of elements ever created through [`Document::create_element`].
    pub fn created_count(&self) -> usize {
        self.created_count.load(Ordering::Acquire)
    }

    /// Elements currently attached to the head, in append order.
    pub fn head_children(&self) -> Vec<MemoryElement> {
        self.head
            .as_ref()
            .map(|head| lock(head).clone())
            .unwrap_or_default()
    }

    /// Every element ever created with the given `src`, attached or not.
    pub fn elements_with_src(&self, src: &str) -> Vec<MemoryElement> {
        lock(&self.created)
            .iter()
            .filter(|el| el.attribute("src").as_deref() == Some(src))
            .cloned()
            .collect()
    }

    /// Delivers a load event to every attached element with the given `src`.
    ///
    /// Detached nodes never hear from the host through this path, use
    /// [`MemoryElement::dispatch`] to simulate a late event on one of them.
    ///
    /// # Returns
    /// The number of elements the event was dispatched to.
    pub fn fire_load(&self, src: &str) -> usize {
        self.fire(src, LoadEvent::Load)
    }

    /// Delivers an error event carrying `error` to every attached element with the given `src`.
    pub fn fire_error(&self, src: &str, error: HostError) -> usize {
        self.fire(src, LoadEvent::Error(error))
    }

    fn fire(&self, src: &str, event: LoadEvent) -> usize {
        let targets: Vec<MemoryElement> = self
            .head_children()
            .into_iter()
            .filter(|el| el.attribute("src").as_deref() == Some(src))
            .collect();
        for el in &targets {
            el.dispatch(&event);
        }
        targets.len()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for MemoryDocument {
    type Element = MemoryElement;

    fn create_element(&self, tag: &str) -> MemoryElement {
        let el = MemoryElement(Arc::new(ElementInner {
            tag: tag.to_ascii_uppercase(),
            attributes: Mutex::new(HashMap::new()),
            flags: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            parent: Mutex::new(None),
        }));
        lock(&self.created).push(el.clone());
        self.created_count.fetch_add(1, Ordering::AcqRel);
        el
    }

    fn append_to_head(&self, element: &MemoryElement) -> bool {
        let Some(head) = &self.head else {
            return false;
        };
        element.detach();
        lock(head).push(element.clone());
        *lock(&element.0.parent) = Some(Arc::downgrade(head));
        true
    }

    fn get_element_by_id(&self, id: &str) -> Option<MemoryElement> {
        let head = self.head.as_ref()?;
        lock(head)
            .iter()
            .find(|el| el.attribute("id").as_deref() == Some(id))
            .cloned()
    }
}

struct ElementInner {
    tag: String,
    attributes: Mutex<HashMap<String, String>>,
    flags: Mutex<HashMap<String, bool>>,
    listeners: Mutex<Vec<(EventKind, ListenerId, Listener)>>,
    parent: Mutex<Option<Weak<Head>>>,
}

#[derive(Clone)]
pub struct MemoryElement(Arc<ElementInner>);

impl std::fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryElement")
            .field("tag", &self.0.tag)
            .field("attributes", &*lock(&self.0.attributes))
            .field("flags", &*lock(&self.0.flags))
            .finish()
    }
}

/// Non-owning reference to a [`MemoryElement`].
#[derive(Clone)]
pub struct WeakMemoryElement(Weak<ElementInner>);

impl WeakMemoryElement {
    /// `None` once every owning handle, listener and document reference is gone.
    pub fn upgrade(&self) -> Option<MemoryElement> {
        self.0.upgrade().map(MemoryElement)
    }
}

impl MemoryElement {
    pub fn attribute(&self, name: &str) -> Option<String> {
        lock(&self.0.attributes).get(name).cloned()
    }

    /// Value of a boolean property, `false` when never set.
    pub fn flag(&self, name: &str) -> bool {
        lock(&self.0.flags).get(name).copied().unwrap_or(false)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.0.listeners).len()
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.0.parent)
            .as_ref()
            .is_some_and(|parent| parent.strong_count() > 0)
    }

    pub fn same_node(&self, other: &MemoryElement) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A handle that does not keep the node alive.
    pub fn downgrade(&self) -> WeakMemoryElement {
        WeakMemoryElement(Arc::downgrade(&self.0))
    }

    /// Invokes the listeners registered for the event's kind, in registration order.
    ///
    /// A listener removed by an earlier listener of the same dispatch is skipped.
    pub fn dispatch(&self, event: &LoadEvent) {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, Listener)> = lock(&self.0.listeners)
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            let registered = lock(&self.0.listeners)
                .iter()
                .any(|(k, other, _)| *k == kind && *other == id);
            if registered {
                listener(event);
            }
        }
    }
}

impl Element for MemoryElement {
    fn tag_name(&self) -> String {
        self.0.tag.clone()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        lock(&self.0.attributes).insert(name.to_owned(), value.to_owned());
    }

    fn set_flag(&self, name: &str, enabled: bool) {
        lock(&self.0.flags).insert(name.to_owned(), enabled);
    }

    fn add_event_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        lock(&self.0.listeners).push((kind, id, listener));
        id
    }

    fn remove_event_listener(&self, kind: EventKind, id: ListenerId) {
        lock(&self.0.listeners).retain(|(k, other, _)| !(*k == kind && *other == id));
    }

    fn detach(&self) -> bool {
        let Some(parent) = lock(&self.0.parent).take().and_then(|p| p.upgrade()) else {
            return false;
        };
        lock(&parent).retain(|el| !el.same_node(self));
        true
    }
}
