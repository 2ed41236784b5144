//! Host document abstraction.
//!
//! The loader never owns the document it injects scripts into. It talks to it
//! through the narrow [`Document`] and [`Element`] traits, so any host (a
//! browser binding, a headless DOM, the builtin [`memory::MemoryDocument`])
//! can be plugged in.

/// In-memory document used for headless embedding and tests.
pub mod memory;

use std::sync::Arc;

use crate::error::HostError;

/// The two notifications a load-capable node can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    Error,
}

/// Event delivered by the host to listeners registered on an [`Element`].
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Load,
    Error(HostError),
}

impl LoadEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LoadEvent::Load => EventKind::Load,
            LoadEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Handle returned by [`Element::add_event_listener`], used to unregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type Listener = Arc<dyn Fn(&LoadEvent) + Send + Sync>;

/// A node living in a host document.
///
/// Handles are cheap to clone and refer to the same underlying node.
pub trait Element: Clone + Send + Sync + 'static {
    /// Upper-case tag name, e.g. `SCRIPT`.
    fn tag_name(&self) -> String;

    fn set_attribute(&self, name: &str, value: &str);

    /// Sets a boolean property such as `async` or `defer`.
    fn set_flag(&self, name: &str, enabled: bool);

    fn add_event_listener(&self, kind: EventKind, listener: Listener) -> ListenerId;

    fn remove_event_listener(&self, kind: EventKind, id: ListenerId);

    /// Removes the node from its parent.
    ///
    /// # Returns
    /// `false` if the node had no parent.
    fn detach(&self) -> bool;
}

/// The environment scripts are injected into. Identity of the `Arc<D>` the
/// loader is handed is what scopes deduplication.
pub trait Document: Send + Sync + 'static {
    type Element: Element;

    fn create_element(&self, tag: &str) -> Self::Element;

    /// Appends `element` to the document's attachment point (`<head>`).
    ///
    /// # Returns
    /// `false` if the document has no attachment point, in which case nothing was appended.
    fn append_to_head(&self, element: &Self::Element) -> bool;

    fn get_element_by_id(&self, id: &str) -> Option<Self::Element>;
}
