use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::ResourceDescriptor;
use crate::{
    config::LoaderConfig,
    document::{Document, Element, EventKind, ListenerId, LoadEvent},
    error::HostError,
    utils::lock,
};

pub(crate) type Completion = Box<dyn FnOnce(&str, Option<HostError>) + Send>;

/// The pair of listeners registered on one injected node.
struct Subscription<E: Element> {
    element: E,
    load: ListenerId,
    error: ListenerId,
}

impl<E: Element> Subscription<E> {
    fn release(self) {
        self.element.remove_event_listener(EventKind::Load, self.load);
        self.element.remove_event_listener(EventKind::Error, self.error);
    }
}

/// Shared between the load and error listeners; whichever runs first takes both halves.
struct OneShot<E: Element> {
    subscription: Option<Subscription<E>>,
    on_complete: Option<Completion>,
}

/// Unregisters the listeners of one injected node and drops its completion,
/// for nodes that will not be waited on any more.
pub(crate) struct Release(Box<dyn FnOnce() + Send + Sync>);

impl Release {
    pub(crate) fn release(self) {
        (self.0)()
    }
}

fn discard<E: Element>(slot: &Mutex<OneShot<E>>) {
    let (subscription, on_complete) = {
        let mut slot = lock(slot);
        (slot.subscription.take(), slot.on_complete.take())
    };
    if let Some(subscription) = subscription {
        subscription.release();
    }
    drop(on_complete);
}

fn settle<E: Element>(slot: &Mutex<OneShot<E>>, url: &str, event: &LoadEvent) {
    let (subscription, on_complete) = {
        let mut slot = lock(slot);
        (slot.subscription.take(), slot.on_complete.take())
    };
    if let Some(subscription) = subscription {
        subscription.release();
    }
    let Some(on_complete) = on_complete else {
        return;
    };
    match event {
        LoadEvent::Load => on_complete(url, None),
        LoadEvent::Error(err) => on_complete(url, Some(Arc::clone(err))),
    }
}

/// Creates a script node for `item` and appends it to the document head.
///
/// `on_complete` runs at most once, on the first load or error event. If the
/// document has no head nothing is appended, the listeners are released right
/// away and `on_complete` never runs.
///
/// # Returns
/// A handle releasing the node's listeners, `None` when the document had no
/// attachment point.
pub(crate) fn inject<D: Document>(
    document: &D,
    item: &ResourceDescriptor,
    id: &str,
    config: &LoaderConfig,
    on_complete: Completion,
) -> Option<Release> {
    let element = document.create_element("script");
    element.set_attribute("referrerpolicy", &config.referrer_policy);
    element.set_attribute("type", &config.script_type);
    element.set_attribute("id", id);
    element.set_attribute("src", &item.url);
    element.set_flag("async", item.is_async);
    element.set_flag("defer", item.defer);

    let slot = Arc::new(Mutex::new(OneShot::<D::Element> {
        subscription: None,
        on_complete: Some(on_complete),
    }));

    let load = {
        let (slot, url) = (Arc::clone(&slot), item.url.clone());
        element.add_event_listener(
            EventKind::Load,
            Arc::new(move |event: &LoadEvent| settle(&slot, &url, event)),
        )
    };
    let error = {
        let (slot, url) = (Arc::clone(&slot), item.url.clone());
        element.add_event_listener(
            EventKind::Error,
            Arc::new(move |event: &LoadEvent| settle(&slot, &url, event)),
        )
    };

    let subscription = Subscription {
        element: element.clone(),
        load,
        error,
    };
    {
        let mut guard = lock(&slot);
        if guard.on_complete.is_some() {
            guard.subscription = Some(subscription);
        } else {
            // settled while the listeners were being registered
            drop(guard);
            subscription.release();
        }
    }

    if !document.append_to_head(&element) {
        warn!(url = %item.url, "document has no head, script will never load");
        discard(&slot);
        return None;
    }
    debug!(url = %item.url, id, "injected script");
    Some(Release(Box::new(move || discard(&slot))))
}
