//! Change notifications for cached objects derived from entries (sprites, quads, UV buffers).
//!
//! Listeners are invoked synchronously from the atlas operation that caused the change.
//! Holders that prefer polling can compare `Entry::version` instead.

use crate::model::EntryId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtlasEvent {
    EntryAdded { id: EntryId, page: usize },
    /// Rect, page or page size changed; `version` is the entry's new version.
    EntryChanged { id: EntryId, version: u64 },
    EntryRemoved { id: EntryId },
    PageCountChanged { count: usize },
    PageResized { page: usize, width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&AtlasEvent)>;

#[derive(Default)]
pub(crate) struct EventHub {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl EventHub {
    pub(crate) fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub(crate) fn emit(&mut self, event: AtlasEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}
