use crate::coords::Point;
use crate::marker::MarkerId;

/// Listener registration handle.
pub type ListenerId = u64;

/// Listener callback. Canvas use is single threaded, so no `Send` bound.
pub type CanvasListener = Box<dyn FnMut(&CanvasEvent)>;

/// Event categories listeners subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Move,
    Zoom,
    Drop,
    Click,
    Ready,
}

/// Events emitted by an [`ImageCanvas`](super::ImageCanvas).
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// Marker moved during a drag; position normalized to 0..1 of the canvas.
    Move { marker: MarkerId, normalized: Point },
    /// Zoom state changed. Reflects the state after internal handling.
    Zoom { factor: f64, inset_visible: bool },
    /// Drag finished; display-space position.
    Drop { marker: MarkerId, position: Point },
    /// Marker grabbed.
    Click { marker: MarkerId },
    /// Frame loaded and markers built.
    Ready { frame: usize },
}

impl CanvasEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CanvasEvent::Move { .. } => EventKind::Move,
            CanvasEvent::Zoom { .. } => EventKind::Zoom,
            CanvasEvent::Drop { .. } => EventKind::Drop,
            CanvasEvent::Click { .. } => EventKind::Click,
            CanvasEvent::Ready { .. } => EventKind::Ready,
        }
    }
}

/// Ordered listener lists, one per event kind.
#[derive(Default)]
pub struct Listeners {
    entries: Vec<(ListenerId, EventKind, CanvasListener)>,
    next_id: ListenerId,
}

impl Listeners {
    pub fn bind(&mut self, kind: EventKind, listener: CanvasListener) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, kind, listener));
        id
    }

    pub fn unbind(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _, _)| *entry != id);
        self.entries.len() != before
    }

    /// Number of listeners bound to `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|(_, k, _)| *k == kind).count()
    }

    /// Invoke every listener for the event's kind in registration order.
    pub fn dispatch(&mut self, event: &CanvasEvent) {
        let kind = event.kind();
        for (_, _, listener) in self.entries.iter_mut().filter(|(_, k, _)| *k == kind) {
            listener(event);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::default();
        for tag in ["first", "second"] {
            let log = log.clone();
            listeners.bind(
                EventKind::Click,
                Box::new(move |_| log.borrow_mut().push(tag)),
            );
        }
        let other = log.clone();
        listeners.bind(EventKind::Drop, Box::new(move |_| other.borrow_mut().push("drop")));

        listeners.dispatch(&CanvasEvent::Click { marker: MarkerId(0) });
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_unbind() {
        let hits = Rc::new(RefCell::new(0));
        let mut listeners = Listeners::default();
        let h = hits.clone();
        let id = listeners.bind(EventKind::Ready, Box::new(move |_| *h.borrow_mut() += 1));
        assert_eq!(listeners.count(EventKind::Ready), 1);
        assert!(listeners.unbind(id));
        assert!(!listeners.unbind(id));
        listeners.dispatch(&CanvasEvent::Ready { frame: 0 });
        assert_eq!(*hits.borrow(), 0);
    }
}
