//! Callback broadcast of input events.

use crate::event::InputEvent;

/// Handle returned by [`InputDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&InputEvent)>;

/// Broadcasts every event to all registered callbacks in registration order.
#[derive(Default)]
pub struct InputDispatcher {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
    dispatched: u64,
}

impl std::fmt::Debug for InputDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDispatcher")
            .field("listeners", &self.listeners.len())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

impl InputDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: impl FnMut(&InputEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(callback)));
        tracing::debug!("Registered input listener {:?}", id);
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        before != self.listeners.len()
    }

    /// Deliver `event` to every listener.
    pub fn dispatch(&mut self, event: &InputEvent) {
        self.dispatched += 1;
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Events dispatched so far.
    #[must_use]
    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::event::InputSource;
    use winit::keyboard::KeyCode;

    fn key(pressed: bool) -> InputEvent {
        InputEvent::button(InputSource::Key(KeyCode::KeyA), pressed, false)
    }

    #[test]
    fn broadcasts_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = InputDispatcher::new();
        for tag in ["first", "second"] {
            let log = Rc::clone(&log);
            dispatcher.register(move |event| log.borrow_mut().push((tag, event.value)));
        }

        dispatcher.dispatch(&key(true));
        assert_eq!(*log.borrow(), vec![("first", 1.0), ("second", 1.0)]);
        assert_eq!(dispatcher.dispatched(), 1);
    }

    #[test]
    fn unregistered_listeners_stop_receiving() {
        let count = Rc::new(RefCell::new(0));
        let mut dispatcher = InputDispatcher::new();
        let id = {
            let count = Rc::clone(&count);
            dispatcher.register(move |_| *count.borrow_mut() += 1)
        };

        dispatcher.dispatch(&key(true));
        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));
        dispatcher.dispatch(&key(false));

        assert_eq!(*count.borrow(), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn ids_are_not_reused() {
        let mut dispatcher = InputDispatcher::new();
        let a = dispatcher.register(|_| {});
        dispatcher.unregister(a);
        let b = dispatcher.register(|_| {});
        assert_ne!(a, b);
    }
}
