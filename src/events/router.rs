//! Per-identifier routing table for engine events.
//!
//! Every engine reports through one [`EventEmitter`]. Instead of broadcasting
//! each event to every listener and letting listeners filter, the router keeps
//! a table from upload identifier to the handlers interested in that upload,
//! alongside the lifecycle state of the upload. Handlers registered without an
//! identifier see every event of their kinds.
//!
//! Events can reach the router before anyone has subscribed to the upload they
//! belong to (an engine may finish a tiny file before `start_upload` has even
//! returned). The latest progress event and the terminal event are held back
//! for such uploads and replayed to the first subscriber of the matching kind.
//! Only the most recent [`PARKED_CAPACITY`] unclaimed terminal events are
//! kept; older ones are dropped and their uploads retired.

use super::{EventKind, UploadEvent, UploadId, UploadState};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Callback invoked for each routed event
pub type EventHandler = Arc<dyn Fn(&UploadEvent) + Send + Sync>;

/// How many finished identifiers are remembered for duplicate suppression
const RETIRED_CAPACITY: usize = 1024;

/// How many finished uploads may hold an unclaimed terminal event
pub const PARKED_CAPACITY: usize = 1024;

struct HandlerEntry {
    key: u64,
    kinds: Vec<EventKind>,
    handler: EventHandler,
}

impl HandlerEntry {
    fn accepts(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }
}

#[derive(Default)]
struct Backlog {
    progress: Option<UploadEvent>,
    terminal: Option<UploadEvent>,
}

struct Route {
    state: UploadState,
    handlers: Vec<HandlerEntry>,
    backlog: Backlog,
    /// Nobody will claim held-back events; retire as soon as the upload ends
    detached: bool,
}

impl Route {
    fn new() -> Self {
        Self {
            state: UploadState::Pending,
            handlers: Vec::new(),
            backlog: Backlog::default(),
            detached: false,
        }
    }

    fn is_finished(&self) -> bool {
        self.state.is_terminal() && self.handlers.is_empty() && self.backlog.terminal.is_none()
    }
}

#[derive(Default)]
struct RoutingTable {
    routes: HashMap<UploadId, Route>,
    wildcard: Vec<HandlerEntry>,
    retired: HashMap<UploadId, UploadState>,
    retired_order: VecDeque<UploadId>,
    parked: VecDeque<UploadId>,
    next_key: u64,
}

impl RoutingTable {
    fn retire(&mut self, id: UploadId, state: UploadState) {
        if self.retired.insert(id.clone(), state).is_none() {
            self.retired_order.push_back(id);
        }
        while self.retired_order.len() > RETIRED_CAPACITY {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }

    fn unretire(&mut self, id: &UploadId) -> Option<UploadState> {
        let state = self.retired.remove(id)?;
        self.retired_order.retain(|retired| retired != id);
        Some(state)
    }

    /// Remember that `id` holds an unclaimed terminal event, evicting the oldest
    fn park(&mut self, id: UploadId) {
        self.parked.push_back(id);
        while self.parked.len() > PARKED_CAPACITY {
            let Some(oldest) = self.parked.pop_front() else {
                break;
            };
            if let Some(route) = self.routes.get_mut(&oldest) {
                if route.backlog.terminal.take().is_some() {
                    route.backlog.progress = None;
                    tracing::debug!("Dropping unclaimed events for upload {}", oldest);
                }
            }
            self.retire_if_finished(&oldest);
        }
    }

    fn retire_if_finished(&mut self, id: &UploadId) {
        if self.routes.get(id).is_some_and(Route::is_finished) {
            if let Some(route) = self.routes.remove(id) {
                tracing::debug!("Upload {} retired in state {:?}", id, route.state);
                self.retire(id.clone(), route.state);
            }
        }
    }
}

/// Routing table shared by an [`EventEmitter`] and its subscribers
pub struct EventRouter {
    table: Mutex<RoutingTable>,
}

impl EventRouter {
    /// Create an empty router
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(RoutingTable::default()),
        })
    }

    /// A cloneable handle engines use to report events
    pub fn emitter(self: &Arc<Self>) -> EventEmitter {
        EventEmitter {
            router: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoutingTable> {
        // Handlers never run under the lock, so a poisoned table is still consistent
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking an upload in the `Pending` state
    pub fn track(&self, id: &UploadId) {
        let mut table = self.lock();
        if !table.retired.contains_key(id) {
            table.routes.entry(id.clone()).or_insert_with(Route::new);
        }
    }

    /// Current lifecycle state of an upload, if it is known
    pub fn state(&self, id: &UploadId) -> Option<UploadState> {
        let table = self.lock();
        table
            .routes
            .get(id)
            .map(|route| route.state)
            .or_else(|| table.retired.get(id).copied())
    }

    /// Number of live subscriptions for an identifier, or the wildcard ones for `None`
    pub fn subscriber_count(&self, id: Option<&UploadId>) -> usize {
        let table = self.lock();
        match id {
            Some(id) => table.routes.get(id).map_or(0, |route| route.handlers.len()),
            None => table.wildcard.len(),
        }
    }

    /// Prepare to route a new upload under an identifier an earlier upload
    /// may have used. Returns the earlier upload's final state, if there was one.
    pub fn revive(&self, id: &UploadId) -> Option<UploadState> {
        let mut table = self.lock();
        let mut previous = table.unretire(id);

        if let Some(route) = table.routes.get_mut(id) {
            if route.state.is_terminal() {
                previous = Some(route.state);
                route.state = UploadState::Pending;
                route.backlog = Backlog::default();
                route.detached = false;
            }
        }
        if previous.is_some() {
            table.parked.retain(|parked| parked != id);
            tracing::debug!("Upload id {} reused after finishing as {:?}", id, previous);
        }
        previous
    }

    /// Undo [`EventRouter::revive`] after the new upload failed to start
    pub fn restore(&self, id: &UploadId, state: UploadState) {
        let mut table = self.lock();
        if table
            .routes
            .get(id)
            .is_some_and(|route| route.state == UploadState::Pending && route.handlers.is_empty())
        {
            table.routes.remove(id);
        }
        if !table.routes.contains_key(id) {
            table.retire(id.clone(), state);
        }
    }

    /// Stop holding events for an upload nobody will observe.
    ///
    /// Held-back events are dropped now. An upload that is still running is
    /// retired as soon as it ends, without holding its terminal event.
    pub fn discard(&self, id: &UploadId) {
        let mut table = self.lock();
        if let Some(route) = table.routes.get_mut(id) {
            route.detached = true;
            route.backlog = Backlog::default();
        }
        table.retire_if_finished(id);
    }

    /// Number of uploads the table still holds a route for
    pub fn route_count(&self) -> usize {
        self.lock().routes.len()
    }

    /// Route one event to the handlers interested in it
    pub fn dispatch(&self, event: UploadEvent) {
        let kind = event.kind();

        let handlers: Vec<EventHandler> = {
            let mut guard = self.lock();
            let table = &mut *guard;

            if let Some(state) = table.retired.get(event.id()) {
                tracing::debug!(
                    "Dropping {} event for finished upload {} ({:?})",
                    kind,
                    event.id(),
                    state
                );
                return;
            }

            let route = table
                .routes
                .entry(event.id().clone())
                .or_insert_with(Route::new);

            let Some(next) = route.state.on_event(kind) else {
                tracing::debug!(
                    "Dropping {} event for upload {} in state {:?}",
                    kind,
                    event.id(),
                    route.state
                );
                return;
            };
            route.state = next;

            let mut handlers: Vec<EventHandler> = route
                .handlers
                .iter()
                .filter(|entry| entry.accepts(kind))
                .map(|entry| entry.handler.clone())
                .collect();

            let mut parked = false;
            if handlers.is_empty() && !route.detached {
                match kind {
                    EventKind::Progress => route.backlog.progress = Some(event.clone()),
                    _ => {
                        route.backlog.terminal = Some(event.clone());
                        parked = true;
                    }
                }
            }

            handlers.extend(
                table
                    .wildcard
                    .iter()
                    .filter(|entry| entry.accepts(kind))
                    .map(|entry| entry.handler.clone()),
            );

            if parked {
                table.park(event.id().clone());
            } else if kind.is_terminal() {
                table.retire_if_finished(event.id());
            }

            handlers
        };

        for handler in handlers {
            handler(&event);
        }
    }

    /// Register `handler` for `kinds`, scoped to one upload or to all of them.
    ///
    /// Held-back events matching the subscription are delivered before this
    /// returns, progress first.
    pub fn subscribe(
        self: &Arc<Self>,
        kinds: &[EventKind],
        id: Option<&UploadId>,
        handler: EventHandler,
    ) -> Subscription {
        let (key, replay) = {
            let mut guard = self.lock();
            let table = &mut *guard;

            let key = table.next_key;
            table.next_key += 1;

            let entry = HandlerEntry {
                key,
                kinds: kinds.to_vec(),
                handler: handler.clone(),
            };

            let mut replay = Vec::new();
            match id {
                Some(id) if table.retired.contains_key(id) => {
                    tracing::debug!("Subscribing to finished upload {}; nothing to deliver", id);
                }
                Some(id) => {
                    let route = table.routes.entry(id.clone()).or_insert_with(Route::new);

                    if entry.accepts(EventKind::Progress) {
                        replay.extend(route.backlog.progress.take());
                    }
                    if route
                        .backlog
                        .terminal
                        .as_ref()
                        .is_some_and(|event| entry.accepts(event.kind()))
                    {
                        replay.extend(route.backlog.terminal.take());
                    }

                    route.handlers.push(entry);
                }
                None => table.wildcard.push(entry),
            }

            (key, replay)
        };

        for event in &replay {
            handler(event);
        }

        Subscription {
            router: Arc::downgrade(self),
            key,
            id: id.cloned(),
            kinds: kinds.to_vec(),
        }
    }

    fn unsubscribe(&self, key: u64, id: Option<&UploadId>) {
        let mut table = self.lock();
        match id {
            Some(id) => {
                if let Some(route) = table.routes.get_mut(id) {
                    route.handlers.retain(|entry| entry.key != key);
                }
                table.retire_if_finished(id);
            }
            None => table.wildcard.retain(|entry| entry.key != key),
        }
    }
}

/// Handle engines use to push events into the router
#[derive(Clone)]
pub struct EventEmitter {
    router: Arc<EventRouter>,
}

impl EventEmitter {
    /// Deliver an event
    pub fn emit(&self, event: UploadEvent) {
        self.router.dispatch(event);
    }

    /// Report progress as a percentage
    pub fn progress(&self, id: &UploadId, progress: f64) {
        self.emit(UploadEvent::Progress {
            id: id.clone(),
            progress: progress.clamp(0.0, 100.0),
        });
    }

    /// Report a failure
    pub fn error(&self, id: &UploadId, error: impl Into<String>) {
        self.emit(UploadEvent::Error {
            id: id.clone(),
            error: error.into(),
        });
    }

    /// Report a cancellation
    pub fn cancelled(&self, id: &UploadId, error: impl Into<String>) {
        self.emit(UploadEvent::Cancelled {
            id: id.clone(),
            error: error.into(),
        });
    }

    /// Report the server response
    pub fn completed(&self, id: &UploadId, response_code: u16, response_body: impl Into<String>) {
        self.emit(UploadEvent::Completed {
            id: id.clone(),
            response_code,
            response_body: response_body.into(),
        });
    }
}

/// A registered handler. Dropping it (or calling [`Subscription::remove`])
/// takes the handler out of the routing table.
#[must_use = "dropping a Subscription removes its handler"]
pub struct Subscription {
    router: Weak<EventRouter>,
    key: u64,
    id: Option<UploadId>,
    kinds: Vec<EventKind>,
}

impl Subscription {
    /// The upload this subscription is scoped to, if any
    pub fn id(&self) -> Option<&UploadId> {
        self.id.as_ref()
    }

    /// Event kinds this subscription receives
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    /// Remove the handler
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.unsubscribe(self.key, self.id.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (EventHandler, Arc<StdMutex<Vec<UploadEvent>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EventHandler = Arc::new(move |event: &UploadEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (handler, seen)
    }

    #[test]
    fn test_scoped_subscription_ignores_other_uploads() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let a = UploadId::new("a");
        let b = UploadId::new("b");
        router.track(&a);
        router.track(&b);

        let (handler, seen) = recorder();
        let _sub = router.subscribe(&[EventKind::Progress], Some(&a), handler);

        emitter.progress(&b, 10.0);
        emitter.progress(&a, 20.0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id(), &a);
    }

    #[test]
    fn test_wildcard_sees_every_upload() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let (handler, seen) = recorder();
        let _sub = router.subscribe(&[EventKind::Completed], None, handler);

        emitter.completed(&UploadId::new("a"), 200, "{}");
        emitter.completed(&UploadId::new("b"), 200, "{}");
        emitter.progress(&UploadId::new("c"), 5.0);

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_terminal_event_dropped() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let id = UploadId::new("dup");
        router.track(&id);

        let (handler, seen) = recorder();
        let _sub = router.subscribe(&EventKind::ALL, Some(&id), handler);

        emitter.completed(&id, 200, "{}");
        emitter.error(&id, "late");
        emitter.completed(&id, 200, "{}");

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(router.state(&id), Some(UploadState::Completed));
    }

    #[test]
    fn test_early_events_replayed_in_order() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let id = UploadId::new("early");

        emitter.progress(&id, 40.0);
        emitter.progress(&id, 100.0);
        emitter.completed(&id, 200, r#"{"ok":true}"#);

        let (handler, seen) = recorder();
        let sub = router.subscribe(&EventKind::ALL, Some(&id), handler);

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].kind(), EventKind::Progress);
            assert!(matches!(seen[0], UploadEvent::Progress { progress, .. } if progress == 100.0));
            assert_eq!(seen[1].kind(), EventKind::Completed);
        }

        sub.remove();
        assert_eq!(router.subscriber_count(Some(&id)), 0);
        assert_eq!(router.state(&id), Some(UploadState::Completed));
    }

    #[test]
    fn test_dropping_subscriptions_releases_route() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let id = UploadId::new("release");
        router.track(&id);

        let subs: Vec<Subscription> = EventKind::ALL
            .iter()
            .map(|kind| router.subscribe(&[*kind], Some(&id), Arc::new(|_: &UploadEvent| {})))
            .collect();
        assert_eq!(router.subscriber_count(Some(&id)), 4);

        emitter.error(&id, "boom");
        drop(subs);

        assert_eq!(router.subscriber_count(Some(&id)), 0);
        assert_eq!(router.state(&id), Some(UploadState::Failed));

        // A late event for a retired upload is ignored rather than resurrecting it
        emitter.progress(&id, 50.0);
        assert_eq!(router.state(&id), Some(UploadState::Failed));
    }

    #[test]
    fn test_revived_id_routes_again() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let id = UploadId::new("avatar");
        router.track(&id);
        emitter.completed(&id, 200, "{}");
        router.discard(&id);
        assert_eq!(router.state(&id), Some(UploadState::Completed));

        assert_eq!(router.revive(&id), Some(UploadState::Completed));
        router.track(&id);
        assert_eq!(router.state(&id), Some(UploadState::Pending));

        let (handler, seen) = recorder();
        let _sub = router.subscribe(&EventKind::ALL, Some(&id), handler);
        emitter.progress(&id, 50.0);
        emitter.error(&id, "second attempt failed");

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(router.state(&id), Some(UploadState::Failed));
    }

    #[test]
    fn test_restore_after_failed_restart() {
        let router = EventRouter::new();
        let id = UploadId::new("restart");
        router.emitter().cancelled(&id, "stop");
        router.discard(&id);

        let previous = router.revive(&id).unwrap();
        router.restore(&id, previous);

        assert_eq!(router.state(&id), Some(UploadState::Cancelled));
        assert_eq!(router.route_count(), 0);
    }

    #[test]
    fn test_discarded_upload_retires_when_it_ends() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let id = UploadId::new("abandoned");
        router.track(&id);
        emitter.progress(&id, 30.0);

        router.discard(&id);
        assert_eq!(router.route_count(), 1);

        emitter.completed(&id, 200, "{}");
        assert_eq!(router.route_count(), 0);
        assert_eq!(router.state(&id), Some(UploadState::Completed));

        let (handler, seen) = recorder();
        let _sub = router.subscribe(&EventKind::ALL, Some(&id), handler);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unclaimed_terminal_events_are_bounded() {
        let router = EventRouter::new();
        let emitter = router.emitter();
        let (handler, seen) = recorder();
        let _wildcard = router.subscribe(&[EventKind::Completed], None, handler);

        for n in 0..PARKED_CAPACITY + 10 {
            emitter.completed(&UploadId::new(format!("unclaimed-{}", n)), 200, "{}");
        }

        assert_eq!(seen.lock().unwrap().len(), PARKED_CAPACITY + 10);
        assert_eq!(router.route_count(), PARKED_CAPACITY);

        // The newest ones can still be claimed
        let newest = UploadId::new(format!("unclaimed-{}", PARKED_CAPACITY + 9));
        let (handler, replayed) = recorder();
        let _sub = router.subscribe(&[EventKind::Completed], Some(&newest), handler);
        assert_eq!(replayed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_subscription_outliving_router() {
        let router = EventRouter::new();
        let sub = router.subscribe(&[EventKind::Progress], None, Arc::new(|_: &UploadEvent| {}));
        drop(router);
        drop(sub);
    }
}
