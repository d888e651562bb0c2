//! Listener registry and dispatch machinery

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::ThreadId;

use fluxplayer_shared_types::PlayerState;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::events::{Event, EventListener, EventType};

/// How a caller wants an event delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Async when off the main thread or async-tune is enabled, else sync
    #[default]
    Default,
    /// Invoke listeners on the caller's thread (main thread only)
    Sync,
    /// Queue and deliver from the idle dispatcher
    Async,
}

struct ManagerState {
    listeners: HashMap<EventType, Vec<Arc<dyn EventListener>>>,
    queue: VecDeque<Event>,
    /// callback-id → still pending; revoked entries flip to false
    pending: HashMap<u64, bool>,
    next_callback_id: u64,
    player_state: PlayerState,
    fake_tune: bool,
    async_tune: bool,
    stats: HashMap<EventType, u64>,
}

/// Typed event dispatcher with sync and idle-posted async modes
///
/// The thread constructing the manager is recorded as the main/event-loop
/// thread; only that thread may dispatch synchronously. Run
/// [`EventManager::run_dispatcher`] on the owning runtime to drain async
/// events.
pub struct EventManager {
    state: Mutex<ManagerState>,
    main_thread: ThreadId,
    idle_tx: mpsc::UnboundedSender<u64>,
    idle_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    /// Create a manager bound to the calling thread as main
    pub fn new() -> Self {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(ManagerState {
                listeners: HashMap::new(),
                queue: VecDeque::new(),
                pending: HashMap::new(),
                next_callback_id: 1,
                player_state: PlayerState::Idle,
                fake_tune: false,
                async_tune: false,
                stats: HashMap::new(),
            }),
            main_thread: std::thread::current().id(),
            idle_tx,
            idle_rx: Mutex::new(Some(idle_rx)),
        }
    }

    /// Register a listener for one event type
    pub fn add_event_listener(&self, event_type: EventType, listener: Arc<dyn EventListener>) {
        let mut state = self.state.lock();
        state.listeners.entry(event_type).or_default().push(listener);
    }

    /// Register a listener for every event
    pub fn add_listener_for_all_events(&self, listener: Arc<dyn EventListener>) {
        self.add_event_listener(EventType::AllEvents, listener);
    }

    /// Remove a previously registered listener (pointer identity)
    pub fn remove_event_listener(&self, event_type: EventType, listener: &Arc<dyn EventListener>) {
        let mut state = self.state.lock();
        if let Some(list) = state.listeners.get_mut(&event_type) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Remove a listener registered for every event
    pub fn remove_listener_for_all_events(&self, listener: &Arc<dyn EventListener>) {
        self.remove_event_listener(EventType::AllEvents, listener);
    }

    /// Whether any listener would receive this event type
    pub fn is_event_listener_available(&self, event_type: EventType) -> bool {
        let state = self.state.lock();
        let has = |t: &EventType| state.listeners.get(t).is_some_and(|l| !l.is_empty());
        has(&EventType::AllEvents) || has(&event_type)
    }

    /// Whether a listener registered specifically for this type exists
    pub fn is_specific_event_listener_available(&self, event_type: EventType) -> bool {
        if event_type == EventType::AllEvents {
            return false;
        }
        let state = self.state.lock();
        state.listeners.get(&event_type).is_some_and(|l| !l.is_empty())
    }

    /// Suppress all events except COMPLETE state-change and EOS
    pub fn set_fake_tune_flag(&self, fake_tune: bool) {
        self.state.lock().fake_tune = fake_tune;
    }

    /// Route DEFAULT-mode events through the async path
    pub fn set_async_tune_state(&self, async_tune: bool) {
        self.state.lock().async_tune = async_tune;
    }

    /// Update the player state; RELEASED drops all further dispatches
    pub fn set_player_state(&self, state: PlayerState) {
        self.state.lock().player_state = state;
    }

    /// Dispatch an event according to `mode`
    pub fn send_event(&self, event: Event, mode: DispatchMode) {
        let event_type = event.event_type();
        {
            let state = self.state.lock();
            if state.player_state == PlayerState::Released {
                trace!(?event_type, "player released, event dropped");
                return;
            }
            if state.fake_tune && !Self::allowed_during_fake_tune(&event) {
                trace!(?event_type, "events disabled for fake tune");
                return;
            }
            let has = |t: &EventType| state.listeners.get(t).is_some_and(|l| !l.is_empty());
            if !has(&EventType::AllEvents) && !has(&event_type) {
                return;
            }
        }

        let on_main = std::thread::current().id() == self.main_thread;
        let go_sync = match mode {
            // Sync off the main thread must downgrade to async
            DispatchMode::Sync => on_main,
            DispatchMode::Async => false,
            DispatchMode::Default => {
                let async_tune = self.state.lock().async_tune;
                on_main && !async_tune
            }
        };

        if go_sync {
            self.send_event_sync(event);
        } else {
            self.send_event_async(event);
        }
    }

    /// Drop queued events and revoke outstanding idle callbacks
    pub fn flush_pending_events(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        if !state.pending.is_empty() {
            warn!(pending = state.pending.len(), "revoking pending async events");
            for dispatched in state.pending.values_mut() {
                *dispatched = false;
            }
        }
        state.stats.clear();
    }

    /// Drain async events; run exactly once on the owning runtime
    pub async fn run_dispatcher(self: Arc<Self>) {
        let Some(mut rx) = self.idle_rx.lock().take() else {
            warn!("event dispatcher already running");
            return;
        };
        info!("event dispatcher running");
        while let Some(callback_id) = rx.recv().await {
            self.idle_event(callback_id);
        }
        debug!("event dispatcher channel closed");
    }

    /// One idle-callback execution: pop and deliver a single event
    fn idle_event(&self, callback_id: u64) {
        let event = {
            let mut state = self.state.lock();
            let live = state.pending.remove(&callback_id).unwrap_or(false);
            if !live {
                debug!(callback_id, "idle callback revoked");
                return;
            }
            if state.player_state == PlayerState::Released {
                state.queue.pop_front();
                return;
            }
            state.queue.pop_front()
        };
        if let Some(event) = event {
            self.send_event_sync(event);
        }
    }

    fn send_event_async(&self, event: Event) {
        let callback_id = {
            let mut state = self.state.lock();
            if state.player_state == PlayerState::Released {
                return;
            }
            let id = state.next_callback_id;
            state.next_callback_id += 1;
            state.queue.push_back(event);
            state.pending.insert(id, true);
            id
        };
        if self.idle_tx.send(callback_id).is_err() {
            warn!(callback_id, "idle dispatcher gone, async event dropped");
            let mut state = self.state.lock();
            state.pending.remove(&callback_id);
            state.queue.pop_back();
        }
    }

    fn send_event_sync(&self, event: Event) {
        let event_type = event.event_type();
        // Snapshot listeners so handlers can mutate registrations freely
        let targets: Vec<Arc<dyn EventListener>> = {
            let mut state = self.state.lock();
            if state.player_state == PlayerState::Released {
                return;
            }
            *state.stats.entry(event_type).or_insert(0) += 1;
            let mut targets = Vec::new();
            if let Some(list) = state.listeners.get(&EventType::AllEvents) {
                targets.extend(list.iter().cloned());
            }
            if let Some(list) = state.listeners.get(&event_type) {
                targets.extend(list.iter().cloned());
            }
            targets
        };
        trace!(?event_type, listeners = targets.len(), "dispatching event");
        for listener in targets {
            listener.on_event(&event);
        }
    }

    fn allowed_during_fake_tune(event: &Event) -> bool {
        matches!(event, Event::StateChanged(PlayerState::Complete) | Event::Eos)
    }

    /// Dispatch counts per event type since the last flush
    pub fn event_stats(&self) -> HashMap<EventType, u64> {
        self.state.lock().stats.clone()
    }
}
