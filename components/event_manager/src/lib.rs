//! # event_manager Component
//!
//! Priority-ordered event delivery with synchronous and idle-posted
//! asynchronous dispatch modes.
//!
//! Listeners register per event type or for every event. Synchronous
//! dispatch is allowed only on the main/event-loop thread; off-thread or
//! async-tune dispatches are queued and delivered by a single idle
//! dispatcher. Outstanding idle callbacks are tracked so shutdown can revoke
//! them.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use fluxplayer_event_manager::{Event, EventListener, EventManager, EventType};
//!
//! struct Printer;
//! impl EventListener for Printer {
//!     fn on_event(&self, event: &Event) {
//!         println!("event: {:?}", event.event_type());
//!     }
//! }
//!
//! let manager = EventManager::new();
//! manager.add_listener_for_all_events(Arc::new(Printer));
//! manager.send_event(Event::Tuned, Default::default());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Module declarations
mod events;
mod manager;

// Re-export public API
pub use events::{DrmMetadataPayload, Event, EventListener, EventType};
pub use manager::{DispatchMode, EventManager};
