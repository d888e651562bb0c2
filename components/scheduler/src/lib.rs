//! # scheduler Component
//!
//! Single-worker cooperative queue for asynchronous player operations.
//!
//! One worker thread drains a FIFO of named tasks. Tasks observe submission
//! order; cancellation works per task id; `suspend` blocks until the current
//! task finishes and locks out new work until `resume`. Tasks see the player
//! state at the moment the worker picks them up, not at schedule time.
//!
//! # Examples
//!
//! ```
//! use fluxplayer_scheduler::{Scheduler, TASK_ID_INVALID};
//!
//! let scheduler = Scheduler::new();
//! scheduler.start();
//! let id = scheduler.schedule("warm-cache", || { /* async player work */ });
//! assert_ne!(id, TASK_ID_INVALID);
//! scheduler.stop();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Module declarations
mod scheduler;

// Re-export public API
pub use scheduler::{Scheduler, TASK_ID_INVALID};
