//! # config_store Component
//!
//! Layered typed key/value configuration store with ownership precedence.
//!
//! Every configuration cell remembers which layer wrote it. A write is
//! accepted only when the writer's layer is at least as privileged as the
//! current owner; lower-priority writes are silently dropped. Each cell also
//! keeps the previous (value, owner) pair so [`ConfigStore::restore`] can
//! make a layer's writes vanish without replaying history.
//!
//! # Overview
//!
//! - [`ConfigLayer`]: totally ordered provenance tags
//!   (`Default < Operator < Stream < Application < Tune < Dev`)
//! - [`ConfigKey`]: fixed key set partitioned by primitive type, each numeric
//!   key carrying an optional `[min, max]` range
//! - [`ConfigStore`]: the store itself, plus text/JSON file loaders, operator
//!   channel overrides and custom-config matching
//!
//! # Examples
//!
//! ```
//! use fluxplayer_config_store::{ConfigKey, ConfigLayer, ConfigStore};
//!
//! let store = ConfigStore::new();
//! store.set_int(ConfigLayer::Application, ConfigKey::LicenseRetryWaitTime, 750);
//! // An operator write cannot shadow the application value
//! store.set_int(ConfigLayer::Operator, ConfigKey::LicenseRetryWaitTime, 100);
//! assert_eq!(store.int(ConfigKey::LicenseRetryWaitTime), 750);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Module declarations
mod keys;
mod store;

// Re-export public API
pub use keys::{ConfigKey, ConfigLayer, ConfigValue, ValueKind};
pub use store::{ChannelOverride, ConfigStore, CustomConfigEntry};
