//! # net_pool Component
//!
//! Host-keyed LRU pool of reusable network-transfer handles.
//!
//! Each remote host gets a bucket owning one shared network context (DNS
//! cache, TLS sessions and connection pool are shared by every handle in the
//! bucket) plus a fixed array of handle slots with in-use flags. Slot `i`
//! serves transfer instance `i`; slots `i + MAX_INSTANCES` serve a
//! concurrent background user of the same kind. The bucket map is bounded:
//! when it overflows, the least-recently-used bucket with no busy slot is
//! evicted, and if every bucket is busy the effective bound grows by one up
//! to a hard cap.
//!
//! # Examples
//!
//! ```
//! use fluxplayer_net_pool::{HandleProfile, TransferStore};
//! use fluxplayer_shared_types::TransferInstance;
//!
//! let store = TransferStore::new(HandleProfile::default(), 4);
//! let handle = store
//!     .get_handle("http://cdn.example/seg1.ts", TransferInstance::Video)
//!     .expect("handle");
//! // ... perform the transfer with handle.client() ...
//! store.save_handle(handle);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Module declarations
mod profile;
mod store;

// Re-export public API
pub use profile::HandleProfile;
pub use store::{
    AbortFlag, HandleSet, NetPoolError, PooledHandle, StoreAcquire, TransferStore,
    MAX_TRANSFER_BUCKETS,
};
