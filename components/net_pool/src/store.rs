//! Host bucket map, slot protocol and LRU eviction

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use fluxplayer_shared_types::TransferInstance;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::profile::HandleProfile;

/// Hard ceiling for the soft-growing bucket bound
pub const MAX_TRANSFER_BUCKETS: usize = 10;

const SLOTS_PER_BUCKET: usize = TransferInstance::COUNT * 2;

/// Errors from handle construction or URL handling
#[derive(Debug, thiserror::Error)]
pub enum NetPoolError {
    /// Client construction failed
    #[error("transfer handle build failed: {0}")]
    Build(#[from] reqwest::Error),
    /// The URL had no usable host
    #[error("invalid transfer url: {0}")]
    InvalidUrl(String),
}

/// Outcome of a pool acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAcquire {
    /// Host bucket existed and a free slot was found
    HostSockAvailable,
    /// Host bucket did not exist yet
    HostNotAvailable,
    /// Bucket exists but every slot for the instance is busy
    SockNotAvailable,
}

/// Cooperative abort flag consulted by in-flight transfers
///
/// Arming the flag makes the next progress check of a cooperative transfer
/// return the abort code; the flag auto-resets once observed.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Create a disarmed flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or disarm
    pub fn set(&self, armed: bool) {
        self.0.store(armed, Ordering::SeqCst);
    }

    /// Whether the flag is armed (does not reset)
    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Observe-and-reset, the progress-callback contract
    pub fn consume(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// A transfer handle drawn from (or built outside) the pool
#[derive(Debug, Clone)]
pub struct PooledHandle {
    client: reqwest::Client,
    host: Option<String>,
    slot: Option<usize>,
}

impl PooledHandle {
    /// The HTTP client backing this handle
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Whether the handle came from a bucket slot
    pub fn is_pooled(&self) -> bool {
        self.slot.is_some()
    }
}

struct Slot {
    present: bool,
    in_use: bool,
}

struct Bucket {
    /// Shared context: every handle in the bucket clones this client, so
    /// DNS cache, TLS sessions and the connection pool are bucket-wide.
    shared: reqwest::Client,
    slots: Vec<Slot>,
    last_used_ms: u64,
    user_count: u32,
}

impl Bucket {
    fn new(shared: reqwest::Client, now_ms: u64) -> Self {
        let slots = (0..SLOTS_PER_BUCKET)
            .map(|_| Slot {
                present: false,
                in_use: false,
            })
            .collect();
        Self {
            shared,
            slots,
            last_used_ms: now_ms,
            user_count: 0,
        }
    }

    // A bucket with any outstanding handle is never evicted.
    fn is_busy(&self) -> bool {
        self.slots.iter().any(|s| s.in_use)
    }
}

/// Process-wide pool of per-host transfer handles
///
/// One mutex serializes all bucket-map mutations; the per-bucket shared
/// context performs its own locking internally.
pub struct TransferStore {
    profile: HandleProfile,
    buckets: Mutex<HashMap<String, Bucket>>,
    /// Effective bound; grows past the configured value only when every
    /// bucket is busy, and never past [`MAX_TRANSFER_BUCKETS`]
    max_buckets: Mutex<usize>,
    pooling_enabled: bool,
    epoch: Instant,
    abort: AbortFlag,
}

/// A caller's foreground handle array, indexed by [`TransferInstance`]
#[derive(Default)]
pub struct HandleSet {
    handles: Vec<Option<PooledHandle>>,
}

impl HandleSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            handles: (0..TransferInstance::COUNT).map(|_| None).collect(),
        }
    }

    /// Handle for an instance kind, when initialized
    pub fn get(&self, instance: TransferInstance) -> Option<&PooledHandle> {
        self.handles.get(instance.index()).and_then(|h| h.as_ref())
    }
}

impl TransferStore {
    /// Create a store bound to a handle profile and bucket budget
    ///
    /// `max_buckets` is clamped to `[1, MAX_TRANSFER_BUCKETS]`.
    pub fn new(profile: HandleProfile, max_buckets: usize) -> Self {
        Self {
            profile,
            buckets: Mutex::new(HashMap::new()),
            max_buckets: Mutex::new(max_buckets.clamp(1, MAX_TRANSFER_BUCKETS)),
            pooling_enabled: true,
            epoch: Instant::now(),
            abort: AbortFlag::new(),
        }
    }

    /// Same store with pooling disabled; every acquire builds a fresh handle
    pub fn without_pooling(profile: HandleProfile) -> Self {
        let mut store = Self::new(profile, 1);
        store.pooling_enabled = false;
        store
    }

    /// The store's cooperative abort flag
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    /// Ensure handles exist for the owner's instances `[start, start+count)`
    ///
    /// Pooled when the host is remote and pooling is enabled; otherwise each
    /// handle is built directly from the profile.
    pub fn init(
        &self,
        owner: &mut HandleSet,
        start: TransferInstance,
        count: usize,
        proxy: Option<String>,
        host_url: &str,
    ) -> Result<(), NetPoolError> {
        if owner.handles.is_empty() {
            owner.handles = (0..TransferInstance::COUNT).map(|_| None).collect();
        }
        let host = host_from_url(host_url);
        let end = (start.index() + count).min(TransferInstance::COUNT);
        for idx in start.index()..end {
            if owner.handles[idx].is_some() {
                continue;
            }
            let handle = match &host {
                Some(host) if self.pooling_enabled => {
                    let (drawn, code) = self.get_from_store(host, idx)?;
                    match drawn {
                        Some(handle) => handle,
                        None => {
                            debug!(host, idx, ?code, "pool busy, building handle outside pool");
                            self.fresh_handle(proxy.clone())?
                        }
                    }
                }
                _ => self.fresh_handle(proxy.clone())?,
            };
            owner.handles[idx] = Some(handle);
        }
        Ok(())
    }

    /// Return the owner's handles `[start, start+count)` to the pool
    ///
    /// Pooled handles free their slot; out-of-pool handles are dropped.
    pub fn term(&self, owner: &mut HandleSet, start: TransferInstance, count: usize) {
        let end = (start.index() + count).min(owner.handles.len());
        for idx in start.index()..end {
            if let Some(handle) = owner.handles[idx].take() {
                self.save_handle(handle);
            }
        }
    }

    /// Resolve the host from `url` and draw a handle for the instance
    ///
    /// Remote host + pooling enabled draws from the bucket (creating bucket
    /// or handle as needed). When every slot for the instance is busy, or
    /// the host is not remote, the caller gets a fresh handle outside the
    /// pool.
    pub fn get_handle(
        &self,
        url: &str,
        instance: TransferInstance,
    ) -> Result<PooledHandle, NetPoolError> {
        match host_from_url(url) {
            Some(host) if self.pooling_enabled => {
                let (drawn, _) = self.get_from_store(&host, instance.index())?;
                match drawn {
                    Some(handle) => Ok(handle),
                    None => self.fresh_handle(None),
                }
            }
            _ => self.fresh_handle(None),
        }
    }

    /// Build an out-of-pool handle, optionally through a proxy
    pub fn build_handle(&self, proxy: Option<String>) -> Result<PooledHandle, NetPoolError> {
        self.fresh_handle(proxy)
    }

    /// Mirror of [`TransferStore::get_handle`]
    pub fn save_handle(&self, handle: PooledHandle) {
        let (Some(host), Some(slot)) = (&handle.host, handle.slot) else {
            return; // out-of-pool handle, just drop
        };
        let now = self.now_ms();
        let mut buckets = self.buckets.lock();
        match buckets.get_mut(host) {
            Some(bucket) => {
                bucket.slots[slot].in_use = false;
                bucket.last_used_ms = now;
                debug!(host, slot, "handle returned to store");
            }
            None => {
                debug!(host, slot, "bucket gone, handle dropped");
            }
        }
    }

    /// Number of live buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Current effective bucket bound
    pub fn effective_max_buckets(&self) -> usize {
        *self.max_buckets.lock()
    }

    /// Log the bucket map (diagnostics)
    pub fn show_store_data(&self) {
        let buckets = self.buckets.lock();
        for (host, bucket) in buckets.iter() {
            info!(
                host,
                busy = bucket.slots.iter().filter(|s| s.in_use).count(),
                present = bucket.slots.iter().filter(|s| s.present).count(),
                last_used_ms = bucket.last_used_ms,
                users = bucket.user_count,
                "transfer store bucket"
            );
        }
    }

    fn fresh_handle(&self, proxy: Option<String>) -> Result<PooledHandle, NetPoolError> {
        let profile = match proxy {
            Some(p) => self.profile.with_proxy(Some(p)),
            None => self.profile.clone(),
        };
        Ok(PooledHandle {
            client: profile.build_client()?,
            host: None,
            slot: None,
        })
    }

    /// Slot scan: start at the instance index, stride the instance count
    fn get_from_store(
        &self,
        host: &str,
        instance_idx: usize,
    ) -> Result<(Option<PooledHandle>, StoreAcquire), NetPoolError> {
        let now = self.now_ms();
        let mut buckets = self.buckets.lock();

        let mut acquire = StoreAcquire::HostSockAvailable;
        if !buckets.contains_key(host) {
            acquire = StoreAcquire::HostNotAvailable;
            let shared = self.profile.build_client()?;
            let max = *self.max_buckets.lock();
            if buckets.len() >= max {
                self.evict_locked(&mut buckets);
            }
            info!(host, size = buckets.len() + 1, "created transfer store bucket");
            buckets.insert(host.to_string(), Bucket::new(shared, now));
        }

        let mut drawn: Option<PooledHandle> = None;
        if let Some(bucket) = buckets.get_mut(host) {
            bucket.user_count += 1;
            let mut slot_idx = instance_idx;
            while slot_idx < SLOTS_PER_BUCKET {
                if !bucket.slots[slot_idx].in_use {
                    bucket.slots[slot_idx].present = true;
                    bucket.slots[slot_idx].in_use = true;
                    bucket.last_used_ms = now;
                    debug!(host, instance_idx, slot_idx, "handle drawn from store");
                    drawn = Some(PooledHandle {
                        client: bucket.shared.clone(),
                        host: Some(host.to_string()),
                        slot: Some(slot_idx),
                    });
                    break;
                }
                slot_idx += TransferInstance::COUNT;
            }
        }

        if drawn.is_none() {
            warn!(host, instance_idx, "store slots busy, no free slot for instance");
            acquire = StoreAcquire::SockNotAvailable;
        }
        let max = *self.max_buckets.lock();
        if buckets.len() > max {
            self.evict_locked(&mut buckets);
        }
        Ok((drawn, acquire))
    }

    /// Remove the least-recently-used bucket with no outstanding handle
    ///
    /// When every bucket is busy, grow the effective bound instead (capped).
    fn evict_locked(&self, buckets: &mut HashMap<String, Bucket>) {
        let victim = buckets
            .iter()
            .filter(|(_, b)| !b.is_busy())
            .min_by_key(|(_, b)| b.last_used_ms)
            .map(|(host, _)| host.clone());
        match victim {
            Some(host) => {
                info!(host, "evicting least-recently-used transfer bucket");
                buckets.remove(&host);
            }
            None => {
                let mut max = self.max_buckets.lock();
                if *max < MAX_TRANSFER_BUCKETS {
                    *max += 1;
                    warn!(new_max = *max, "all buckets busy, growing store bound");
                }
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Host part of a URL when it points at a remote http(s) endpoint
pub(crate) fn host_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    match parsed.scheme() {
        "http" | "https" => parsed.host_str().map(str::to_string),
        _ => None,
    }
}
