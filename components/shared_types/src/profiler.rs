//! Tune-time profiling buckets
//!
//! Collaborators bracket notable phases (manifest download, license
//! acquisition stages, first frame) so a tune can be summarized as one
//! timeline record.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

/// Phases measured during a tune
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ProfilerBucket {
    /// Main manifest download
    Manifest = 0,
    /// License acquisition, whole exchange
    LaTotal,
    /// License acquisition pre-processing (challenge generation)
    LaPreproc,
    /// License acquisition network operation
    LaNetwork,
    /// License acquisition post-processing (key installation)
    LaPostproc,
    /// First buffer handed to the sink
    FirstBuffer,
    /// First frame displayed
    FirstFrame,
}

const BUCKET_COUNT: usize = 7;

impl ProfilerBucket {
    fn index(&self) -> usize {
        *self as usize
    }

    fn label(&self) -> &'static str {
        match self {
            ProfilerBucket::Manifest => "manifest",
            ProfilerBucket::LaTotal => "la-total",
            ProfilerBucket::LaPreproc => "la-preproc",
            ProfilerBucket::LaNetwork => "la-network",
            ProfilerBucket::LaPostproc => "la-postproc",
            ProfilerBucket::FirstBuffer => "first-buffer",
            ProfilerBucket::FirstFrame => "first-frame",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketRecord {
    start_ms: u64,
    duration_ms: u64,
    complete: bool,
    errored: bool,
    error_code: i64,
}

/// Per-tune phase timing collector
///
/// Begin/end pairs are idempotent per bucket and per tune; a second begin
/// on an already-profiled bucket is ignored so retried phases keep their
/// first measurement.
#[derive(Debug)]
pub struct TuneProfiler {
    epoch: Instant,
    tune_start_ms: Mutex<u64>,
    buckets: Mutex<[BucketRecord; BUCKET_COUNT]>,
}

impl Default for TuneProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TuneProfiler {
    /// Profiler with the tune clock starting now
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            tune_start_ms: Mutex::new(0),
            buckets: Mutex::new([BucketRecord::default(); BUCKET_COUNT]),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Restart the tune clock and drop previous measurements
    pub fn tune_begin(&self) {
        *self.tune_start_ms.lock() = self.now_ms();
        *self.buckets.lock() = [BucketRecord::default(); BUCKET_COUNT];
    }

    /// Open a bucket (no-op when it was already measured this tune)
    pub fn profile_begin(&self, bucket: ProfilerBucket) {
        let mut buckets = self.buckets.lock();
        let record = &mut buckets[bucket.index()];
        if record.complete || record.start_ms != 0 {
            return;
        }
        record.start_ms = self.now_ms().max(1);
    }

    /// Close a bucket and record its duration
    pub fn profile_end(&self, bucket: ProfilerBucket) {
        let now = self.now_ms();
        let mut buckets = self.buckets.lock();
        let record = &mut buckets[bucket.index()];
        if record.complete || record.start_ms == 0 {
            return;
        }
        record.duration_ms = now.saturating_sub(record.start_ms);
        record.complete = true;
    }

    /// Mark a bucket failed with the observed code
    pub fn profile_error(&self, bucket: ProfilerBucket, error_code: i64) {
        let mut buckets = self.buckets.lock();
        let record = &mut buckets[bucket.index()];
        record.errored = true;
        record.error_code = error_code;
    }

    /// Duration of a completed bucket, in milliseconds
    pub fn bucket_duration_ms(&self, bucket: ProfilerBucket) -> Option<u64> {
        let buckets = self.buckets.lock();
        let record = buckets[bucket.index()];
        record.complete.then_some(record.duration_ms)
    }

    /// Whether a bucket recorded an error
    pub fn bucket_errored(&self, bucket: ProfilerBucket) -> bool {
        self.buckets.lock()[bucket.index()].errored
    }

    /// Log the tune timeline as one structured record
    pub fn tune_end(&self, success: bool) {
        let total = self.now_ms().saturating_sub(*self.tune_start_ms.lock());
        let buckets = self.buckets.lock();
        let mut summary = String::new();
        for (i, record) in buckets.iter().enumerate() {
            if !record.complete && !record.errored {
                continue;
            }
            let bucket = [
                ProfilerBucket::Manifest,
                ProfilerBucket::LaTotal,
                ProfilerBucket::LaPreproc,
                ProfilerBucket::LaNetwork,
                ProfilerBucket::LaPostproc,
                ProfilerBucket::FirstBuffer,
                ProfilerBucket::FirstFrame,
            ][i];
            if !summary.is_empty() {
                summary.push(',');
            }
            if record.errored {
                summary.push_str(&format!("{}:err({})", bucket.label(), record.error_code));
            } else {
                summary.push_str(&format!("{}:{}", bucket.label(), record.duration_ms));
            }
        }
        info!(success, total_ms = total, timeline = %summary, "TuneTimeline");
    }
}
