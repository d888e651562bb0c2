//! Unit tests for the tune-phase profiler

use fluxplayer_shared_types::{ProfilerBucket, TuneProfiler};

#[test]
fn test_bucket_round_trip() {
    let profiler = TuneProfiler::new();
    profiler.tune_begin();
    profiler.profile_begin(ProfilerBucket::LaNetwork);
    profiler.profile_end(ProfilerBucket::LaNetwork);
    assert!(profiler.bucket_duration_ms(ProfilerBucket::LaNetwork).is_some());
    assert!(profiler.bucket_duration_ms(ProfilerBucket::LaPreproc).is_none());
}

#[test]
fn test_end_without_begin_is_ignored() {
    let profiler = TuneProfiler::new();
    profiler.profile_end(ProfilerBucket::Manifest);
    assert!(profiler.bucket_duration_ms(ProfilerBucket::Manifest).is_none());
}

#[test]
fn test_retried_phase_keeps_first_measurement() {
    let profiler = TuneProfiler::new();
    profiler.profile_begin(ProfilerBucket::LaTotal);
    profiler.profile_end(ProfilerBucket::LaTotal);
    let first = profiler.bucket_duration_ms(ProfilerBucket::LaTotal);
    profiler.profile_begin(ProfilerBucket::LaTotal);
    profiler.profile_end(ProfilerBucket::LaTotal);
    assert_eq!(profiler.bucket_duration_ms(ProfilerBucket::LaTotal), first);
}

#[test]
fn test_tune_begin_resets_measurements() {
    let profiler = TuneProfiler::new();
    profiler.profile_begin(ProfilerBucket::LaTotal);
    profiler.profile_end(ProfilerBucket::LaTotal);
    profiler.tune_begin();
    assert!(profiler.bucket_duration_ms(ProfilerBucket::LaTotal).is_none());
}

#[test]
fn test_error_marking() {
    let profiler = TuneProfiler::new();
    profiler.profile_begin(ProfilerBucket::LaNetwork);
    profiler.profile_error(ProfilerBucket::LaNetwork, 503);
    assert!(profiler.bucket_errored(ProfilerBucket::LaNetwork));
    profiler.tune_end(false);
}
