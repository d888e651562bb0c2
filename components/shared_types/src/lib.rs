//! # shared_types Component
//!
//! Common types, enums, and error definitions used across all player components.
//!
//! This crate provides the foundational type definitions for the FluxPlayer
//! core, including media formats, transfer instance kinds, player state, the
//! tune-failure taxonomy and the logging facility.
//!
//! # Overview
//!
//! The shared_types component is a foundational library that defines:
//!
//! - **Formats**: [`MediaFormat`], [`DrmMethod`], [`MediaType`],
//!   [`TransferInstance`] for stream and transfer classification
//! - **Player state**: [`PlayerState`] observed by the scheduler and event
//!   manager
//! - **Errors**: [`TuneFailure`] taxonomy with retry hints, [`KeyStatus`]
//!   reported by the platform decryption module
//! - **Logging**: [`init_logging`] and the [`HttpRequestEnd`] triage record
//! - **Profiling**: [`TuneProfiler`] bracketing tune phases
//!
//! # Examples
//!
//! Classifying a protected HLS stream:
//!
//! ```
//! use fluxplayer_shared_types::{DrmMethod, MediaFormat};
//!
//! let format = MediaFormat::HlsMp4;
//! let method = DrmMethod::Aes128;
//! assert!(format.is_fragmented_mp4());
//! assert_ne!(method, DrmMethod::None);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Module declarations
mod errors;
mod formats;
mod logging;
mod player;
mod profiler;

// Re-export public API
pub use errors::*;
pub use formats::*;
pub use logging::*;
pub use player::*;
pub use profiler::*;
