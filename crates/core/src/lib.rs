//! autodub-core: automatic video dubbing.
//!
//! Downloads a video, transcribes it with speaker diarization, translates
//! each speaker turn, re-voices it (optionally with a voice cloned from the
//! original speaker), fits the new speech into the original timing and muxes
//! the result back over the video.

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod providers;
pub mod reconcile;
pub mod reference;
pub mod segment;
pub mod session;
pub mod timeline;
pub mod types;
pub mod voice;

pub use config::DubConfig;
pub use error::{DubError, Result};
pub use pipeline::Dubber;
pub use types::{DubOutcome, DubRequest, Stage};
