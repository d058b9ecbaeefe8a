//! Per-speaker voice assignment for one dubbing run.
//!
//! The first time a speaker is seen, a voice is chosen (cloned from their
//! reference clip, or taken from the fixed pool) and memoized; every later
//! segment of that speaker reuses it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::VoiceCache;
use crate::error::{DubError, Result};
use crate::providers::VoiceCloner;
use crate::types::VoiceId;

/// Where a bound voice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceOrigin {
    Pool,
    Cloned,
}

/// A speaker's voice for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceBinding {
    pub voice: VoiceId,
    pub origin: VoiceOrigin,
}

struct CloneSource<'a> {
    cache: &'a VoiceCache,
    cloner: &'a dyn VoiceCloner,
}

/// Session-scoped speaker → voice memo.
pub struct VoiceBinder<'a> {
    pool: Vec<VoiceId>,
    next_slot: usize,
    bindings: HashMap<String, VoiceBinding>,
    cloning: Option<CloneSource<'a>>,
}

impl<'a> VoiceBinder<'a> {
    /// Assign voices from `pool` in order, wrapping around.
    pub fn with_pool(pool: Vec<VoiceId>) -> Result<Self> {
        if pool.is_empty() {
            return Err(DubError::Config("voice pool is empty".into()));
        }
        Ok(Self {
            pool,
            next_slot: 0,
            bindings: HashMap::new(),
            cloning: None,
        })
    }

    /// Clone each speaker from their cached reference clip, falling back to `pool`.
    pub fn with_cloning(
        pool: Vec<VoiceId>,
        cache: &'a VoiceCache,
        cloner: &'a dyn VoiceCloner,
    ) -> Result<Self> {
        let mut binder = Self::with_pool(pool)?;
        binder.cloning = Some(CloneSource { cache, cloner });
        Ok(binder)
    }

    /// Voice for `speaker`, binding one on first sight.
    pub fn resolve(&mut self, speaker: &str) -> VoiceId {
        if let Some(binding) = self.bindings.get(speaker) {
            return binding.voice.clone();
        }

        let binding = match self.try_clone(speaker) {
            Some(voice) => VoiceBinding {
                voice,
                origin: VoiceOrigin::Cloned,
            },
            None => VoiceBinding {
                voice: self.next_pool_voice(),
                origin: VoiceOrigin::Pool,
            },
        };

        log::info!(
            "Speaker {} -> voice {} ({:?})",
            speaker,
            binding.voice,
            binding.origin
        );
        let voice = binding.voice.clone();
        self.bindings.insert(speaker.to_string(), binding);
        voice
    }

    pub fn bindings(&self) -> &HashMap<String, VoiceBinding> {
        &self.bindings
    }

    pub fn into_bindings(self) -> HashMap<String, VoiceBinding> {
        self.bindings
    }

    fn next_pool_voice(&mut self) -> VoiceId {
        let voice = self.pool[self.next_slot % self.pool.len()].clone();
        self.next_slot += 1;
        voice
    }

    fn try_clone(&self, speaker: &str) -> Option<VoiceId> {
        let source = self.cloning.as_ref()?;

        let Some(clip) = source.cache.get(speaker) else {
            log::warn!(
                "No reference clip for speaker {} in {}, using a pool voice",
                speaker,
                source.cache.dir().display()
            );
            return None;
        };

        match source.cloner.clone_voice(&clip, speaker) {
            Ok(voice) => Some(voice),
            Err(e) => {
                let err = DubError::Cloning {
                    speaker: speaker.to_string(),
                    message: DubError::detail(&e),
                };
                log::warn!("{}; using a pool voice", err);
                None
            }
        }
    }
}
