//! `manifest.json`: a record of what a dubbing session did.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DubRequest, Segment, Stage, VoiceId};
use crate::voice::VoiceBinding;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub index: usize,
    pub speaker: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub translation: String,
    /// None when the translation was blank and nothing was synthesized
    pub voice: Option<VoiceId>,
}

impl SegmentRecord {
    pub fn new(index: usize, segment: &Segment) -> Self {
        Self {
            index,
            speaker: segment.speaker.clone(),
            start_ms: segment.start_ms(),
            end_ms: segment.end_ms(),
            text: segment.text(),
            translation: String::new(),
            voice: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub session_id: String,
    pub request: DubRequest,
    pub segments: Vec<SegmentRecord>,
    pub voices: BTreeMap<String, VoiceBinding>,
    pub stages: Vec<Stage>,
    pub output_path: PathBuf,
}

impl Manifest {
    /// Write as pretty JSON into `session_dir`, returning the file path.
    pub fn write(&self, session_dir: &Path) -> Result<PathBuf> {
        let path = session_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data).map_err(std::io::Error::from)?)
    }
}
