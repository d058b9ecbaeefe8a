//! File-based caching: speaker reference clips and transcripts.
//!
//! Reference clips are written by the speaker reference collector and read
//! back once per speaker when a voice is cloned. Transcripts are keyed by the
//! SHA-256 of the audio they came from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::audio::io::write_wav;
use crate::types::{AudioBuffer, Word};

/// Get the default cache directory.
///
/// Uses `AUTODUB_CACHE_DIR` env var if set, otherwise `~/.cache/autodub`.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AUTODUB_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cache").join("autodub")
}

/// Compute SHA-256 hash of a file's contents.
///
/// Returns a 64-character hex string.
pub fn file_hash(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a string, as hex.
pub fn text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

pub(crate) fn short(hash: &str) -> &str {
    &hash[..12.min(hash.len())]
}

/// Write `target` through a uniquely named temp file in the same directory,
/// then rename it into place. Concurrent writers never share a temp file.
fn write_via_temp(target: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;

    let tmp = tempfile::Builder::new()
        .prefix(".autodub-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    write(tmp.path())?;
    tmp.persist(target)
        .with_context(|| format!("Failed to move file into cache: {}", target.display()))?;
    Ok(())
}

/// Atomically write data to a file via temp file + rename.
fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    write_via_temp(target, |tmp| Ok(std::fs::write(tmp, data)?))
}

/// Turn an opaque speaker label into a safe file stem.
///
/// Labels that need rewriting get a hash suffix so two different labels
/// never map to the same file.
pub fn speaker_file_stem(speaker: &str) -> String {
    let cleaned: String = speaker
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned == speaker && !cleaned.is_empty() {
        cleaned
    } else {
        format!("{}-{}", cleaned, &text_hash(speaker)[..8])
    }
}

// --- Speaker reference clips ---

/// Directory of per-speaker reference clips for one cache scope.
#[derive(Debug, Clone)]
pub struct VoiceCache {
    dir: PathBuf,
}

impl VoiceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reference clips under `<root>/voices/<scope>`.
    pub fn scoped(root: &Path, scope: &str) -> Self {
        Self::new(root.join("voices").join(scope))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn clip_path(&self, speaker: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", speaker_file_stem(speaker)))
    }

    /// Return the cached clip for a speaker, or None if not cached.
    pub fn get(&self, speaker: &str) -> Option<PathBuf> {
        let path = self.clip_path(speaker);
        if path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            log::debug!("Cache hit: reference clip for speaker {}", speaker);
            Some(path)
        } else {
            None
        }
    }

    /// Write a speaker's reference clip. Returns the cache path.
    pub fn store(&self, speaker: &str, audio: &AudioBuffer) -> Result<PathBuf> {
        let dest = self.clip_path(speaker);
        write_via_temp(&dest, |tmp| write_wav(tmp, audio))?;
        Ok(dest)
    }
}

// --- Transcript cache ---

fn transcript_path(root: &Path, audio_hash: &str) -> PathBuf {
    root.join("transcripts").join(format!("{}.json", audio_hash))
}

/// Return a cached transcript, or None if not cached or unreadable.
pub fn get_cached_transcript(root: &Path, audio_hash: &str) -> Option<Vec<Word>> {
    let path = transcript_path(root, audio_hash);
    if !path.exists() {
        return None;
    }
    let data = std::fs::read_to_string(&path).ok()?;
    let words: Vec<Word> = serde_json::from_str(&data).ok()?;
    log::info!("Cache hit: transcription ({}...)", short(audio_hash));
    Some(words)
}

/// Store a transcript in the cache.
pub fn store_transcript_cache(root: &Path, audio_hash: &str, words: &[Word]) -> Result<()> {
    let json = serde_json::to_string(words)?;
    atomic_write(&transcript_path(root, audio_hash), json.as_bytes())?;
    log::info!("Cached transcription ({}...)", short(audio_hash));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("autodub_cache_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_hash_deterministic() {
        let dir = temp_root("hash_det");
        let path = dir.join("test.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let h1 = file_hash(&path).unwrap();
        let h2 = file_hash(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_eq!(h1, text_hash("hello world"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_atomic_write() {
        let dir = temp_root("atomic");
        let path = dir.join("nested").join("test.json");

        atomic_write(&path, b"{\"key\": \"value\"}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"key\": \"value\"}");
        assert!(leftover_temp_files(&dir.join("nested")).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_speaker_file_stem_plain_labels_unchanged() {
        assert_eq!(speaker_file_stem("0"), "0");
        assert_eq!(speaker_file_stem("speaker_A-1"), "speaker_A-1");
    }

    #[test]
    fn test_speaker_file_stem_unsafe_labels_do_not_collide() {
        let a = speaker_file_stem("a/b");
        let b = speaker_file_stem("a_b");
        let c = speaker_file_stem("a b");
        assert!(!a.contains('/'));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(!speaker_file_stem("").is_empty());
        assert!(!speaker_file_stem("..").contains('.'));
    }

    #[test]
    fn test_voice_cache_store_and_get() {
        let root = temp_root("voices");
        let cache = VoiceCache::scoped(&root, "session-1");
        assert!(cache.get("0").is_none());

        let clip = AudioBuffer::new(vec![0.1; 32000], 16000);
        let path = cache.store("0", &clip).unwrap();
        assert_eq!(cache.get("0"), Some(path.clone()));
        assert!(path.starts_with(root.join("voices").join("session-1")));

        let other = VoiceCache::scoped(&root, "session-2");
        assert!(other.get("0").is_none());

        std::fs::remove_dir_all(&root).ok();
    }

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map(|e| e == "tmp").unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_voice_cache_concurrent_stores_same_speaker() {
        let root = temp_root("voices_concurrent");
        let cache = VoiceCache::scoped(&root, "shared");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let clip = AudioBuffer::new(vec![0.01 * i as f64; 16000], 16000);
                    cache.store("0", &clip)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let path = cache.get("0").unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 16000);
        assert!(leftover_temp_files(cache.dir()).is_empty());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_atomic_write_concurrent_writers() {
        let dir = temp_root("atomic_concurrent");
        let path = dir.join("shared.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || atomic_write(&path, format!("[{}]", i).as_bytes()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.starts_with('[') && data.ends_with(']'));
        assert!(leftover_temp_files(&dir).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_transcript_store_and_retrieve() {
        let root = temp_root("transcripts");
        let words = vec![
            Word::new("hello", 0.0, 0.5, "0"),
            Word::new("world", 0.5, 1.0, "1"),
        ];
        assert!(get_cached_transcript(&root, "abc").is_none());

        store_transcript_cache(&root, "abc", &words).unwrap();
        assert_eq!(get_cached_transcript(&root, "abc"), Some(words));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_cache_dir_default() {
        assert!(!cache_dir().to_string_lossy().is_empty());
    }
}
