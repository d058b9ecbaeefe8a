//! Subprocess-backed collaborators: yt-dlp, demucs, ffmpeg.

use std::ffi::OsString;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use super::{Downloader, MediaFiles, Muxer, SourceSeparator};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Run a program to completion, killing it if it outlives `timeout`.
///
/// Stderr is captured to a temp file so a failing tool's last words end up
/// in the error.
pub fn run_command(program: &str, args: &[OsString], timeout: Duration) -> Result<()> {
    let mut stderr_file = tempfile::tempfile().context("Failed to create stderr capture file")?;

    log::debug!("Running {} {:?}", program, args);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file.try_clone()?))
        .spawn()
        .with_context(|| format!("Failed to start {} (is it installed and on PATH?)", program))?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            bail!("{} timed out after {:?}", program, timeout);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    if !status.success() {
        let mut stderr = String::new();
        stderr_file.seek(SeekFrom::Start(0))?;
        stderr_file.read_to_string(&mut stderr).ok();
        bail!("{} exited with {}: {}", program, status, tail(&stderr, STDERR_TAIL_LINES));
    }
    Ok(())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}

fn expect_file(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        bail!("{} not found at {}", what, path.display());
    }
    Ok(())
}

// --- yt-dlp ---

/// Downloads audio and video streams separately with yt-dlp.
pub struct YtDlp {
    pub binary: String,
    pub timeout: Duration,
}

impl YtDlp {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout,
        }
    }
}

/// yt-dlp arguments for one stream. The URL goes after `--` so a value
/// starting with `-` is never taken for an option.
pub(crate) fn ytdlp_args(format: &str, output: &Path, url: &str) -> Vec<OsString> {
    args([
        OsString::from("-f"),
        format.into(),
        "-o".into(),
        output.into(),
        "--".into(),
        url.into(),
    ])
}

impl Downloader for YtDlp {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<MediaFiles> {
        std::fs::create_dir_all(dest_dir)?;
        let audio = dest_dir.join("source.m4a");
        let video = dest_dir.join("source.mp4");

        log::info!("Downloading audio stream of {}", url);
        run_command(
            &self.binary,
            &ytdlp_args("bestaudio[ext=m4a]", &audio, url),
            self.timeout,
        )?;
        log::info!("Downloading video stream of {}", url);
        run_command(
            &self.binary,
            &ytdlp_args("bestvideo", &video, url),
            self.timeout,
        )?;

        expect_file(&audio, "Downloaded audio")?;
        expect_file(&video, "Downloaded video")?;
        Ok(MediaFiles { audio, video })
    }
}

// --- demucs ---

/// Two-stem vocal separation with demucs; keeps the non-vocal stem.
pub struct Demucs {
    pub binary: String,
    pub model: String,
    pub timeout: Duration,
}

impl Demucs {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "demucs".to_string(),
            model: "htdemucs".to_string(),
            timeout,
        }
    }

    /// Where demucs writes the background stem for `audio_path`.
    pub fn background_path(&self, audio_path: &Path, dest_dir: &Path) -> PathBuf {
        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        dest_dir.join(&self.model).join(stem).join("no_vocals.wav")
    }
}

impl SourceSeparator for Demucs {
    fn separate(&self, audio_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
        log::info!("Separating background from {}", audio_path.display());
        run_command(
            &self.binary,
            &args([
                OsString::from("--two-stems"),
                "vocals".into(),
                "-n".into(),
                self.model.clone().into(),
                "-o".into(),
                dest_dir.into(),
                audio_path.into(),
            ]),
            self.timeout,
        )?;

        let background = self.background_path(audio_path, dest_dir);
        expect_file(&background, "Background stem")?;
        Ok(background)
    }
}

// --- ffmpeg ---

/// Mixing and muxing with ffmpeg.
pub struct Ffmpeg {
    pub binary: String,
    pub timeout: Duration,
}

impl Ffmpeg {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            timeout,
        }
    }
}

pub(crate) fn mix_args(speech: &Path, background: &Path, output: &Path) -> Vec<OsString> {
    args([
        OsString::from("-i"),
        speech.into(),
        "-i".into(),
        background.into(),
        "-filter_complex".into(),
        "[0:a][1:a]amix=inputs=2:duration=longest:dropout_transition=3".into(),
        "-y".into(),
        output.into(),
    ])
}

pub(crate) fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    args([
        OsString::from("-i"),
        video.into(),
        "-i".into(),
        audio.into(),
        "-c:v".into(),
        "copy".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-shortest".into(),
        "-y".into(),
        output.into(),
    ])
}

impl Muxer for Ffmpeg {
    fn mix(&self, speech: &Path, background: &Path, output: &Path) -> Result<()> {
        log::info!("Mixing speech over background into {}", output.display());
        run_command(&self.binary, &mix_args(speech, background, output), self.timeout)?;
        expect_file(output, "Mixed audio")
    }

    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        log::info!("Muxing {} into {}", audio.display(), output.display());
        run_command(&self.binary, &mux_args(video, audio, output), self.timeout)?;
        expect_file(output, "Dubbed video")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_command_success() {
        assert!(run_command("true", &[], Duration::from_secs(5)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_failure_includes_stderr() {
        let err = run_command(
            "sh",
            &args(["-c", "echo boom >&2; exit 3"]),
            Duration::from_secs(5),
        )
        .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("boom"), "stderr missing from: {}", msg);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_timeout_kills() {
        let started = Instant::now();
        let err = run_command("sleep", &args(["5"]), Duration::from_millis(200)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_command_missing_binary() {
        let err = run_command("autodub-no-such-tool", &[], Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("autodub-no-such-tool"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("only", 5), "only");
    }

    #[test]
    fn test_demucs_background_path() {
        let demucs = Demucs::new(Duration::from_secs(1));
        let path = demucs.background_path(Path::new("/tmp/s/source.m4a"), Path::new("/tmp/s/sep"));
        assert_eq!(path, PathBuf::from("/tmp/s/sep/htdemucs/source/no_vocals.wav"));
    }

    #[test]
    fn test_ytdlp_args_end_options_before_url() {
        let a = ytdlp_args("bestvideo", Path::new("out/source.mp4"), "--exec=rm -rf ~");
        let a: Vec<String> = a.iter().map(|s| s.to_string_lossy().to_string()).collect();
        assert_eq!(a, ["-f", "bestvideo", "-o", "out/source.mp4", "--", "--exec=rm -rf ~"]);
    }

    #[test]
    fn test_mux_args_copy_video_and_map_streams() {
        let a = mux_args(Path::new("v.mp4"), Path::new("a.wav"), Path::new("out.mp4"));
        let a: Vec<String> = a.iter().map(|s| s.to_string_lossy().to_string()).collect();
        assert_eq!(a[..4], ["-i", "v.mp4", "-i", "a.wav"]);
        assert!(a.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(a.windows(2).any(|w| w == ["-map", "0:v:0"]));
        assert!(a.windows(2).any(|w| w == ["-map", "1:a:0"]));
        assert!(a.contains(&"-shortest".to_string()));
        assert_eq!(a.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_mix_args_amix_longest() {
        let a = mix_args(Path::new("tts.wav"), Path::new("bg.wav"), Path::new("mix.wav"));
        let joined = a.iter().map(|s| s.to_string_lossy().to_string()).collect::<Vec<_>>().join(" ");
        assert!(joined.contains("amix=inputs=2:duration=longest:dropout_transition=3"));
        assert!(joined.ends_with("mix.wav"));
    }
}
