//! Subprocess bridge to an external speech recognizer.
//!
//! Speaks the line-delimited protocol the original bridge used: a decimal
//! byte-count line followed by raw little-endian `f32` mono PCM on the
//! child's stdin, and one newline-terminated JSON reply on its stdout.

use log::{error, warn};
use serde::Deserialize;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;

use crate::bus::{Transcription, Word, ACTIVITY, TRANSCRIPTION};
use crate::timeline::{Event, Handler, Timestamp};

#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// The sample rate the recognizer expects its PCM at. The ingestion
    /// pipeline is assumed to already normalize tracks to this rate.
    pub sample_rate_hz: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        RecognizerConfig {
            command: "python3".into(),
            args: vec!["-u".into(), "transcribe.py".into()],
            sample_rate_hz: 16_000,
        }
    }
}

#[derive(Debug)]
pub enum RecognizerError {
    Spawn(std::io::Error),
    Io(std::io::Error),
    MalformedReply(String),
    ProcessExited,
}

impl fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerError::Spawn(e) => write!(f, "failed to spawn recognizer subprocess: {}", e),
            RecognizerError::Io(e) => write!(f, "recognizer subprocess i/o error: {}", e),
            RecognizerError::MalformedReply(s) => write!(f, "malformed recognizer reply: {}", s),
            RecognizerError::ProcessExited => write!(f, "recognizer subprocess has exited"),
        }
    }
}

impl std::error::Error for RecognizerError {}

#[derive(Debug, Deserialize)]
struct ReplyLine {
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    words: Vec<WordJson>,
}

#[derive(Debug, Deserialize)]
struct WordJson {
    word: String,
    start: f64,
    end: f64,
    prob: f32,
}

struct Pipe {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<std::process::ChildStdout>,
}

/// Owns the recognizer child process and is registered on a session as an
/// `activity`-subscribed [`Handler`]. I/O is synchronous and serialized by
/// `pipe`'s mutex, mirroring the original's single in-flight request at a
/// time.
pub struct RecognizerClient {
    config: RecognizerConfig,
    pipe: Mutex<Option<Pipe>>,
}

impl RecognizerClient {
    pub fn new(config: RecognizerConfig) -> Self {
        RecognizerClient {
            config,
            pipe: Mutex::new(None),
        }
    }

    fn spawn(&self) -> Result<Pipe, RecognizerError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(RecognizerError::Spawn)?;
        let stdin = child.stdin.take().ok_or(RecognizerError::ProcessExited)?;
        let stdout = child.stdout.take().ok_or(RecognizerError::ProcessExited)?;
        Ok(Pipe {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Sends `pcm` and blocks for the reply. Lazily spawns the subprocess
    /// on first use.
    fn transcribe(&self, pcm: &[f32]) -> Result<Vec<Word>, RecognizerError> {
        let mut guard = self.pipe.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let pipe = guard.as_mut().unwrap();

        let mut bytes = Vec::with_capacity(pcm.len() * 4);
        for sample in pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let write_result = (|| -> std::io::Result<()> {
            writeln!(pipe.stdin, "{}", bytes.len())?;
            pipe.stdin.write_all(&bytes)?;
            pipe.stdin.flush()
        })();
        if let Err(e) = write_result {
            *guard = None;
            return Err(RecognizerError::Io(e));
        }

        let mut line = String::new();
        match pipe.stdout.read_line(&mut line) {
            Ok(0) => {
                *guard = None;
                return Err(RecognizerError::ProcessExited);
            }
            Ok(_) => {}
            Err(e) => {
                *guard = None;
                return Err(RecognizerError::Io(e));
            }
        }

        let reply: ReplyLine = serde_json::from_str(line.trim())
            .map_err(|e| RecognizerError::MalformedReply(e.to_string()))?;

        let words = reply
            .segments
            .into_iter()
            .flat_map(|s| s.words)
            .map(|w| Word {
                word: w.word,
                start: Timestamp::from_nanos((w.start * 1_000_000_000.0) as i64),
                end: Timestamp::from_nanos((w.end * 1_000_000_000.0) as i64),
                prob: w.prob,
            })
            .collect();
        Ok(words)
    }
}

impl Handler for RecognizerClient {
    fn handle(&self, event: &Event) {
        if event.meta.event_type != ACTIVITY {
            return;
        }
        let Some(track) = event.track() else {
            return;
        };
        let span = track.span(event.meta.start, event.meta.end);
        let pcm: Vec<f32> = span.audio().flatten().collect();
        if pcm.is_empty() {
            return;
        }

        match self.transcribe(&pcm) {
            Ok(words) if words.is_empty() => {}
            Ok(words) => {
                let words = words
                    .into_iter()
                    .map(|w| Word {
                        start: span.start() + w.start,
                        end: span.start() + w.end,
                        ..w
                    })
                    .collect();
                span.record_event(TRANSCRIPTION, Transcription { words });
            }
            Err(e) => {
                warn!("recognizer: {}", e);
            }
        }
    }
}

impl Drop for RecognizerClient {
    fn drop(&mut self) {
        if let Some(mut pipe) = self.pipe.lock().unwrap().take() {
            if let Err(e) = pipe.child.kill() {
                error!("recognizer: failed to kill subprocess on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_line_parses_nested_segments_and_words() {
        let json = r#"{"segments":[{"words":[{"word":"hi","start":0.1,"end":0.4,"prob":0.9}]}]}"#;
        let reply: ReplyLine = serde_json::from_str(json).unwrap();
        assert_eq!(reply.segments.len(), 1);
        assert_eq!(reply.segments[0].words[0].word, "hi");
    }
}
