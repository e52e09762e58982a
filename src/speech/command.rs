//! Speech through the host's command-line synthesizer (`say` on macOS,
//! `espeak-ng` or `espeak` elsewhere). Each utterance is one child process.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::utils::host::find_on_path;

use super::{SpeechBackend, Utterance, Voice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Say,
    Espeak,
}

pub struct CommandSpeech {
    program: PathBuf,
    flavor: Flavor,
    child: Mutex<Option<Child>>,
}

impl CommandSpeech {
    /// Finds a synthesizer on `PATH`. `None` means the host cannot speak.
    pub fn detect() -> Option<Self> {
        let candidates: &[(&str, Flavor)] = if cfg!(target_os = "macos") {
            &[("say", Flavor::Say)]
        } else {
            &[("espeak-ng", Flavor::Espeak), ("espeak", Flavor::Espeak)]
        };

        candidates.iter().find_map(|(name, flavor)| {
            find_on_path(name).map(|program| Self {
                program,
                flavor: *flavor,
                child: Mutex::new(None),
            })
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_command(&self, utterance: &Utterance) -> Command {
        let mut command = Command::new(&self.program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match self.flavor {
            Flavor::Say => {
                if let Some(voice) = utterance.voice.as_ref() {
                    command.arg("-v").arg(&voice.name);
                }
                // `say` speaks about 175 words per minute at its default rate.
                let rate = (175.0 * utterance.rate).round() as u32;
                command.arg("-r").arg(rate.to_string()).arg(&utterance.text);
            }
            Flavor::Espeak => {
                // espeak selects voices by language tag, not display name.
                if let Some(voice) = utterance.voice.as_ref() {
                    command.arg("-v").arg(&voice.lang);
                }
                let words_per_minute = (175.0 * utterance.rate).round() as u32;
                let amplitude = (100.0 * utterance.volume).round() as u32;
                let pitch = (50.0 * utterance.pitch).round().min(99.0) as u32;
                command
                    .arg("-s")
                    .arg(words_per_minute.to_string())
                    .arg("-a")
                    .arg(amplitude.to_string())
                    .arg("-p")
                    .arg(pitch.to_string())
                    .arg("--")
                    .arg(&utterance.text);
            }
        }

        command
    }

    fn list_voices(&self) -> Result<String> {
        let mut command = Command::new(&self.program);
        match self.flavor {
            Flavor::Say => command.args(["-v", "?"]),
            Flavor::Espeak => command.arg("--voices"),
        };
        let output = command
            .stderr(Stdio::null())
            .output()
            .with_context(|| format!("failed to list voices via {}", self.program.display()))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SpeechBackend for CommandSpeech {
    fn voices(&self) -> Vec<Voice> {
        match self.list_voices() {
            Ok(listing) => match self.flavor {
                Flavor::Say => parse_say_voices(&listing),
                Flavor::Espeak => parse_espeak_voices(&listing),
            },
            Err(err) => {
                warn!("{err:#}");
                Vec::new()
            }
        }
    }

    fn speak(&self, utterance: &Utterance) -> Result<()> {
        // A silent utterance has nothing to unlock for a child-process
        // synthesizer.
        if utterance.text.trim().is_empty() || utterance.volume <= 0.0 {
            debug!("skipping silent utterance");
            return Ok(());
        }

        let child = self
            .build_command(utterance)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        let mut guard = self
            .child
            .lock()
            .map_err(|_| anyhow::anyhow!("speech child lock poisoned"))?;
        if let Some(mut previous) = guard.replace(child) {
            let _ = previous.kill();
            let _ = previous.wait();
        }
        Ok(())
    }

    fn cancel(&self) {
        let Ok(mut guard) = self.child.lock() else {
            return;
        };
        if let Some(mut child) = guard.take() {
            if let Ok(None) = child.try_wait() {
                debug!("cancelling utterance (pid {})", child.id());
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }

    #[cfg(unix)]
    fn resume(&self) {
        let Ok(mut guard) = self.child.lock() else {
            return;
        };
        if let Some(child) = guard.as_mut() {
            if let Ok(None) = child.try_wait() {
                let status = Command::new("kill")
                    .args(["-CONT", &child.id().to_string()])
                    .stderr(Stdio::null())
                    .status();
                if let Err(err) = status {
                    warn!("failed to resume speech process: {err}");
                }
            }
        }
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Parses `say -v ?` lines such as `Samantha            en_US    # Hello...`.
/// Voice names may contain spaces, so the locale column anchors the split.
fn parse_say_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, lang) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || !looks_like_locale(lang) {
                return None;
            }
            Some(Voice::new(name, lang, false))
        })
        .collect()
}

fn looks_like_locale(value: &str) -> bool {
    let mut parts = value.split(['_', '-']);
    let language = parts.next().unwrap_or_default();
    (2..=3).contains(&language.len()) && language.chars().all(|c| c.is_ascii_alphabetic())
}

/// Parses `espeak-ng --voices`, whose columns are
/// `Pty Language Age/Gender VoiceName File Other`.
fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let lang = columns.next()?;
            let _gender = columns.next()?;
            let name = columns.next()?;
            Some(Voice::new(name, lang, lang == "en"))
        })
        .collect()
}
