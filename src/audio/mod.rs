//! Keep-awake fallback that holds an audio output open with an inaudible
//! stream, the desktop counterpart of a muted looping media element.

pub mod dither;

use dither::Dither;

use anyhow::{anyhow, Result};
use rodio::{OutputStream, Sink};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

use crate::wake::KeepAwakeFallback;

enum AudioCommand {
    Start(mpsc::Sender<Result<(), String>>),
    Stop,
}

pub struct SilentAudioKeepAwake {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    is_playing: Arc<AtomicBool>,
}

impl SilentAudioKeepAwake {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            is_playing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let is_playing = Arc::clone(&self.is_playing);

        // Spawn dedicated audio thread holding non-Send audio objects
        thread::Builder::new()
            .name("keep-awake-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn open_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        new_sink.append(Dither::new());
                        new_sink.play();
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Start(reply) => {
                            let result = open_sink(&mut _stream, &mut sink);
                            is_playing.store(result.is_ok(), Ordering::SeqCst);
                            let _ = reply.send(result);
                        }
                        AudioCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                            is_playing.store(false, Ordering::SeqCst);
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }

    pub fn start(&self) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(AudioCommand::Start(reply_tx))
            .map_err(|e| e.to_string())?;
        reply_rx
            .recv()
            .map_err(|_| "audio thread exited before replying".to_string())?
    }

    pub fn stop(&self) -> Result<(), String> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Stop);
        }
        Ok(())
    }
}

impl Default for SilentAudioKeepAwake {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepAwakeFallback for SilentAudioKeepAwake {
    fn enable(&mut self) -> Result<()> {
        self.start().map_err(|e| anyhow!(e))
    }

    fn disable(&mut self) {
        if !self.is_playing() {
            return;
        }
        let _ = self.stop();
    }
}
