use crate::TRANSCRIPT_TARGET;
use std::io::Read;
use std::process::Child;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::debug;

/// Drains a child's stdout and stderr on background threads into a single
/// channel. The channel disconnects once both streams hit EOF.
pub(crate) fn attach(child: &mut Child) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx);
    }
    rx
}

fn spawn_reader(mut stream: impl Read + Send + 'static, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Incremental UTF-8 decoding. A sequence cut off at the end of one chunk is
/// held back until the next chunk completes it.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    held: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.held.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            let err = match std::str::from_utf8(&self.held) {
                Ok(rest) => {
                    text.push_str(rest);
                    self.held.clear();
                    return text;
                }
                Err(err) => err,
            };
            let valid = err.valid_up_to();
            text.push_str(&String::from_utf8_lossy(&self.held[..valid]));
            match err.error_len() {
                Some(invalid) => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    self.held.drain(..valid + invalid);
                }
                None => {
                    self.held.drain(..valid);
                    return text;
                }
            }
        }
    }

    /// Whatever is still held, decoded lossily.
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.held).into_owned();
        self.held.clear();
        rest
    }
}

/// Decodes a byte stream, splits it into lines and mirrors each one to the
/// transcript target at debug level.
pub(crate) struct Mirror {
    label: String,
    decoder: Utf8Decoder,
    partial: String,
}

impl Mirror {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            decoder: Utf8Decoder::default(),
            partial: String::new(),
        }
    }

    /// Mirror complete lines and return the newly decoded text.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> String {
        let text = self.decoder.decode(bytes);
        self.log_lines(&text);
        text
    }

    fn log_lines(&mut self, text: &str) {
        self.partial.push_str(text);
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            debug!(target: TRANSCRIPT_TARGET, "{} > {}", self.label, line.trim_end());
        }
    }

    pub(crate) fn note_sent(&self, line: &str) {
        debug!(target: TRANSCRIPT_TARGET, "{} < {line}", self.label);
    }

    /// Mirror the unterminated tail and return any bytes still held back.
    pub(crate) fn flush(&mut self) -> String {
        let rest = self.decoder.finish();
        self.partial.push_str(&rest);
        if !self.partial.is_empty() {
            debug!(target: TRANSCRIPT_TARGET, "{} > {}", self.label, self.partial.trim_end());
            self.partial.clear();
        }
        rest
    }
}
