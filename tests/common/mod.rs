#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use rewind::error::GenerateError;
use rewind::execute::Runner;
use rewind::generate::CodeGenerator;
use rewind::server::AppState;

/// Canned model: returns `reply` (or a quota error) and records prompts.
pub struct FakeGenerator {
    reply: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(code: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(code.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CodeGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or(GenerateError::Quota)
    }
}

/// Temp roots for one test. Dropping it removes them.
pub struct Sandbox {
    pub media: TempDir,
    pub scratch: TempDir,
    pub static_root: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            media: TempDir::new().unwrap(),
            scratch: TempDir::new().unwrap(),
            static_root: TempDir::new().unwrap(),
        }
    }

    /// State that runs scripts with `sh` so tests need no Python.
    pub fn state(&self, generator: Arc<FakeGenerator>, timeout_secs: u64) -> AppState {
        let runner = Runner::new(
            "sh",
            Duration::from_secs(timeout_secs),
            self.media.path(),
            self.scratch.path(),
        );
        AppState::new(generator, Arc::new(runner), "/media/")
    }

    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }

    pub fn media_entries(&self) -> usize {
        std::fs::read_dir(self.media.path()).unwrap().count()
    }
}
