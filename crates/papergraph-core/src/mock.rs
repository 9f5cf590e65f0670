//! Hand-rolled test doubles for the completion and PDF backends.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{BackendError, PdfBackend};
use crate::llm::{CompletionBackend, LlmError};

/// A configurable reply for [`MockCompletion`].
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    Error(LlmError),
}

/// A mock implementing [`CompletionBackend`].
///
/// Supports:
/// - A fixed reply (used for every call), **or**
/// - A sequence of replies (one per call, repeating the last if exhausted).
/// - Call counting and prompt capture.
pub struct MockCompletion {
    /// Reversed so `pop()` yields the next reply.
    replies: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl MockCompletion {
    /// Create a mock that always returns `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fallback: reply,
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock that returns replies in order, repeating the last one.
    pub fn with_sequence(mut replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "sequence must have at least one reply");
        replies.reverse();
        let fallback = replies[0].clone();
        Self {
            replies: Mutex::new(replies),
            fallback,
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many times `complete()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        let mut seq = match self.replies.lock() {
            Ok(seq) => seq,
            Err(poisoned) => poisoned.into_inner(),
        };
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl CompletionBackend for MockCompletion {
    fn model(&self) -> &str {
        "mock-model"
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let reply = self.next_reply();

        Box::pin(async move {
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Error(e) => Err(e),
            }
        })
    }
}

/// A [`PdfBackend`] that serves canned text keyed by file name.
///
/// Files without an entry fail with [`BackendError::OpenError`].
#[derive(Default)]
pub struct StubPdf {
    texts: HashMap<PathBuf, String>,
}

impl StubPdf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` for any path whose file name is `file_name`.
    pub fn with_text(mut self, file_name: &str, text: &str) -> Self {
        self.texts.insert(PathBuf::from(file_name), text.to_string());
        self
    }
}

impl PdfBackend for StubPdf {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        path.file_name()
            .and_then(|name| self.texts.get(Path::new(name)))
            .cloned()
            .ok_or_else(|| BackendError::OpenError(format!("no stub for {}", path.display())))
    }
}
