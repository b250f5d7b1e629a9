//! Collaborator contracts.
//!
//! The monitor steps never touch a screen, a network, or a window directly.
//! They call through these traits, so the hosting shell chooses the
//! implementations and tests substitute stubs.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::verdict::DistractionVerdict;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a chat-completion conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// What the intervention surface shows the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervention {
    /// The configured nudge shown to the user.
    pub message: String,
    /// The classifier's description of the distraction.
    pub description: String,
    /// The goal the user set.
    pub objective: String,
}

/// Invoked exactly once when the user dismisses an intervention.
pub type OnClose = Box<dyn FnOnce() + Send + 'static>;

/// Keeps an opened intervention on screen.
///
/// The intervene step holds the guard until the user acknowledges.  When
/// the run is cancelled the step is aborted, the guard drops, and the
/// surface tears itself down without calling its `OnClose`.
pub struct SurfaceGuard {
    teardown: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl SurfaceGuard {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A guard for a surface with nothing to release.
    pub fn detached() -> Self {
        Self { teardown: None }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for SurfaceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceGuard")
            .field("armed", &self.teardown.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Captures the user's screen to an image file.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture the screen and return the path of the written image.
    async fn capture(&self) -> Result<PathBuf>;

    /// Dispose of a screenshot once it has been classified.
    async fn release(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Judges whether a screenshot shows the user working toward a goal.
#[async_trait]
pub trait DistractionClassifier: Send + Sync {
    /// Classify the image at `image` against `objective`.
    ///
    /// Malformed model output is normalized into a verdict; only transport
    /// and I/O failures return `Err`.
    async fn classify(&self, objective: &str, image: &Path) -> Result<DistractionVerdict>;
}

/// A plain chat-completion endpoint.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Send `messages` and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Shows an intervention to the user.
#[async_trait]
pub trait InterventionSurface: Send + Sync {
    /// Open the surface and return without waiting for the user.
    ///
    /// The implementation must call `on_close` at most once, when the user
    /// dismisses the intervention.  Dropping the returned guard closes the
    /// surface and releases whatever it holds.
    async fn open(&self, intervention: Intervention, on_close: OnClose) -> Result<SurfaceGuard>;
}

/// Persists the user's current goal.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// The saved goal, or `None` if none is set.
    async fn get(&self) -> Result<Option<String>>;

    /// Replace the saved goal.
    async fn save(&self, goal: &str) -> Result<()>;

    /// Forget the saved goal.
    async fn clear(&self) -> Result<()>;
}
