//! The monitor's closed event type.
//!
//! ```text
//! Start | FocusVerified | ViolationAcknowledged  -> [sleep]     -> SleepComplete
//! SleepComplete                                  -> [capture]   -> ScreenshotTaken
//! ScreenshotTaken                                -> [classify]  -> FocusVerified | FocusViolation
//! FocusViolation                                 -> [intervene] -> FocusVerified
//! ```
//!
//! There is no terminal variant; a monitor run lasts until its consumer
//! stops reading.

use std::fmt;
use std::path::PathBuf;

use focuscoach_engine::WorkflowEvent;

/// Every event that flows through a monitor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Seeded by the runner when a run starts.
    Start,
    /// The wait between two checks has elapsed.
    SleepComplete,
    /// A screenshot was written to `path`.
    ScreenshotTaken { path: PathBuf },
    /// The latest check found the user on task.
    FocusVerified,
    /// The latest check found the user distracted.
    FocusViolation { description: String },
    /// The user dismissed the intervention.
    ViolationAcknowledged,
}

/// Routing tag for [`MonitorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorVariant {
    Start,
    SleepComplete,
    ScreenshotTaken,
    FocusVerified,
    FocusViolation,
    ViolationAcknowledged,
}

impl MonitorVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::SleepComplete => "sleep_complete",
            Self::ScreenshotTaken => "screenshot_taken",
            Self::FocusVerified => "focus_verified",
            Self::FocusViolation => "focus_violation",
            Self::ViolationAcknowledged => "violation_acknowledged",
        }
    }
}

impl fmt::Display for MonitorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkflowEvent for MonitorEvent {
    type Variant = MonitorVariant;
    type StartPayload = ();

    const START: MonitorVariant = MonitorVariant::Start;

    fn variant(&self) -> MonitorVariant {
        match self {
            Self::Start => MonitorVariant::Start,
            Self::SleepComplete => MonitorVariant::SleepComplete,
            Self::ScreenshotTaken { .. } => MonitorVariant::ScreenshotTaken,
            Self::FocusVerified => MonitorVariant::FocusVerified,
            Self::FocusViolation { .. } => MonitorVariant::FocusViolation,
            Self::ViolationAcknowledged => MonitorVariant::ViolationAcknowledged,
        }
    }

    fn start(_payload: ()) -> Self {
        Self::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_tags_ignore_payload() {
        let a = MonitorEvent::ScreenshotTaken {
            path: PathBuf::from("a.png"),
        };
        let b = MonitorEvent::ScreenshotTaken {
            path: PathBuf::from("b.png"),
        };
        assert_eq!(a.variant(), b.variant());
        assert_ne!(a, b);
    }

    #[test]
    fn monitor_has_no_terminal_variant() {
        assert!(MonitorEvent::TERMINAL.is_none());
        assert!(!MonitorEvent::FocusVerified.is_terminal());
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(
            MonitorVariant::ViolationAcknowledged.to_string(),
            "violation_acknowledged"
        );
    }
}
