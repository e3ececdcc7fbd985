use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::models::Badge;

/// Time a closed overlay stays mounted, hidden, before it is removed.
pub const EXIT_DELAY: Duration = Duration::from_millis(300);
pub const NOTICE_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Shown,
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay<T> {
    pub content: T,
    pub visibility: Visibility,
    pub generation: u64,
    remove_at: Option<Instant>,
}

/// Owns at most one mounted overlay. Closing is two-phase: the overlay is
/// hidden at once and removed by a later `sweep`.
#[derive(Debug)]
pub struct OverlayController<T> {
    active: Option<Overlay<T>>,
    delay: Duration,
    generation: u64,
}

impl<T> Default for OverlayController<T> {
    fn default() -> Self {
        Self::new(EXIT_DELAY)
    }
}

impl<T> OverlayController<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            active: None,
            delay,
            generation: 0,
        }
    }

    /// Mounts `content`, removing whatever was mounted before, including
    /// an instance still waiting out its exit delay.
    pub fn open(&mut self, content: T) -> u64 {
        if let Some(previous) = self.active.take() {
            debug!(generation = previous.generation, "overlay replaced");
        }
        self.generation += 1;
        self.active = Some(Overlay {
            content,
            visibility: Visibility::Shown,
            generation: self.generation,
            remove_at: None,
        });
        self.generation
    }

    pub fn close(&mut self, now: Instant) {
        if let Some(active) = self.active.as_mut() {
            if active.visibility == Visibility::Shown {
                active.visibility = Visibility::Hidden;
                active.remove_at = Some(now + self.delay);
            }
        }
    }

    /// Removes a hidden overlay whose exit delay has run out.
    pub fn sweep(&mut self, now: Instant) -> bool {
        let due = self
            .active
            .as_ref()
            .and_then(|active| active.remove_at)
            .is_some_and(|at| at <= now);
        if due {
            self.active = None;
        }
        due
    }

    pub fn visible(&self) -> Option<&T> {
        self.active
            .as_ref()
            .filter(|active| active.visibility == Visibility::Shown)
            .map(|active| &active.content)
    }

    #[cfg(test)]
    pub fn mounted(&self) -> Option<&Overlay<T>> {
        self.active.as_ref()
    }

    pub fn pending_removal(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|active| active.remove_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeTip {
    pub student: String,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    ConfirmDelete { name: String },
}

pub type Tooltip = OverlayController<BadgeTip>;
pub type ModalController = OverlayController<Modal>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub lasting: Duration,
}

impl Notice {
    fn with_level(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            lasting: NOTICE_DURATION,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::with_level(NoticeLevel::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::with_level(NoticeLevel::Success, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::with_level(NoticeLevel::Error, text)
    }

    pub fn lasting(mut self, lasting: Duration) -> Self {
        self.lasting = lasting;
        self
    }
}

/// Auto-dismissing status notice. A new notice replaces the old one.
#[derive(Debug, Default)]
pub struct StatusLine {
    current: Option<(Notice, Instant)>,
}

impl StatusLine {
    pub fn show(&mut self, notice: Notice, now: Instant) {
        let expires = now + notice.lasting;
        self.current = Some((notice, expires));
    }

    pub fn current(&self, now: Instant) -> Option<&Notice> {
        self.current
            .as_ref()
            .filter(|(_, expires)| *expires > now)
            .map(|(notice, _)| notice)
    }

    pub fn sweep(&mut self, now: Instant) -> bool {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|(_, expires)| *expires <= now);
        if expired {
            self.current = None;
        }
        expired
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.current.as_ref().map(|(_, expires)| *expires)
    }
}
