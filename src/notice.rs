use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);
const MAX_NOTICES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub expires_at: Instant,
}

/// Transient user-visible messages. Oldest are dropped first.
#[derive(Debug)]
pub struct NoticeBoard {
    notices: VecDeque<Notice>,
    ttl: Duration,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL)
    }
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            notices: VecDeque::new(),
            ttl,
        }
    }

    pub fn info(&mut self, text: impl Into<String>, now: Instant) {
        self.push(NoticeLevel::Info, text.into(), now);
    }

    pub fn error(&mut self, text: impl Into<String>, now: Instant) {
        self.push(NoticeLevel::Error, text.into(), now);
    }

    fn push(&mut self, level: NoticeLevel, text: String, now: Instant) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            text,
            expires_at: now + self.ttl,
        });
    }

    /// Returns whether anything expired.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.expires_at > now);
        before != self.notices.len()
    }

    pub fn dismiss_all(&mut self) {
        self.notices.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.notices.iter().map(|n| n.expires_at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
