use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Bounded queue of transient user-facing messages. The oldest notice is
/// dropped once the queue is full.
#[derive(Debug, Clone)]
pub struct Notifier {
    queue: VecDeque<Notice>,
    capacity: usize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(crate::NOTICE_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info | NoticeLevel::Success => info!(level:? = level; "{message}"),
            NoticeLevel::Warning => warn!("{message}"),
            NoticeLevel::Error => error!("{message}"),
        }
        self.queue.push_back(Notice {
            level,
            message,
            created_at: Utc::now(),
        });
        while self.queue.len() > self.capacity {
            self.queue.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Success, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message);
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        self.queue.drain(..).collect()
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.queue.back()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_bounded() {
        let mut notifier = Notifier::new(2);
        notifier.info("one");
        notifier.warn("two");
        notifier.error("three");
        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "two");
        assert_eq!(drained[1].level, NoticeLevel::Error);
        assert!(notifier.is_empty());
    }

    #[test]
    fn latest_returns_most_recent() {
        let mut notifier = Notifier::default();
        notifier.success("saved");
        assert_eq!(notifier.latest().map(|n| n.message.as_str()), Some("saved"));
    }
}
