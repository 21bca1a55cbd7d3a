//! User-facing notices

use std::collections::VecDeque;

const MAX_NOTICES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
}

/// Dismissible notices, newest last. Old ones fall off when full.
#[derive(Debug, Default)]
pub struct Notices {
    next_id: u64,
    items: VecDeque<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notice and mirror it to the log. Returns its id.
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) -> u64 {
        let message = message.into();
        match severity {
            Severity::Info => log::info!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
        }

        self.next_id += 1;
        if self.items.len() == MAX_NOTICES {
            self.items.pop_front();
        }
        self.items.push_back(Notice {
            id: self.next_id,
            severity,
            message,
        });
        self.next_id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dismiss() {
        let mut notices = Notices::new();
        let a = notices.push(Severity::Warning, "missing mtl");
        let b = notices.push(Severity::Error, "load failed");
        assert_ne!(a, b);
        assert!(notices.dismiss(a));
        assert!(!notices.dismiss(a));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices.latest().unwrap().message, "load failed");
    }

    #[test]
    fn test_oldest_evicted() {
        let mut notices = Notices::new();
        for i in 0..MAX_NOTICES + 3 {
            notices.push(Severity::Info, format!("notice {i}"));
        }
        assert_eq!(notices.len(), MAX_NOTICES);
        assert_eq!(notices.iter().next().unwrap().message, "notice 3");
    }
}
