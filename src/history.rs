//! # Undo/Redo History
//!
//! A linear stack of deep-copied scene snapshots plus a cursor.
//!
//! ```text
//! commit(S1) commit(S2) commit(S3) undo() undo()   commit(S4)
//!   [S1]       [S1 S2]    [S1 S2 S3]  ..^     .^.    [S1 S4]
//!    ^              ^             ^                       ^
//! ```
//!
//! `commit` drops any redo branch past the cursor before appending.
//! `undo`/`redo` return `None` at the stack boundaries.

use crate::config::HistoryConfig;
use crate::template::Element;

/// A fully independent copy of the scene state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub elements: Vec<Element>,
    pub background_color: String,
}

/// Linear undo/redo history.
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: Vec<HistorySnapshot>,
    cursor: usize,
    limit: Option<usize>,
}

impl History {
    /// Create an empty history with the configured bound.
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            snapshots: Vec::new(),
            cursor: 0,
            // A bound below one would discard the current state
            limit: config.limit.map(|l| l.max(1)),
        }
    }

    /// Record a new state. Truncates the redo branch first.
    pub fn commit(&mut self, snapshot: HistorySnapshot) {
        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.cursor + 1);
        }
        self.snapshots.push(snapshot);

        if let Some(limit) = self.limit
            && self.snapshots.len() > limit
        {
            let excess = self.snapshots.len() - limit;
            self.snapshots.drain(..excess);
            log::debug!("[history] evicted {} oldest snapshot(s)", excess);
        }
        self.cursor = self.snapshots.len() - 1;
    }

    /// Step back one snapshot.
    pub fn undo(&mut self) -> Option<HistorySnapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.snapshots.get(self.cursor).cloned()
    }

    /// Step forward one snapshot.
    pub fn redo(&mut self) -> Option<HistorySnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.snapshots.get(self.cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        !self.snapshots.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// The snapshot at the cursor.
    pub fn current(&self) -> Option<&HistorySnapshot> {
        self.snapshots.get(self.cursor)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Element, TextElement};
    use pretty_assertions::assert_eq;

    fn snap(texts: &[&str]) -> HistorySnapshot {
        HistorySnapshot {
            elements: texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let mut el = TextElement::new(t);
                    el.base.id = format!("t{}", i);
                    Element::Text(el)
                })
                .collect(),
            background_color: "#ffffff".into(),
        }
    }

    #[test]
    fn test_undo_redo_determinism() {
        let mut h = History::new(&HistoryConfig::default());
        let s1 = snap(&["one"]);
        let s2 = snap(&["one", "two"]);
        h.commit(s1.clone());
        h.commit(s2.clone());
        assert_eq!(h.undo(), Some(s1));
        assert_eq!(h.redo(), Some(s2));
    }

    #[test]
    fn test_boundaries_are_noops() {
        let mut h = History::new(&HistoryConfig::default());
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), None);
        h.commit(snap(&["a"]));
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), None);
        assert_eq!(h.current(), Some(&snap(&["a"])));
    }

    #[test]
    fn test_commit_truncates_redo_branch() {
        let mut h = History::new(&HistoryConfig::default());
        h.commit(snap(&["a"]));
        h.commit(snap(&["b"]));
        h.commit(snap(&["c"]));
        h.undo();
        h.undo();
        h.commit(snap(&["d"]));
        assert_eq!(h.len(), 2);
        assert!(!h.can_redo());
        assert_eq!(h.undo(), Some(snap(&["a"])));
    }

    #[test]
    fn test_snapshots_are_independent() {
        let mut h = History::new(&HistoryConfig::default());
        let mut live = snap(&["a"]);
        h.commit(live.clone());
        if let Element::Text(t) = &mut live.elements[0] {
            t.font_size = 99.0;
        }
        h.commit(live);
        let first = h.undo().unwrap();
        assert!(matches!(&first.elements[0], Element::Text(t) if t.font_size == 24.0));
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut h = History::new(&HistoryConfig { limit: Some(3) });
        for name in ["a", "b", "c", "d", "e"] {
            h.commit(snap(&[name]));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.current(), Some(&snap(&["e"])));
        assert_eq!(h.undo(), Some(snap(&["d"])));
        assert_eq!(h.undo(), Some(snap(&["c"])));
        assert_eq!(h.undo(), None);
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut h = History::new(&HistoryConfig::default());
        for i in 0..500 {
            h.commit(snap(&[&i.to_string()]));
        }
        assert_eq!(h.len(), 500);
    }
}
