//! Scoped source-name to target-identifier mapping.

use std::collections::HashMap;

/// Stack of rename frames. A lookup walks from the innermost frame outward,
/// so popping a frame drops exactly the renames made inside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameTable {
    frames: Vec<HashMap<String, String>>,
}

/// Entries one synthesis added to the caller's frame, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameDelta {
    pub entries: Vec<(String, String)>,
}

impl RenameDelta {
    pub fn push(&mut self, name: impl Into<String>, ident: impl Into<String>) {
        self.entries.push((name.into(), ident.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, ident)| ident.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay these entries into the innermost frame of `table`.
    pub fn apply(&self, table: &mut RenameTable) {
        for (name, ident) in &self.entries {
            table.insert(name.clone(), ident.clone());
        }
    }
}

impl RenameTable {
    /// A table with one (outermost) frame.
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame. The outermost frame is never popped.
    pub fn pop(&mut self) -> Option<HashMap<String, String>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Register `name -> ident` in the innermost frame.
    pub fn insert(&mut self, name: impl Into<String>, ident: impl Into<String>) {
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), ident.into());
        }
    }

    /// Register `name -> ident` in the frame at `index` (0 is outermost).
    pub fn insert_at(&mut self, index: usize, name: impl Into<String>, ident: impl Into<String>) {
        match self.frames.get_mut(index) {
            Some(frame) => {
                frame.insert(name.into(), ident.into());
            }
            None => self.insert(name, ident),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.get(name))
            .map(String::as_str)
    }

    /// True if any visible frame maps some name onto `ident`.
    pub fn targets(&self, ident: &str) -> bool {
        self.targets_since(0, ident)
    }

    /// Like [`RenameTable::targets`], looking only at frames from `start` on.
    pub fn targets_since(&self, start: usize, ident: &str) -> bool {
        self.frames
            .iter()
            .skip(start)
            .any(|f| f.values().any(|target| target == ident))
    }

    /// Whether the frame at `index` maps some name onto `ident`.
    pub fn frame_targets(&self, index: usize, ident: &str) -> bool {
        self.frames
            .get(index)
            .map(|f| f.values().any(|target| target == ident))
            .unwrap_or(false)
    }
}
