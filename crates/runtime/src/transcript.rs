//! Chat Transcript Manager
//!
//! Ordered, append-only log of chat entries. The only mutation of an existing
//! entry is extending the in-progress streaming assistant answer.

use sentinel_core::{EntryId, Role, TranscriptEntry};

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
    streaming: Option<EntryId>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a complete entry. Ids keep increasing across `clear`.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> EntryId {
        let id = self.allocate_id();
        self.entries.push(TranscriptEntry::new(id, role, content));
        id
    }

    /// Extend the streaming assistant entry if it is the most recent one,
    /// otherwise start a new streaming entry.
    pub fn append_or_extend_streaming(&mut self, delta: &str) -> EntryId {
        if let Some(id) = self.streaming
            && let Some(last) = self.entries.last_mut()
            && last.id == id
        {
            last.content.push_str(delta);
            return id;
        }

        let id = self.append(Role::Assistant, delta);
        self.streaming = Some(id);
        id
    }

    /// The current answer is complete; the next delta starts a new entry.
    pub fn seal_streaming(&mut self) {
        self.streaming = None;
    }

    pub fn streaming_entry(&self) -> Option<EntryId> {
        self.streaming
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.streaming = None;
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.entries.iter().filter(|e| e.role == role).count()
    }

    fn allocate_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }
}
