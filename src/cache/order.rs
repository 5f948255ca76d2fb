//! Insertion Order Module
//!
//! Tracks the order in which keys were last written, for capacity eviction.

use std::collections::{BTreeMap, HashMap};

// == Insertion Order ==
/// Write-sequence index for oldest-first eviction.
///
/// Each write stamps the key with the next sequence number. The smallest
/// stamp is the key written longest ago. Reads never touch the order.
#[derive(Debug, Default)]
pub struct InsertionOrder {
    by_seq: BTreeMap<u64, String>,
    seq_of: HashMap<String, u64>,
    next_seq: u64,
}

impl InsertionOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps `key` as the newest write, replacing any earlier stamp.
    pub fn record_write(&mut self, key: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(old) = self.seq_of.insert(key.to_string(), seq) {
            self.by_seq.remove(&old);
        }
        self.by_seq.insert(seq, key.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        if let Some(seq) = self.seq_of.remove(key) {
            self.by_seq.remove(&seq);
        }
    }

    pub fn pop_oldest(&mut self) -> Option<String> {
        let (_, key) = self.by_seq.pop_first()?;
        self.seq_of.remove(&key);
        Some(key)
    }

    pub fn peek_oldest(&self) -> Option<&str> {
        self.by_seq.values().next().map(String::as_str)
    }

    /// Drops every stamp. Sequence numbers keep counting up.
    pub fn clear(&mut self) {
        self.by_seq.clear();
        self.seq_of.clear();
    }

    pub fn len(&self) -> usize {
        self.seq_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq_of.is_empty()
    }
}
