//! Multipart AIS message reassembly.
//!
//! Long AIS messages (type 5 static data, for example) are split across
//! several NMEA sentences. Fragments are buffered under a key derived from the
//! sequential message id and channel until every index is present, then
//! handed back in order. Incomplete sets are reclaimed by [`FragmentBuffer::evict_stale`];
//! there is no retransmission on an AIS feed, so an evicted set is lost.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::nmea::FragmentMetadata;

/// Default age after which an incomplete multipart message is dropped.
pub const DEFAULT_MAX_FRAGMENT_AGE: Duration = Duration::from_secs(60);

/// An incomplete multipart message
#[derive(Debug, Clone)]
struct PendingMultipart {
    /// Raw sentences by 1-based fragment index
    fragments: HashMap<u32, String>,
    total_expected: u32,
    first_seen: Instant,
}

impl PendingMultipart {
    fn new(total_expected: u32, now: Instant) -> Self {
        PendingMultipart {
            fragments: HashMap::with_capacity(total_expected as usize),
            total_expected,
            first_seen: now,
        }
    }

    fn summary(&self) -> String {
        format!("{}/{}", self.fragments.len(), self.total_expected)
    }

    /// Sentences in fragment order, or `None` if an index is missing.
    fn ordered(&self) -> Option<Vec<String>> {
        (1..=self.total_expected)
            .map(|index| self.fragments.get(&index).cloned())
            .collect()
    }
}

/// Buffer diagnostics for observability endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    /// Number of incomplete multipart messages held
    pub buffered_message_count: usize,
    /// "received/total" per buffer key
    pub buffered_messages: BTreeMap<String, String>,
}

/// Reassembly buffer for multipart AIS sentences.
///
/// Holds at most one pending entry per key. Not synchronized; wrap it in a
/// mutex when statistics are read from another task.
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    pending: HashMap<String, PendingMultipart>,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        FragmentBuffer {
            pending: HashMap::new(),
        }
    }

    /// Buffer key for a fragment.
    ///
    /// Without a message id the only distinguishing data is channel and
    /// fragment count, so two unidentified multiparts of the same length on
    /// the same channel share a key.
    pub fn key_for(message_id: Option<&str>, channel: &str, total_fragments: u32) -> String {
        match message_id {
            Some(id) => format!("{}_{}", id, channel),
            None => format!("no_id_{}_{}", channel, total_fragments),
        }
    }

    /// Add one fragment. Returns the complete, ordered sentence list once the
    /// last missing fragment arrives; the entry is removed at that point.
    ///
    /// A repeated index replaces the stored sentence for that index.
    pub fn add_fragment(
        &mut self,
        line: &str,
        meta: &FragmentMetadata,
        now: Instant,
    ) -> Option<Vec<String>> {
        let total = meta.total_fragments;
        let index = meta.fragment_index;
        let key = Self::key_for(meta.message_id.as_deref(), &meta.channel, total);

        if index == 0 || index > total {
            log::warn!(
                "Fragment index {} out of range 1..={} for {}, dropped",
                index,
                total,
                key
            );
            return None;
        }

        let entry = self
            .pending
            .entry(key.clone())
            .or_insert_with(|| PendingMultipart::new(total, now));

        if entry.total_expected != total {
            // Same id and channel, different length: the id was reused
            log::debug!(
                "Multipart {} changed length {} -> {}, discarding {} buffered fragments",
                key,
                entry.total_expected,
                total,
                entry.fragments.len()
            );
            *entry = PendingMultipart::new(total, now);
        }

        entry.fragments.insert(index, line.to_string());

        if entry.fragments.len() < entry.total_expected as usize {
            log::debug!(
                "Buffering fragment {}/{} for {} (have {})",
                index,
                total,
                key,
                entry.summary()
            );
            return None;
        }

        match entry.ordered() {
            Some(lines) => {
                self.pending.remove(&key);
                log::info!("Assembled multipart message {} ({} parts)", key, total);
                Some(lines)
            }
            None => {
                log::warn!("Multipart {} has {} fragments but gaps", key, entry.summary());
                None
            }
        }
    }

    /// Drop every pending entry older than `max_age`. Returns the number of
    /// entries removed.
    pub fn evict_stale(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, pending| {
            let age = now.saturating_duration_since(pending.first_seen);
            if age > max_age {
                log::info!(
                    "Evicting incomplete multipart {} ({} fragments, {:.0}s old)",
                    key,
                    pending.summary(),
                    age.as_secs_f64()
                );
                false
            } else {
                true
            }
        });
        before - self.pending.len()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            buffered_message_count: self.pending.len(),
            buffered_messages: self
                .pending
                .iter()
                .map(|(key, pending)| (key.clone(), pending.summary()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(total: u32, index: u32, id: Option<&str>, channel: &str) -> FragmentMetadata {
        FragmentMetadata {
            total_fragments: total,
            fragment_index: index,
            message_id: id.map(str::to_string),
            channel: channel.to_string(),
        }
    }

    fn line(total: u32, index: u32, id: &str, channel: &str) -> String {
        format!("!AIVDM,{},{},{},{},payload{},0*00", total, index, id, channel, index)
    }

    #[test]
    fn test_key_derivation() {
        assert_eq!(FragmentBuffer::key_for(Some("3"), "A", 2), "3_A");
        assert_eq!(FragmentBuffer::key_for(None, "B", 3), "no_id_B_3");
    }

    #[test]
    fn test_in_order_reassembly() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();

        let first = line(2, 1, "7", "B");
        let second = line(2, 2, "7", "B");

        assert_eq!(buffer.add_fragment(&first, &meta(2, 1, Some("7"), "B"), now), None);
        assert_eq!(buffer.len(), 1);

        let assembled = buffer
            .add_fragment(&second, &meta(2, 2, Some("7"), "B"), now + Duration::from_secs(5))
            .unwrap();
        assert_eq!(assembled, vec![first, second]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_any_arrival_order() {
        let orders: [[u32; 3]; 4] = [[3, 2, 1], [2, 3, 1], [1, 3, 2], [3, 1, 2]];
        for order in orders {
            let mut buffer = FragmentBuffer::new();
            let now = Instant::now();
            let mut result = None;
            for index in order {
                assert!(result.is_none());
                result = buffer.add_fragment(
                    &line(3, index, "4", "A"),
                    &meta(3, index, Some("4"), "A"),
                    now,
                );
            }
            let expected: Vec<String> = (1..=3).map(|i| line(3, i, "4", "A")).collect();
            assert_eq!(result, Some(expected), "order {:?}", order);
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_duplicate_index_replaces() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();

        buffer.add_fragment("old", &meta(2, 1, Some("1"), "A"), now);
        buffer.add_fragment("new", &meta(2, 1, Some("1"), "A"), now);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.stats().buffered_messages["1_A"], "1/2");

        let assembled = buffer
            .add_fragment("tail", &meta(2, 2, Some("1"), "A"), now)
            .unwrap();
        assert_eq!(assembled, vec!["new".to_string(), "tail".to_string()]);
    }

    #[test]
    fn test_channels_do_not_mix() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();

        assert!(buffer.add_fragment("a1", &meta(2, 1, Some("5"), "A"), now).is_none());
        assert!(buffer.add_fragment("b2", &meta(2, 2, Some("5"), "B"), now).is_none());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_unidentified_multipart() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();

        assert!(buffer.add_fragment("x1", &meta(2, 1, None, "A"), now).is_none());
        assert!(buffer.stats().buffered_messages.contains_key("no_id_A_2"));
        let assembled = buffer.add_fragment("x2", &meta(2, 2, None, "A"), now).unwrap();
        assert_eq!(assembled.len(), 2);
    }

    #[test]
    fn test_out_of_range_index_not_stored() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();

        assert!(buffer.add_fragment("bad", &meta(2, 3, Some("1"), "A"), now).is_none());
        assert!(buffer.is_empty());
        assert!(buffer.add_fragment("bad", &meta(2, 0, Some("1"), "A"), now).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reused_id_with_new_length() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();

        buffer.add_fragment("a1", &meta(3, 1, Some("2"), "A"), now);
        buffer.add_fragment("a2", &meta(3, 2, Some("2"), "A"), now);

        // id 2 reused for a two-part message
        assert!(buffer.add_fragment("b1", &meta(2, 1, Some("2"), "A"), now).is_none());
        assert_eq!(buffer.stats().buffered_messages["2_A"], "1/2");
        let assembled = buffer.add_fragment("b2", &meta(2, 2, Some("2"), "A"), now).unwrap();
        assert_eq!(assembled, vec!["b1".to_string(), "b2".to_string()]);
    }

    #[test]
    fn test_evict_stale() {
        let mut buffer = FragmentBuffer::new();
        let start = Instant::now();

        buffer.add_fragment("old", &meta(2, 1, Some("1"), "A"), start);
        buffer.add_fragment("young", &meta(2, 1, Some("2"), "A"), start + Duration::from_secs(30));

        // Exactly at the threshold is not yet stale
        let evicted = buffer.evict_stale(DEFAULT_MAX_FRAGMENT_AGE, start + Duration::from_secs(60));
        assert_eq!(evicted, 0);

        let evicted = buffer.evict_stale(DEFAULT_MAX_FRAGMENT_AGE, start + Duration::from_secs(61));
        assert_eq!(evicted, 1);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.stats().buffered_messages.contains_key("2_A"));
    }

    #[test]
    fn test_evicted_message_never_completes() {
        let mut buffer = FragmentBuffer::new();
        let start = Instant::now();

        buffer.add_fragment("p1", &meta(2, 1, Some("9"), "B"), start);
        buffer.evict_stale(DEFAULT_MAX_FRAGMENT_AGE, start + Duration::from_secs(90));
        assert!(buffer.is_empty());

        // The late fragment opens a new entry instead of completing the old one
        let late = buffer.add_fragment("p2", &meta(2, 2, Some("9"), "B"), start + Duration::from_secs(91));
        assert_eq!(late, None);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.stats().buffered_messages["9_B"], "1/2");
    }

    #[test]
    fn test_stats() {
        let mut buffer = FragmentBuffer::new();
        let now = Instant::now();
        assert_eq!(buffer.stats(), BufferStats::default());

        buffer.add_fragment("a", &meta(3, 1, Some("1"), "A"), now);
        buffer.add_fragment("b", &meta(3, 2, Some("1"), "A"), now);
        buffer.add_fragment("c", &meta(2, 1, None, "B"), now);

        let stats = buffer.stats();
        assert_eq!(stats.buffered_message_count, 2);
        assert_eq!(stats.buffered_messages["1_A"], "2/3");
        assert_eq!(stats.buffered_messages["no_id_B_2"], "1/2");
    }
}
