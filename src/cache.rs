use crate::models::Record;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{ops::ControlFlow, sync::Arc};

/// Thread-safe in-memory index mapping short code -> [`Record`].
///
/// Backed by a DashMap so unrelated codes land on different shards and never
/// contend. The index is warmed on startup from the durable store, then kept
/// in sync by the service on every create and by the reaper on expiry.
#[derive(Clone, Debug)]
pub struct LinkCache {
    inner: Arc<DashMap<String, Record>>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::with_capacity(capacity)),
        }
    }

    /// Look up a short code. Returns a clone of the record if present,
    /// expired or not.
    pub fn get(&self, code: &str) -> Option<Record> {
        self.inner.get(code).map(|r| r.clone())
    }

    /// Insert `record` unless its code is already taken.
    ///
    /// Returns `None` when this call performed the insert, or the occupying
    /// record otherwise. The check and the insert happen under the same shard
    /// lock, so of several concurrent callers for one code exactly one gets
    /// `None`. An occupant already expired at `now` counts as absent and is
    /// replaced.
    pub fn get_or_insert(&self, record: Record, now: u64) -> Option<Record> {
        match self.inner.entry(record.code.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired_at(now) {
                    slot.insert(record);
                    None
                } else {
                    Some(slot.get().clone())
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                None
            }
        }
    }

    /// Populate from the durable store, overwriting anything present.
    pub fn load(&self, record: Record) {
        self.inner.insert(record.code.clone(), record);
    }

    /// Remove the given codes. Absent codes are ignored. Returns how many
    /// entries were actually removed.
    pub fn delete<I, K>(&self, codes: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        codes
            .into_iter()
            .filter(|code| self.inner.remove(AsRef::<str>::as_ref(code)).is_some())
            .count()
    }

    /// Remove `record.code` only while it still maps to exactly `record`.
    pub fn remove_exact(&self, record: &Record) -> bool {
        self.inner
            .remove_if(record.code.as_str(), |_, current| current == record)
            .is_some()
    }

    /// Remove the given codes, but only those still expired at `now`.
    ///
    /// A code rebound to a fresh record after the caller observed it as
    /// expired is left alone.
    pub fn evict_expired<I, K>(&self, codes: I, now: u64) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        codes
            .into_iter()
            .filter(|code| {
                self.inner
                    .remove_if(AsRef::<str>::as_ref(code), |_, record| {
                        record.is_expired_at(now)
                    })
                    .is_some()
            })
            .count()
    }

    /// Visit entries until the visitor breaks.
    ///
    /// Not a snapshot: entries inserted or removed on other shards during the
    /// walk may or may not be seen. The visitor must not call back into the
    /// cache.
    pub fn for_each(&self, mut visit: impl FnMut(&Record) -> ControlFlow<()>) {
        for entry in self.inner.iter() {
            if visit(entry.value()).is_break() {
                break;
            }
        }
    }

    /// Clone of every entry, in no particular order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for LinkCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NEVER_EXPIRES;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(code: &str, target: &str) -> Record {
        Record::new(code, target, NEVER_EXPIRES)
    }

    #[test]
    fn get_or_insert_inserts_once() {
        let cache = LinkCache::new();
        assert_eq!(cache.get_or_insert(record("abc", "https://a.io"), 0), None);

        let existing = cache.get_or_insert(record("abc", "https://b.io"), 0);
        assert_eq!(existing, Some(record("abc", "https://a.io")));
        assert_eq!(cache.get("abc").unwrap().target, "https://a.io");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_occupant_is_replaced() {
        let cache = LinkCache::new();
        cache.load(Record::new("abc", "https://old.io", 100));

        assert_eq!(cache.get_or_insert(record("abc", "https://new.io"), 200), None);
        assert_eq!(cache.get("abc").unwrap().target, "https://new.io");
    }

    #[test]
    fn delete_tolerates_missing_keys() {
        let cache = LinkCache::new();
        cache.load(record("a", "https://a.io"));
        cache.load(record("b", "https://b.io"));

        assert_eq!(cache.delete(["a", "missing", "b", "a"]), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.delete(Vec::<String>::new()), 0);
    }

    #[test]
    fn remove_exact_leaves_replaced_entry() {
        let cache = LinkCache::new();
        let ours = Record::new("abc", "https://a.io", 1_000);
        assert!(cache.get_or_insert(ours.clone(), 500).is_none());

        // Someone else takes the code over once ours has expired.
        let theirs = Record::new("abc", "https://b.io", 0);
        assert!(cache.get_or_insert(theirs.clone(), 2_000).is_none());

        assert!(!cache.remove_exact(&ours));
        assert_eq!(cache.get("abc"), Some(theirs.clone()));

        assert!(cache.remove_exact(&theirs));
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_expired_skips_fresh_entries() {
        let cache = LinkCache::new();
        cache.load(Record::new("old", "https://old.io", 100));
        cache.load(Record::new("fresh", "https://fresh.io", 500));
        cache.load(record("forever", "https://forever.io"));

        assert_eq!(cache.evict_expired(["old", "fresh", "forever"], 200), 1);
        assert!(cache.get("old").is_none());
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("forever").is_some());
    }

    #[test]
    fn for_each_stops_on_break() {
        let cache = LinkCache::new();
        for i in 0..10 {
            cache.load(record(&format!("c{i}"), "https://a.io"));
        }

        let mut seen = 0;
        cache.for_each(|_| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, 3);

        let mut all = 0;
        cache.for_each(|_| {
            all += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(all, 10);
    }

    #[test]
    fn concurrent_creators_have_one_winner() {
        let cache = LinkCache::with_capacity(8);
        let winners = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for i in 0..16 {
                let cache = &cache;
                let winners = &winners;
                s.spawn(move || {
                    let target = format!("https://{i}.io");
                    if cache.get_or_insert(record("same", &target), 0).is_none() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clones_share_entries() {
        let cache = LinkCache::default();
        let other = cache.clone();
        other.load(record("abc", "https://a.io"));
        assert_eq!(cache.snapshot(), vec![record("abc", "https://a.io")]);
    }
}
