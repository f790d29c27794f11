use crate::catalog::TrackKey;
use crate::ledger::Ledger;
use rand::Rng;

/// Navigation cursor over the ledger's queue projection.
///
/// The key list is taken from [`Ledger::keys_by_recency`] whenever the
/// history is re-rendered and otherwise only shrinks, so replaying an entry
/// (which bumps its timestamp) does not reshuffle the list being walked.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    keys: Vec<TrackKey>,
    current_index: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-project from the ledger. The current entry is followed by key; if it
    /// is gone the index becomes unset.
    pub fn rebuild(&mut self, ledger: &Ledger) {
        let current = self.current_key().cloned();
        self.keys = ledger.keys_by_recency();
        self.current_index = current.and_then(|k| self.position(&k));
    }

    /// Remove a key, shifting later indices down by one. Removing the current
    /// entry unsets the current index. Returns the removed position.
    pub fn remove(&mut self, key: &TrackKey) -> Option<usize> {
        let index = self.position(key)?;
        self.keys.remove(index);

        if let Some(current) = self.current_index {
            if index < current {
                self.current_index = Some(current - 1);
            } else if index == current {
                self.current_index = None;
            }
        }
        Some(index)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.current_index = None;
    }

    pub fn set_current(&mut self, index: Option<usize>) {
        self.current_index = index.filter(|&i| i < self.keys.len());
    }

    /// Point the cursor at `key`, returning its index if it is queued.
    pub fn set_current_key(&mut self, key: &TrackKey) -> Option<usize> {
        self.current_index = self.position(key);
        self.current_index
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_key(&self) -> Option<&TrackKey> {
        self.current_index.and_then(|i| self.keys.get(i))
    }

    pub fn get(&self, index: usize) -> Option<&TrackKey> {
        self.keys.get(index)
    }

    pub fn position(&self, key: &TrackKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn keys(&self) -> &[TrackKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn next_index(&self) -> Option<usize> {
        wrap_next(self.current_index, self.keys.len())
    }

    pub fn prev_index(&self) -> Option<usize> {
        wrap_prev(self.current_index, self.keys.len())
    }

    pub fn random_index(&self, rng: &mut impl Rng) -> Option<usize> {
        random_index(self.keys.len(), rng)
    }
}

/// Next position with wraparound. From "unset" this is the first entry.
pub fn wrap_next(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match current {
        Some(i) if i + 1 < len => Some(i + 1),
        _ => Some(0),
    }
}

/// Previous position with wraparound. From "unset" this is the last entry.
pub fn wrap_prev(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match current {
        Some(i) if i > 0 && i < len => Some(i - 1),
        _ => Some(len - 1),
    }
}

pub fn random_index(len: usize, rng: &mut impl Rng) -> Option<usize> {
    (len > 0).then(|| rng.random_range(0..len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Platform, Track};

    fn make_track(id: &str) -> Track {
        Track {
            platform: Platform::Qq,
            id: id.to_string(),
            name: format!("Track {id}"),
            artist: "Artist".to_string(),
            album: None,
            pic: None,
        }
    }

    fn ledger_of(ids: &[&str]) -> Ledger {
        let mut ledger = Ledger::new();
        // Oldest first so `ids[0]` ends up most recent.
        for (i, id) in ids.iter().rev().enumerate() {
            ledger.upsert(make_track(id), 0.0, i as i64);
        }
        ledger
    }

    fn key(id: &str) -> TrackKey {
        make_track(id).key()
    }

    #[test]
    fn test_rebuild_follows_current_key() {
        let mut ledger = ledger_of(&["1", "2", "3"]);
        let mut queue = Queue::new();
        queue.rebuild(&ledger);
        assert_eq!(queue.set_current_key(&key("2")), Some(1));

        ledger.upsert(make_track("2"), 0.0, 100);
        queue.rebuild(&ledger);
        assert_eq!(queue.current_index(), Some(0));
        assert_eq!(queue.current_key(), Some(&key("2")));
    }

    #[test]
    fn test_remove() {
        let mut queue = Queue::new();
        queue.rebuild(&ledger_of(&["1", "2", "3"]));
        queue.set_current(Some(1)); // Playing track 2

        assert_eq!(queue.remove(&key("1")), Some(0));
        assert_eq!(queue.current_index(), Some(0)); // Index shifted
        assert_eq!(queue.current_key(), Some(&key("2")));

        queue.remove(&key("3"));
        assert_eq!(queue.current_index(), Some(0)); // Later removal leaves it

        queue.remove(&key("2"));
        assert_eq!(queue.current_index(), None); // Current removed
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wraparound() {
        assert_eq!(wrap_next(Some(4), 5), Some(0));
        assert_eq!(wrap_next(Some(1), 5), Some(2));
        assert_eq!(wrap_next(None, 5), Some(0));
        assert_eq!(wrap_prev(Some(0), 5), Some(4));
        assert_eq!(wrap_prev(None, 5), Some(4));
        assert_eq!(wrap_prev(Some(9), 5), Some(4));
        assert_eq!(wrap_next(Some(0), 0), None);
        assert_eq!(wrap_prev(None, 0), None);
    }

    #[test]
    fn test_set_current_out_of_range_unsets() {
        let mut queue = Queue::new();
        queue.rebuild(&ledger_of(&["1"]));
        queue.set_current(Some(3));
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn test_random_index_in_bounds() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let i = random_index(5, &mut rng).unwrap();
            assert!(i < 5);
        }
        assert_eq!(random_index(0, &mut rng), None);
    }

    #[test]
    fn test_clear() {
        let mut queue = Queue::new();
        queue.rebuild(&ledger_of(&["1", "2"]));
        queue.set_current(Some(0));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.current_index().is_none());
    }
}
