//! Sticky (hash-based) selection.
//!
//! Entries are walked in address order so the bucket layout only depends on
//! the eligible set and their weights, not on configuration order.

use xxhash_rust::xxh3::xxh3_64;

use crate::load_balancer::pool::PoolEntry;

/// Hash `key` into `0..base`. An empty key hashes to a random value.
pub fn get_hash(key: &[u8], base: u64) -> u64 {
    let hash = if key.is_empty() {
        fastrand::u64(..)
    } else {
        xxh3_64(key)
    };
    hash % base.max(1)
}

/// Pick an eligible entry for `key`, walking `sorted` (indices into
/// `entries` in address order).
pub(crate) fn sticky_select(entries: &[PoolEntry], sorted: &[usize], key: &[u8]) -> Option<usize> {
    let candidates: Vec<usize> = sorted
        .iter()
        .copied()
        .filter(|&idx| entries[idx].eligible())
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let total: i64 = candidates.iter().map(|&idx| entries[idx].weight as i64).sum();
    let mut value = get_hash(key, total as u64) as i64;
    for idx in candidates {
        value -= entries[idx].weight as i64;
        if value < 0 {
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::pool::tests::entries;

    fn sorted_order(list: &[PoolEntry]) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..list.len()).collect();
        idx.sort_by(|&a, &b| list[a].backend.addr_info.cmp(&list[b].backend.addr_info));
        idx
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(get_hash(b"client-1", 1000), get_hash(b"client-1", 1000));
        assert!(get_hash(b"", 7) < 7);
    }

    #[test]
    fn test_same_key_same_backend() {
        let list = entries(&[("A", 3), ("B", 1), ("C", 2)]);
        let order = sorted_order(&list);
        for i in 0..100 {
            let key = format!("user-{}", i);
            let first = sticky_select(&list, &order, key.as_bytes()).unwrap();
            for _ in 0..5 {
                assert_eq!(sticky_select(&list, &order, key.as_bytes()), Some(first));
            }
        }
    }

    #[test]
    fn test_removing_later_backend_keeps_earlier_buckets() {
        let full = entries(&[("A", 2), ("B", 3), ("C", 5)]);
        let order = sorted_order(&full);
        let reduced = entries(&[("A", 2), ("B", 3)]);
        let reduced_order = sorted_order(&reduced);

        // keys whose hash lands at the same offset in both layouts and
        // before C's bucket must keep their backend
        let mut checked = 0;
        for i in 0..2000 {
            let key = format!("session-{}", i);
            let offset_full = get_hash(key.as_bytes(), 10);
            let offset_reduced = get_hash(key.as_bytes(), 5);
            if offset_full != offset_reduced || offset_full >= 5 {
                continue;
            }
            let a = sticky_select(&full, &order, key.as_bytes()).unwrap();
            let b = sticky_select(&reduced, &reduced_order, key.as_bytes()).unwrap();
            assert_eq!(full[a].backend.name, reduced[b].backend.name);
            checked += 1;
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_all_down() {
        let list = entries(&[("A", 1)]);
        list[0].backend.set_avail(false);
        assert!(sticky_select(&list, &[0], b"k").is_none());
    }
}
