//! Weighted least-connections strategy.

use std::cmp::Ordering;

use crate::load_balancer::pool::PoolEntry;

/// Compare load ratios `conn/weight` without floating point.
///
/// `Greater` means `a` is more loaded than `b`.
fn compare_load(a: &PoolEntry, b: &PoolEntry) -> Ordering {
    let lhs = a.backend.conn_num() * b.weight as i64;
    let rhs = b.backend.conn_num() * a.weight as i64;
    lhs.cmp(&rhs)
}

/// Indices of the least loaded eligible entries.
///
/// Usually one entry; several when their load ratios tie exactly. Empty when
/// no entry is eligible.
pub(crate) fn least_conn_candidates(entries: &[PoolEntry]) -> Vec<usize> {
    let mut best: Option<usize> = None;
    let mut single = true;

    for (idx, entry) in entries.iter().enumerate() {
        if !entry.eligible() {
            continue;
        }
        let Some(current) = best else {
            best = Some(idx);
            continue;
        };

        match compare_load(&entries[current], entry) {
            Ordering::Greater => {
                best = Some(idx);
                single = true;
            }
            Ordering::Equal => single = false,
            Ordering::Less => {}
        }
    }

    let Some(best) = best else {
        return Vec::new();
    };
    if single {
        return vec![best];
    }

    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.eligible() && compare_load(&entries[best], e) == Ordering::Equal)
        .map(|(idx, _)| idx)
        .collect()
}
