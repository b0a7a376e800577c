//! Weighted round-robin strategies.
//!
//! - Smooth WRR: every eligible entry gains its weight per call; the entry
//!   with the largest credit wins and pays back the sum of credits. Picks are
//!   interleaved (5:1 yields `A A A B A A`).
//! - Simple WRR: a shared cursor hands out `weight` picks per entry, then
//!   rearms all credits.

use crate::load_balancer::pool::PoolEntry;

/// Smooth weighted round robin over `candidates` (indices into `entries`).
///
/// Ties keep the earlier candidate. Ineligible entries keep their credit.
pub(crate) fn smooth_select(
    entries: &mut [PoolEntry],
    candidates: impl IntoIterator<Item = usize>,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut max = 0i64;
    let mut total = 0i64;

    for idx in candidates {
        let entry = &mut entries[idx];
        if !entry.eligible() {
            continue;
        }

        let credit = entry.credit;
        if best.is_none() || credit > max {
            best = Some(idx);
            max = credit;
        }
        total += credit;

        entry.credit += entry.weight as i64;
    }

    let best = best?;
    entries[best].credit -= total;
    Some(best)
}

/// Simple weighted round robin starting at `*next`.
///
/// When a full pass finds no entry with credit left, all credits are reset to
/// their weights and scanning resumes at position 0. Returns `None` only when
/// no eligible entry exists.
pub(crate) fn simple_select(entries: &mut [PoolEntry], next: &mut usize) -> Option<usize> {
    if entries.is_empty() {
        return None;
    }

    let mut start = *next % entries.len();
    let mut cursor = start;
    let mut rearmed = false;
    let mut all_down = true;

    loop {
        let entry = &entries[cursor];
        let avail = entry.backend.avail();
        if avail && entry.credit > 0 {
            break;
        }
        if avail && entry.weight > 0 {
            all_down = false;
        }

        cursor = (cursor + 1) % entries.len();
        if cursor == start {
            // a second empty pass after rearming means backends went down
            // while we were scanning
            if all_down || rearmed {
                return None;
            }
            for entry in entries.iter_mut() {
                entry.reset_credit();
            }
            rearmed = true;
            all_down = true;
            start = 0;
            cursor = 0;
        }
    }

    entries[cursor].credit -= 1;
    *next = (cursor + 1) % entries.len();
    Some(cursor)
}
