#![forbid(unsafe_code)]

//! MRU reconciliation.
//!
//! Merges the host-reported tab list with recency evidence into one
//! strictly ordered sequence. Host-native focus timestamps take precedence
//! wholesale when any tab carries one; otherwise the persisted score map is
//! used. In both cases the active tab's score is forced up to `now` so it
//! always sorts first, and ties break on the tab's position in the
//! host-reported list, so the order is deterministic regardless of map
//! iteration order.

use std::collections::HashMap;

use tabflip_core::logging::debug;

use crate::host::TabInfo;

/// The id of the active tab, defaulting to the first listed.
#[must_use]
pub fn active_tab_id(tabs: &[TabInfo]) -> Option<u64> {
    tabs.iter()
        .find(|tab| tab.is_active)
        .or_else(|| tabs.first())
        .map(|tab| tab.id)
}

/// Reconcile the host tab list with persisted scores.
///
/// Returns the tabs in MRU order (most recent first) plus the resolved
/// score for every listed tab.
#[must_use]
pub fn reconcile(
    tabs: Vec<TabInfo>,
    persisted: &HashMap<u64, f64>,
    now: f64,
) -> (Vec<TabInfo>, HashMap<u64, f64>) {
    if tabs.is_empty() {
        return (tabs, HashMap::new());
    }

    let use_native = tabs.iter().any(|tab| tab.last_focused.is_some());
    let mut scores: HashMap<u64, f64> = tabs
        .iter()
        .map(|tab| {
            let score = if use_native {
                tab.last_focused.unwrap_or(0.0)
            } else {
                persisted.get(&tab.id).copied().unwrap_or(0.0)
            };
            (tab.id, score)
        })
        .collect();

    if let Some(active) = active_tab_id(&tabs) {
        let entry = scores.entry(active).or_insert(0.0);
        *entry = entry.max(now);
    }

    let mut ordered: Vec<(usize, TabInfo)> = tabs.into_iter().enumerate().collect();
    ordered.sort_by(|(rank_a, a), (rank_b, b)| {
        let score_a = scores.get(&a.id).copied().unwrap_or(0.0);
        let score_b = scores.get(&b.id).copied().unwrap_or(0.0);
        score_b
            .total_cmp(&score_a)
            .then_with(|| rank_a.cmp(rank_b))
    });

    let ordered: Vec<TabInfo> = ordered.into_iter().map(|(_, tab)| tab).collect();
    debug!(
        order = ?ordered.iter().map(|t| t.id).collect::<Vec<_>>(),
        source = if use_native { "last_focused" } else { "cache" },
        "reconciled MRU order"
    );
    (ordered, scores)
}

/// Rewrite the MRU order after a commit: the committed tab first, the tab
/// the session started from second (when different), everything else in
/// prior relative order. Returns the new order plus a score map encoding it
/// (descending by a millisecond per position).
#[must_use]
pub fn committed_order(
    prior_order: &[u64],
    committed: u64,
    original: Option<u64>,
    now: f64,
) -> (Vec<u64>, HashMap<u64, f64>) {
    let mut new_order = vec![committed];
    if let Some(original) = original
        && original != committed
    {
        new_order.push(original);
    }
    new_order.extend(
        prior_order
            .iter()
            .copied()
            .filter(|id| *id != committed && Some(*id) != original),
    );

    let scores = new_order
        .iter()
        .enumerate()
        .map(|(idx, id)| (*id, now - idx as f64 * 0.001))
        .collect();
    (new_order, scores)
}
