//! Multi-select state for the site list.
//!
//! The model stores ids only. Every operation that depends on what the user
//! can see takes the current visible ordering as an argument, so the order
//! used for a range is always the order that was rendered.

use std::collections::HashSet;

/// Tri-state value of the "select all" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderState {
    pub checked: bool,
    pub indeterminate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionModel {
    selected: HashSet<i64>,
    /// Last id toggled without the range modifier.
    anchor: Option<i64>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    /// Selected ids in ascending order.
    pub fn selected_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.selected.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn anchor(&self) -> Option<i64> {
        self.anchor
    }

    pub fn toggle_single(&mut self, id: i64) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        self.anchor = Some(id);
    }

    /// Set every id between the anchor and `id` (both inclusive, in
    /// `visible` order) to `checked`. The anchor stays where it was.
    ///
    /// Without a usable anchor (none yet, or it is not visible) this falls
    /// back to setting `id` alone and making it the anchor; the return value
    /// is `false` in that case.
    pub fn toggle_range(&mut self, id: i64, checked: bool, visible: &[i64]) -> bool {
        let span = self.anchor.and_then(|anchor| {
            let from = visible.iter().position(|&v| v == anchor)?;
            let to = visible.iter().position(|&v| v == id)?;
            Some((from.min(to), from.max(to)))
        });

        match span {
            Some((start, end)) => {
                for &member in &visible[start..=end] {
                    self.set(member, checked);
                }
                true
            }
            None => {
                self.set(id, checked);
                self.anchor = Some(id);
                false
            }
        }
    }

    /// Set every visible id to `checked`; hidden ids keep their state.
    pub fn select_all(&mut self, checked: bool, visible: &[i64]) {
        for &id in visible {
            self.set(id, checked);
        }
    }

    pub fn header_state(&self, visible: &[i64]) -> HeaderState {
        let selected = visible.iter().filter(|id| self.selected.contains(*id)).count();
        HeaderState {
            checked: selected > 0 && selected == visible.len(),
            indeterminate: selected > 0 && selected < visible.len(),
        }
    }

    /// Drop ids that no longer exist; forget the anchor if it was one of them.
    pub fn reconcile(&mut self, existing: &HashSet<i64>) {
        let before = self.selected.len();
        self.selected.retain(|id| existing.contains(id));
        if self.anchor.is_some_and(|anchor| !existing.contains(&anchor)) {
            self.anchor = None;
        }
        let dropped = before - self.selected.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped stale selections");
        }
    }

    pub fn clear_anchor(&mut self) {
        self.anchor = None;
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    fn set(&mut self, id: i64, checked: bool) {
        if checked {
            self.selected.insert(id);
        } else {
            self.selected.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const VISIBLE: [i64; 6] = [10, 20, 30, 40, 50, 60];

    #[test]
    fn test_toggle_single_flips_and_anchors() {
        let mut model = SelectionModel::new();
        model.toggle_single(30);
        assert!(model.is_selected(30));
        assert_eq!(model.anchor(), Some(30));

        model.toggle_single(30);
        assert!(!model.is_selected(30));
        assert_eq!(model.anchor(), Some(30));
    }

    #[test]
    fn test_range_forward_and_backward() {
        let mut model = SelectionModel::new();
        model.toggle_single(20);
        assert!(model.toggle_range(50, true, &VISIBLE));
        assert_eq!(model.selected_ids(), vec![20, 30, 40, 50]);
        assert_eq!(model.anchor(), Some(20));

        let mut model = SelectionModel::new();
        model.toggle_single(50);
        assert!(model.toggle_range(20, true, &VISIBLE));
        assert_eq!(model.selected_ids(), vec![20, 30, 40, 50]);
        assert_eq!(model.anchor(), Some(50));
    }

    #[test]
    fn test_range_overrides_individual_state() {
        let mut model = SelectionModel::new();
        model.toggle_single(30);
        model.toggle_single(40);
        model.toggle_single(60);
        // anchor is 60; uncheck 30..=60
        model.toggle_range(30, false, &VISIBLE);
        assert!(model.is_empty());
    }

    #[test]
    fn test_range_without_anchor_sets_target_only() {
        let mut model = SelectionModel::new();
        assert!(!model.toggle_range(40, true, &VISIBLE));
        assert_eq!(model.selected_ids(), vec![40]);
        assert_eq!(model.anchor(), Some(40));
    }

    #[test]
    fn test_range_with_hidden_anchor_sets_target_only() {
        let mut model = SelectionModel::new();
        model.toggle_single(99);
        assert!(!model.toggle_range(20, true, &VISIBLE));
        assert_eq!(model.selected_ids(), vec![20, 99]);
        assert_eq!(model.anchor(), Some(20));
    }

    #[test]
    fn test_select_all_leaves_hidden_ids() {
        let mut model = SelectionModel::new();
        model.toggle_single(20);
        model.toggle_single(99);

        model.select_all(true, &[10, 30]);
        assert_eq!(model.selected_ids(), vec![10, 20, 30, 99]);

        model.select_all(false, &[10, 20, 30]);
        assert_eq!(model.selected_ids(), vec![99]);
    }

    #[test]
    fn test_header_state() {
        let mut model = SelectionModel::new();
        assert_eq!(model.header_state(&VISIBLE), HeaderState::default());
        assert_eq!(model.header_state(&[]), HeaderState::default());

        model.toggle_single(10);
        assert_eq!(
            model.header_state(&VISIBLE),
            HeaderState {
                checked: false,
                indeterminate: true
            }
        );

        model.select_all(true, &VISIBLE);
        assert_eq!(
            model.header_state(&VISIBLE),
            HeaderState {
                checked: true,
                indeterminate: false
            }
        );

        // Only visible ids count
        assert!(model.header_state(&[10]).checked);
    }

    #[test]
    fn test_reconcile_drops_stale_ids_and_anchor() {
        let mut model = SelectionModel::new();
        model.select_all(true, &[3, 5, 9]);
        model.toggle_single(7);

        let existing: HashSet<i64> = [1, 2, 3].into_iter().collect();
        model.reconcile(&existing);
        assert_eq!(model.selected_ids(), vec![3]);
        assert_eq!(model.anchor(), None);
    }

    #[test]
    fn test_reconcile_keeps_live_anchor() {
        let mut model = SelectionModel::new();
        model.toggle_single(2);
        model.reconcile(&[1, 2].into_iter().collect());
        assert_eq!(model.anchor(), Some(2));
    }

    #[test]
    fn test_clear() {
        let mut model = SelectionModel::new();
        model.toggle_single(1);
        model.clear();
        assert!(model.is_empty());
        assert_eq!(model.anchor(), None);
    }

    // ========================================================================
    // Properties
    // ========================================================================

    #[derive(Debug, Clone)]
    enum Op {
        Toggle(usize),
        Range(usize, bool),
        All(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..12).prop_map(Op::Toggle),
            (0usize..12, any::<bool>()).prop_map(|(i, c)| Op::Range(i, c)),
            any::<bool>().prop_map(Op::All),
        ]
    }

    proptest! {
        #[test]
        fn prop_selection_stays_within_collection(
            ids in prop::collection::hash_set(0i64..1000, 1..12),
            ops in prop::collection::vec(op(), 0..40),
        ) {
            let visible: Vec<i64> = ids.iter().copied().collect();
            let mut model = SelectionModel::new();

            for op in ops {
                match op {
                    Op::Toggle(i) => model.toggle_single(visible[i % visible.len()]),
                    Op::Range(i, c) => {
                        model.toggle_range(visible[i % visible.len()], c, &visible);
                    }
                    Op::All(c) => model.select_all(c, &visible),
                }
                prop_assert!(model.selected_ids().iter().all(|id| ids.contains(id)));
            }
        }

        #[test]
        fn prop_indeterminate_iff_partial(
            visible in prop::collection::vec(0i64..50, 0..20),
            picks in prop::collection::vec(0i64..50, 0..20),
        ) {
            let mut model = SelectionModel::new();
            for id in picks {
                if !model.is_selected(id) {
                    model.toggle_single(id);
                }
            }

            let visible: Vec<i64> = {
                let mut seen = HashSet::new();
                visible.into_iter().filter(|id| seen.insert(*id)).collect()
            };
            let selected = visible.iter().filter(|id| model.is_selected(**id)).count();
            let state = model.header_state(&visible);

            prop_assert_eq!(state.indeterminate, selected > 0 && selected < visible.len());
            prop_assert_eq!(state.checked, selected > 0 && selected == visible.len());
        }

        #[test]
        fn prop_range_is_order_independent(
            len in 2usize..20,
            a in 0usize..20,
            b in 0usize..20,
            checked in any::<bool>(),
        ) {
            let visible: Vec<i64> = (0..len as i64).map(|i| i * 3 + 1).collect();
            let (a, b) = (visible[a % len], visible[b % len]);

            let mut forward = SelectionModel::new();
            forward.toggle_single(a);
            forward.toggle_range(b, checked, &visible);

            let mut backward = SelectionModel::new();
            backward.toggle_single(b);
            backward.toggle_range(a, checked, &visible);

            // Only the span is compared; the anchors' own toggles differ.
            let span: Vec<i64> = visible
                .iter()
                .copied()
                .filter(|id| {
                    let lo = a.min(b);
                    let hi = a.max(b);
                    *id >= lo && *id <= hi
                })
                .collect();
            for id in span {
                prop_assert_eq!(forward.is_selected(id), checked);
                prop_assert_eq!(backward.is_selected(id), checked);
            }
        }
    }
}
