//! Index bookkeeping for ordered children (layers, labels, elements).
//!
//! Kept free of SQL so the repositories only execute the updates computed here.

use std::collections::HashSet;

use crate::ReorderError;

/// Checks that every id in `order` is one of `children`.
pub(crate) fn check_order(children: &[i64], order: &[(i64, i32)]) -> Result<(), ReorderError> {
    let known: HashSet<i64> = children.iter().copied().collect();
    match order.iter().find(|(id, _)| !known.contains(id)) {
        Some(&(id, _)) => Err(ReorderError::ForeignId(id)),
        None => Ok(()),
    }
}

/// Position a new child lands at: `requested` clamped to `0..=len`, or the end.
pub(crate) fn insertion_index(requested: Option<i32>, len: usize) -> i32 {
    let end = i32::try_from(len).unwrap_or(i32::MAX);
    requested.map_or(end, |i| i.clamp(0, end))
}

/// Makes room for a child at `requested`.
///
/// `current` is `(id, index)` in display order. Returns the index of the new child
/// and the `(id, index)` pairs of existing children whose index must change.
pub(crate) fn renumber_with_insert(
    current: &[(i64, i32)],
    requested: Option<i32>,
) -> (i32, Vec<(i64, i32)>) {
    let at = insertion_index(requested, current.len());
    let changes = positions(current)
        .map(|(pos, id, index)| (id, index, if pos >= at { pos + 1 } else { pos }))
        .filter(|(_, old, new)| old != new)
        .map(|(id, _, new)| (id, new))
        .collect();
    (at, changes)
}

/// Renumbers the remaining children `0..n` after a removal.
///
/// `remaining` is `(id, index)` in display order. Returns only the changed pairs.
pub(crate) fn renumber_after_remove(remaining: &[(i64, i32)]) -> Vec<(i64, i32)> {
    positions(remaining)
        .filter(|(pos, _, index)| pos != index)
        .map(|(pos, id, _)| (id, pos))
        .collect()
}

fn positions(rows: &[(i64, i32)]) -> impl Iterator<Item = (i32, i64, i32)> + '_ {
    (0..).zip(rows).map(|(pos, &(id, index))| (pos, id, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_id_is_reported() {
        let children = [10, 11, 12];

        assert!(check_order(&children, &[(12, 0), (10, 1), (11, 2)]).is_ok());
        assert!(check_order(&children, &[]).is_ok());

        let result = check_order(&children, &[(10, 0), (99, 1), (11, 2)]);
        assert!(matches!(result, Err(ReorderError::ForeignId(99))));
    }

    #[test]
    fn test_insertion_index_is_clamped() {
        assert_eq!(insertion_index(None, 3), 3);
        assert_eq!(insertion_index(Some(1), 3), 1);
        assert_eq!(insertion_index(Some(7), 3), 3);
        assert_eq!(insertion_index(Some(-2), 3), 0);
        assert_eq!(insertion_index(None, 0), 0);
    }

    #[test]
    fn test_insert_shifts_later_children() {
        let current = [(1, 0), (2, 1), (3, 2)];

        let (at, changes) = renumber_with_insert(&current, Some(1));
        assert_eq!(at, 1);
        assert_eq!(changes, vec![(2, 2), (3, 3)]);

        let (at, changes) = renumber_with_insert(&current, Some(0));
        assert_eq!(at, 0);
        assert_eq!(changes, vec![(1, 1), (2, 2), (3, 3)]);

        let (at, changes) = renumber_with_insert(&current, None);
        assert_eq!(at, 3);
        assert!(changes.is_empty());

        let (at, changes) = renumber_with_insert(&current, Some(40));
        assert_eq!(at, 3);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_insert_repairs_existing_gaps() {
        let current = [(1, 0), (2, 4), (3, 9)];

        let (at, changes) = renumber_with_insert(&current, Some(1));
        assert_eq!(at, 1);
        assert_eq!(changes, vec![(2, 2), (3, 3)]);
    }

    #[test]
    fn test_remove_closes_gap() {
        // Child at index 1 was removed.
        let remaining = [(1, 0), (3, 2), (4, 3)];
        assert_eq!(renumber_after_remove(&remaining), vec![(3, 1), (4, 2)]);

        assert!(renumber_after_remove(&[(1, 0), (2, 1)]).is_empty());
        assert!(renumber_after_remove(&[]).is_empty());
    }
}
