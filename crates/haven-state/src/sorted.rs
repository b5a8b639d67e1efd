//! Binary-search insertion points over sorted slices.
//!
//! The search lands *after* every element that compares equal to the needle
//! (ascending) or *before* them (descending). When an identity selector is
//! given, the run of equal elements next to that point is scanned for an
//! element with the needle's identity, which is preferred over the raw
//! insertion point. Two messages sharing a timestamp therefore resolve to the
//! existing entry instead of producing a duplicate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Insertion index of `needle` in `sorted`, ordered by `value`.
pub fn locate<T, V>(needle: &T, sorted: &[T], direction: Direction, value: impl Fn(&T) -> V) -> usize
where
    V: PartialOrd,
{
    let target = value(needle);
    let mut left = 0;
    let mut right = sorted.len();
    while left < right {
        let middle = left + (right - left) / 2;
        let probe = value(&sorted[middle]);
        let go_left = match direction {
            Direction::Ascending => target < probe,
            Direction::Descending => target >= probe,
        };
        if go_left {
            right = middle;
        } else {
            left = middle + 1;
        }
    }
    left
}

/// Like [`locate`], but returns the index of an element with the same identity
/// when one sits among the elements that compare equal to `needle`.
pub fn locate_with_identity<T, V, K>(
    needle: &T,
    sorted: &[T],
    direction: Direction,
    value: impl Fn(&T) -> V,
    identity: impl Fn(&T) -> K,
) -> usize
where
    V: PartialOrd,
    K: PartialEq,
{
    let insertion = locate(needle, sorted, direction, &value);
    let target = value(needle);
    let key = identity(needle);

    match direction {
        Direction::Ascending => {
            let mut i = insertion;
            while i > 0 {
                i -= 1;
                if value(&sorted[i]) != target {
                    break;
                }
                if identity(&sorted[i]) == key {
                    return i;
                }
            }
        }
        Direction::Descending => {
            for (i, item) in sorted.iter().enumerate().skip(insertion) {
                if value(item) != target {
                    break;
                }
                if identity(item) == key {
                    return i;
                }
            }
        }
    }

    insertion
}
