use std::cmp::Ordering;

use arrow::compute::SortOptions;
use datafusion::scalar::ScalarValue;
use itertools::izip;

/// Compares two values of one ordering column under the column's sort options.
///
/// `Less` means `a` sorts before `b`. Two NULLs are peers.
pub fn compare_scalars(a: &ScalarValue, b: &ScalarValue, options: SortOptions) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if options.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if options.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            if options.descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

/// Lexicographic comparison of ordering keys.
pub fn compare_keys(a: &[ScalarValue], b: &[ScalarValue], options: &[SortOptions]) -> Ordering {
    for (x, y, opts) in izip!(a, b, options) {
        match compare_scalars(x, y, *opts) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// `a` sorts strictly before `b`.
pub fn sorts_before(a: &[ScalarValue], b: &[ScalarValue], options: &[SortOptions]) -> bool {
    compare_keys(a, b, options) == Ordering::Less
}

/// Partition-key equality; NULLs compare equal to each other.
pub fn keys_equal(a: &[ScalarValue], b: &[ScalarValue]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|(x, y)| match (x.is_null(), y.is_null()) {
            (true, true) => true,
            (false, false) => x == y,
            _ => false,
        })
}

/// Picks the listed columns out of a row.
pub fn project(row: &[ScalarValue], columns: &[usize]) -> Vec<ScalarValue> {
    columns.iter().map(|&c| row[c].clone()).collect()
}
