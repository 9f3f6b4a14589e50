//! Grouping: flat arrival-ordered items → sorted buckets → display rows.
//!
//! Pure and recomputed wholesale whenever items, the group dimension or the
//! column count change. Nothing here is patched incrementally; the item
//! list only ever grows within a query, so a full rebuild stays cheap
//! relative to the network.
//!
//! ```text
//! items (arrival order)          rows (columns = 2)          matches
//!   a {x:1}                        Header "x: 1"               0 a
//!   b {x:2}        ──group──►      Images [a, c]    ─flat─►    1 c
//!   c {x:1}                        Header "x: 2"               2 b
//!                                  Images [b]
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::{Deref, Range};
use std::sync::Arc;

use crate::api::Item;

/// Group value used when an item lacks the grouping capture.
pub const MISSING_VALUE: &str = "—";

/// An item placed into the grouped, flattened match list.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchItem {
    pub item: Arc<Item>,
    /// Capture name grouped on.
    pub group_key: String,
    /// Value of that capture, or `MISSING_VALUE`.
    pub group_value: String,
    /// Position in `Grouped::matches`. Only meaningful for the grouping
    /// that produced it.
    pub global_index: usize,
}

impl Deref for MatchItem {
    type Target = Item;

    fn deref(&self) -> &Item {
        &self.item
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridRow {
    Header {
        label: String,
        /// Number of items in the bucket this header introduces.
        size: usize,
    },
    /// Up to `columns` consecutive entries of `Grouped::matches`.
    Images { group_key: String, range: Range<usize> },
}

/// Output of `group`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouped {
    pub rows: Vec<GridRow>,
    pub matches: Vec<MatchItem>,
    pub group_count: usize,
    /// `match_rows[i]` is the row index holding `matches[i]`.
    match_rows: Vec<usize>,
}

impl Grouped {
    /// Items shown by a row (empty for headers).
    pub fn row_items(&self, row: &GridRow) -> &[MatchItem] {
        match row {
            GridRow::Header { .. } => &[],
            GridRow::Images { range, .. } => &self.matches[range.clone()],
        }
    }

    /// Row index of the match at `global_index`.
    pub fn row_of(&self, global_index: usize) -> Option<usize> {
        self.match_rows.get(global_index).copied()
    }

    pub fn total(&self) -> usize {
        self.matches.len()
    }
}

/// Pick the capture to group on.
///
/// `requested` wins only if it is one of `capture_names`; otherwise the
/// first capture name is used. `None` when there are no captures.
pub fn resolve_dimension<'a>(capture_names: &'a [String], requested: Option<&str>) -> Option<&'a str> {
    if let Some(req) = requested
        && let Some(found) = capture_names.iter().find(|n| n.as_str() == req)
    {
        return Some(found.as_str());
    }
    capture_names.first().map(String::as_str)
}

/// Bucket `items` by `captures[dimension]` and lay the buckets out as rows.
///
/// Buckets are ordered by `collate` on the group value; inside a bucket
/// the arrival order is kept. Each bucket yields one header and
/// `ceil(len / columns)` image rows. A zero column count is treated as one.
pub fn group(items: &[Arc<Item>], dimension: Option<&str>, columns: usize) -> Grouped {
    let Some(dim) = dimension else {
        return Grouped::default();
    };
    if items.is_empty() {
        return Grouped::default();
    }
    let columns = columns.max(1);

    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut buckets: Vec<(&str, Vec<&Arc<Item>>)> = Vec::new();
    for item in items {
        let value = item
            .captures
            .get(dim)
            .map(String::as_str)
            .unwrap_or(MISSING_VALUE);
        let slot = *slots.entry(value).or_insert_with(|| {
            buckets.push((value, Vec::new()));
            buckets.len() - 1
        });
        buckets[slot].1.push(item);
    }
    buckets.sort_by(|a, b| collate(a.0, b.0));

    let mut rows = Vec::with_capacity(buckets.len() * 2 + items.len() / columns);
    let mut matches = Vec::with_capacity(items.len());
    let mut match_rows = Vec::with_capacity(items.len());

    for (value, members) in &buckets {
        rows.push(GridRow::Header {
            label: format!("{dim}: {value}"),
            size: members.len(),
        });
        let bucket_start = matches.len();
        for item in members {
            let global_index = matches.len();
            matches.push(MatchItem {
                item: Arc::clone(item),
                group_key: dim.to_string(),
                group_value: value.to_string(),
                global_index,
            });
        }
        let bucket_end = matches.len();
        let mut start = bucket_start;
        while start < bucket_end {
            let end = (start + columns).min(bucket_end);
            let row_idx = rows.len();
            match_rows.extend(std::iter::repeat_n(row_idx, end - start));
            rows.push(GridRow::Images {
                group_key: dim.to_string(),
                range: start..end,
            });
            start = end;
        }
    }

    Grouped {
        rows,
        matches,
        group_count: buckets.len(),
        match_rows,
    }
}

/// Display order of group values.
///
/// Case-insensitive first, so `apple < Cat < dog`. Values differing only
/// in case put lowercase first, and a final ordinal comparison keeps the
/// order total.
pub fn collate(a: &str, b: &str) -> Ordering {
    let fold = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();
    fold(a)
        .cmp(&fold(b))
        .then_with(|| {
            a.chars()
                .map(char::is_uppercase)
                .cmp(b.chars().map(char::is_uppercase))
        })
        .then_with(|| a.cmp(b))
}

/// Secondary label for a grid cell: the first capture that is not the
/// group dimension, falling back to the group value itself.
pub fn cell_label(m: &MatchItem, capture_names: &[String]) -> String {
    let secondary = capture_names
        .iter()
        .find(|n| **n != m.group_key)
        .unwrap_or(&m.group_key);
    let value = m
        .captures
        .get(secondary)
        .map(String::as_str)
        .unwrap_or(&m.group_value);
    format!("{secondary}: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::item;

    fn items(entries: &[(&str, Option<&str>)]) -> Vec<Arc<Item>> {
        entries.iter()
            .map(|(obj, x)| {
                let caps: Vec<(&str, &str)> = x.iter().map(|v| ("x", *v)).collect();
                Arc::new(item(obj, &caps))
            })
            .collect()
    }

    fn objects(ms: &[MatchItem]) -> Vec<&str> {
        ms.iter().map(|m| m.object.as_str()).collect()
    }

    /// Deterministic pseudo-random item list (xorshift).
    fn generated(n: usize, distinct: u64, seed: u64) -> Vec<Arc<Item>> {
        let mut s = seed.max(1);
        (0..n)
            .map(|i| {
                s ^= s << 13;
                s ^= s >> 7;
                s ^= s << 17;
                let v = format!("v{}", s % distinct);
                Arc::new(item(&format!("obj{i}"), &[("x", v.as_str())]))
            })
            .collect()
    }

    #[test]
    fn three_items_two_columns() {
        let src = items(&[("a", Some("1")), ("b", Some("2")), ("c", Some("1"))]);
        let g = group(&src, Some("x"), 2);
        assert_eq!(g.rows.len(), 4);
        assert!(matches!(&g.rows[0], GridRow::Header { label, size: 2 } if label == "x: 1"));
        assert_eq!(objects(g.row_items(&g.rows[1])), ["a", "c"]);
        assert!(matches!(&g.rows[2], GridRow::Header { label, size: 1 } if label == "x: 2"));
        assert_eq!(objects(g.row_items(&g.rows[3])), ["b"]);
        assert_eq!(objects(&g.matches), ["a", "c", "b"]);
        let idx: Vec<usize> = g.matches.iter().map(|m| m.global_index).collect();
        assert_eq!(idx, [0, 1, 2]);
        assert_eq!(g.group_count, 2);
        assert_eq!(g.matches[2].group_value, "2");
        assert_eq!(g.matches[2].group_key, "x");
    }

    #[test]
    fn empty_input_or_no_dimension() {
        assert_eq!(group(&[], Some("x"), 4), Grouped::default());
        let src = items(&[("a", Some("1"))]);
        assert_eq!(group(&src, None, 4), Grouped::default());
    }

    #[test]
    fn missing_capture_uses_sentinel() {
        let src = items(&[("a", None), ("b", Some("1"))]);
        let g = group(&src, Some("x"), 4);
        assert_eq!(g.matches[0].group_value, "1");
        assert_eq!(g.matches[1].group_value, MISSING_VALUE);
        assert!(matches!(&g.rows[2], GridRow::Header { label, .. } if label == "x: —"));
    }

    #[test]
    fn zero_columns_treated_as_one() {
        let src = items(&[("a", Some("1")), ("b", Some("1"))]);
        let g = group(&src, Some("x"), 0);
        assert_eq!(g.rows.len(), 3);
    }

    #[test]
    fn every_item_in_exactly_one_bucket() {
        for seed in 1..20 {
            let src = generated(137, 9, seed);
            let g = group(&src, Some("x"), 4);
            assert_eq!(g.matches.len(), src.len());
            let header_sum: usize = g
                .rows
                .iter()
                .map(|r| match r {
                    GridRow::Header { size, .. } => *size,
                    _ => 0,
                })
                .sum();
            assert_eq!(header_sum, src.len());
            let mut seen: Vec<&str> = objects(&g.matches);
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), src.len());
            for m in &g.matches {
                assert_eq!(m.group_value, m.captures["x"]);
            }
        }
    }

    #[test]
    fn row_counts_per_bucket() {
        for columns in [1usize, 2, 3, 4, 6, 8] {
            let src = generated(101, 5, 42);
            let g = group(&src, Some("x"), columns);
            let mut i = 0;
            while i < g.rows.len() {
                let GridRow::Header { size, .. } = &g.rows[i] else {
                    panic!("expected header at {i}");
                };
                let expected_rows = size.div_ceil(columns);
                let image_rows: Vec<&GridRow> = g.rows[i + 1..i + 1 + expected_rows].iter().collect();
                for (k, row) in image_rows.iter().enumerate() {
                    let len = g.row_items(row).len();
                    if k + 1 < expected_rows {
                        assert_eq!(len, columns);
                    } else {
                        assert_eq!(len, size - columns * (expected_rows - 1));
                    }
                }
                i += 1 + expected_rows;
            }
        }
    }

    #[test]
    fn buckets_sorted_and_arrival_order_kept() {
        let src = generated(200, 7, 3);
        let g = group(&src, Some("x"), 3);
        let values: Vec<&str> = g.matches.iter().map(|m| m.group_value.as_str()).collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| collate(a, b));
        assert_eq!(values, sorted);
        // Within a bucket, arrival order (obj index) is ascending.
        for w in g.matches.windows(2) {
            if w[0].group_value == w[1].group_value {
                let a: usize = w[0].object[3..].parse().unwrap();
                let b: usize = w[1].object[3..].parse().unwrap();
                assert!(a < b);
            }
        }
    }

    #[test]
    fn mixed_case_values_sort_case_insensitively() {
        let src = items(&[
            ("d", Some("dog")),
            ("c", Some("Cat")),
            ("a", Some("apple")),
            ("b", Some("Banana")),
        ]);
        let g = group(&src, Some("x"), 4);
        let labels: Vec<&str> = g
            .rows
            .iter()
            .filter_map(|r| match r {
                GridRow::Header { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, ["x: apple", "x: Banana", "x: Cat", "x: dog"]);
        assert_eq!(objects(&g.matches), ["a", "b", "c", "d"]);
    }

    #[test]
    fn collate_breaks_case_ties() {
        assert_eq!(collate("cat", "Cat"), Ordering::Less);
        assert_eq!(collate("Cat", "cat"), Ordering::Greater);
        assert_eq!(collate("cat", "cat"), Ordering::Equal);
        assert_eq!(collate("Zebra", "apple"), Ordering::Greater);
        assert_eq!(collate("e10", "e2"), Ordering::Less);
    }

    #[test]
    fn deterministic() {
        let src = generated(80, 6, 11);
        assert_eq!(group(&src, Some("x"), 4), group(&src, Some("x"), 4));
    }

    #[test]
    fn row_of_maps_matches_to_image_rows() {
        let src = items(&[("a", Some("1")), ("b", Some("2")), ("c", Some("1"))]);
        let g = group(&src, Some("x"), 1);
        // rows: H1, [a], [c], H2, [b]
        assert_eq!(g.row_of(0), Some(1));
        assert_eq!(g.row_of(1), Some(2));
        assert_eq!(g.row_of(2), Some(4));
        assert_eq!(g.row_of(3), None);
    }

    #[test]
    fn dimension_resolution() {
        let names = vec!["exp".to_string(), "class".to_string()];
        assert_eq!(resolve_dimension(&names, Some("class")), Some("class"));
        assert_eq!(resolve_dimension(&names, Some("nope")), Some("exp"));
        assert_eq!(resolve_dimension(&names, None), Some("exp"));
        assert_eq!(resolve_dimension(&[], Some("exp")), None);
    }

    #[test]
    fn cell_label_prefers_other_capture() {
        let src = vec![Arc::new(item("a", &[("exp", "e1"), ("class", "cat")]))];
        let names = vec!["exp".to_string(), "class".to_string()];
        let g = group(&src, Some("exp"), 4);
        assert_eq!(cell_label(&g.matches[0], &names), "class: cat");
        let g = group(&src, Some("class"), 4);
        assert_eq!(cell_label(&g.matches[0], &names), "exp: e1");
        let single = vec!["exp".to_string()];
        let g = group(&src, Some("exp"), 4);
        assert_eq!(cell_label(&g.matches[0], &single), "exp: e1");
    }
}
