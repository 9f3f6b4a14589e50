//! Row sizing for virtualized rendering of the grid.
//!
//! Only rows intersecting the viewport are drawn. To find them without
//! laying out every row, each row gets a fixed height by kind and the
//! model keeps prefix-sum offsets. While more pages may exist a synthetic
//! loading row is appended; it carries no matches and gives the scroll
//! position something to approach so the proximity trigger can fire.

use std::ops::Range;

use crate::group::GridRow;

/// Fire the next page request when the last visible row is this close to
/// the end of the row list.
pub const LOOKAHEAD_ROWS: usize = 8;

/// Heights in terminal lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHeights {
    pub header: u16,
    pub images: u16,
}

impl Default for RowHeights {
    fn default() -> Self {
        Self { header: 1, images: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Header,
    Images,
    /// Synthetic trailing row shown while more pages may exist.
    Loading,
}

pub struct ViewportModel {
    kinds: Vec<RowKind>,
    /// `offsets[i]` = top of row i; `offsets[len]` = total height.
    offsets: Vec<u32>,
    heights: RowHeights,
}

impl ViewportModel {
    /// `more_pending`: a further page is known to exist or is being fetched.
    pub fn new(rows: &[GridRow], more_pending: bool, heights: RowHeights) -> Self {
        let mut kinds: Vec<RowKind> = rows
            .iter()
            .map(|r| match r {
                GridRow::Header { .. } => RowKind::Header,
                GridRow::Images { .. } => RowKind::Images,
            })
            .collect();
        if more_pending {
            kinds.push(RowKind::Loading);
        }
        let mut offsets = Vec::with_capacity(kinds.len() + 1);
        let mut y = 0u32;
        offsets.push(0);
        // Saturates: rows past u32::MAX all sit at the bottom edge.
        for kind in &kinds {
            y = y.saturating_add(u32::from(size_of_kind(*kind, heights)));
            offsets.push(y);
        }
        Self {
            kinds,
            offsets,
            heights,
        }
    }

    /// Number of rendered rows, including the loading row.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kind(&self, index: usize) -> Option<RowKind> {
        self.kinds.get(index).copied()
    }

    pub fn row_size(&self, index: usize) -> u16 {
        self.kind(index)
            .map(|k| size_of_kind(k, self.heights))
            .unwrap_or(0)
    }

    pub fn offset_of(&self, index: usize) -> u32 {
        let i = index.min(self.kinds.len());
        self.offsets[i]
    }

    pub fn total_height(&self) -> u32 {
        self.offsets[self.kinds.len()]
    }

    pub fn max_scroll(&self, viewport_height: u32) -> u32 {
        self.total_height().saturating_sub(viewport_height)
    }

    /// Rows intersecting `[scroll, scroll + height)`.
    pub fn visible_range(&self, scroll: u32, height: u32) -> Range<usize> {
        if self.kinds.is_empty() || height == 0 {
            return 0..0;
        }
        // First row whose bottom edge is below `scroll`.
        let start = self.offsets[1..].partition_point(|&bottom| bottom <= scroll);
        let end_y = scroll.saturating_add(height);
        let end = self.offsets[..self.kinds.len()].partition_point(|&top| top < end_y);
        start..end.max(start)
    }

    /// Scroll offset that keeps `scroll` if row `index` is already fully
    /// visible, otherwise the nearest offset that reveals it.
    pub fn scroll_to_reveal(&self, index: usize, scroll: u32, height: u32) -> u32 {
        if index >= self.kinds.len() {
            return scroll.min(self.max_scroll(height));
        }
        let top = self.offsets[index];
        let bottom = self.offsets[index + 1];
        let scroll = if top < scroll {
            top
        } else if bottom > scroll.saturating_add(height) {
            bottom.saturating_sub(height)
        } else {
            scroll
        };
        scroll.min(self.max_scroll(height))
    }

    /// Proximity trigger: the highest visible row is within the lookahead
    /// window of the end, more pages exist, and none is in flight.
    pub fn should_fetch(&self, visible_stop: usize, has_more: bool, fetching: bool, lookahead: usize) -> bool {
        if !has_more || fetching {
            return false;
        }
        visible_stop.saturating_add(lookahead) >= self.kinds.len()
    }
}

fn size_of_kind(kind: RowKind, heights: RowHeights) -> u16 {
    match kind {
        RowKind::Header => heights.header,
        RowKind::Images | RowKind::Loading => heights.images,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pattern: &str) -> Vec<GridRow> {
        pattern
            .chars()
            .enumerate()
            .map(|(i, c)| match c {
                'H' => GridRow::Header { label: format!("h{i}"), size: 1 },
                _ => GridRow::Images { group_key: "x".into(), range: i..i + 1 },
            })
            .collect()
    }

    #[test]
    fn loading_row_only_when_more_pending() {
        let r = rows("HII");
        let m = ViewportModel::new(&r, false, RowHeights::default());
        assert_eq!(m.len(), 3);
        let m = ViewportModel::new(&r, true, RowHeights::default());
        assert_eq!(m.len(), 4);
        assert_eq!(m.kind(3), Some(RowKind::Loading));
        assert_eq!(m.row_size(3), 3);
    }

    #[test]
    fn sizes_and_offsets() {
        let m = ViewportModel::new(&rows("HIHI"), false, RowHeights { header: 1, images: 4 });
        assert_eq!(m.row_size(0), 1);
        assert_eq!(m.row_size(1), 4);
        assert_eq!(m.row_size(99), 0);
        assert_eq!(m.offset_of(2), 5);
        assert_eq!(m.total_height(), 10);
        assert_eq!(m.max_scroll(4), 6);
        assert_eq!(m.max_scroll(40), 0);
    }

    #[test]
    fn offsets_saturate_on_huge_grids() {
        let tall = RowHeights { header: u16::MAX, images: u16::MAX };
        let r = vec![GridRow::Header { label: "h".into(), size: 1 }; 70_000];
        let m = ViewportModel::new(&r, true, tall);
        assert_eq!(m.total_height(), u32::MAX);
        assert_eq!(m.offset_of(69_999), u32::MAX);
        assert_eq!(m.offset_of(1), u32::from(u16::MAX));
        assert_eq!(m.visible_range(u32::MAX - 1, 10).start, 65_536);
        assert!(m.should_fetch(0, true, false, usize::MAX));
    }

    #[test]
    fn visible_range_math() {
        // offsets: H0 [0,1) I1 [1,5) H2 [5,6) I3 [6,10)
        let m = ViewportModel::new(&rows("HIHI"), false, RowHeights { header: 1, images: 4 });
        assert_eq!(m.visible_range(0, 1), 0..1);
        assert_eq!(m.visible_range(0, 2), 0..2);
        assert_eq!(m.visible_range(1, 4), 1..2);
        assert_eq!(m.visible_range(4, 3), 1..4);
        assert_eq!(m.visible_range(9, 100), 3..4);
        assert_eq!(m.visible_range(0, 0), 0..0);
        let empty = ViewportModel::new(&[], false, RowHeights::default());
        assert_eq!(empty.visible_range(0, 10), 0..0);
    }

    #[test]
    fn reveal_scrolls_minimally() {
        let m = ViewportModel::new(&rows("HIHIHI"), false, RowHeights { header: 1, images: 4 });
        // total 15, viewport 5
        assert_eq!(m.scroll_to_reveal(1, 0, 5), 0);
        assert_eq!(m.scroll_to_reveal(3, 0, 5), 5); // I3 = [6,10)
        assert_eq!(m.scroll_to_reveal(0, 7, 5), 0);
        assert_eq!(m.scroll_to_reveal(5, 0, 5), 10);
    }

    #[test]
    fn proximity_trigger() {
        let r = rows("HIIIIIIIIIIIIIIIIIII"); // 20 rows
        let m = ViewportModel::new(&r, true, RowHeights::default()); // 21 with loading
        assert!(!m.should_fetch(5, true, false, LOOKAHEAD_ROWS));
        assert!(!m.should_fetch(12, true, false, LOOKAHEAD_ROWS));
        assert!(m.should_fetch(13, true, false, LOOKAHEAD_ROWS));
        assert!(!m.should_fetch(13, true, true, LOOKAHEAD_ROWS));
        assert!(!m.should_fetch(20, false, false, LOOKAHEAD_ROWS));
    }
}
