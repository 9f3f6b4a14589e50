//! Viewer-local state: layout, grid cursor and scroll, the shown image,
//! and status bar text.

use crate::group::{GridRow, Grouped};
use crate::navigation::NavState;
use crate::session::{QueryPhase, Session};
use crate::viewport::ViewportModel;
use crate::worker::Transport;

/// Cell size assumed when the terminal does not report pixel dimensions.
const FALLBACK_CELL: (u16, u16) = (8, 16);

// ---------------------------------------------------------------------------
// Layout / ViewState
// ---------------------------------------------------------------------------

pub(super) struct Layout {
    pub cols: u16,
    pub grid_top: u16,   // first row under the pattern line
    pub grid_rows: u16,  // rows available to the grid / viewer body
    pub status_row: u16, // last terminal row
    pub cell_w: u16,     // pixels per cell (width)
    pub cell_h: u16,     // pixels per cell (height)
}

pub(super) fn compute_layout(term_cols: u16, term_rows: u16, pixel_w: u16, pixel_h: u16) -> Layout {
    let (cell_w, cell_h) = if pixel_w == 0 || pixel_h == 0 || term_cols == 0 || term_rows == 0 {
        FALLBACK_CELL
    } else {
        ((pixel_w / term_cols).max(1), (pixel_h / term_rows).max(1))
    };
    Layout {
        cols: term_cols,
        grid_top: 1,
        grid_rows: term_rows.saturating_sub(2),
        status_row: term_rows.saturating_sub(1),
        cell_w,
        cell_h,
    }
}

pub(super) enum ImageStatus {
    Loading,
    /// Transmitted to the terminal; only its pixel size is kept here.
    Ready { width: u32, height: u32 },
    Failed(String),
}

/// The one image the terminal currently holds (or is waiting for).
pub(super) struct ImageSlot {
    pub object: String,
    pub status: ImageStatus,
}

pub(super) struct ViewState {
    /// Grid selection as a global match index.
    pub cursor: usize,
    /// Grid scroll offset in terminal lines.
    pub scroll: u32,
    pub image: Option<ImageSlot>,
}

impl ViewState {
    pub(super) fn new() -> Self {
        Self {
            cursor: 0,
            scroll: 0,
            image: None,
        }
    }

    /// Back to the top after a new submission.
    pub(super) fn reset(&mut self) {
        self.cursor = 0;
        self.scroll = 0;
    }

    /// Keep the cursor on an existing match and the scroll in range.
    pub(super) fn clamp(&mut self, grouped: &Grouped, model: &ViewportModel, height: u32) {
        self.cursor = self.cursor.min(grouped.total().saturating_sub(1));
        self.scroll = self.scroll.min(model.max_scroll(height));
    }

    /// Scroll so the cursor row (and the header right above it) is visible.
    pub(super) fn reveal_cursor(&mut self, grouped: &Grouped, model: &ViewportModel, height: u32) {
        let Some(row) = grouped.row_of(self.cursor) else {
            return;
        };
        if row > 0 && matches!(grouped.rows.get(row - 1), Some(GridRow::Header { .. })) {
            self.scroll = model.scroll_to_reveal(row - 1, self.scroll, height);
        }
        self.scroll = model.scroll_to_reveal(row, self.scroll, height);
    }
}

// ---------------------------------------------------------------------------
// Grid cursor movement
// ---------------------------------------------------------------------------

/// Move the cursor `delta` image rows, keeping its column where possible.
/// Header rows are skipped; group boundaries are crossed freely.
pub(super) fn move_rows(grouped: &Grouped, cursor: usize, delta: isize) -> usize {
    let image_rows: Vec<&std::ops::Range<usize>> = grouped
        .rows
        .iter()
        .filter_map(|r| match r {
            GridRow::Images { range, .. } => Some(range),
            GridRow::Header { .. } => None,
        })
        .collect();
    if image_rows.is_empty() {
        return 0;
    }
    let Some(pos) = image_rows.iter().position(|r| r.contains(&cursor)) else {
        return 0;
    };
    let column = cursor - image_rows[pos].start;
    let target = pos.saturating_add_signed(delta).min(image_rows.len() - 1);
    let range = image_rows[target];
    range.start + column.min(range.len() - 1)
}

/// Move the cursor `delta` matches in reading order.
pub(super) fn move_items(grouped: &Grouped, cursor: usize, delta: isize) -> usize {
    let last = grouped.total().saturating_sub(1);
    cursor.saturating_add_signed(delta).min(last)
}

/// Number of image rows in half a screen.
pub(super) fn half_page_rows(grid_rows: u16, image_row_height: u16) -> isize {
    ((grid_rows / 2) / image_row_height.max(1)).max(1) as isize
}

// ---------------------------------------------------------------------------
// Image geometry
// ---------------------------------------------------------------------------

/// Width and height from a PNG's IHDR chunk.
pub(super) fn png_dimensions(png: &[u8]) -> Option<(u32, u32)> {
    if png.len() < 24 || &png[..8] != b"\x89PNG\r\n\x1a\n" || &png[12..16] != b"IHDR" {
        return None;
    }
    let w = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
    let h = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    (w > 0 && h > 0).then_some((w, h))
}

/// Cells an image should occupy to fit `area` (cols, rows) without
/// distorting its aspect ratio.
pub(super) fn fit_cells(img: (u32, u32), area: (u16, u16), cell: (u16, u16)) -> (u16, u16) {
    let (iw, ih) = (img.0.max(1) as f64, img.1.max(1) as f64);
    let area_w = area.0 as f64 * cell.0 as f64;
    let area_h = area.1 as f64 * cell.1 as f64;
    let scale = (area_w / iw).min(area_h / ih);
    let cols = ((iw * scale) / cell.0 as f64).floor() as u16;
    let rows = ((ih * scale) / cell.1 as f64).floor() as u16;
    (cols.clamp(1, area.0.max(1)), rows.clamp(1, area.1.max(1)))
}

// ---------------------------------------------------------------------------
// Status bar text
// ---------------------------------------------------------------------------

pub(super) fn status_text<T: Transport>(
    session: &Session<T>,
    view: &ViewState,
    acc_peek: Option<u32>,
    flash: Option<&str>,
) -> String {
    let fetch = session.fetch();
    let grouped = session.grouped();

    let query = match session.phase() {
        QueryPhase::Idle => "no query".to_string(),
        QueryPhase::Scanning => "scanning…".to_string(),
        QueryPhase::Failed(_) => "query failed".to_string(),
        QueryPhase::Ready => {
            let loaded = fetch.items().len();
            if let Some(e) = fetch.error() {
                format!("{loaded} loaded, stopped: {}", e.user_message())
            } else if fetch.is_fetching() {
                format!("{loaded} loaded, fetching…")
            } else if fetch.has_more() {
                format!("{loaded} loaded, more")
            } else {
                format!("{loaded} loaded")
            }
        }
    };

    let mut parts = vec![query];
    if grouped.group_count > 0 {
        let dim = session.group_dimension().unwrap_or_default();
        parts.push(format!(
            "{} group{} by {dim}",
            grouped.group_count,
            if grouped.group_count == 1 { "" } else { "s" }
        ));
    }
    let count = session.count().label();
    if !count.is_empty() {
        parts.push(count);
    }
    let position = match session.nav().state() {
        NavState::Viewing(i) => Some(format!("{} / {}", i + 1, grouped.total())),
        NavState::AwaitingNext => Some("loading…".to_string()),
        NavState::Closed if grouped.total() > 0 => {
            Some(format!("{} / {}", view.cursor + 1, grouped.total()))
        }
        NavState::Closed => None,
    };
    parts.extend(position);
    parts.push(format!("{} cols", session.columns()));

    let tail = if let Some(msg) = flash {
        msg.to_string()
    } else if let Some(n) = acc_peek {
        format!(":{n}_")
    } else if session.nav().is_open() {
        "[h/l:prev/next o:open y:yank q:close]".to_string()
    } else {
        "[/:pattern m:mode Tab:group +/-:cols Enter:view ::cmd q:quit]".to_string()
    };
    parts.push(tail);

    format!(" {}", parts.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::{Recorder, item, page};
    use crate::group::group;
    use crate::query::{QueryKey, QueryMode};
    use crate::session::SessionConfig;
    use crate::viewport::RowHeights;
    use std::sync::Arc;

    fn grouped(entries: &[(&str, &str)], columns: usize) -> Grouped {
        let items: Vec<_> = entries
            .iter()
            .map(|(o, x)| Arc::new(item(o, &[("x", x)])))
            .collect();
        group(&items, Some("x"), columns)
    }

    #[test]
    fn move_rows_keeps_column_and_crosses_groups() {
        // x=1: [a b c] [d], x=2: [e f]
        let g = grouped(
            &[("a", "1"), ("b", "1"), ("c", "1"), ("d", "1"), ("e", "2"), ("f", "2")],
            3,
        );
        assert_eq!(move_rows(&g, 1, 1), 3); // b -> d (short row, clamp column)
        assert_eq!(move_rows(&g, 3, 1), 4); // d -> e
        assert_eq!(move_rows(&g, 2, 2), 5); // c -> f
        assert_eq!(move_rows(&g, 5, 10), 5);
        assert_eq!(move_rows(&g, 5, -1), 3);
        assert_eq!(move_rows(&g, 4, -5), 0);
        assert_eq!(move_rows(&Grouped::default(), 0, 1), 0);
    }

    #[test]
    fn move_items_clamps() {
        let g = grouped(&[("a", "1"), ("b", "1")], 2);
        assert_eq!(move_items(&g, 0, 1), 1);
        assert_eq!(move_items(&g, 1, 1), 1);
        assert_eq!(move_items(&g, 1, -3), 0);
    }

    #[test]
    fn half_page() {
        assert_eq!(half_page_rows(40, 3), 6);
        assert_eq!(half_page_rows(2, 3), 1);
    }

    #[test]
    fn reveal_includes_header() {
        let g = grouped(&[("a", "1"), ("b", "2")], 2);
        // rows: H I H I, heights 1/3 → offsets 0,1,4,5,8
        let model = ViewportModel::new(&g.rows, false, RowHeights::default());
        let mut view = ViewState::new();
        view.cursor = 1;
        view.reveal_cursor(&g, &model, 4);
        assert_eq!(view.scroll, 4);
        view.cursor = 0;
        view.reveal_cursor(&g, &model, 4);
        assert_eq!(view.scroll, 0);
    }

    #[test]
    fn png_header_parsing() {
        let img = image::RgbImage::new(7, 5);
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(png_dimensions(buf.get_ref()), Some((7, 5)));
        assert_eq!(png_dimensions(b"GIF89a"), None);
    }

    #[test]
    fn fit_preserves_aspect() {
        // 80x20 cells of 10x20 px = 800x400 px area; 1000x1000 image → 400x400
        assert_eq!(fit_cells((1000, 1000), (80, 20), (10, 20)), (40, 20));
        // wide image limited by width
        assert_eq!(fit_cells((1600, 200), (80, 20), (10, 20)), (80, 5));
        assert_eq!(fit_cells((1, 1), (0, 0), (10, 20)), (1, 1));
    }

    #[test]
    fn status_reflects_session() {
        let mut s = Session::new(
            Recorder::default(),
            SessionConfig {
                page_size: 25,
                columns: 4,
                group_by: None,
                heights: RowHeights::default(),
                lookahead: 8,
            },
        );
        let view = ViewState::new();
        assert!(status_text(&s, &view, None, None).starts_with(" no query"));

        let v = s.submit(QueryKey::new("gs://b/%x%.jpg", QueryMode::Percent)).unwrap();
        assert!(status_text(&s, &view, None, None).contains("scanning…"));
        assert!(status_text(&s, &view, None, None).contains("counting…"));

        s.on_page(v, Ok(page(&["x"], vec![item("a", &[("x", "1")])], Some("c"))));
        s.on_count(v, Ok(1234));
        let text = status_text(&s, &view, None, None);
        assert!(text.contains("1 loaded, more"), "{text}");
        assert!(text.contains("1 group by x"), "{text}");
        assert!(text.contains("1,234 files"), "{text}");
        assert!(text.contains("1 / 1"), "{text}");

        s.open(0);
        s.navigate(crate::navigation::Direction::Next);
        let text = status_text(&s, &view, None, Some("Yanked a"));
        assert!(text.contains("loading…"), "{text}");
        assert!(text.ends_with("Yanked a"), "{text}");
    }
}
