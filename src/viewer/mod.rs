//! Terminal image-grid browser with Kitty Graphics Protocol
//!
//! Layout:
//!   row 0               : pattern line (`[mode] gs://bucket/...`)
//!   rows 1..term_rows-1 : grid (virtualized text rows) or detail viewer
//!   row term_rows-1     : status bar / input bar
//!
//! Threads:
//!   The UI thread owns the `Session` and does all state mutation. Network
//!   and image decoding run on the worker (see `crate::worker`); replies
//!   are drained with `try_recv` on every loop iteration and fed back into
//!   the session. The session's dirty flag schedules a redraw, throttled to
//!   the frame budget.
//!
//! Kitty response suppression:
//!   All Kitty Graphics Protocol commands use `q=2` (suppress all responses).
//!   Without this, error responses are delivered as APC sequences that
//!   crossterm misparses as key events. The viewer never reads Kitty
//!   responses, so this is always safe.
//!
//! Only the image currently shown in the detail viewer lives in the
//! terminal (one Kitty image ID); it is replaced on every navigation step.

mod input;
mod mode_command;
mod mode_grid;
mod mode_prompt;
mod mode_viewer;
mod state;
mod terminal;

use crossterm::{
    event::{self, Event, KeyEvent, KeyEventKind},
    terminal as crossterm_terminal,
};
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::{Backend, HttpBackend};
use crate::config::Config;
use crate::navigation::{Direction, NavState};
use crate::query::{QueryKey, QueryMode};
use crate::session::{Session, SessionConfig};
use crate::worker::{Job, Reply, Transport, Worker};

use input::{InputAccumulator, map_edit_key, map_grid_key, map_viewer_key};
use mode_command::CommandState;
use mode_grid::GridCtx;
use mode_prompt::PromptState;
use state::{ImageSlot, ImageStatus, Layout, ViewState};
use terminal::IMAGE_ID;

/// Worker replies are drained at least this often while idle.
const REPLY_POLL: Duration = Duration::from_millis(50);

/// Side effects requested by mode handlers, applied by the event loop.
enum Effect {
    Exit,
    SetMode(ViewerMode),
    /// Move the grid cursor to a global match index.
    MoveCursor(usize),
    Open(usize),
    Close,
    Navigate(Direction),
    Submit(QueryKey),
    Resubmit,
    ToggleMode,
    SetQueryMode(QueryMode),
    GroupBy(String),
    CycleGroup { forward: bool },
    SetColumns(usize),
    CycleColumns { forward: bool },
    OpenUrl(String),
    Yank(String),
    Flash(String),
    RedrawStatusBar,
    MarkDirty,
}

/// Input mode. Whether `Normal` shows the grid or the detail viewer is
/// decided by the session's navigation state.
enum ViewerMode {
    Normal,
    Prompt(PromptState),
    Command(CommandState),
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Exit,
}

struct App<T: Transport> {
    session: Session<T>,
    view: ViewState,
    mode: ViewerMode,
    acc: InputAccumulator,
    /// Flash message (e.g. "Yanked ..."), cleared on next keypress
    flash: Option<String>,
    /// Mode offered by the prompt before anything was submitted.
    default_mode: QueryMode,
    image_row_height: u16,
    dirty: bool,
}

/// Run the terminal browser.
pub fn run(config: Config) -> anyhow::Result<()> {
    terminal::check_tty()?;

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(
        &config.server,
        config.request_timeout,
        config.viewer.max_image_bytes,
    ));
    let worker = Worker::spawn(backend);
    let session = Session::new(
        worker.jobs.clone(),
        SessionConfig {
            page_size: config.page_size,
            columns: config.grid.columns,
            group_by: config.grid.group_by.clone(),
            heights: config.grid.heights,
            lookahead: config.grid.lookahead_rows,
        },
    );

    let winsize = crossterm_terminal::window_size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    if winsize.width == 0 || winsize.height == 0 {
        warn!("viewer: terminal reports no pixel size, image fit is approximate");
    }

    let mut guard = terminal::RawGuard::enter()?;
    let mut layout = state::compute_layout(winsize.columns, winsize.rows, winsize.width, winsize.height);

    let mut app = App {
        session,
        view: ViewState::new(),
        mode: ViewerMode::Normal,
        acc: InputAccumulator::new(),
        flash: None,
        default_mode: config.mode,
        image_row_height: config.grid.heights.images,
        dirty: true,
    };

    if !config.pattern.trim().is_empty()
        && let Err(e) = app
            .session
            .submit(QueryKey::new(config.pattern.as_str(), config.mode))
    {
        app.flash = Some(format!("Invalid pattern: {e}"));
        app.mode = ViewerMode::Prompt(PromptState::new(&config.pattern, config.mode));
    }

    let frame_budget = config.viewer.frame_budget;
    app.redraw(&layout)?;
    let mut last_render = Instant::now();

    loop {
        // Drain worker replies into the session.
        while let Ok(reply) = worker.replies.try_recv() {
            app.on_reply(reply)?;
        }
        app.sync_viewer()?;
        if app.session.take_dirty() {
            app.dirty = true;
        }

        let timeout = if app.dirty {
            frame_budget.saturating_sub(last_render.elapsed())
        } else {
            REPLY_POLL
        };

        if event::poll(timeout)? {
            let ev = event::read()?;
            debug!("event: {:?}", ev);
            match ev {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    // Clear flash message on any keypress
                    let had_flash = app.flash.take().is_some();
                    let effects = app.handle_key(key, &layout);
                    if app.apply(effects, &layout)? == Flow::Exit {
                        break;
                    }
                    if had_flash {
                        app.draw_bar(&layout)?;
                    }
                }
                Event::Resize(cols, rows) => {
                    let ws = crossterm_terminal::window_size()?;
                    layout = state::compute_layout(cols, rows, ws.width, ws.height);
                    debug!("resize: {cols}x{rows}");
                    app.dirty = true;
                }
                _ => {}
            }
            continue;
        }

        // poll timeout → frame budget elapsed, execute redraw
        if app.dirty {
            app.redraw(&layout)?;
        }
        last_render = Instant::now();
    }

    info!("viewer: exit");
    guard.cleanup();
    Ok(())
}

impl<T: Transport> App<T> {
    fn on_reply(&mut self, reply: Reply) -> io::Result<()> {
        match reply {
            Reply::Page { version, result } => self.session.on_page(version, result),
            Reply::Count { version, result } => self.session.on_count(version, result),
            Reply::Image { object, result } => {
                let Some(slot) = self.view.image.as_mut().filter(|s| s.object == object) else {
                    debug!("viewer: dropping image for {object}, no longer shown");
                    return Ok(());
                };
                slot.status = match result {
                    Ok(png) => match state::png_dimensions(&png) {
                        Some((width, height)) => {
                            terminal::send_image(&png, IMAGE_ID)?;
                            debug!("viewer: image {object} {width}x{height} ({} bytes)", png.len());
                            ImageStatus::Ready { width, height }
                        }
                        None => ImageStatus::Failed("not a PNG".into()),
                    },
                    Err(msg) => {
                        warn!("viewer: image {object} failed: {msg}");
                        ImageStatus::Failed(msg)
                    }
                };
                self.dirty = true;
            }
        }
        Ok(())
    }

    /// Follow the navigator: keep the grid cursor on the viewed match and
    /// make sure the terminal holds (or is fetching) its image.
    fn sync_viewer(&mut self) -> io::Result<()> {
        if let NavState::Viewing(i) = self.session.nav().state()
            && self.view.cursor != i
        {
            self.view.cursor = i;
            self.dirty = true;
        }

        match self.session.selected_match() {
            Some(m) => {
                if self.view.image.as_ref().is_some_and(|s| s.object == m.object) {
                    return Ok(());
                }
                if self.view.image.take().is_some() {
                    terminal::delete_image(IMAGE_ID)?;
                }
                debug!("viewer: requesting image {}", m.object);
                self.session.transport().dispatch(Job::Image {
                    object: m.object.clone(),
                    url: m.url.clone(),
                });
                self.view.image = Some(ImageSlot {
                    object: m.object.clone(),
                    status: ImageStatus::Loading,
                });
                self.dirty = true;
            }
            None if !self.session.nav().is_open() => {
                if self.view.image.take().is_some() {
                    terminal::delete_image(IMAGE_ID)?;
                    self.dirty = true;
                }
            }
            // Awaiting the next page: keep the previous image until it is replaced.
            None => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent, layout: &Layout) -> Vec<Effect> {
        match &mut self.mode {
            ViewerMode::Prompt(ps) => map_edit_key(key)
                .map(|a| mode_prompt::handle(a, ps))
                .unwrap_or_default(),
            ViewerMode::Command(cs) => map_edit_key(key)
                .map(|a| mode_command::handle(a, cs))
                .unwrap_or_default(),
            ViewerMode::Normal if self.session.nav().is_open() => map_viewer_key(key)
                .map(|a| mode_viewer::handle(a, self.session.selected_match()))
                .unwrap_or_default(),
            ViewerMode::Normal => match map_grid_key(key, &mut self.acc) {
                Some(action) => {
                    let ctx = GridCtx {
                        grouped: self.session.grouped(),
                        cursor: self.view.cursor,
                        half_page: state::half_page_rows(layout.grid_rows, self.image_row_height),
                        key: self.session.fetch().key(),
                        default_mode: self.default_mode,
                    };
                    mode_grid::handle(action, &ctx)
                }
                None => {
                    // Unknown key: reset accumulator
                    if self.acc.is_active() {
                        self.acc.reset();
                        vec![Effect::RedrawStatusBar]
                    } else {
                        vec![]
                    }
                }
            },
        }
    }

    fn apply(&mut self, effects: Vec<Effect>, layout: &Layout) -> io::Result<Flow> {
        for effect in effects {
            match effect {
                Effect::Exit => return Ok(Flow::Exit),
                Effect::SetMode(mode) => self.mode = mode,
                Effect::MoveCursor(i) => {
                    self.view.cursor = i;
                    self.reveal(layout);
                    self.dirty = true;
                }
                Effect::Open(i) => {
                    if self.session.open(i) {
                        self.view.cursor = i;
                    }
                }
                Effect::Close => {
                    self.session.close();
                    self.reveal(layout);
                }
                Effect::Navigate(dir) => {
                    let state = self.session.navigate(dir);
                    debug!("viewer: navigate {dir:?} → {state:?}");
                }
                Effect::Submit(key) => self.submit(key),
                Effect::Resubmit => match self.session.fetch().key().cloned() {
                    Some(key) => self.submit(key),
                    None => self.flash = Some("Nothing to refresh".into()),
                },
                Effect::ToggleMode => {
                    let mode = self
                        .session
                        .fetch()
                        .key()
                        .map(|k| k.mode)
                        .unwrap_or(self.default_mode)
                        .toggled();
                    self.switch_mode(mode);
                }
                Effect::SetQueryMode(mode) => self.switch_mode(mode),
                Effect::GroupBy(name) => {
                    let anchor = self.anchor();
                    if self.session.set_group_by(&name) {
                        self.follow(anchor, layout);
                        self.flash = Some(format!("Grouped by {name}"));
                    } else {
                        let names = self.session.capture_names().join(", ");
                        self.flash = Some(format!("No capture named {name} (have: {names})"));
                    }
                    self.dirty = true;
                }
                Effect::CycleGroup { forward } => {
                    let anchor = self.anchor();
                    match self.session.cycle_group(forward) {
                        Some(name) => {
                            self.follow(anchor, layout);
                            self.flash = Some(format!("Grouped by {name}"));
                        }
                        None => self.flash = Some("No captures to group on".into()),
                    }
                    self.dirty = true;
                }
                Effect::SetColumns(n) => {
                    self.session.set_columns(n);
                    self.reveal(layout);
                }
                Effect::CycleColumns { forward } => {
                    let n = self.session.cycle_columns(forward);
                    self.reveal(layout);
                    self.flash = Some(format!("{n} columns"));
                    self.dirty = true;
                }
                Effect::OpenUrl(url) => {
                    debug!("viewer: open {url}");
                    self.flash = Some(match open::that(&url) {
                        Ok(()) => "Opened in browser".into(),
                        Err(e) => format!("Failed to open: {e}"),
                    });
                    self.dirty = true;
                }
                Effect::Yank(text) => {
                    if let Err(e) = terminal::send_osc52(&text) {
                        debug!("OSC 52 failed: {e}");
                    }
                }
                Effect::Flash(msg) => self.flash = Some(msg),
                Effect::RedrawStatusBar => self.draw_bar(layout)?,
                Effect::MarkDirty => self.dirty = true,
            }
        }
        Ok(Flow::Continue)
    }

    fn submit(&mut self, key: QueryKey) {
        match self.session.submit(key) {
            Ok(version) => {
                info!("viewer: submitted {version}");
                self.mode = ViewerMode::Normal;
                self.view.reset();
            }
            Err(e) => self.flash = Some(format!("Invalid pattern: {e}")),
        }
        self.dirty = true;
    }

    /// Resubmit the current pattern under `mode`.
    fn switch_mode(&mut self, mode: QueryMode) {
        self.default_mode = mode;
        match self.session.fetch().key().cloned() {
            Some(key) if key.mode == mode => self.flash = Some(format!("Already in {mode} mode")),
            Some(key) => self.submit(QueryKey::new(key.pattern, mode)),
            None => self.flash = Some(format!("Mode: {mode}")),
        }
        self.dirty = true;
    }

    /// Object under the grid cursor, to find it again after a regroup.
    fn anchor(&self) -> Option<String> {
        self.session
            .grouped()
            .matches
            .get(self.view.cursor)
            .map(|m| m.object.clone())
    }

    fn follow(&mut self, anchor: Option<String>, layout: &Layout) {
        let grouped = self.session.grouped();
        self.view.cursor = anchor
            .and_then(|o| grouped.matches.iter().position(|m| m.object == o))
            .unwrap_or(0);
        self.view.scroll = 0;
        self.reveal(layout);
    }

    fn reveal(&mut self, layout: &Layout) {
        let model = self.session.viewport();
        self.view
            .reveal_cursor(self.session.grouped(), &model, layout.grid_rows as u32);
    }

    fn redraw(&mut self, layout: &Layout) -> io::Result<()> {
        let start = Instant::now();
        terminal::delete_placements(IMAGE_ID)?;
        terminal::clear_screen()?;

        let (mode, pattern) = match self.session.fetch().key() {
            Some(k) => (k.mode, k.pattern.as_str()),
            None => (self.default_mode, ""),
        };
        terminal::draw_title(layout, mode.as_str(), pattern)?;

        if self.session.nav().is_open() {
            mode_viewer::draw_viewer_screen(layout, &self.session, &self.view)?;
        } else {
            let model = self.session.viewport();
            self.view
                .clamp(self.session.grouped(), &model, layout.grid_rows as u32);
            let range = mode_grid::draw_grid_screen(layout, &self.session, &self.view)?;
            if let Some(last) = range.end.checked_sub(1) {
                self.session.on_visible_rows(last);
            }
        }
        self.draw_bar(layout)?;
        self.dirty = false;
        debug!("redraw: {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    fn draw_bar(&self, layout: &Layout) -> io::Result<()> {
        match (&self.mode, &self.flash) {
            (ViewerMode::Normal, _) => {
                let text = state::status_text(
                    &self.session,
                    &self.view,
                    self.acc.peek(),
                    self.flash.as_deref(),
                );
                terminal::draw_status_bar(layout, &text)
            }
            (ViewerMode::Prompt(_) | ViewerMode::Command(_), Some(flash)) => {
                terminal::draw_status_bar(layout, &format!(" {flash}"))
            }
            (ViewerMode::Prompt(ps), None) => terminal::draw_input_bar(layout, &ps.prefix(), &ps.input),
            (ViewerMode::Command(cs), None) => terminal::draw_input_bar(layout, ":", &cs.input),
        }
    }
}
