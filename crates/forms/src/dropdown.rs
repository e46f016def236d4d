//! Dropdown panel sizing.
//!
//! A panel opens at least as wide as its anchor and at most as wide as the
//! configured maximum (800 px by default). While the open animation runs it
//! carries a temporary style with those bounds; once it has settled the
//! width of the rendered content decides the final width. The temporary
//! style is removed when the panel closes (after a short delay) and when the
//! owning field is torn down.
//!
//! The host renders the panel and implements [`DropdownSurface`]; the
//! geometry itself is plain arithmetic and lives in free functions.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use crate::reactive::Cell;
use crate::schedule::{Scheduler, Timing};

pub const DEFAULT_MAX_WIDTH: f64 = 800.0;
/// Padding and border of the panel; the item list is this much narrower.
pub const INNER_INSET: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Width limits applied while the panel opens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProvisionalStyle {
    pub panel: Bounds,
    pub items: Bounds,
}

/// Fixed widths applied once the panel has settled. The item list hides
/// horizontal overflow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinalDimensions {
    pub panel_width: f64,
    pub items_width: f64,
}

impl FinalDimensions {
    pub fn new(panel_width: f64) -> Self {
        Self {
            panel_width,
            items_width: panel_width - INNER_INSET,
        }
    }
}

pub fn provisional_style(anchor_width: f64, max_width: Option<f64>) -> ProvisionalStyle {
    let max = anchor_width.max(max_width.unwrap_or(DEFAULT_MAX_WIDTH));
    ProvisionalStyle {
        panel: Bounds {
            min: anchor_width,
            max,
        },
        items: Bounds {
            min: anchor_width - INNER_INSET,
            max: max - INNER_INSET,
        },
    }
}

/// Final panel width from the measured content width.
///
/// Later rules override earlier ones: the content width, unless the anchor
/// is wider than the maximum; the anchor width when the content fits into
/// it; the maximum when the content exceeds it.
pub fn settle_width(content_width: f64, anchor_width: f64, max_width: Option<f64>) -> f64 {
    let max = max_width.unwrap_or(DEFAULT_MAX_WIDTH);
    let mut width = content_width;
    if anchor_width > max {
        width = anchor_width;
    }
    if content_width <= anchor_width {
        width = anchor_width;
    }
    if content_width > max {
        width = max;
    }
    width
}

/// The rendered panel, as far as sizing is concerned.
pub trait DropdownSurface: Send + Sync {
    /// Width of the control the panel hangs from.
    fn anchor_width(&self) -> f64;

    /// Natural width of the item list, `None` while the panel is not
    /// rendered.
    fn content_width(&self) -> Option<f64>;

    fn apply_provisional(&self, style_id: &str, style: &ProvisionalStyle);

    fn apply_final(&self, dimensions: &FinalDimensions);

    fn remove_styles(&self, style_id: &str);
}

struct DropdownState {
    scheduler: Arc<dyn Scheduler>,
    timing: Timing,
    surface: Mutex<Option<Arc<dyn DropdownSurface>>>,
    style_id: Mutex<Option<String>>,
    max_width: Mutex<Option<f64>>,
    /// Bumped on every open and close; timers of an older cycle do nothing.
    cycle: AtomicU64,
    torn_down: AtomicBool,
}

/// Open/close state of one dropdown and the deferred sizing work.
#[derive(Clone)]
pub struct Dropdown {
    state: Arc<DropdownState>,
    open: Cell<bool>,
}

impl Dropdown {
    pub fn new(scheduler: Arc<dyn Scheduler>, timing: Timing) -> Self {
        Self {
            state: Arc::new(DropdownState {
                scheduler,
                timing,
                surface: Mutex::new(None),
                style_id: Mutex::new(None),
                max_width: Mutex::new(None),
                cycle: AtomicU64::new(0),
                torn_down: AtomicBool::new(false),
            }),
            open: Cell::new(false),
        }
    }

    pub fn attach(&self, surface: Arc<dyn DropdownSurface>) {
        *self.state.surface.lock().unwrap_or_else(PoisonError::into_inner) = Some(surface);
    }

    pub fn is_open(&self) -> &Cell<bool> {
        &self.open
    }

    /// Size and open the panel for the control `id`.
    pub fn open(&self, id: &str, max_width: Option<f64>) {
        if self.state.torn_down.load(Ordering::SeqCst) {
            return;
        }
        let cycle = self.state.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.max_width.lock().unwrap_or_else(PoisonError::into_inner) = max_width;

        if let Some(surface) = self.state.surface() {
            self.state.remove_styles(surface.as_ref());
            let style_id = format!("dropdown-styles-{id}");
            let style = provisional_style(surface.anchor_width(), max_width);
            debug!(%style_id, ?style, "dropdown opening");
            surface.apply_provisional(&style_id, &style);
            *self.state.style_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(style_id);

            let state = Arc::downgrade(&self.state);
            self.state.scheduler.after(
                self.state.timing.dropdown_settle(),
                Box::new(move || settle(&state, cycle)),
            );
        }
        self.open.set(true);
    }

    /// Close the panel; its temporary styling goes away after
    /// [`Timing::dropdown_close`].
    pub fn close(&self) {
        if !self.open.get() {
            return;
        }
        let cycle = self.state.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.set(false);
        let state = Arc::downgrade(&self.state);
        self.state.scheduler.after(
            self.state.timing.dropdown_close(),
            Box::new(move || {
                if let Some(state) = state.upgrade() {
                    if state.cycle.load(Ordering::SeqCst) == cycle {
                        if let Some(surface) = state.surface() {
                            state.remove_styles(surface.as_ref());
                        }
                    }
                }
            }),
        );
    }

    /// Scroll somewhere on the page. Scrolling the panel itself keeps it open.
    pub fn on_scroll(&self, inside_panel: bool) {
        if !inside_panel {
            self.close();
        }
    }

    /// Pointer pressed somewhere on the page.
    pub fn on_pointer_down(&self, inside_control_or_panel: bool) {
        if !inside_control_or_panel {
            self.close();
        }
    }

    /// Drop styling immediately; nothing scheduled earlier will run.
    pub fn teardown(&self) {
        self.state.torn_down.store(true, Ordering::SeqCst);
        self.state.cycle.fetch_add(1, Ordering::SeqCst);
        self.open.set(false);
        if let Some(surface) = self.state.surface() {
            self.state.remove_styles(surface.as_ref());
        }
    }
}

impl DropdownState {
    fn surface(&self) -> Option<Arc<dyn DropdownSurface>> {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remove_styles(&self, surface: &dyn DropdownSurface) {
        let style_id = self
            .style_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(style_id) = style_id {
            surface.remove_styles(&style_id);
        }
    }
}

fn settle(state: &Weak<DropdownState>, cycle: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    if state.cycle.load(Ordering::SeqCst) != cycle {
        return;
    }
    let Some(surface) = state.surface() else {
        return;
    };
    let Some(content) = surface.content_width() else {
        return;
    };
    let max_width = *state.max_width.lock().unwrap_or_else(PoisonError::into_inner);
    let width = settle_width(content, surface.anchor_width(), max_width);
    debug!(content, width, "dropdown settled");
    surface.apply_final(&FinalDimensions::new(width));
}

impl fmt::Debug for Dropdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dropdown")
            .field("open", &self.open.get())
            .field("cycle", &self.state.cycle.load(Ordering::SeqCst))
            .finish()
    }
}
