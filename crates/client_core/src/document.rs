//! Host document seam: element lookup, geometry, activation, and highlight.

use std::{
    collections::HashSet,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::domain::ElementHandle;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

/// The signals the clickability classifier reads from one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementTraits {
    pub tag: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub has_click_handler: bool,
}

impl ElementTraits {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// Elements are referenced by handle only; any lookup may find the element gone.
pub trait HostDocument: Send + Sync {
    fn viewport(&self) -> Viewport;
    /// Topmost element at viewport coordinates.
    fn element_at(&self, x: f64, y: f64) -> Option<ElementHandle>;
    fn is_document_root(&self, element: ElementHandle) -> bool;
    fn traits_of(&self, element: ElementHandle) -> Option<ElementTraits>;
    /// Bounding box relative to the viewport.
    fn client_rect(&self, element: ElementHandle) -> Option<Rect>;
    /// Native activation (click). `false` when the element no longer exists.
    fn activate(&self, element: ElementHandle) -> bool;
    fn set_tint(&self, element: ElementHandle, tinted: bool);
    /// Page-relative highlight box, or `None` to hide it.
    fn render_highlight(&self, highlight: Option<Rect>);
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutElement {
    #[serde(flatten)]
    pub traits: ElementTraits,
    /// Page-relative bounds.
    pub rect: Rect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Layout {
    pub viewport: Viewport,
    #[serde(default)]
    pub elements: Vec<LayoutElement>,
}

const ROOT: ElementHandle = ElementHandle(0);

/// In-memory page model: later elements paint above earlier ones, and
/// anything not covered by an element resolves to the body.
pub struct LayoutDocument {
    state: Mutex<LayoutState>,
}

struct LayoutState {
    viewport: Viewport,
    elements: Vec<Option<LayoutElement>>,
    activations: Vec<ElementHandle>,
    tinted: HashSet<ElementHandle>,
    highlight: Option<Rect>,
    highlight_renders: usize,
}

impl LayoutDocument {
    pub fn new(layout: Layout) -> Self {
        Self {
            state: Mutex::new(LayoutState {
                viewport: layout.viewport,
                elements: layout.elements.into_iter().map(Some).collect(),
                activations: Vec::new(),
                tinted: HashSet::new(),
                highlight: None,
                highlight_renders: 0,
            }),
        }
    }

    pub fn empty(width: f64, height: f64) -> Self {
        Self::new(Layout {
            viewport: Viewport {
                width,
                height,
                scroll_x: 0.0,
                scroll_y: 0.0,
            },
            elements: Vec::new(),
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read layout '{}'", path.display()))?;
        let layout: Layout = serde_json::from_str(&raw)
            .with_context(|| format!("invalid layout '{}'", path.display()))?;
        Ok(Self::new(layout))
    }

    fn lock(&self) -> MutexGuard<'_, LayoutState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, traits: ElementTraits, rect: Rect) -> ElementHandle {
        let mut state = self.lock();
        state.elements.push(Some(LayoutElement { traits, rect }));
        ElementHandle(state.elements.len() as u64)
    }

    pub fn remove(&self, element: ElementHandle) {
        let mut state = self.lock();
        if let Some(slot) = slot_index(element).and_then(|i| state.elements.get_mut(i)) {
            *slot = None;
        }
    }

    pub fn scroll_to(&self, scroll_x: f64, scroll_y: f64) {
        let mut state = self.lock();
        state.viewport.scroll_x = scroll_x;
        state.viewport.scroll_y = scroll_y;
    }

    pub fn activations(&self) -> Vec<ElementHandle> {
        self.lock().activations.clone()
    }

    pub fn is_tinted(&self, element: ElementHandle) -> bool {
        self.lock().tinted.contains(&element)
    }

    pub fn highlight(&self) -> Option<Rect> {
        self.lock().highlight
    }

    pub fn highlight_renders(&self) -> usize {
        self.lock().highlight_renders
    }
}

fn slot_index(element: ElementHandle) -> Option<usize> {
    (element.0 as usize).checked_sub(1)
}

impl LayoutState {
    fn element(&self, element: ElementHandle) -> Option<&LayoutElement> {
        slot_index(element)
            .and_then(|i| self.elements.get(i))
            .and_then(Option::as_ref)
    }
}

impl HostDocument for LayoutDocument {
    fn viewport(&self) -> Viewport {
        self.lock().viewport
    }

    fn element_at(&self, x: f64, y: f64) -> Option<ElementHandle> {
        let state = self.lock();
        let page_x = x + state.viewport.scroll_x;
        let page_y = y + state.viewport.scroll_y;
        let hit = state
            .elements
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, element)| {
                element
                    .as_ref()
                    .filter(|element| element.rect.contains(page_x, page_y))
                    .map(|_| ElementHandle(i as u64 + 1))
            });
        Some(hit.unwrap_or(ROOT))
    }

    fn is_document_root(&self, element: ElementHandle) -> bool {
        element == ROOT
    }

    fn traits_of(&self, element: ElementHandle) -> Option<ElementTraits> {
        if element == ROOT {
            return Some(ElementTraits::tag("body"));
        }
        self.lock()
            .element(element)
            .map(|element| element.traits.clone())
    }

    fn client_rect(&self, element: ElementHandle) -> Option<Rect> {
        let state = self.lock();
        let viewport = state.viewport;
        state
            .element(element)
            .map(|element| element.rect.translated(-viewport.scroll_x, -viewport.scroll_y))
    }

    fn activate(&self, element: ElementHandle) -> bool {
        let mut state = self.lock();
        if state.element(element).is_none() {
            return false;
        }
        state.activations.push(element);
        true
    }

    fn set_tint(&self, element: ElementHandle, tinted: bool) {
        let mut state = self.lock();
        if tinted {
            if state.element(element).is_some() {
                state.tinted.insert(element);
            }
        } else {
            state.tinted.remove(&element);
        }
    }

    fn render_highlight(&self, highlight: Option<Rect>) {
        let mut state = self.lock();
        state.highlight = highlight;
        state.highlight_renders += 1;
    }
}
