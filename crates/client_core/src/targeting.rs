//! Gaze-driven snapping, highlighting, and double-blink activation.

use std::time::{Duration, Instant};

use shared::domain::{ElementHandle, GazeSample};
use tracing::{debug, warn};

use crate::document::{ElementTraits, HostDocument, Rect};

const INTERACTIVE_TAGS: &[&str] = &["a", "button", "input", "select", "textarea", "label"];
const INTERACTIVE_ROLES: &[&str] = &["button", "link", "menuitem", "tab", "checkbox", "radio"];
const CLICKABLE_CLASS_HINTS: &[&str] = &["btn", "button", "link", "clickable"];

/// Any single signal suffices.
pub fn is_clickable(traits: &ElementTraits) -> bool {
    let tag = traits.tag.to_ascii_lowercase();
    if INTERACTIVE_TAGS.contains(&tag.as_str()) {
        return true;
    }
    if traits.has_click_handler {
        return true;
    }
    if let Some(role) = &traits.role {
        if INTERACTIVE_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    if traits
        .cursor
        .as_deref()
        .is_some_and(|cursor| cursor.trim().eq_ignore_ascii_case("pointer"))
    {
        return true;
    }
    if traits.editable {
        return true;
    }
    let class_name = traits.class_name.to_ascii_lowercase();
    CLICKABLE_CLASS_HINTS
        .iter()
        .any(|hint| class_name.contains(hint))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapTarget {
    pub element: ElementHandle,
    /// Page-relative, scroll offset included.
    pub highlight: Rect,
}

#[derive(Debug, Clone, Copy)]
struct PendingRevert {
    element: ElementHandle,
    due: Instant,
}

pub struct TargetingEngine {
    resolved: Option<ElementHandle>,
    target: Option<SnapTarget>,
    pending_revert: Option<PendingRevert>,
    ack_tint: Duration,
}

impl TargetingEngine {
    pub fn new(ack_tint: Duration) -> Self {
        Self {
            resolved: None,
            target: None,
            pending_revert: None,
            ack_tint,
        }
    }

    pub fn target(&self) -> Option<SnapTarget> {
        self.target
    }

    /// Returns the element activated by this sample, if any.
    pub fn on_gaze_sample(
        &mut self,
        document: &dyn HostDocument,
        sample: GazeSample,
        now: Instant,
    ) -> Option<ElementHandle> {
        if let Some(point) = sample.point() {
            let viewport = document.viewport();
            let x = point.x * viewport.width;
            let y = point.y * viewport.height;
            let resolved = document
                .element_at(x, y)
                .filter(|element| !document.is_document_root(*element));
            if resolved != self.resolved {
                self.resolved = resolved;
                self.retarget(document, resolved);
            }
        }

        if sample.double_blink {
            self.activate(document, now)
        } else {
            None
        }
    }

    fn retarget(&mut self, document: &dyn HostDocument, resolved: Option<ElementHandle>) {
        let snap = resolved.and_then(|element| {
            let traits = document.traits_of(element)?;
            if !is_clickable(&traits) {
                return None;
            }
            let viewport = document.viewport();
            let rect = document.client_rect(element)?;
            Some(SnapTarget {
                element,
                highlight: rect.translated(viewport.scroll_x, viewport.scroll_y),
            })
        });

        match snap {
            Some(snap) => {
                debug!(element = snap.element.0, "targeting: snapped");
                document.render_highlight(Some(snap.highlight));
                self.target = Some(snap);
            }
            None => self.clear_target(document),
        }
    }

    fn clear_target(&mut self, document: &dyn HostDocument) {
        if self.target.take().is_some() {
            debug!("targeting: snap cleared");
            document.render_highlight(None);
        }
    }

    fn activate(&mut self, document: &dyn HostDocument, now: Instant) -> Option<ElementHandle> {
        let Some(target) = self.target else {
            debug!("targeting: double blink without snap target");
            return None;
        };
        if document.traits_of(target.element).is_none() {
            debug!(element = target.element.0, "targeting: snap target vanished");
            self.resolved = None;
            self.clear_target(document);
            return None;
        }

        if let Some(previous) = self.pending_revert.take() {
            document.set_tint(previous.element, false);
        }
        document.set_tint(target.element, true);
        self.pending_revert = Some(PendingRevert {
            element: target.element,
            due: now + self.ack_tint,
        });

        if !document.activate(target.element) {
            warn!(element = target.element.0, "targeting: native activation failed");
            return None;
        }
        Some(target.element)
    }

    /// Reverts the acknowledgement tint once it has been shown long enough.
    pub fn poll(&mut self, document: &dyn HostDocument, now: Instant) {
        if let Some(pending) = self.pending_revert {
            if now >= pending.due {
                document.set_tint(pending.element, false);
                self.pending_revert = None;
            }
        }
    }

    pub fn reset(&mut self, document: &dyn HostDocument) {
        if let Some(pending) = self.pending_revert.take() {
            document.set_tint(pending.element, false);
        }
        self.resolved = None;
        self.clear_target(document);
    }
}

#[cfg(test)]
#[path = "tests/targeting_tests.rs"]
mod tests;
