//! What the overlay should show.

use crate::domain::Item;
use crate::feed::FeedState;

use super::rotation::RotationState;

/// Shown under every slide.
pub const EXIT_HINT: &str = "Move mouse or press any key to exit";

/// Overlay content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Overlay not mounted (user active).
    Hidden,

    /// Waiting for the first batch.
    Loading,

    /// Nothing to show and the last fetch failed; offers a manual retry.
    Failed { message: String },

    /// Fetch finished without items.
    Empty,

    Slide(Slide),
}

/// One item on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub item: Item,
    pub index: usize,
    pub total: usize,
    /// Non-blocking notice, e.g. that the items are stale.
    pub notice: Option<String>,
}

impl Slide {
    /// One marker per item, the current one highlighted.
    pub fn progress(&self) -> String {
        (0..self.total)
            .map(|i| if i == self.index { "━━" } else { "•" })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Pick the view for the current rotation and feed state.
///
/// `rotation` is `None` while dormant.
pub fn compose(rotation: Option<&RotationState>, feed: &FeedState) -> View {
    let Some(rotation) = rotation else {
        return View::Hidden;
    };

    if feed.items.is_empty() {
        if feed.loading {
            return View::Loading;
        }
        if let Some(ref message) = feed.error {
            return View::Failed {
                message: message.clone(),
            };
        }
        return View::Empty;
    }

    let total = feed.items.len();
    let index = rotation.current_index().unwrap_or(0).min(total - 1);

    View::Slide(Slide {
        item: feed.items[index].clone(),
        index,
        total,
        notice: feed.error.clone(),
    })
}

/// Draws views. Implemented by whatever hosts the overlay.
pub trait Renderer: Send {
    fn render(&mut self, view: &View);
}
