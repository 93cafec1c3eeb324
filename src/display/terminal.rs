//! Plain-text renderer for running the overlay in a terminal.

use std::io::{self, Stdout, Write};

use tracing::warn;

use super::view::{EXIT_HINT, Renderer, Slide, View};

/// Writes each view as a block of text.
pub struct TerminalRenderer<W: Write + Send = Stdout> {
    out: W,
}

impl TerminalRenderer<Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_view(&mut self, view: &View) -> io::Result<()> {
        match view {
            View::Hidden => writeln!(self.out, "[attract] overlay hidden")?,
            View::Loading => writeln!(self.out, "[attract] Loading items...")?,
            View::Failed { message } => {
                writeln!(self.out, "[attract] Error loading items")?;
                writeln!(self.out, "  {message}")?;
                writeln!(self.out, "  Type `retry` and press Enter to retry")?;
            }
            View::Empty => writeln!(self.out, "[attract] No items to show")?,
            View::Slide(slide) => self.write_slide(slide)?,
        }
        self.out.flush()
    }

    fn write_slide(&mut self, slide: &Slide) -> io::Result<()> {
        let item = &slide.item;
        writeln!(self.out, "{}", "─".repeat(60))?;
        if let Some(ref avatar) = item.author_avatar_url {
            writeln!(self.out, "  [avatar] {avatar}")?;
        }
        writeln!(self.out, "  {}", item.title)?;
        if let Some(ref subtitle) = item.subtitle {
            for line in subtitle.lines() {
                writeln!(self.out, "    {line}")?;
            }
        }
        writeln!(
            self.out,
            "  by {} • @{}",
            item.author_name, item.author_handle
        )?;
        writeln!(self.out, "  {}  {}", item.timestamp, item.short_id())?;
        writeln!(self.out, "  {}", slide.progress())?;
        if let Some(ref notice) = slide.notice {
            writeln!(self.out, "  ! {notice}")?;
        }
        writeln!(self.out, "  {EXIT_HINT}")?;
        Ok(())
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&mut self, view: &View) {
        if let Err(e) = self.write_view(view) {
            warn!("Failed to render view: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_item;

    fn rendered(view: &View) -> String {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render(view);
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_slide_output() {
        let mut item = test_item("0123456789", "Ship it");
        item.subtitle = Some("Second line".to_string());
        item.author_avatar_url = Some("https://example.com/a.png".to_string());

        let out = rendered(&View::Slide(Slide {
            item,
            index: 0,
            total: 2,
            notice: Some("Using stale cache due to API error".to_string()),
        }));

        assert!(out.contains("Ship it"));
        assert!(out.contains("    Second line"));
        assert!(out.contains("by Ada • @ada"));
        assert!(out.contains("0123456"));
        assert!(!out.contains("01234567"));
        assert!(out.contains("━━ •"));
        assert!(out.contains("[avatar] https://example.com/a.png"));
        assert!(out.contains("! Using stale cache"));
        assert!(out.contains(EXIT_HINT));
    }

    #[test]
    fn test_failed_output_mentions_retry() {
        let out = rendered(&View::Failed {
            message: "Failed to fetch items".to_string(),
        });
        assert!(out.contains("Failed to fetch items"));
        assert!(out.contains("retry"));
    }
}
