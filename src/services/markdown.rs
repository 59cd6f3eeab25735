//! Markdown rendering service
//!
//! Converts the markdown body of a news record to HTML with pulldown-cmark.
//! Content comes from third-party platforms, so raw HTML in the source is
//! escaped rather than passed through and links with script schemes are
//! neutralised.
//!
//! ```
//! use corpsite::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("Hello **world** <script>x</script>");
//! assert!(html.contains("<strong>world</strong>"));
//! assert!(!html.contains("<script>"));
//! ```

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

/// Markdown to HTML renderer
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
    /// Render single newlines as `<br />`, as social posts rely on them
    hard_breaks: bool,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self {
            options,
            hard_breaks: true,
        }
    }

    /// Render without turning soft line breaks into `<br />`
    pub fn without_hard_breaks(mut self) -> Self {
        self.hard_breaks = false;
        self
    }

    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options);
        let events = parser.map(|event| self.sanitize(event));

        let mut output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut output, events);
        output
    }

    fn sanitize<'a>(&self, event: Event<'a>) -> Event<'a> {
        match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            Event::SoftBreak if self.hard_breaks => Event::HardBreak,
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Link {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Image {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            other => other,
        }
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lowered = url.trim().to_ascii_lowercase();
    if lowered.starts_with("javascript:") || lowered.starts_with("vbscript:") || lowered.starts_with("data:") {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

/// Escapes HTML special characters in a string.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_markdown() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("# Launch\n\nWe shipped **v2** today.");
        assert!(html.contains("<h1>Launch</h1>"));
        assert!(html.contains("<strong>v2</strong>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("<script>alert(1)</script>\n\nhi <b>there</b>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_script_links_neutralised() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("[click](javascript:alert(1)) and [ok](https://example.com)");
        assert!(!html.contains("javascript:"));
        assert!(html.contains("href=\"#\""));
        assert!(html.contains("href=\"https://example.com\""));
    }

    #[test]
    fn test_line_breaks() {
        let html = MarkdownRenderer::new().render("line one\nline two");
        assert!(html.contains("<br />"));

        let html = MarkdownRenderer::new().without_hard_breaks().render("line one\nline two");
        assert!(!html.contains("<br />"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
    }
}
