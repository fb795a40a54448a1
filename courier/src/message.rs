//! Message resolver: turns a message source file into a delivery payload.
//!
//! A `.html` source is already delivery-ready and passes through unchanged.
//! A `.md` source (or a source with an unrecognized extension, as a
//! fallback) is converted to HTML and then restricted to the markup subset
//! the delivery channel accepts. The general-purpose converter emits tags
//! broader than that subset, so the restriction pass is part of the
//! resolver's contract: headings collapse to bold, paragraphs to line
//! breaks, unordered lists to bullet characters, and block quotes keep
//! their tag but gain a leading blank line.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use pulldown_cmark::{Parser, html};
use regex::Regex;
use tracing::debug;

use crate::error::FormatError;

/// The message in both source and delivery form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPayload {
    /// Raw source text, as authored.
    pub text: String,
    /// Channel-ready HTML.
    pub html: String,
}

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h[1-6]>(.*?)</h[1-6]>").unwrap());
static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<p>(.*?)</p>").unwrap());
static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<blockquote>(.*?)</blockquote>").unwrap());

/// Resolve a message source file into a [`DeliveryPayload`].
///
/// Fails with [`FormatError`] when the source cannot be read as text.
pub fn resolve(path: &Path) -> Result<DeliveryPayload> {
    let text = fs::read_to_string(path)
        .map_err(|err| FormatError::new(path, format!("cannot read as text: {err}")))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let html = match extension.as_deref() {
        Some("html" | "htm") => text.clone(),
        Some("md" | "markdown") => restrict_to_channel_subset(&markdown_to_html(&text)),
        other => {
            debug!(
                path = %path.display(),
                extension = other.unwrap_or(""),
                "unrecognized message extension, treating as markdown"
            );
            restrict_to_channel_subset(&markdown_to_html(&text))
        }
    };

    Ok(DeliveryPayload { text, html })
}

fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Collapse converter output onto the delivery channel's markup subset.
///
/// Applied in order: headings, paragraphs, list tags, block quotes. The
/// order matters: paragraph collapse must run before the block-quote pass
/// so quoted paragraphs become line breaks inside the preserved tag.
fn restrict_to_channel_subset(html: &str) -> String {
    let html = HEADING_RE.replace_all(html, "<b>$1</b>");
    let html = PARAGRAPH_RE.replace_all(&html, "$1<br>");
    let html = html
        .replace("<ul>", "")
        .replace("</ul>", "")
        .replace("<li>", "\u{2022} ")
        .replace("</li>", "<br>");
    BLOCKQUOTE_RE
        .replace_all(&html, "\n<blockquote>$1</blockquote>")
        .into_owned()
}
