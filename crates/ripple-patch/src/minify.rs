//! HTML minification and text escaping.
//!
//! Every rendered fragment passes through [`minify_html`] before it becomes
//! a patch value. The pass collapses whitespace runs to a single space,
//! drops runs that sit entirely between two tags, and leaves `<pre>`,
//! `<textarea>`, `<script>`, and `<style>` content untouched. It does not
//! parse HTML; it only tracks tag boundaries, which is enough for template
//! output.

/// Elements whose text content is whitespace-significant.
const PRESERVE_TAGS: &[&str] = &["pre", "textarea", "script", "style"];

/// Minify a rendered HTML fragment.
#[must_use]
pub fn minify_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.char_indices();
    let mut preserve_depth: usize = 0;
    // Whitespace run awaiting a decision: kept as one space when it borders
    // text, dropped when it sits between two tags or at the fragment edge.
    let mut pending_ws = false;

    while let Some((idx, ch)) = chars.next() {
        if ch == '<' {
            if let Some(tag) = tag_name(&html[idx..]) {
                if PRESERVE_TAGS.contains(&tag.name) {
                    if tag.closing {
                        preserve_depth = preserve_depth.saturating_sub(1);
                    } else {
                        preserve_depth += 1;
                    }
                }
            }
            if pending_ws && !out.is_empty() && !out.ends_with('>') {
                out.push(' ');
            }
            pending_ws = false;
            out.push(ch);
            // Copy the rest of the tag verbatim.
            for (_, tc) in chars.by_ref() {
                out.push(tc);
                if tc == '>' {
                    break;
                }
            }
            continue;
        }

        if preserve_depth > 0 {
            out.push(ch);
            continue;
        }

        if ch.is_whitespace() {
            pending_ws = true;
            continue;
        }

        if pending_ws && !out.is_empty() {
            out.push(' ');
        }
        pending_ws = false;
        out.push(ch);
    }

    out
}

struct TagStart<'a> {
    name: &'a str,
    closing: bool,
}

/// Extract the tag name from a string starting at `<`.
fn tag_name(s: &str) -> Option<TagStart<'_>> {
    let body = s.strip_prefix('<')?;
    let (closing, body) = match body.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let end = body
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '-')
        .unwrap_or(body.len());
    if end == 0 {
        return None;
    }
    Some(TagStart {
        name: &body[..end],
        closing,
    })
}

/// Escape text for safe embedding in an HTML fragment.
///
/// Used for user-facing error messages so handler output can never inject
/// markup into the error target.
#[must_use]
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
