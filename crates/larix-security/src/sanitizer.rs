//! Input sanitization helpers

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static DANGEROUS_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object)\b[^>]*>.*?</(script|style|iframe|object)\s*>")
        .expect("valid regex")
});
static UNCLOSED_DANGEROUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed)\b[^>]*>").expect("valid regex")
});
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").expect("valid regex")
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static EVENT_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
});
static JS_URL_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+([a-z-]+)\s*=\s*("\s*javascript:[^"]*"|'\s*javascript:[^']*'|javascript:[^\s>]*)"#)
        .expect("valid regex")
});
static FILENAME_FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).expect("valid regex"));

/// Tags kept by [`sanitize_html`] when no list is given
pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "u", "i", "b", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li",
    "blockquote", "code", "pre", "span", "div", "a",
];

pub const MAX_FILENAME_LENGTH: usize = 255;

/// Escape `& < > " ' /` for safe inclusion in HTML
pub fn escape_html(input: &str) -> String {
    html_escape::encode_safe(input).into_owned()
}

/// Remove every tag, keeping the text between them
pub fn strip_tags(input: &str) -> String {
    let without_comments = COMMENT.replace_all(input, "");
    ANY_TAG.replace_all(&without_comments, "").into_owned()
}

/// Clean untrusted HTML.
///
/// `<script>`/`<style>` blocks (and similar embedding tags) are removed with
/// their content, `on*=` handlers and `javascript:` URLs are dropped, and any
/// tag not in `allowed_tags` is stripped while its text is kept.
pub fn sanitize_html(input: &str, allowed_tags: &[&str]) -> String {
    let cleaned = COMMENT.replace_all(input, "");
    let cleaned = DANGEROUS_BLOCK.replace_all(&cleaned, "");
    let cleaned = UNCLOSED_DANGEROUS.replace_all(&cleaned, "");

    TAG.replace_all(&cleaned, |caps: &Captures| {
        let closing = &caps[1];
        let name = caps[2].to_ascii_lowercase();
        if !allowed_tags.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
            return String::new();
        }
        if !closing.is_empty() {
            return format!("</{}>", name);
        }
        let attrs = EVENT_ATTR.replace_all(&caps[3], "");
        let attrs = JS_URL_ATTR.replace_all(&attrs, "");
        format!("<{}{}>", name, attrs.trim_end())
    })
    .into_owned()
}

/// Make an uploaded file name safe to store.
///
/// Path separators and control characters are dropped, leading and trailing
/// dots and spaces are trimmed, and long names are shortened while keeping
/// the extension.
pub fn clean_filename(filename: &str) -> String {
    let cleaned = FILENAME_FORBIDDEN.replace_all(filename, "");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');

    if cleaned.chars().count() <= MAX_FILENAME_LENGTH {
        return cleaned.to_string();
    }

    match cleaned.rsplit_once('.') {
        Some((stem, ext)) if ext.chars().count() < MAX_FILENAME_LENGTH - 1 => {
            let keep = MAX_FILENAME_LENGTH - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{}.{}", stem, ext)
        }
        _ => cleaned.chars().take(MAX_FILENAME_LENGTH).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;&#x2F;a&gt;"
        );
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Hello <b>world</b></p><!-- hidden -->"), "Hello world");
    }

    #[test]
    fn test_sanitize_html_removes_scripts_and_handlers() {
        let dirty = r#"<p onclick="steal()">Hi<script>alert(1)</script></p><style>p{}</style>"#;
        assert_eq!(sanitize_html(dirty, DEFAULT_ALLOWED_TAGS), "<p>Hi</p>");

        let link = r#"<a href="javascript:alert(1)" title="t">x</a>"#;
        assert_eq!(sanitize_html(link, DEFAULT_ALLOWED_TAGS), r#"<a title="t">x</a>"#);

        let safe = r#"<a href="https://larix.dev">docs</a>"#;
        assert_eq!(sanitize_html(safe, DEFAULT_ALLOWED_TAGS), safe);
    }

    #[test]
    fn test_sanitize_html_strips_disallowed_tags() {
        let input = "<div><img src=x onerror=alert(1)><em>kept</em></div>";
        assert_eq!(sanitize_html(input, &["em"]), "<em>kept</em>");
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(clean_filename("  report?.pdf. "), "report.pdf");
        assert_eq!(clean_filename("a:b|c*.txt"), "abc.txt");

        let long = format!("{}.png", "x".repeat(300));
        let cleaned = clean_filename(&long);
        assert_eq!(cleaned.len(), MAX_FILENAME_LENGTH);
        assert!(cleaned.ends_with(".png"));
    }
}
