//! Message body cleanup: HTML stripping, entity decoding and quote stripping.
//!
//! Pure string processing, no I/O. Used when building reply context so the
//! composer sees what the sender actually wrote, not the quoted history.

use std::sync::LazyLock;

use regex::Regex;

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br\s*/?|/p|/div|/li|/tr|/h[1-6])\s*>").expect("valid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

static STYLE_OR_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(style|script)[^>]*>.*?</(style|script)\s*>").expect("valid regex")
});

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"));

/// Produce the readable text of a message body.
///
/// HTML bodies are flattened to text. Quoted replies and attribution
/// lines are dropped. Blank-line runs collapse to a single blank line.
pub fn clean_body(raw: &str) -> String {
    let text = if looks_like_html(raw) {
        html_to_text(raw)
    } else {
        decode_entities(raw)
    };

    let stripped = strip_quoted_text(&text);

    let mut lines: Vec<&str> = Vec::new();
    for line in stripped.lines().map(str::trim_end) {
        if line.trim().is_empty() && lines.last().is_none_or(|l| l.trim().is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn looks_like_html(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    ["<html", "<body", "<div", "<p>", "<p ", "<br", "<table", "<span"]
        .iter()
        .any(|tag| lower.contains(tag))
}

/// Flatten HTML to plain text, keeping block boundaries as line breaks.
pub fn html_to_text(html: &str) -> String {
    let without_code = STYLE_OR_SCRIPT.replace_all(html, "");
    let with_breaks = BLOCK_BREAK.replace_all(&without_code, "\n");
    let untagged = TAG.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&untagged);

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode named and numeric HTML entities. Unknown entities are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Strip quoted text from an email body.
///
/// Removes lines starting with `>` and everything after an
/// "On ... wrote:" attribution or an "Original Message" separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_basic_quoted_lines() {
        let body = "Hello!\n\n> This is quoted\n> Another quoted line\nThanks";
        assert_eq!(strip_quoted_text(body), "Hello!\n\nThanks");
    }

    #[test]
    fn strip_on_wrote_attribution() {
        let body = "Sounds good!\n\nOn Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:\n> Original message";
        assert_eq!(strip_quoted_text(body), "Sounds good!");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn decode_named_and_numeric_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&lt;b&gt;"), "<b>");
        assert_eq!(decode_entities("caf&#233;"), "café");
        assert_eq!(decode_entities("&#x263A;"), "☺");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }

    #[test]
    fn html_to_text_keeps_paragraphs() {
        let html = "<html><body><p>Ciao Sofia,</p><p>puoi <b>aiutarmi</b>?</p></body></html>";
        assert_eq!(html_to_text(html).trim(), "Ciao Sofia,\npuoi aiutarmi ?");
    }

    #[test]
    fn html_to_text_drops_style_blocks() {
        let html = "<style>p { color: red; }</style><div>Hi there</div>";
        let text = html_to_text(html);
        assert!(!text.contains("color"));
        assert!(text.contains("Hi there"));
    }

    #[test]
    fn clean_body_plain_text() {
        let body = "Hi,\n\n\n\nCan we meet Tuesday?\n\n> earlier stuff\n\n";
        assert_eq!(clean_body(body), "Hi,\n\nCan we meet Tuesday?");
    }

    #[test]
    fn clean_body_html_with_entities() {
        let body = "<div>Price: 5&nbsp;&euro;<br>Q&amp;A at 3pm</div>";
        let cleaned = clean_body(body);
        assert!(cleaned.contains("Q&A at 3pm"));
        assert!(cleaned.contains("&euro;"));
    }

    #[test]
    fn clean_body_empty() {
        assert_eq!(clean_body(""), "");
        assert_eq!(clean_body("   \n\n  "), "");
    }
}
