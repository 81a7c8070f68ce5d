use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HIDDEN_BLOCKS: Regex = Regex::new(r"(?is)<(style|script|head)(\s[^>]*)?>.*?</(style|script|head)>").unwrap();
    static ref LINE_BREAKS: Regex = Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|table)>").unwrap();
    static ref TAGS: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Converts rendered HTML into the plain-text alternative part of an email.
pub fn html_to_plain(html: &str) -> String {
    let without_blocks = HIDDEN_BLOCKS.replace_all(html, "");
    let with_breaks = LINE_BREAKS.replace_all(&without_blocks, "\n");
    let stripped = TAGS.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim) {
        // collapse runs of blank lines
        if line.is_empty() && lines.last().map_or(true, |last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x3D;", "=")
        .replace("&amp;", "&")
}
