use regex::Regex;

use crate::errors::Result;

const TRUNCATION_MARK: &str = "\n\n... (truncated)";

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{TRUNCATION_MARK}", &text[..byte_index]),
        None => text.to_string(),
    }
}

const FENCE: &str = "```";
const FENCE_CLOSE: &str = "\n```";
const FENCE_REOPEN: &str = "```\n";
const BREAKS: [&str; 3] = ["\n\n", "\n", " "];

/// Splits `text` into chunks of at most `max_len` bytes, preferring
/// paragraph breaks, then line breaks, then spaces. Never cuts inside a
/// UTF-8 sequence. Breaks outside fenced code blocks win; a block that has
/// to be cut is closed at the end of one chunk and reopened in the next.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text.to_string();

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining);
            break;
        }

        let fenced = remaining.contains(FENCE) && max_len > 2 * FENCE_REOPEN.len();
        let mut limit = if fenced {
            max_len - FENCE_CLOSE.len()
        } else {
            max_len
        };
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        if limit == 0 {
            limit = remaining
                .chars()
                .next()
                .map_or(remaining.len(), char::len_utf8);
        }

        let split_at = split_point(&remaining[..limit]).unwrap_or(limit);
        let (chunk, rest) = remaining.split_at(split_at);
        let mut chunk = chunk.trim_end().to_string();
        let mut rest = rest.trim_start_matches(['\n', ' ']).to_string();
        if fenced && split_at > FENCE_REOPEN.len() && inside_fence(&chunk) {
            chunk.push_str(FENCE_CLOSE);
            rest.insert_str(0, FENCE_REOPEN);
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        remaining = rest;
    }

    chunks
}

fn split_point(window: &str) -> Option<usize> {
    let last_break = |outside_fences: bool| {
        BREAKS.iter().find_map(|pattern| {
            window
                .rmatch_indices(pattern)
                .map(|(pos, _)| pos)
                .find(|&pos| pos > 0 && !(outside_fences && inside_fence(&window[..pos])))
        })
    };
    last_break(true).or_else(|| last_break(false))
}

fn inside_fence(text: &str) -> bool {
    text.matches(FENCE).count() % 2 == 1
}

/// Converts the Markdown subset assistants emit into Telegram HTML: fenced
/// blocks, inline code, bold and italics. Everything else is escaped.
pub struct MarkdownRenderer {
    fence: Regex,
    bold: Vec<Regex>,
    italic_star: Regex,
    italic_underscore: Regex,
}

impl MarkdownRenderer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fence: Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n?(.*?)```")?,
            bold: vec![Regex::new(r"\*\*(.+?)\*\*")?, Regex::new(r"__(.+?)__")?],
            italic_star: Regex::new(r"\*([^*\n]+?)\*")?,
            italic_underscore: Regex::new(r"(^|[^A-Za-z0-9_])_([^_\n]+?)_([^A-Za-z0-9_]|$)")?,
        })
    }

    pub fn render(&self, markdown: &str) -> String {
        let mut out = String::with_capacity(markdown.len());
        let mut last = 0;
        for captures in self.fence.captures_iter(markdown) {
            let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            out.push_str(&self.render_inline(&markdown[last..whole.start()]));
            out.push_str("<pre>");
            out.push_str(&escape_html(body.as_str().trim_end_matches('\n')));
            out.push_str("</pre>");
            last = whole.end();
        }
        out.push_str(&self.render_inline(&markdown[last..]));
        out
    }

    fn render_inline(&self, text: &str) -> String {
        let segments: Vec<&str> = text.split('`').collect();
        let balanced = segments.len() % 2 == 1;
        let mut out = String::with_capacity(text.len());
        for (index, segment) in segments.iter().enumerate() {
            if balanced && index % 2 == 1 {
                out.push_str("<code>");
                out.push_str(&escape_html(segment));
                out.push_str("</code>");
                continue;
            }
            if !balanced && index > 0 {
                out.push('`');
            }
            out.push_str(&self.emphasis(&escape_html(segment)));
        }
        out
    }

    fn emphasis(&self, text: &str) -> String {
        let mut out = text.to_string();
        for bold in &self.bold {
            out = bold.replace_all(&out, "<b>$1</b>").into_owned();
        }
        out = self.italic_star.replace_all(&out, "<i>$1</i>").into_owned();
        self.italic_underscore
            .replace_all(&out, "$1<i>$2</i>$3")
            .into_owned()
    }
}
