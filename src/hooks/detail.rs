//! Human-readable HTML summaries of a tool call for the approval message.

use std::fs;

use serde_json::Value;

use crate::telegram::format::{escape_html, truncate_chars};

const MAX_DETAIL_CHARS: usize = 3500;
const MAX_DIFF_CHARS: usize = 3000;
const DIFF_CONTEXT_LINES: usize = 3;

pub fn permission_message(tool_name: &str, tool_input: &Value) -> String {
    format!(
        "🔔 <b>Permission Request</b>\n\n<b>Tool:</b> {}\n\n{}",
        escape_html(tool_name),
        tool_detail(tool_name, tool_input)
    )
}

pub fn tool_detail(tool_name: &str, input: &Value) -> String {
    match tool_name {
        "Bash" => {
            let command = clipped(field(input, "command"), MAX_DETAIL_CHARS);
            format!("<b>Command:</b>\n<code>{command}</code>")
        }
        "Write" => format!(
            "<b>File:</b>\n<code>{}</code>\n\n<b>Content:</b>\n<code>{}</code>",
            escape_html(field(input, "file_path")),
            clipped(field(input, "content"), MAX_DETAIL_CHARS)
        ),
        "Edit" => {
            let path = field(input, "file_path");
            let file = fs::read_to_string(path).ok();
            let diff = edit_diff(
                file.as_deref(),
                field(input, "old_string"),
                field(input, "new_string"),
            );
            format!(
                "<b>File:</b>\n<code>{}</code>\n\n<b>Changes:</b>\n<pre>{}</pre>",
                escape_html(path),
                clipped(&diff, MAX_DIFF_CHARS)
            )
        }
        "Read" => format!(
            "<b>File:</b>\n<code>{}</code>",
            escape_html(field(input, "file_path"))
        ),
        "WebFetch" => format!(
            "<b>URL:</b>\n<code>{}</code>\n\n<b>Prompt:</b>\n{}",
            escape_html(field(input, "url")),
            escape_html(field(input, "prompt"))
        ),
        "Glob" => format!(
            "<b>Pattern:</b>\n<code>{}</code>\n\n<b>Path:</b>\n<code>{}</code>",
            escape_html(field(input, "pattern")),
            escape_html(path_or_cwd(input))
        ),
        "Grep" => format!(
            "<b>Search:</b>\n<code>{}</code>\n\n<b>Path:</b>\n<code>{}</code>",
            escape_html(field(input, "pattern")),
            escape_html(path_or_cwd(input))
        ),
        _ => generic_detail(input),
    }
}

/// Old lines marked 🔴, new lines 🟢, with a few unchanged lines around the
/// edit when `old` can be located in the current file. Returns raw text.
fn edit_diff(file: Option<&str>, old: &str, new: &str) -> String {
    let mut lines = Vec::new();
    let located = file.and_then(|content| {
        content
            .find(old)
            .filter(|_| !old.is_empty())
            .map(|pos| (&content[..pos], &content[pos + old.len()..]))
    });

    let (before, after): (Vec<&str>, Vec<&str>) = match located {
        Some((before, after)) => {
            let before: Vec<&str> = before.lines().collect();
            let skip = before.len().saturating_sub(DIFF_CONTEXT_LINES);
            (
                before[skip..].to_vec(),
                after
                    .strip_prefix('\n')
                    .unwrap_or(after)
                    .lines()
                    .take(DIFF_CONTEXT_LINES)
                    .collect(),
            )
        }
        None => (Vec::new(), Vec::new()),
    };

    lines.extend(before.iter().map(|line| format!("   {line}")));
    lines.extend(old.lines().map(|line| format!("🔴 {line}")));
    lines.extend(new.lines().map(|line| format!("🟢 {line}")));
    lines.extend(after.iter().map(|line| format!("   {line}")));
    lines.join("\n")
}

fn generic_detail(input: &Value) -> String {
    let Some(fields) = input.as_object() else {
        return String::new();
    };
    let mut remaining = MAX_DETAIL_CHARS;
    let mut details = Vec::new();
    for (key, value) in fields {
        let value = match value {
            Value::String(text) => unescape_literals(text),
            other => other.to_string(),
        };
        let chars = value.chars().count();
        details.push(format!(
            "<b>{}:</b>\n{}",
            escape_html(key),
            clipped(&value, remaining)
        ));
        if chars > remaining {
            break;
        }
        remaining -= chars;
    }
    details.join("\n\n")
}

/// Tools sometimes pass literal `\n` sequences; show them as line breaks.
fn unescape_literals(text: &str) -> String {
    text.replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\r", "\n")
        .replace("\\t", "  ")
}

fn field<'a>(input: &'a Value, key: &str) -> &'a str {
    input.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn path_or_cwd(input: &Value) -> &str {
    match field(input, "path") {
        "" => "current directory",
        path => path,
    }
}

/// Cuts the raw text and escapes afterwards, so a cut never splits an entity.
fn clipped(text: &str, max_chars: usize) -> String {
    escape_html(&truncate_chars(text, max_chars))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::{MAX_DETAIL_CHARS, edit_diff, permission_message, tool_detail};

    #[test]
    fn bash_command_is_escaped() {
        let detail = tool_detail("Bash", &json!({ "command": "ls <dir> && echo" }));
        assert_eq!(
            detail,
            "<b>Command:</b>\n<code>ls &lt;dir&gt; &amp;&amp; echo</code>"
        );
    }

    #[test]
    fn long_content_is_truncated() {
        let content = "x".repeat(5000);
        let detail = tool_detail("Write", &json!({ "file_path": "a.txt", "content": content }));
        assert!(detail.contains("... (truncated)"));
        assert!(detail.len() < 4000);
    }

    #[test]
    fn edit_shows_surrounding_context_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rs");
        fs::write(&path, "a\nb\nc\nd\nold\ne\nf\ng\nh\n").unwrap();

        let detail = tool_detail(
            "Edit",
            &json!({
                "file_path": path.display().to_string(),
                "old_string": "old",
                "new_string": "new",
            }),
        );
        assert!(detail.contains("<pre>   b\n   c\n   d\n🔴 old\n🟢 new\n   e\n   f\n   g</pre>"));
        assert!(!detail.contains("   a\n"));
    }

    #[test]
    fn edit_without_readable_file_shows_bare_diff() {
        assert_eq!(edit_diff(None, "x < 1", "x <= 1"), "🔴 x < 1\n🟢 x <= 1");
    }

    #[test]
    fn search_tools_default_to_current_directory() {
        let detail = tool_detail("Grep", &json!({ "pattern": "fn main" }));
        assert!(detail.ends_with("<code>current directory</code>"));
    }

    #[test]
    fn unknown_tools_list_their_inputs() {
        let detail = tool_detail(
            "mcp__notes__add",
            &json!({ "title": "a\\nb", "count": 2 }),
        );
        assert!(detail.contains("<b>count:</b>\n2"));
        assert!(detail.contains("<b>title:</b>\na\nb"));
    }

    #[test]
    fn truncation_never_splits_an_entity() {
        let command = format!("x{}", "&".repeat(4000));
        let detail = tool_detail("Bash", &json!({ "command": command }));
        assert!(detail.ends_with("&amp;&amp;\n\n... (truncated)</code>"));
        assert_eq!(detail.matches("&amp;").count(), MAX_DETAIL_CHARS - 1);
    }

    #[test]
    fn diff_is_cut_before_escaping() {
        let old = "<".repeat(4000);
        let detail = tool_detail("Edit", &json!({ "file_path": "", "old_string": old }));
        assert!(detail.ends_with("&lt;\n\n... (truncated)</pre>"));
    }

    #[test]
    fn unknown_tool_fields_stay_balanced_when_cut() {
        let detail = tool_detail(
            "mcp__notes__add",
            &json!({ "body": "<&>".repeat(2000), "title": "later" }),
        );
        assert!(detail.ends_with("&lt;&amp;\n\n... (truncated)"));
        assert!(!detail.contains("<b>title:</b>"));
        assert_eq!(detail.matches("<b>").count(), detail.matches("</b>").count());
    }

    #[test]
    fn message_names_the_tool() {
        let message = permission_message("Read", &json!({ "file_path": "/etc/hosts" }));
        assert!(message.starts_with("🔔 <b>Permission Request</b>\n\n<b>Tool:</b> Read"));
    }
}
