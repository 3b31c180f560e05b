use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde_json::Value;

use crate::errors::Result;

/// Text of the last assistant entry in a Claude Code JSONL transcript.
/// Unparsable lines are skipped.
pub fn latest_assistant_text(path: &Path) -> Result<Option<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut latest = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if entry.get("type").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        if let Some(text) = entry.pointer("/message/content").and_then(content_text) {
            latest = Some(text);
        }
    }

    Ok(latest)
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .map(|item| item.get("text").and_then(Value::as_str).unwrap_or_default())
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::latest_assistant_text;

    #[test]
    fn picks_last_assistant_text_blocks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"type":"assistant","message":{{"content":[{{"type":"text","text":"first"}}]}}}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(
            file,
            r#"{{"type":"assistant","message":{{"content":[{{"type":"text","text":"done"}},{{"type":"tool_use","name":"Bash"}},{{"type":"text","text":"bye"}}]}}}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"type":"assistant","message":{{"content":[{{"type":"tool_use","name":"Read"}}]}}}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"type":"user","message":{{"content":"thanks"}}}}"#).unwrap();

        let text = latest_assistant_text(file.path()).unwrap();
        assert_eq!(text.as_deref(), Some("done\nbye"));
    }

    #[test]
    fn transcript_without_assistant_yields_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type":"user","message":{{"content":"hi"}}}}"#).unwrap();
        assert_eq!(latest_assistant_text(file.path()).unwrap(), None);
    }
}
