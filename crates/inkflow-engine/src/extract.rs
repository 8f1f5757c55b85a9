//! Text extraction for `text_extract` nodes. No match is an empty string.

use inkflow_config::node_config::{ExtractMode, TextExtractConfig};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

pub(crate) fn extract(config: &TextExtractConfig, text: &str) -> String {
  match config.extract_mode {
    ExtractMode::Regex => by_regex(&config.regex_pattern, text),
    ExtractMode::StartEnd => between(&config.start_marker, &config.end_marker, text),
    ExtractMode::JsonPath => by_json_path(&config.json_path, text),
  }
}

/// First capture group, or the whole match when the pattern has no groups.
fn by_regex(pattern: &str, text: &str) -> String {
  let re = match Regex::new(pattern) {
    Ok(re) => re,
    Err(e) => {
      warn!(pattern = %pattern, error = %e, "extract_regex_invalid");
      return String::new();
    }
  };
  let Some(caps) = re.captures(text) else {
    return String::new();
  };
  let group = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
  group.map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Text between the first `start` and the next `end`. Empty markers mean the
/// start and end of the text.
fn between(start: &str, end: &str, text: &str) -> String {
  let from = if start.is_empty() {
    0
  } else {
    match text.find(start) {
      Some(pos) => pos + start.len(),
      None => return String::new(),
    }
  };
  let rest = &text[from..];
  if end.is_empty() {
    return rest.to_string();
  }
  match rest.find(end) {
    Some(pos) => rest[..pos].to_string(),
    None => String::new(),
  }
}

fn by_json_path(path: &str, text: &str) -> String {
  let document: Value = match serde_json::from_str(strip_fence(text)) {
    Ok(document) => document,
    Err(e) => {
      warn!(error = %e, "extract_json_invalid");
      return String::new();
    }
  };

  let mut current = &document;
  for segment in path_segments(path) {
    let next = match current {
      Value::Object(map) => map.get(&segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    };
    match next {
      Some(value) => current = value,
      None => return String::new(),
    }
  }

  match current {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

/// Strip a surrounding ``` fence (with optional language tag).
fn strip_fence(text: &str) -> &str {
  let trimmed = text.trim();
  let Some(body) = trimmed.strip_prefix("```") else {
    return trimmed;
  };
  let body = match body.find('\n') {
    Some(pos) => &body[pos + 1..],
    None => body,
  };
  body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Split `$.a.b[0]` or `a.b.0` into `["a", "b", "0"]`.
fn path_segments(path: &str) -> Vec<String> {
  let path = path.trim();
  let path = path.strip_prefix('$').unwrap_or(path);
  path
    .replace('[', ".")
    .replace(']', "")
    .split('.')
    .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    .filter(|s| !s.is_empty())
    .collect()
}
