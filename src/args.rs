//! Merge of the mandatory scanner argv with a free-form flag string.
//!
//! No shell is involved: a new flag starts at every " -" boundary, the first
//! space inside a flag separates its name from its value, and one outer pair
//! of matching quotes is stripped from the value.

/// Append the tokens of `extra` to `mandatory`, keeping the caller's order.
pub fn merge_cli_arguments(mandatory: &[String], extra: Option<&str>) -> Vec<String> {
    let mut merged = mandatory.to_vec();
    let Some(extra) = extra else {
        return merged;
    };
    for chunk in split_flag_chunks(extra) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        match chunk.split_once(' ') {
            Some((flag, value)) => {
                merged.push(flag.trim().to_string());
                merged.push(strip_outer_quotes(value.trim()).to_string());
            }
            None => merged.push(chunk.to_string()),
        }
    }
    merged
}

/// Split before every space that is followed by a hyphen.
fn split_flag_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(" -") {
        if idx > start {
            chunks.push(&text[start..idx]);
        }
        start = idx;
    }
    chunks.push(&text[start..]);
    chunks
}

fn strip_outer_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
