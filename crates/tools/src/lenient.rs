//! Lenient JSON parsing for model-generated output.
//!
//! Secondary model calls are asked for a bare JSON object, but output is
//! sometimes cut off at the token limit or followed by chatter. Repair is
//! limited to bracket balancing:
//!
//! 1. Text that already parses is returned as-is.
//! 2. Text after the top-level value closes is dropped.
//! 3. A truncated value is closed: an open string gets its quote, trailing
//!    commas and whitespace are dropped, and the missing `}`/`]` are appended.
//! 4. If that still fails, the text is cut back to the end of the last
//!    complete nested value and closed again.
//!
//! Anything else (mismatched brackets, comments, bad literals) is
//! unrepairable and yields `None`; callers skip the output and log it.

use serde_json::Value;

enum Scan {
    /// The top-level value closes at this byte offset.
    Complete(usize),
    /// Input ran out with brackets still open.
    Open {
        stack: Vec<char>,
        in_string: bool,
        /// Offsets just past a nested closer, with the brackets still open there.
        last_cut: Option<(usize, Vec<char>)>,
    },
}

/// Parse `text`, repairing unbalanced brackets where possible.
pub fn parse(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    if !text.starts_with(['{', '[']) {
        return None;
    }

    match scan(text)? {
        Scan::Complete(end) => serde_json::from_str(&text[..end]).ok(),
        Scan::Open {
            stack,
            in_string,
            last_cut,
        } => {
            let mut candidate = text.to_string();
            if in_string {
                candidate.push('"');
            }
            close(&candidate, &stack).or_else(|| {
                let (cut, stack) = last_cut?;
                close(&text[..cut], &stack)
            })
        }
    }
}

/// Parse `text` and require a JSON object.
pub fn parse_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match parse(text)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn scan(text: &str) -> Option<Scan> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_cut = None;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' | ']' => {
                let open = stack.pop()?;
                if (open, c) != ('{', '}') && (open, c) != ('[', ']') {
                    return None;
                }
                if stack.is_empty() {
                    return Some(Scan::Complete(i + 1));
                }
                last_cut = Some((i + 1, stack.clone()));
            }
            _ => {}
        }
    }

    Some(Scan::Open {
        stack,
        in_string,
        last_cut,
    })
}

fn close(text: &str, stack: &[char]) -> Option<Value> {
    let mut repaired = text.trim_end().trim_end_matches(',').trim_end().to_string();
    for open in stack.iter().rev() {
        repaired.push(if *open == '{' { '}' } else { ']' });
    }
    serde_json::from_str(&repaired).ok()
}
