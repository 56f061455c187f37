//! Pull artifact content out of a free-form service response.
//!
//! Contract: the first complete fenced block wins. A block opens with a line
//! starting with three or more backticks (optional info string) and closes on
//! the next line made only of at least as many backticks, so shorter fences
//! inside the content survive. Without a complete block the whole response is
//! the content.

const MIN_FENCE: usize = 3;

/// Extract content from `response`, or `None` when nothing usable remains.
pub fn extract_content(response: &str) -> Option<String> {
    let content = first_fenced_block(response).unwrap_or_else(|| response.trim().to_string());
    if content.trim().is_empty() {
        return None;
    }
    Some(with_trailing_newline(content))
}

fn first_fenced_block(response: &str) -> Option<String> {
    let mut lines = response.lines();
    let width = lines.find_map(|line| {
        let width = backtick_run(line.trim_start());
        (width >= MIN_FENCE).then_some(width)
    })?;

    let mut body = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if backtick_run(trimmed) == trimmed.len() && trimmed.len() >= width {
            return Some(body.join("\n"));
        }
        body.push(line);
    }
    // Unterminated fence: not a block.
    None
}

fn backtick_run(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b'`').count()
}

fn with_trailing_newline(mut content: String) -> String {
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}
