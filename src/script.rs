use std::fmt::{Display, Formatter};

const COMMENT_CHAR: char = '#';
const END_OF_COMMENT: char = '\n';
const CMD_SEPARATOR: char = ';';

/// One `;` terminated statement of a script, tagged with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub line: usize,
    pub text: String,
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.line, self.text)
    }
}

/// Removes every `#` comment, keeping the newline that ends it so line
/// numbers stay intact.
pub fn strip_comments(script: &str) -> String {
    let mut result = String::with_capacity(script.len());
    let mut rest = script;

    while let Some(start) = rest.find(COMMENT_CHAR) {
        result.push_str(&rest[..start]);
        match rest[start..].find(END_OF_COMMENT) {
            // The search restarts at the newline itself, so a comment marker
            // right after it is never skipped.
            Some(end) => rest = &rest[start + end..],
            None => return result,
        }
    }

    result.push_str(rest);
    result
}

/// Splits a comment-free script on `;`, dropping empty statements.
pub fn split_commands(script: &str) -> Vec<Command> {
    let mut result = Vec::new();
    let mut current_line = 1;

    for item in script.split(CMD_SEPARATOR) {
        let line_count = count_newlines(item);
        let trimmed_start = item.trim_start();
        let leading_lines = count_newlines(&item[..item.len() - trimmed_start.len()]);
        let text = trimmed_start.trim_end();

        if !text.is_empty() {
            result.push(Command {
                line: current_line + leading_lines,
                text: text.to_string(),
            });
        }

        current_line += line_count;
    }

    result
}

fn count_newlines(s: &str) -> usize {
    s.chars().filter(|c| *c == '\n').count()
}
