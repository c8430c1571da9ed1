//! Brace-balanced block extraction for Gradle scripts.
//!
//! Groovy and Kotlin DSL scripts are not parsed; instead a small byte-level state machine
//! tracks whether the cursor is inside code, a comment or a string literal and only
//! matches keywords and braces in code. All syntax it cares about is ASCII, so multi-byte
//! UTF-8 sequences pass through as identifier bytes.

/// Lexical context of the byte under the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lexical {
    Code,
    LineComment,
    BlockComment,
    /// Inside a string opened with the given quote byte.
    Str(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    SearchingKeyword,
    SearchingOpenBrace,
    TrackingDepth { open: usize, depth: usize },
}

struct BlockScanner<'a> {
    content: &'a [u8],
    keyword: &'a [u8],
    lexical: Lexical,
    phase: Phase,
}

/// Outcome of feeding one byte to the scanner.
enum Step {
    /// Continue at the given index.
    Next(usize),
    /// A block closed; holds `(open_brace, close_brace)`.
    Closed(usize, usize),
}

impl<'a> BlockScanner<'a> {
    fn new(content: &'a str, keyword: &'a str) -> Self {
        Self {
            content: content.as_bytes(),
            keyword: keyword.as_bytes(),
            lexical: Lexical::Code,
            phase: Phase::SearchingKeyword,
        }
    }

    fn step(&mut self, i: usize) -> Step {
        let b = self.content[i];
        let next = self.content.get(i + 1).copied();

        match self.lexical {
            Lexical::LineComment => {
                if b == b'\n' {
                    self.lexical = Lexical::Code;
                }
                return Step::Next(i + 1);
            }
            Lexical::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    self.lexical = Lexical::Code;
                    return Step::Next(i + 2);
                }
                return Step::Next(i + 1);
            }
            Lexical::Str(quote) => {
                if b == quote && !is_escaped(self.content, i) {
                    self.lexical = Lexical::Code;
                }
                return Step::Next(i + 1);
            }
            Lexical::Code => {}
        }

        match (b, next) {
            (b'/', Some(b'/')) => {
                self.lexical = Lexical::LineComment;
                return Step::Next(i + 2);
            }
            (b'/', Some(b'*')) => {
                self.lexical = Lexical::BlockComment;
                return Step::Next(i + 2);
            }
            (b'"' | b'\'', _) => {
                self.lexical = Lexical::Str(b);
                if self.phase == Phase::SearchingOpenBrace {
                    self.phase = Phase::SearchingKeyword;
                }
                return Step::Next(i + 1);
            }
            _ => {}
        }

        match self.phase {
            Phase::SearchingKeyword => {
                if self.keyword_at(i) {
                    self.phase = Phase::SearchingOpenBrace;
                    return Step::Next(i + self.keyword.len());
                }
            }
            Phase::SearchingOpenBrace => {
                if b == b'{' {
                    self.phase = Phase::TrackingDepth { open: i, depth: 1 };
                } else if !b.is_ascii_whitespace() {
                    self.phase = Phase::SearchingKeyword;
                    // The resetting byte may itself start the keyword.
                    return self.step(i);
                }
            }
            Phase::TrackingDepth { open, depth } => match b {
                b'{' => {
                    self.phase = Phase::TrackingDepth {
                        open,
                        depth: depth + 1,
                    };
                }
                b'}' if depth == 1 => {
                    self.phase = Phase::SearchingKeyword;
                    return Step::Closed(open, i);
                }
                b'}' => {
                    self.phase = Phase::TrackingDepth {
                        open,
                        depth: depth - 1,
                    };
                }
                _ => {}
            },
        }

        Step::Next(i + 1)
    }

    fn keyword_at(&self, i: usize) -> bool {
        let end = i + self.keyword.len();
        if self.keyword.is_empty() || end > self.content.len() {
            return false;
        }
        if &self.content[i..end] != self.keyword {
            return false;
        }
        let valid_start = i == 0 || !is_ident_byte(self.content[i - 1]);
        let valid_end = end == self.content.len() || !is_ident_byte(self.content[end]);
        valid_start && valid_end
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || !b.is_ascii()
}

/// Whether the byte at `i` is preceded by an odd number of backslashes.
fn is_escaped(content: &[u8], i: usize) -> bool {
    let backslashes = content[..i]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    backslashes % 2 == 1
}

/// Finds the first `keyword { ... }` block at or after `start`.
///
/// Returns the text between the outer braces and the offset just past the closing brace.
/// Keywords inside comments and string literals never match, and a keyword must be a whole
/// identifier (`ext` does not match `extProperty`). A keyword followed by anything other
/// than whitespace, comments and `{` (for example `publishing()`) is not a block.
pub fn find_next_block<'a>(
    content: &'a str,
    keyword: &str,
    start: usize,
) -> Option<(&'a str, usize)> {
    let mut scanner = BlockScanner::new(content, keyword);
    let mut i = start;
    while i < content.len() {
        match scanner.step(i) {
            Step::Next(next) => i = next,
            Step::Closed(open, close) => return Some((&content[open + 1..close], close + 1)),
        }
    }
    None
}

/// Every top-level `keyword { ... }` block in `content`, in document order.
///
/// Empty bodies (`ext {}`) are dropped; whitespace-only bodies are kept. Blocks nested inside
/// an already returned block are not reported separately.
pub fn find_all_blocks<'a>(content: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    while let Some((body, next)) = find_next_block(content, keyword, offset) {
        if !body.is_empty() {
            blocks.push(body);
        }
        offset = next;
    }
    blocks
}
