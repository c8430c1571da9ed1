//! Parser for Java `.properties` files.
//!
//! Gradle reads `gradle.properties` with `java.util.Properties`, so this follows the
//! same surface rules: logical lines joined by a trailing `\`, `#`/`!` comment lines,
//! `=`, `:` or whitespace between key and value, and backslash escapes (`\t`, `\n`,
//! `\r`, `\f`, `\uXXXX`; any other escaped character stands for itself).

use std::iter::Enumerate;
use std::str::Lines;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyEntry {
    pub key: String,
    pub value: String,
    /// 1-based line on which the entry starts.
    pub line: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertiesFile {
    pub entries: Vec<PropertyEntry>,
}

impl PropertiesFile {
    /// Every definition of `key`, in file order.
    pub fn by_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a PropertyEntry> + 'a {
        self.entries.iter().filter(move |e| e.key == key)
    }

    /// Effective value of `key`: like `java.util.Properties`, the last definition wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

/// Parses `.properties` text. Malformed input never fails; at worst a line yields a key
/// with an empty value.
#[must_use]
pub fn parse(text: &str) -> PropertiesFile {
    let entries = LogicalLines::new(text)
        .filter_map(|(line, logical)| parse_entry(&logical, line))
        .collect();
    PropertiesFile { entries }
}

/// Physical lines joined across continuations, yielded with their starting line number.
struct LogicalLines<'a> {
    physical: Enumerate<Lines<'a>>,
}

impl<'a> LogicalLines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            physical: text.lines().enumerate(),
        }
    }
}

impl Iterator for LogicalLines<'_> {
    type Item = (usize, String);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, first) = self.physical.next()?;

        // Comment lines never continue, even when they end with a backslash.
        if is_comment(first) {
            return Some((idx + 1, String::new()));
        }

        let mut joined = String::new();
        let mut segment = first;
        while let Some(head) = strip_continuation(segment) {
            joined.push_str(head);
            match self.physical.next() {
                Some((_, next)) => segment = next.trim_start_matches(is_blank),
                None => return Some((idx + 1, joined)),
            }
        }
        joined.push_str(segment);
        Some((idx + 1, joined))
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0C')
}

fn is_comment(line: &str) -> bool {
    line.trim_start_matches(is_blank).starts_with(['#', '!'])
}

/// `line` without its continuation backslash, if it ends with an unescaped one.
fn strip_continuation(line: &str) -> Option<&str> {
    let backslashes = line.bytes().rev().take_while(|b| *b == b'\\').count();
    (backslashes % 2 == 1).then(|| &line[..line.len() - 1])
}

fn parse_entry(logical: &str, line: usize) -> Option<PropertyEntry> {
    let body = logical.trim_start_matches(is_blank);
    if body.is_empty() || body.starts_with(['#', '!']) {
        return None;
    }

    let (raw_key, rest) = body.split_at(key_len(body));
    let rest = rest.trim_start_matches(is_blank);
    let rest = rest.strip_prefix(['=', ':']).unwrap_or(rest);
    let raw_value = rest.trim_start_matches(is_blank);

    Some(PropertyEntry {
        key: unescape(raw_key),
        value: unescape(raw_value),
        line,
    })
}

/// Length of the key: up to the first unescaped separator or blank.
fn key_len(body: &str) -> usize {
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '=' | ':' => return i,
            c if is_blank(c) => return i,
            _ => {}
        }
    }
    body.len()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0C'),
            Some('u') => {
                let rest = chars.as_str();
                match rest.get(..4).and_then(decode_hex4) {
                    Some(decoded) => {
                        out.push(decoded);
                        chars = rest[4..].chars();
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
        }
    }

    out
}

fn decode_hex4(digits: &str) -> Option<char> {
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(char::from_u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(parsed: &PropertiesFile) -> Vec<(&str, &str)> {
        parsed
            .entries
            .iter()
            .map(|e| (e.key.as_str(), e.value.as_str()))
            .collect()
    }

    #[test]
    fn parses_basic_entries() {
        let parsed = parse(
            "# comment\nrepo=libs-release-local\nartifactoryUrl = http://localhost:8081/artifactory\n",
        );
        assert_eq!(
            pairs(&parsed),
            vec![
                ("repo", "libs-release-local"),
                ("artifactoryUrl", "http://localhost:8081/artifactory"),
            ]
        );
        assert_eq!(parsed.entries[0].line, 2);
        assert_eq!(parsed.entries[1].line, 3);
    }

    #[test]
    fn supports_colon_and_whitespace_separators() {
        let parsed = parse("key1:value1\nkey2  =  value2\nkey3 value3\n\tkey4 : value4\nflag\n");
        assert_eq!(
            pairs(&parsed),
            vec![
                ("key1", "value1"),
                ("key2", "value2"),
                ("key3", "value3"),
                ("key4", "value4"),
                ("flag", ""),
            ]
        );
    }

    #[test]
    fn keeps_separators_inside_values() {
        let parsed = parse("password=p@ss=word!123\npath=/usr/local/bin\nurl=http://h:8081/x\n");
        assert_eq!(parsed.get("password"), Some("p@ss=word!123"));
        assert_eq!(parsed.get("path"), Some("/usr/local/bin"));
        assert_eq!(parsed.get("url"), Some("http://h:8081/x"));
    }

    #[test]
    fn escaped_separators_belong_to_the_key() {
        let parsed = parse("a\\=b=c\nwith\\ space = v\n");
        assert_eq!(pairs(&parsed), vec![("a=b", "c"), ("with space", "v")]);
    }

    #[test]
    fn supports_line_continuations_and_unicode_escapes() {
        let parsed = parse(
            "greeting=hello\\\n  world\nunicode=\\u0041\\u00e9\nutf8=caf\u{e9}\nbroken=\\u00zz\ntab=a\\tb\n",
        );
        assert_eq!(parsed.get("greeting"), Some("helloworld"));
        assert_eq!(parsed.get("unicode"), Some("A\u{e9}"));
        assert_eq!(parsed.get("utf8"), Some("caf\u{e9}"));
        assert_eq!(parsed.get("broken"), Some("u00zz"));
        assert_eq!(parsed.get("tab"), Some("a\tb"));
        assert_eq!(parsed.entries[1].line, 3);
    }

    #[test]
    fn even_backslashes_do_not_continue() {
        let parsed = parse("dir=C:\\\\\nnext=1\n");
        assert_eq!(pairs(&parsed), vec![("dir", "C:\\"), ("next", "1")]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let parsed = parse("# a comment \\\n! another\n\n   \nkey=value\r\n");
        assert_eq!(pairs(&parsed), vec![("key", "value")]);
    }

    #[test]
    fn continuation_at_end_of_input() {
        let parsed = parse("key=value\\");
        assert_eq!(parsed.get("key"), Some("value"));
    }

    #[test]
    fn last_definition_wins() {
        let parsed = parse("repo=first\nrepo=second\n");
        assert_eq!(parsed.by_key("repo").count(), 2);
        assert_eq!(parsed.get("repo"), Some("second"));
    }

    #[test]
    fn looked_up_value_outlives_the_key() {
        let parsed = parse("repo=libs-release\n");
        let value = {
            let key = String::from("repo");
            parsed.get(&key)
        };
        assert_eq!(value, Some("libs-release"));
    }
}
