//! Splits zone file text into logical lines of fields.
//!
//! A logical line is one physical line, or several when parentheses
//! are open. Comments are dropped. Escapes are kept verbatim in the
//! field text (they matter differently for names and for
//! `<character-string>`s); they only stop a backslash-escaped blank
//! or delimiter from ending the field.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Field {
    pub text: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LogicalLine {
    /// Physical line the logical line starts on (1-based).
    pub line: usize,
    /// Whether the line starts with blank space, meaning the owner is
    /// inherited from the previous record.
    pub indented: bool,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LexError {
    pub line: usize,
    pub msg: &'static str,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.msg, self.line)
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    depth: usize,
}

/// Tokenizes `text`, which must already use LF line endings. Lines
/// without fields are skipped.
pub(super) fn tokenize(text: &str) -> Result<Vec<LogicalLine>, LexError> {
    let mut lexer = Lexer {
        chars: text.chars().peekable(),
        line: 1,
        depth: 0,
    };
    let mut lines = Vec::new();
    while lexer.chars.peek().is_some() {
        let logical = lexer.logical_line()?;
        if !logical.fields.is_empty() {
            lines.push(logical);
        }
    }
    Ok(lines)
}

impl Lexer<'_> {
    fn error(&self, msg: &'static str) -> LexError {
        LexError {
            line: self.line,
            msg,
        }
    }

    fn logical_line(&mut self) -> Result<LogicalLine, LexError> {
        let mut logical = LogicalLine {
            line: self.line,
            indented: matches!(self.chars.peek(), Some(' ' | '\t')),
            fields: Vec::new(),
        };

        loop {
            let Some(&c) = self.chars.peek() else {
                if self.depth > 0 {
                    return Err(self.error("unclosed parenthesis"));
                }
                return Ok(logical);
            };
            match c {
                '\n' => {
                    self.chars.next();
                    self.line += 1;
                    if self.depth == 0 {
                        return Ok(logical);
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.chars.next();
                }
                ';' => {
                    while self.chars.next_if(|&c| c != '\n').is_some() {}
                }
                '(' => {
                    self.chars.next();
                    self.depth += 1;
                }
                ')' => {
                    self.chars.next();
                    if self.depth == 0 {
                        return Err(self.error("unbalanced closing parenthesis"));
                    }
                    self.depth -= 1;
                }
                '"' => {
                    self.chars.next();
                    logical.fields.push(self.quoted()?);
                }
                _ => logical.fields.push(self.bare()?),
            }
        }
    }

    fn quoted(&mut self) -> Result<Field, LexError> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated quoted string")),
                Some('"') => {
                    return Ok(Field { text, quoted: true });
                }
                Some('\\') => {
                    let escaped = self
                        .chars
                        .next()
                        .ok_or_else(|| self.error("escape at end of input"))?;
                    if escaped == '\n' {
                        self.line += 1;
                    }
                    text.push('\\');
                    text.push(escaped);
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                }
            }
        }
    }

    fn bare(&mut self) -> Result<Field, LexError> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' | ';' | '(' | ')' | '"' => break,
                '\\' => {
                    self.chars.next();
                    let escaped = self
                        .chars
                        .next()
                        .ok_or_else(|| self.error("escape at end of input"))?;
                    text.push('\\');
                    text.push(escaped);
                }
                _ => {
                    self.chars.next();
                    text.push(c);
                }
            }
        }
        Ok(Field {
            text,
            quoted: false,
        })
    }
}

/// Resolves `\X` and `\DDD` escapes in a `<character-string>`.
pub(super) fn unescape(text: &str) -> Option<String> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let first = bytes.next()?;
        if first.is_ascii_digit() {
            let second = bytes.next_if(u8::is_ascii_digit)?;
            let third = bytes.next_if(u8::is_ascii_digit)?;
            let value = u32::from(first - b'0') * 100 + u32::from(second - b'0') * 10 + u32::from(third - b'0');
            out.push(u8::try_from(value).ok()?);
        } else {
            out.push(first);
        }
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &LogicalLine) -> Vec<&str> {
        line.fields.iter().map(|f| f.text.as_str()).collect()
    }

    #[test]
    fn splits_fields_and_drops_comments() {
        let lines = tokenize("www 300 IN A 192.0.2.1 ; web\n\n; only a comment\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(texts(&lines[0]), vec!["www", "300", "IN", "A", "192.0.2.1"]);
        assert!(!lines[0].indented);
    }

    #[test]
    fn parentheses_join_physical_lines() {
        let text = "@ IN SOA ns1 admin (\n  1 ; serial\n  2 3 4\n  5 )\nnext A 1.2.3.4\n";
        let lines = tokenize(text).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(texts(&lines[0]).len(), 10);
        assert_eq!(lines[1].line, 5);
    }

    #[test]
    fn leading_blank_marks_inherited_owner() {
        let lines = tokenize("www A 192.0.2.1\n\tAAAA ::1\n").unwrap();
        assert!(lines[1].indented);
        assert_eq!(texts(&lines[1]), vec!["AAAA", "::1"]);
    }

    #[test]
    fn quoted_strings_keep_spaces_and_semicolons() {
        let lines = tokenize("txt TXT \"hello world; not a comment\" \"x\\\"y\"\n").unwrap();
        let fields = &lines[0].fields;
        assert_eq!(fields[2].text, "hello world; not a comment");
        assert!(fields[2].quoted);
        assert_eq!(fields[3].text, "x\\\"y");
    }

    #[test]
    fn escaped_blank_does_not_split() {
        let lines = tokenize("a\\ b A 192.0.2.1\n").unwrap();
        assert_eq!(lines[0].fields[0].text, "a\\ b");
    }

    #[test]
    fn unbalanced_parentheses_are_errors() {
        assert_eq!(tokenize("a ( b\n").unwrap_err().msg, "unclosed parenthesis");
        assert_eq!(tokenize("a ) b\n").unwrap_err().line, 1);
        assert!(tokenize("a \"open\n").is_err());
    }

    #[test]
    fn unescape_handles_decimal_and_literal() {
        assert_eq!(unescape(r#"a\"b\059c\\"#).unwrap(), "a\"b;c\\");
        assert!(unescape(r"\25").is_none());
        assert!(unescape(r"\999").is_none());
    }
}
