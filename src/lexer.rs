//! Single-pass tokenizer.
//!
//! The scanner runs in one of four exclusive modes. In normal mode whitespace and
//! the delimiters `( ) [ ] ;` end the current token, and brackets are emitted as
//! one-character tokens. A `"` or `'` switches into string or char mode without
//! closing the token in progress, and `;` switches into comment mode, which lasts
//! until the end of the line and produces nothing.
//!
//! A string closes on a `"` preceded by an even number of backslashes; a char
//! closes on the next `'`. Neither may contain a raw newline or run into the end
//! of input.

use std::fmt;
use std::rc::Rc;

use crate::{DEFAULT_SOURCE_NAME, Error, LexerError, LexerErrorKind};

/// A positioned piece of source text. Rows and columns are 1-indexed and point at
/// the token's first character; columns count characters, not bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub row: usize,
    pub column: usize,
    pub source: Rc<str>,
}

impl Token {
    pub fn new(text: impl Into<String>, row: usize, column: usize, source: Rc<str>) -> Self {
        Token {
            text: text.into(),
            row,
            column,
            source,
        }
    }

    /// `source#row:column`, used by error messages
    pub fn location(&self) -> String {
        format!("{}#{}:{}", self.source, self.row, self.column)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.row, self.column, self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Normal,
    String,
    Char,
    Comment,
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '[' | ']' | ';')
}

struct Scanner {
    chars: Vec<char>,
    source: Rc<str>,
    tokens: Vec<Token>,
    row: usize,
    line_start: usize,
}

impl Scanner {
    fn emit(&mut self, from: usize, to: usize) {
        let text: String = self.chars[from..to].iter().collect();
        self.tokens.push(Token::new(
            text,
            self.row,
            from - self.line_start + 1,
            Rc::clone(&self.source),
        ));
    }

    fn error(&self, kind: LexerErrorKind, from: usize) -> Error {
        Error::LexerError(LexerError {
            kind,
            source: Rc::clone(&self.source),
            row: self.row,
            column: from - self.line_start + 1,
        })
    }

    /// Number of consecutive backslashes directly before `at`, not looking past `floor`
    fn backslashes_before(&self, at: usize, floor: usize) -> usize {
        self.chars[floor..at]
            .iter()
            .rev()
            .take_while(|&&c| c == '\\')
            .count()
    }
}

/// Tokenize `program` under the default source name.
pub fn lex(program: &str) -> Result<Vec<Token>, Error> {
    lex_with_source(program, DEFAULT_SOURCE_NAME)
}

/// Tokenize `program`, stamping `source` on every token for diagnostics.
pub fn lex_with_source(program: &str, source: &str) -> Result<Vec<Token>, Error> {
    let normalized = program.replace("\r\n", "\n");
    let mut scanner = Scanner {
        chars: normalized.chars().collect(),
        source: Rc::from(source),
        tokens: Vec::new(),
        row: 1,
        line_start: 0,
    };

    let mut mode = Mode::Normal;
    // First character of the token in progress
    let mut start = 0;
    let mut i = 0;

    while i < scanner.chars.len() {
        let ch = scanner.chars[i];
        match mode {
            Mode::Normal => {
                if is_delimiter(ch) {
                    if start < i {
                        scanner.emit(start, i);
                    }
                    match ch {
                        '(' | ')' | '[' | ']' => scanner.emit(i, i + 1),
                        ';' => mode = Mode::Comment,
                        '\n' => {
                            scanner.row += 1;
                            scanner.line_start = i + 1;
                        }
                        _ => {}
                    }
                    start = i + 1;
                } else if ch == '"' {
                    mode = Mode::String;
                } else if ch == '\'' {
                    mode = Mode::Char;
                }
            }
            Mode::String => {
                if ch == '"' && scanner.backslashes_before(i, start) % 2 == 0 {
                    scanner.emit(start, i + 1);
                    start = i + 1;
                    mode = Mode::Normal;
                } else if ch == '\n' {
                    return Err(scanner.error(LexerErrorKind::NewlineInString, start));
                }
            }
            Mode::Char => {
                if ch == '\'' {
                    scanner.emit(start, i + 1);
                    start = i + 1;
                    mode = Mode::Normal;
                } else if ch == '\n' {
                    return Err(scanner.error(LexerErrorKind::NewlineInChar, start));
                }
            }
            Mode::Comment => {
                if ch == '\n' {
                    // Hand the newline back to normal mode so the row advances
                    start = i;
                    mode = Mode::Normal;
                    continue;
                }
            }
        }
        i += 1;
    }

    match mode {
        Mode::Normal if start < scanner.chars.len() => scanner.emit(start, scanner.chars.len()),
        Mode::Normal | Mode::Comment => {}
        Mode::String => return Err(scanner.error(LexerErrorKind::UnterminatedString, start)),
        Mode::Char => return Err(scanner.error(LexerErrorKind::UnterminatedChar, start)),
    }

    tracing::debug!(tokens = scanner.tokens.len(), source, "lexed program");
    Ok(scanner.tokens)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn texts(program: &str) -> Vec<String> {
        lex(program).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_token_texts() {
        let cases: Vec<(&str, Vec<&str>)> = vec![
            ("(+ 1 2)", vec!["(", "+", "1", "2", ")"]),
            ("[1 2 3]", vec!["[", "1", "2", "3", "]"]),
            ("  42  ", vec!["42"]),
            ("", vec![]),
            ("(a(b)c)", vec!["(", "a", "(", "b", ")", "c", ")"]),
            ("foo\tbar\nbaz", vec!["foo", "bar", "baz"]),
            // strings keep their delimiters and inner whitespace
            ("(display \"hi there\")", vec!["(", "display", "\"hi there\"", ")"]),
            (r#""a \"b\" c""#, vec![r#""a \"b\" c""#]),
            (r#""a\\" b"#, vec![r#""a\\""#, "b"]),
            (r#""(not [brackets])""#, vec![r#""(not [brackets])""#]),
            // chars close on the next quote
            ("'x' 'y'", vec!["'x'", "'y'"]),
            ("'ab'", vec!["'ab'"]),
            // comments vanish
            ("; nothing here", vec![]),
            ("(+ 1 ; one\n 2)", vec!["(", "+", "1", "2", ")"]),
            ("x;comment", vec!["x"]),
            // a quote does not close the token in progress
            ("ab\"c d\" e", vec!["ab\"c d\"", "e"]),
            ("\"a\"b", vec!["\"a\"", "b"]),
            ("(+ 1 2)\r\n(+ 3 4)", vec!["(", "+", "1", "2", ")", "(", "+", "3", "4", ")"]),
        ];

        for (i, (program, expected)) in cases.into_iter().enumerate() {
            assert_eq!(texts(program), expected, "case {i}: {program:?}");
        }
    }

    #[test]
    fn test_positions() {
        let tokens = lex("(+ 1 2)").unwrap();
        let columns: Vec<usize> = tokens.iter().map(|t| t.column).collect();
        assert_eq!(columns, vec![1, 2, 4, 6, 8]);
        assert!(tokens.iter().all(|t| t.row == 1));

        let tokens = lex("(a\n  b ; note\n\"s\")").unwrap();
        let positions: Vec<(usize, usize)> = tokens.iter().map(|t| (t.row, t.column)).collect();
        assert_eq!(positions, vec![(1, 1), (1, 2), (2, 3), (3, 1), (3, 4)]);

        // columns count characters, not bytes
        let tokens = lex("(λ x)").unwrap();
        assert_eq!(tokens[2].text, "x");
        assert_eq!(tokens[2].column, 4);

        let tokens = lex("a\r\nb").unwrap();
        assert_eq!((tokens[1].row, tokens[1].column), (2, 1));
    }

    #[test]
    fn test_token_display() {
        let tokens = lex_with_source("(+ 1\n  22)", "demo.sl").unwrap();
        let rendered: Vec<String> = tokens.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["1:1 (", "1:2 +", "1:4 1", "2:3 22", "2:5 )"]);
        assert_eq!(tokens[3].location(), "demo.sl#2:3");
        assert_eq!(lex("x").unwrap()[0].location(), "__main__#1:1");
    }

    #[test]
    fn test_lexer_errors() {
        let cases = vec![
            ("\"abc", LexerErrorKind::UnterminatedString, 1, 1),
            ("(display \"abc)", LexerErrorKind::UnterminatedString, 1, 10),
            ("\"", LexerErrorKind::UnterminatedString, 1, 1),
            ("x\n  \"ab\ncd\"", LexerErrorKind::NewlineInString, 2, 3),
            ("'a", LexerErrorKind::UnterminatedChar, 1, 1),
            ("'a\n'", LexerErrorKind::NewlineInChar, 1, 1),
            (r#""ends with escaped quote\""#, LexerErrorKind::UnterminatedString, 1, 1),
        ];

        for (i, (program, kind, row, column)) in cases.into_iter().enumerate() {
            match lex(program) {
                Err(Error::LexerError(e)) => {
                    assert_eq!(e.kind, kind, "case {i}: {program:?}");
                    assert_eq!((e.row, e.column), (row, column), "case {i}: {program:?}");
                }
                other => panic!("case {i}: expected lexer error for {program:?}, got {other:?}"),
            }
        }
    }
}
