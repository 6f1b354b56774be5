mod scan;
mod token_type;
mod trie;

use std::sync::OnceLock;

pub use self::scan::{is_delimiter, is_identifier_continue, is_identifier_start};
pub use self::token_type::{TokenType, WordType, DEFINITIONS};
use self::trie::Trie;
use crate::{
    preprocessor::Preprocessor,
    span::{Position, Span},
};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Token {
    pub kind: TokenType,
    pub literal: String,
    /// Absolute byte offsets.
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    /// Only populated for interpolation tokens.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Token>,
}

impl Token {
    pub fn new(kind: TokenType, literal: impl Into<String>, at: Position) -> Self {
        let literal = literal.into();
        Self {
            kind,
            start: at.offset,
            end: at.offset + literal.len(),
            line: at.line,
            column: at.column,
            literal,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = children;
        self
    }

    pub fn position(&self) -> Position {
        Position {
            offset: self.start,
            line: self.line,
            column: self.column,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.position(), advance(self.position(), &self.literal))
    }
}

/// Position reached after reading `text` from `at`.
pub(crate) fn advance(mut at: Position, text: &str) -> Position {
    for c in text.chars() {
        at.offset += c.len_utf8();
        if c == '\n' {
            at.line += 1;
            at.column = 0;
        } else {
            at.column += 1;
        }
    }
    at
}

fn trie() -> &'static Trie {
    static TRIE: OnceLock<Trie> = OnceLock::new();
    TRIE.get_or_init(Trie::from_definitions)
}

/// Converts source text into tokens.
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    trie: &'static Trie,
    is_delimiter: fn(char) -> bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            trie: trie(),
            is_delimiter: scan::is_delimiter,
        }
    }

    /// Replace the predicate deciding where identifiers and numbers stop.
    pub fn with_delimiter(mut self, is_delimiter: fn(char) -> bool) -> Self {
        self.is_delimiter = is_delimiter;
        self
    }

    /// Raw scan followed by preprocessing.
    #[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
    pub fn tokenize(&self, source: &str) -> Vec<Token> {
        self.tokenize_at(source, Position::default())
    }

    /// Like [`Tokenizer::tokenize`], with every position shifted so that the
    /// fragment starts at `base`.
    pub fn tokenize_at(&self, source: &str, base: Position) -> Vec<Token> {
        let tokens = self.scan_at(source.as_bytes(), base);
        Preprocessor::new(*self).process(tokens)
    }

    /// The raw token stream, before preprocessing. Invalid UTF-8 becomes
    /// one [`TokenType::Unknown`] token per offending byte.
    pub fn scan(&self, source: &[u8]) -> Vec<Token> {
        self.scan_at(source, Position::default())
    }

    fn scan_at(&self, source: &[u8], base: Position) -> Vec<Token> {
        let mut cursor = Cursor {
            at: base,
            last_was_newline: false,
        };
        let mut tokens = Vec::new();

        for chunk in source.utf8_chunks() {
            self.scan_str(chunk.valid(), &mut cursor, &mut tokens);
            for byte in chunk.invalid() {
                let literal = String::from_utf8_lossy(&[*byte]).into_owned();
                let mut token = Token::new(TokenType::Unknown, literal, cursor.at);
                token.end = cursor.at.offset + 1;
                tokens.push(token);
                cursor.at.offset += 1;
                cursor.at.column += 1;
                cursor.last_was_newline = false;
            }
        }

        tokens
    }

    fn scan_str(&self, source: &str, cursor: &mut Cursor, tokens: &mut Vec<Token>) {
        let mut rest = source;
        while let Some(c) = rest.chars().next() {
            match c {
                ' ' | '\t' | '\r' | '\u{3000}' => {
                    cursor.at.offset += c.len_utf8();
                    cursor.at.column += 1;
                    rest = &rest[c.len_utf8()..];
                }
                '\n' => {
                    if !cursor.last_was_newline {
                        tokens.push(Token::new(TokenType::Newline, "\n", cursor.at));
                        cursor.last_was_newline = true;
                    }
                    cursor.at = advance(cursor.at, "\n");
                    rest = &rest[1..];
                }
                _ => {
                    cursor.last_was_newline = false;
                    let (kind, len) = self.next_token(rest);
                    let literal = &rest[..len];
                    tokens.push(Token::new(kind, literal, cursor.at));
                    cursor.at = advance(cursor.at, literal);
                    rest = &rest[len..];
                }
            }
        }
    }

    fn next_token(&self, source: &str) -> (TokenType, usize) {
        let words_only = source.starts_with(is_identifier_start);
        scan::string(source)
            .or_else(|| scan::heredoc(source))
            .or_else(|| scan::byte(source))
            .or_else(|| scan::comment(source))
            .or_else(|| scan::number(source, self.is_delimiter))
            .or_else(|| self.trie.longest_match(source, words_only))
            .or_else(|| scan::identifier(source, self.is_delimiter))
            .unwrap_or_else(|| {
                let len = source.chars().next().map_or(1, char::len_utf8);
                (TokenType::Unknown, len)
            })
    }
}

struct Cursor {
    at: Position,
    last_was_newline: bool,
}

/// Tokenize and preprocess `source` with the default tokenizer.
pub fn tokens(source: &str) -> Vec<Token> {
    Tokenizer::new().tokenize(source)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenType> {
        tokens.iter().map(|token| token.kind).collect()
    }

    fn raw(source: &str) -> Vec<Token> {
        Tokenizer::new().scan(source.as_bytes())
    }

    #[test]
    fn test_scan_statement() {
        let tokens = raw("$total = $a + 10;");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Dollar,
                TokenType::Identifier,
                TokenType::Assign,
                TokenType::Dollar,
                TokenType::Identifier,
                TokenType::Add,
                TokenType::Int,
                TokenType::Semicolon,
            ]
        );
        assert_eq!(tokens[1].literal, "total");
        assert_eq!(tokens[6].start, 14);
        assert_eq!(tokens[6].end, 16);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = raw("class classes extends in int $this");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Class,
                TokenType::Identifier,
                TokenType::Extends,
                TokenType::In,
                TokenType::Identifier,
                TokenType::This,
            ]
        );
    }

    #[test]
    fn test_longest_operator() {
        let tokens = raw("a<=>b ??= c?->d");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Spaceship,
                TokenType::Identifier,
                TokenType::CoalesceAssign,
                TokenType::Identifier,
                TokenType::NullsafeOperator,
                TokenType::Identifier,
            ]
        );
    }

    #[test]
    fn test_newlines_collapse() {
        let tokens = raw("a\n\n  \n\u{3000}\nb\n");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Newline,
                TokenType::Identifier,
                TokenType::Newline,
            ]
        );
        assert_eq!(tokens[2].line, 4);
        assert_eq!(tokens[2].column, 0);
    }

    #[test]
    fn test_positions_count_characters() {
        let tokens = raw("名字 = \"值\"\n  x");
        assert_eq!(tokens[0].column, 0);
        assert_eq!(tokens[1].column, 3);
        assert_eq!(tokens[1].start, 7);
        assert_eq!(tokens[2].column, 5);
        assert_eq!(tokens[4].line, 1);
        assert_eq!(tokens[4].column, 2);
    }

    #[test]
    fn test_multiline_tokens_advance_lines() {
        let tokens = raw("/* a\nb */ x \"s\ns\" y");
        assert_eq!(tokens[0].kind, TokenType::MultilineComment);
        assert_eq!(tokens[1].line, 1);
        assert_eq!(tokens[1].column, 5);
        assert_eq!(tokens[3].line, 2);
        assert_eq!(tokens[2].span().end_line, 2);
    }

    #[test]
    fn test_invalid_utf8_becomes_unknown() {
        let tokens = Tokenizer::new().scan(b"a \xff\xfe b");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Unknown,
                TokenType::Unknown,
                TokenType::Identifier,
            ]
        );
        assert_eq!(tokens[2].start, 3);
        assert_eq!(tokens[3].start, 5);
    }

    #[test]
    fn test_unterminated_string_is_unknown() {
        let tokens = raw("\"abc");
        assert_eq!(tokens[0].kind, TokenType::Unknown);
        assert_eq!(tokens[0].literal, "\"");
        assert_eq!(tokens[1].kind, TokenType::Identifier);
    }

    #[test]
    fn test_custom_delimiter() {
        let tokenizer = Tokenizer::new().with_delimiter(|c| c.is_whitespace() || c == '-');
        let tokens = tokenizer.scan(b"data-id x");
        assert_eq!(tokens[0].literal, "data");
        assert_eq!(tokens[1].kind, TokenType::Sub);
    }

    #[test]
    fn test_tokens_preprocesses() {
        let tokens = tokens("$a = 1\n$b = 2");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Variable,
                TokenType::Assign,
                TokenType::Int,
                TokenType::Semicolon,
                TokenType::Variable,
                TokenType::Assign,
                TokenType::Int,
            ]
        );
        assert_eq!(tokens[0].literal, "$a");
        assert_eq!(tokens[3].literal, "\n");
    }
}
