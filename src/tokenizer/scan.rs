//! Dedicated scanners for the token classes the trie cannot describe.
//!
//! Every scanner looks at the start of `source` and returns the token type
//! and the matched length in bytes, or `None` when the class does not apply.

use super::TokenType;

/// First code point of the CJK range treated as identifier text.
const CJK_THRESHOLD: char = '\u{4E00}';

pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c >= CJK_THRESHOLD
}

pub fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\\' || c >= CJK_THRESHOLD
}

/// Default delimiter predicate: whitespace and every single-character
/// operator or punctuation mark.
pub fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '\u{3000}' || "()[]{}<>+-*/%=!&|^~?:,;@$.'\"`".contains(c)
}

pub fn string(source: &str) -> Option<(TokenType, usize)> {
    let quote = source.chars().next()?;
    if !matches!(quote, '\'' | '"' | '`') {
        return None;
    }

    let escapes = quote != '`';
    let mut escaped = false;
    for (offset, c) in source.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if escapes && c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some((TokenType::String, offset + c.len_utf8()));
        }
    }

    None
}

/// `<<<ID ... ID` and the non-interpolating `<<<'ID' ... ID`.
pub fn heredoc(source: &str) -> Option<(TokenType, usize)> {
    let rest = source.strip_prefix("<<<")?;
    let header_end = rest.find('\n')?;
    let header = rest[..header_end].trim_matches([' ', '\t', '\r']);
    let (label, kind) = match header.strip_prefix('\'').and_then(|h| h.strip_suffix('\'')) {
        Some(label) => (label, TokenType::Nowdoc),
        None => (header.trim_matches('"'), TokenType::Heredoc),
    };
    if label.is_empty() || !label.chars().all(is_identifier_continue) {
        return None;
    }

    let mut offset = 3 + header_end + 1;
    for line in source[offset..].split_inclusive('\n') {
        let trimmed = line.trim_start_matches([' ', '\t']);
        if let Some(after) = trimmed.strip_prefix(label) {
            if !after.starts_with(is_identifier_continue) {
                let indent = line.len() - trimmed.len();
                return Some((kind, offset + indent + label.len()));
            }
        }
        offset += line.len();
    }

    None
}

/// `b'x'`, with one escaped or unescaped character.
pub fn byte(source: &str) -> Option<(TokenType, usize)> {
    let rest = source.strip_prefix("b'")?;
    let mut chars = rest.char_indices();
    let (_, c) = chars.next()?;
    if c == '\\' {
        chars.next()?;
    }
    let (offset, close) = chars.next()?;
    (close == '\'').then_some((TokenType::Byte, 2 + offset + 1))
}

/// Line comments stop before the newline; an unterminated block comment
/// consumes the rest of the input.
pub fn comment(source: &str) -> Option<(TokenType, usize)> {
    if source.starts_with("//") {
        let len = source.find('\n').unwrap_or(source.len());
        return Some((TokenType::Comment, len));
    }
    if source.starts_with("/*") {
        let len = source[2..]
            .find("*/")
            .map(|end| 2 + end + 2)
            .unwrap_or(source.len());
        return Some((TokenType::MultilineComment, len));
    }
    None
}

/// Greedy numeric scan. Anything that starts with a digit is consumed up to
/// the next delimiter and classified afterwards; malformed input degrades to
/// [`TokenType::Number`] instead of failing.
pub fn number(source: &str, is_delimiter: fn(char) -> bool) -> Option<(TokenType, usize)> {
    if !source.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let bytes = source.as_bytes();
    let mut len = 0;
    for (offset, c) in source.char_indices() {
        let allowed = match c {
            '.' => bytes.get(offset + 1) != Some(&b'.') && bytes.get(offset + 1).is_some_and(u8::is_ascii_digit),
            '+' | '-' => {
                offset > 0
                    && matches!(bytes[offset - 1], b'e' | b'E')
                    && !source[..offset].starts_with("0x")
            }
            c => !is_delimiter(c),
        };
        if !allowed {
            break;
        }
        len = offset + c.len_utf8();
    }

    Some((classify_number(&source[..len]), len))
}

fn classify_number(literal: &str) -> TokenType {
    let digits = |s: &str, radix: u32| !s.is_empty() && s.chars().all(|c| c.is_digit(radix) || c == '_');

    if ["0x", "0X", "0b", "0B"].iter().any(|prefix| literal.starts_with(prefix)) {
        return TokenType::Number;
    }
    if digits(literal, 10) {
        if literal.len() > 1 && literal.starts_with('0') {
            return TokenType::Number;
        }
        return TokenType::Int;
    }
    if let Some((whole, fraction)) = literal.split_once('.') {
        if digits(whole, 10) && digits(fraction, 10) {
            return TokenType::Float;
        }
    }
    TokenType::Number
}

/// Identifier scan: an identifier-start character followed by continuation
/// characters, stopping at the first delimiter.
pub fn identifier(source: &str, is_delimiter: fn(char) -> bool) -> Option<(TokenType, usize)> {
    let mut chars = source.char_indices();
    let (_, first) = chars.next()?;
    if !is_identifier_start(first) {
        return None;
    }

    let mut len = first.len_utf8();
    for (offset, c) in chars {
        if is_delimiter(c) || !is_identifier_continue(c) {
            break;
        }
        len = offset + c.len_utf8();
    }
    Some((TokenType::Identifier, len))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strings() {
        assert_eq!(string(r#""a\"b" rest"#), Some((TokenType::String, 6)));
        assert_eq!(string("'it''s'"), Some((TokenType::String, 4)));
        assert_eq!(string(r"`a\`"), Some((TokenType::String, 4)));
        assert_eq!(string("\"never closed"), None);
        assert_eq!(string("\"中文\""), Some((TokenType::String, 8)));
    }

    #[test]
    fn heredocs() {
        let source = "<<<EOT\nhello\n  EOT;\n";
        assert_eq!(heredoc(source), Some((TokenType::Heredoc, 18)));
        let source = "<<<'RAW'\n{$x}\nRAW\n";
        assert_eq!(heredoc(source), Some((TokenType::Nowdoc, 17)));
        assert_eq!(heredoc("<<<EOT\nno end"), None);
        assert_eq!(heredoc("<<< 1"), None);
    }

    #[test]
    fn bytes_and_comments() {
        assert_eq!(byte("b'a'"), Some((TokenType::Byte, 4)));
        assert_eq!(byte(r"b'\n'"), Some((TokenType::Byte, 5)));
        assert_eq!(byte("bar"), None);
        assert_eq!(comment("// hi\nx"), Some((TokenType::Comment, 5)));
        assert_eq!(comment("/* a */b"), Some((TokenType::MultilineComment, 7)));
        assert_eq!(comment("/* open"), Some((TokenType::MultilineComment, 7)));
        assert_eq!(comment("/ 2"), None);
    }

    #[test]
    fn numbers() {
        let n = |s| number(s, is_delimiter);
        assert_eq!(n("42;"), Some((TokenType::Int, 2)));
        assert_eq!(n("3.14)"), Some((TokenType::Float, 4)));
        assert_eq!(n("0x1F "), Some((TokenType::Number, 4)));
        assert_eq!(n("0b101"), Some((TokenType::Number, 5)));
        assert_eq!(n("0755"), Some((TokenType::Number, 4)));
        assert_eq!(n("1e-5+1"), Some((TokenType::Number, 4)));
        assert_eq!(n("12abc"), Some((TokenType::Number, 5)));
        assert_eq!(n("1..5"), Some((TokenType::Int, 1)));
        assert_eq!(n("1.method"), Some((TokenType::Int, 1)));
        assert_eq!(n("1-2"), Some((TokenType::Int, 1)));
        assert_eq!(n("abc"), None);
    }

    #[test]
    fn identifiers() {
        let i = |s| identifier(s, is_delimiter);
        assert_eq!(i("foo_bar1 = 2"), Some((TokenType::Identifier, 8)));
        assert_eq!(i("App\\Models\\User;"), Some((TokenType::Identifier, 15)));
        assert_eq!(i("名字=1"), Some((TokenType::Identifier, 6)));
        assert_eq!(i("1abc"), None);
    }
}
