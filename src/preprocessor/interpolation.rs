//! Expansion of `{$expr}` and `@{expr}` markers inside string and text
//! tokens.

use std::ops::Range;

use crate::{
    span::Position,
    tokenizer::{advance, is_identifier_start, Token, TokenType, Tokenizer},
};

/// Rewrites a string-like token containing at least one marker into an
/// [`TokenType::InterpolationToken`]. Every other token is returned as is.
pub(super) fn expand(tokenizer: &Tokenizer, token: Token) -> Token {
    let Some(content) = content_range(&token) else {
        return token;
    };

    let literal = token.literal.as_str();
    let mut children = Vec::new();
    let mut segment_start = content.start;
    let mut i = content.start;
    let mut found = false;

    while i < content.end {
        let Some(marker) = marker_at(literal, i, content.end) else {
            i += literal[i..].chars().next().map_or(1, char::len_utf8);
            continue;
        };

        if segment_start < i {
            children.push(segment(&token, segment_start..i));
        }

        let sub_tokens = tokenizer.tokenize_at(
            &literal[marker.expression.clone()],
            position_in(&token, marker.expression.start),
        );
        children.push(
            Token::new(
                TokenType::InterpolationValue,
                &literal[i..marker.end],
                position_in(&token, i),
            )
            .with_children(sub_tokens),
        );

        found = true;
        i = marker.end;
        segment_start = i;
    }

    if !found {
        return token;
    }
    if segment_start < content.end {
        children.push(segment(&token, segment_start..content.end));
    }

    Token {
        kind: TokenType::InterpolationToken,
        children,
        ..token
    }
}

/// Byte range of the interpolatable body inside the token's literal.
fn content_range(token: &Token) -> Option<Range<usize>> {
    let literal = &token.literal;
    match token.kind {
        TokenType::String => {
            let quote = literal.chars().next()?;
            (literal.len() >= 2 && literal.ends_with(quote)).then(|| 1..literal.len() - 1)
        }
        TokenType::Heredoc => {
            let start = literal.find('\n')? + 1;
            let end = literal.rfind('\n')?;
            (start <= end).then_some(start..end)
        }
        TokenType::Text => Some(0..literal.len()),
        _ => None,
    }
}

struct Marker {
    /// Range of the embedded expression text.
    expression: Range<usize>,
    /// One past the closing brace.
    end: usize,
}

fn marker_at(literal: &str, i: usize, limit: usize) -> Option<Marker> {
    let rest = &literal[i..limit];
    if let Some(after) = rest.strip_prefix("{$") {
        if !after.starts_with(is_identifier_start) {
            return None;
        }
        let close = i + 1 + matching_brace(&rest[1..])?;
        return Some(Marker {
            expression: i + 1..close,
            end: close + 1,
        });
    }
    if rest.starts_with("@{") {
        let close = i + 2 + matching_brace(&rest[2..])?;
        if close == i + 2 {
            return None;
        }
        return Some(Marker {
            expression: i + 2..close,
            end: close + 1,
        });
    }
    None
}

/// Offset of the `}` closing an already opened brace, honouring nested
/// brackets and quoted strings.
fn matching_brace(source: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    for (offset, c) in source.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' | '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.checked_sub(1)?,
            '}' if depth == 0 => return Some(offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn position_in(token: &Token, offset: usize) -> Position {
    advance(token.position(), &token.literal[..offset])
}

fn segment(token: &Token, range: Range<usize>) -> Token {
    Token::new(
        TokenType::String,
        &token.literal[range.clone()],
        position_in(token, range.start),
    )
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::tokenizer::{tokens, TokenType};

    #[test]
    fn test_single_marker_after_text() {
        let tokens = tokens(r#"echo "Hello {$name}""#);
        let string = &tokens[1];
        assert_eq!(string.kind, TokenType::InterpolationToken);
        assert_eq!(string.literal, r#""Hello {$name}""#);
        assert_eq!(string.children.len(), 2);

        let text = &string.children[0];
        assert_eq!(text.kind, TokenType::String);
        assert_eq!(text.literal, "Hello ");
        assert_eq!(text.start, 6);

        let value = &string.children[1];
        assert_eq!(value.kind, TokenType::InterpolationValue);
        assert_eq!(value.literal, "{$name}");
        assert_eq!(value.children.len(), 1);
        assert_eq!(value.children[0].kind, TokenType::Variable);
        assert_eq!(value.children[0].literal, "$name");
        assert_eq!(value.children[0].start, 13);
        assert_eq!(value.children[0].column, 13);
    }

    #[test]
    fn test_method_call_marker() {
        let tokens = tokens(r#""id: {$user->get(['a' => '}'])}!""#);
        let string = &tokens[0];
        assert_eq!(string.children.len(), 3);
        assert_eq!(string.children[2].literal, "!");
        let inner: Vec<TokenType> = string.children[1]
            .children
            .iter()
            .map(|token| token.kind)
            .collect();
        assert_eq!(
            inner,
            vec![
                TokenType::Variable,
                TokenType::ObjectOperator,
                TokenType::Identifier,
                TokenType::LParen,
                TokenType::LBracket,
                TokenType::String,
                TokenType::ArrayKeyValue,
                TokenType::String,
                TokenType::RBracket,
                TokenType::RParen,
            ]
        );
    }

    #[test]
    fn test_raw_expression_marker() {
        let tokens = tokens(r#""sum @{1 + 2} done""#);
        let string = &tokens[0];
        assert_eq!(string.children.len(), 3);
        let inner: Vec<&str> = string.children[1]
            .children
            .iter()
            .map(|token| token.literal.as_str())
            .collect();
        assert_eq!(inner, vec!["1", "+", "2"]);
    }

    #[test]
    fn test_invalid_markers_stay_literal() {
        for source in [r#""{$1}""#, r#""{$}""#, r#""{$open""#, r#""@{}""#, r#""plain""#] {
            let tokens = tokens(source);
            assert_eq!(tokens.len(), 1);
            assert_eq!(tokens[0].kind, TokenType::String, "{source}");
            assert!(tokens[0].children.is_empty());
        }
    }

    #[test]
    fn test_heredoc_body() {
        let tokens = tokens("<<<EOT\nHi {$who}\nEOT");
        assert_eq!(tokens[0].kind, TokenType::InterpolationToken);
        assert_eq!(tokens[0].children[0].literal, "Hi ");
        assert_eq!(tokens[0].children[0].line, 1);
        assert_eq!(tokens[0].children[1].children[0].line, 1);
        assert_eq!(tokens[0].children[1].children[0].column, 4);
    }

    #[test]
    fn test_marker_at_start() {
        let tokens = tokens(r#""{$a}{$b}""#);
        let kinds: Vec<TokenType> = tokens[0].children.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenType::InterpolationValue, TokenType::InterpolationValue]
        );
    }
}
