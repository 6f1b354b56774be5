mod interpolation;

use crate::tokenizer::{Token, TokenType, Tokenizer};

/// Bracket depth up to which `name = ...` after `[ { ( ; ,` is read as a
/// variable binding.
const MAX_BINDING_DEPTH: usize = 2;

/// Second pass over the raw token stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    tokenizer: Tokenizer,
}

impl Preprocessor {
    /// `tokenizer` is re-invoked on expressions embedded in strings.
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(tokens = tokens.len()))]
    pub fn process(&self, tokens: Vec<Token>) -> Vec<Token> {
        let tokens = strip_trivia(tokens);
        let tokens = fuse_variables(tokens);
        let tokens = tokens
            .into_iter()
            .map(|token| interpolation::expand(&self.tokenizer, token))
            .collect();
        let tokens = insert_terminators(tokens);
        reclassify_bindings(tokens)
    }
}

fn strip_trivia(tokens: Vec<Token>) -> Vec<Token> {
    let mut kept: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token.kind {
            TokenType::Whitespace | TokenType::Comment | TokenType::MultilineComment => {}
            TokenType::Newline
                if kept.last().is_some_and(|last| last.kind == TokenType::Newline) => {}
            _ => kept.push(token),
        }
    }
    kept
}

fn is_fusible(kind: TokenType) -> bool {
    kind == TokenType::Identifier || kind.is_keyword() || kind.is_literal_value()
}

fn fuse_variables(tokens: Vec<Token>) -> Vec<Token> {
    let mut fused = Vec::with_capacity(tokens.len());
    let mut tokens = tokens.into_iter().peekable();
    while let Some(token) = tokens.next() {
        if token.kind != TokenType::Dollar {
            fused.push(token);
            continue;
        }
        match tokens.next_if(|next| is_fusible(next.kind)) {
            Some(name) => fused.push(Token {
                kind: TokenType::Variable,
                literal: format!("${}", name.literal),
                end: name.end,
                ..token
            }),
            None => fused.push(token),
        }
    }
    fused
}

fn insert_terminators(tokens: Vec<Token>) -> Vec<Token> {
    let mut result = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenType::Newline {
            result.push(token.clone());
            continue;
        }
        let (Some(prev), Some(next)) = (i.checked_sub(1).and_then(|p| tokens.get(p)), tokens.get(i + 1))
        else {
            continue;
        };
        if !prev.kind.continues_statement() && !next.kind.cannot_start_statement() {
            result.push(Token {
                kind: TokenType::Semicolon,
                ..token.clone()
            });
        }
    }
    result
}

fn reclassify_bindings(mut tokens: Vec<Token>) -> Vec<Token> {
    let mut depth = 0usize;
    for i in 0..tokens.len() {
        let binds = tokens[i].kind == TokenType::Identifier
            && depth <= MAX_BINDING_DEPTH
            && i > 0
            && tokens.get(i + 1).is_some_and(|next| next.kind == TokenType::Assign)
            && matches!(
                tokens[i - 1].kind,
                TokenType::LBracket
                    | TokenType::LBrace
                    | TokenType::LParen
                    | TokenType::Semicolon
                    | TokenType::Comma
            );
        if binds {
            tokens[i].kind = TokenType::Variable;
        }

        match tokens[i].kind {
            TokenType::LBracket | TokenType::LBrace | TokenType::LParen => depth += 1,
            TokenType::RBracket | TokenType::RBrace | TokenType::RParen => {
                depth = depth.saturating_sub(1)
            }
            _ => {}
        }
    }
    tokens
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::tokens;

    fn kinds(source: &str) -> Vec<TokenType> {
        tokens(source).iter().map(|token| token.kind).collect()
    }

    #[test]
    fn test_drops_trivia() {
        assert_eq!(
            kinds("a // note\n/* block */ b"),
            vec![TokenType::Identifier, TokenType::Semicolon, TokenType::Identifier]
        );
        assert_eq!(
            kinds("a\n// only a comment\nb"),
            vec![TokenType::Identifier, TokenType::Semicolon, TokenType::Identifier]
        );
    }

    #[test]
    fn test_fuses_sigils() {
        let tokens = tokens("$name $null $class $ 1");
        assert_eq!(tokens[0].kind, TokenType::Variable);
        assert_eq!(tokens[0].literal, "$name");
        assert_eq!((tokens[0].start, tokens[0].end), (0, 5));
        assert_eq!(tokens[1].literal, "$null");
        assert_eq!(tokens[2].literal, "$class");
        assert_eq!(tokens[3].kind, TokenType::Dollar);
        assert_eq!(tokens[4].kind, TokenType::Int);
    }

    #[test]
    fn test_this_is_not_fused() {
        assert_eq!(
            kinds("$this->name"),
            vec![TokenType::This, TokenType::ObjectOperator, TokenType::Identifier]
        );
    }

    #[test]
    fn test_terminator_rules() {
        assert_eq!(
            kinds("$a = 1 +\n2"),
            vec![
                TokenType::Variable,
                TokenType::Assign,
                TokenType::Int,
                TokenType::Add,
                TokenType::Int,
            ]
        );
        assert_eq!(
            kinds("$user\n->name"),
            vec![TokenType::Variable, TokenType::ObjectOperator, TokenType::Identifier]
        );
        assert_eq!(
            kinds("if ($a)\n{\n}"),
            vec![
                TokenType::If,
                TokenType::LParen,
                TokenType::Variable,
                TokenType::RParen,
                TokenType::LBrace,
                TokenType::RBrace,
            ]
        );
        assert_eq!(
            kinds("echo $a\necho $b\n"),
            vec![
                TokenType::Echo,
                TokenType::Variable,
                TokenType::Semicolon,
                TokenType::Echo,
                TokenType::Variable,
            ]
        );
    }

    #[test]
    fn test_terminator_keeps_newline_position() {
        let tokens = tokens("x\ny");
        assert_eq!(tokens[1].kind, TokenType::Semicolon);
        assert_eq!(tokens[1].literal, "\n");
        assert_eq!((tokens[1].start, tokens[1].line, tokens[1].column), (1, 0, 1));
    }

    #[test]
    fn test_binding_reclassification() {
        assert_eq!(
            kinds("[a = 1, b = 2]"),
            vec![
                TokenType::LBracket,
                TokenType::Variable,
                TokenType::Assign,
                TokenType::Int,
                TokenType::Comma,
                TokenType::Variable,
                TokenType::Assign,
                TokenType::Int,
                TokenType::RBracket,
            ]
        );
        assert_eq!(kinds("a = 1")[0], TokenType::Identifier);
        assert_eq!(kinds("((([a = 1])))")[4], TokenType::Identifier);
    }
}
