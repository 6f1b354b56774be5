use proptest::prelude::*;
use zy::tokenizer::{Token, TokenType, Tokenizer};

/// Snippets that each scan to exactly one token.
const SNIPPETS: &[&str] = &[
    "foo", "bar", "42", "'text'", "+", "-", "*", "=", "==", "&&", "->", ".", ",", "(", ")",
    "{", "}", "[", "]", "return", "if", "else", "new", "echo",
];

fn kind_of(snippet: &str) -> TokenType {
    let tokens = Tokenizer::new().scan(snippet.as_bytes());
    assert_eq!(tokens.len(), 1, "{snippet:?} should scan to one token");
    tokens[0].kind
}

fn shape(tokens: &[Token]) -> Vec<(TokenType, String, usize)> {
    tokens
        .iter()
        .map(|token| (token.kind, token.literal.clone(), token.start))
        .collect()
}

fn separator() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(prop_oneof![Just(" "), Just("\u{3000}"), Just("\t")], 0..3),
        prop::collection::vec(
            prop_oneof![Just("\n"), Just("\n "), Just("\n\u{3000}"), Just("\n\t")],
            1..6,
        ),
    )
        .prop_map(|(lead, rest)| lead.concat() + &rest.concat())
}

proptest! {
    #[test]
    fn newline_runs_collapse(separator in separator()) {
        let source = format!("foo{separator}bar");
        let tokens = Tokenizer::new().scan(source.as_bytes());
        let newlines = tokens.iter().filter(|token| token.kind == TokenType::Newline).count();
        prop_assert_eq!(newlines, 1);
        prop_assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn terminators_follow_the_statement_tables(
        a in prop::sample::select(SNIPPETS),
        b in prop::sample::select(SNIPPETS),
    ) {
        let tokens = Tokenizer::new().tokenize(&format!("{a}\n{b}"));
        let expected = !kind_of(a).continues_statement() && !kind_of(b).cannot_start_statement();
        let inserted = tokens.iter().any(|token| token.kind == TokenType::Semicolon);
        prop_assert_eq!(inserted, expected, "{:?}", tokens);
        prop_assert_eq!(tokens.len(), if expected { 3 } else { 2 });
    }

    #[test]
    fn scanning_is_idempotent(source in "[a-z0-9 +*/()=;{}<>!.-]{0,24}(\n[a-z0-9 +*/()=;{}<>!.-]{0,24}){0,3}") {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.scan(source.as_bytes());

        let mut rebuilt = vec![b' '; source.len()];
        for token in &tokens {
            rebuilt[token.start..token.end].copy_from_slice(token.literal.as_bytes());
        }
        let rebuilt = String::from_utf8(rebuilt).unwrap();

        prop_assert_eq!(shape(&tokenizer.scan(rebuilt.as_bytes())), shape(&tokens));
    }
}
