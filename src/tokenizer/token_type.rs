use std::fmt::Display;

/// Classification of a literal in the definition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordType {
    Keyword,
    Operator,
    Symbol,
    Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    // Keywords
    If,
    Else,
    ElseIf,
    While,
    For,
    Foreach,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Function,
    Fn,
    Class,
    Interface,
    Trait,
    Extends,
    Implements,
    Public,
    Private,
    Protected,
    Static,
    Final,
    Abstract,
    Readonly,
    Const,
    Var,
    New,
    Clone,
    Instanceof,
    Like,
    Echo,
    Throw,
    Try,
    Catch,
    Finally,
    Match,
    Namespace,
    Use,
    As,
    Spawn,
    Parent,
    SelfKw,
    Yield,
    In,
    Enum,
    List,
    This,

    // Literal values
    Null,
    True,
    False,

    // Operators
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    Power,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    QuoAssign,
    RemAssign,
    PowerAssign,
    ConcatAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    ShlAssign,
    ShrAssign,
    CoalesceAssign,
    Eq,
    Ne,
    EqStrict,
    NeStrict,
    Lt,
    Gt,
    Le,
    Ge,
    Spaceship,
    LogicalAnd,
    LogicalOr,
    Not,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
    Incr,
    Decr,
    ObjectOperator,
    NullsafeOperator,
    ArrayKeyValue,
    Ternary,
    NullCoalesce,
    Colon,
    ScopeResolution,
    At,
    Dollar,
    Comma,
    Semicolon,
    Dot,
    Ellipsis,
    DoubleDot,
    NamespaceSeparator,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    StartTag,
    EndTag,

    // Values
    Int,
    Float,
    Number,
    String,
    Heredoc,
    Nowdoc,
    Byte,

    Identifier,
    Variable,
    Comment,
    MultilineComment,
    Whitespace,
    Newline,
    Text,
    InterpolationToken,
    InterpolationValue,
    Unknown,
}

/// Every fixed literal the tokenizer's trie knows about.
pub const DEFINITIONS: &[(TokenType, &str, WordType)] = &[
    (TokenType::If, "if", WordType::Keyword),
    (TokenType::Else, "else", WordType::Keyword),
    (TokenType::ElseIf, "elseif", WordType::Keyword),
    (TokenType::While, "while", WordType::Keyword),
    (TokenType::For, "for", WordType::Keyword),
    (TokenType::Foreach, "foreach", WordType::Keyword),
    (TokenType::Do, "do", WordType::Keyword),
    (TokenType::Switch, "switch", WordType::Keyword),
    (TokenType::Case, "case", WordType::Keyword),
    (TokenType::Default, "default", WordType::Keyword),
    (TokenType::Break, "break", WordType::Keyword),
    (TokenType::Continue, "continue", WordType::Keyword),
    (TokenType::Return, "return", WordType::Keyword),
    (TokenType::Function, "function", WordType::Keyword),
    (TokenType::Fn, "fn", WordType::Keyword),
    (TokenType::Class, "class", WordType::Keyword),
    (TokenType::Interface, "interface", WordType::Keyword),
    (TokenType::Trait, "trait", WordType::Keyword),
    (TokenType::Extends, "extends", WordType::Keyword),
    (TokenType::Implements, "implements", WordType::Keyword),
    (TokenType::Public, "public", WordType::Keyword),
    (TokenType::Private, "private", WordType::Keyword),
    (TokenType::Protected, "protected", WordType::Keyword),
    (TokenType::Static, "static", WordType::Keyword),
    (TokenType::Final, "final", WordType::Keyword),
    (TokenType::Abstract, "abstract", WordType::Keyword),
    (TokenType::Readonly, "readonly", WordType::Keyword),
    (TokenType::Const, "const", WordType::Keyword),
    (TokenType::Var, "var", WordType::Keyword),
    (TokenType::New, "new", WordType::Keyword),
    (TokenType::Clone, "clone", WordType::Keyword),
    (TokenType::Instanceof, "instanceof", WordType::Keyword),
    (TokenType::Like, "like", WordType::Keyword),
    (TokenType::Echo, "echo", WordType::Keyword),
    (TokenType::Throw, "throw", WordType::Keyword),
    (TokenType::Try, "try", WordType::Keyword),
    (TokenType::Catch, "catch", WordType::Keyword),
    (TokenType::Finally, "finally", WordType::Keyword),
    (TokenType::Match, "match", WordType::Keyword),
    (TokenType::Namespace, "namespace", WordType::Keyword),
    (TokenType::Use, "use", WordType::Keyword),
    (TokenType::As, "as", WordType::Keyword),
    (TokenType::Spawn, "spawn", WordType::Keyword),
    (TokenType::Parent, "parent", WordType::Keyword),
    (TokenType::SelfKw, "self", WordType::Keyword),
    (TokenType::Yield, "yield", WordType::Keyword),
    (TokenType::In, "in", WordType::Keyword),
    (TokenType::Enum, "enum", WordType::Keyword),
    (TokenType::List, "list", WordType::Keyword),
    (TokenType::This, "$this", WordType::Keyword),
    (TokenType::Null, "null", WordType::Literal),
    (TokenType::True, "true", WordType::Literal),
    (TokenType::False, "false", WordType::Literal),
    (TokenType::Add, "+", WordType::Operator),
    (TokenType::Sub, "-", WordType::Operator),
    (TokenType::Mul, "*", WordType::Operator),
    (TokenType::Quo, "/", WordType::Operator),
    (TokenType::Rem, "%", WordType::Operator),
    (TokenType::Power, "**", WordType::Operator),
    (TokenType::Assign, "=", WordType::Operator),
    (TokenType::AddAssign, "+=", WordType::Operator),
    (TokenType::SubAssign, "-=", WordType::Operator),
    (TokenType::MulAssign, "*=", WordType::Operator),
    (TokenType::QuoAssign, "/=", WordType::Operator),
    (TokenType::RemAssign, "%=", WordType::Operator),
    (TokenType::PowerAssign, "**=", WordType::Operator),
    (TokenType::ConcatAssign, ".=", WordType::Operator),
    (TokenType::BitAndAssign, "&=", WordType::Operator),
    (TokenType::BitOrAssign, "|=", WordType::Operator),
    (TokenType::BitXorAssign, "^=", WordType::Operator),
    (TokenType::ShlAssign, "<<=", WordType::Operator),
    (TokenType::ShrAssign, ">>=", WordType::Operator),
    (TokenType::CoalesceAssign, "??=", WordType::Operator),
    (TokenType::Eq, "==", WordType::Operator),
    (TokenType::Ne, "!=", WordType::Operator),
    (TokenType::EqStrict, "===", WordType::Operator),
    (TokenType::NeStrict, "!==", WordType::Operator),
    (TokenType::Lt, "<", WordType::Operator),
    (TokenType::Gt, ">", WordType::Operator),
    (TokenType::Le, "<=", WordType::Operator),
    (TokenType::Ge, ">=", WordType::Operator),
    (TokenType::Spaceship, "<=>", WordType::Operator),
    (TokenType::LogicalAnd, "&&", WordType::Operator),
    (TokenType::LogicalOr, "||", WordType::Operator),
    (TokenType::Not, "!", WordType::Operator),
    (TokenType::BitAnd, "&", WordType::Operator),
    (TokenType::BitOr, "|", WordType::Operator),
    (TokenType::BitXor, "^", WordType::Operator),
    (TokenType::BitNot, "~", WordType::Operator),
    (TokenType::Shl, "<<", WordType::Operator),
    (TokenType::Shr, ">>", WordType::Operator),
    (TokenType::Incr, "++", WordType::Operator),
    (TokenType::Decr, "--", WordType::Operator),
    (TokenType::ObjectOperator, "->", WordType::Operator),
    (TokenType::NullsafeOperator, "?->", WordType::Operator),
    (TokenType::ArrayKeyValue, "=>", WordType::Operator),
    (TokenType::Ternary, "?", WordType::Operator),
    (TokenType::NullCoalesce, "??", WordType::Operator),
    (TokenType::Colon, ":", WordType::Operator),
    (TokenType::ScopeResolution, "::", WordType::Operator),
    (TokenType::At, "@", WordType::Operator),
    (TokenType::Dollar, "$", WordType::Symbol),
    (TokenType::Comma, ",", WordType::Operator),
    (TokenType::Semicolon, ";", WordType::Operator),
    (TokenType::Dot, ".", WordType::Operator),
    (TokenType::Ellipsis, "...", WordType::Operator),
    (TokenType::DoubleDot, "..", WordType::Operator),
    (TokenType::NamespaceSeparator, "\\", WordType::Operator),
    (TokenType::LParen, "(", WordType::Operator),
    (TokenType::RParen, ")", WordType::Operator),
    (TokenType::LBrace, "{", WordType::Operator),
    (TokenType::RBrace, "}", WordType::Operator),
    (TokenType::LBracket, "[", WordType::Operator),
    (TokenType::RBracket, "]", WordType::Operator),
    (TokenType::StartTag, "<?php", WordType::Operator),
    (TokenType::EndTag, "?>", WordType::Operator),
];

impl TokenType {
    pub fn word_type(&self) -> Option<WordType> {
        DEFINITIONS
            .iter()
            .find(|(kind, _, _)| kind == self)
            .map(|(_, _, word_type)| *word_type)
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self.word_type(), Some(WordType::Keyword))
    }

    /// `null`, `true` and `false`.
    pub fn is_literal_value(&self) -> bool {
        matches!(self.word_type(), Some(WordType::Literal))
    }

    pub fn is_value(&self) -> bool {
        matches!(
            self,
            TokenType::Int
                | TokenType::Float
                | TokenType::Number
                | TokenType::String
                | TokenType::Heredoc
                | TokenType::Nowdoc
                | TokenType::Byte
                | TokenType::Null
                | TokenType::True
                | TokenType::False
        )
    }

    pub fn is_compound_assign(&self) -> bool {
        matches!(
            self,
            TokenType::AddAssign
                | TokenType::SubAssign
                | TokenType::MulAssign
                | TokenType::QuoAssign
                | TokenType::RemAssign
                | TokenType::PowerAssign
                | TokenType::ConcatAssign
                | TokenType::BitAndAssign
                | TokenType::BitOrAssign
                | TokenType::BitXorAssign
                | TokenType::ShlAssign
                | TokenType::ShrAssign
                | TokenType::CoalesceAssign
        )
    }

    /// Tokens that never end a statement: a newline right after one of these
    /// continues the current statement.
    pub fn continues_statement(&self) -> bool {
        self.is_compound_assign()
            || matches!(
                self,
                TokenType::Semicolon
                    | TokenType::Comma
                    | TokenType::Dot
                    | TokenType::LBrace
                    | TokenType::RBrace
                    | TokenType::LBracket
                    | TokenType::LParen
                    | TokenType::ObjectOperator
                    | TokenType::NullsafeOperator
                    | TokenType::ScopeResolution
                    | TokenType::ArrayKeyValue
                    | TokenType::Ternary
                    | TokenType::Colon
                    | TokenType::At
                    | TokenType::Add
                    | TokenType::Sub
                    | TokenType::Mul
                    | TokenType::Quo
                    | TokenType::Rem
                    | TokenType::Power
                    | TokenType::Assign
                    | TokenType::Eq
                    | TokenType::Ne
                    | TokenType::EqStrict
                    | TokenType::NeStrict
                    | TokenType::Lt
                    | TokenType::Gt
                    | TokenType::Le
                    | TokenType::Ge
                    | TokenType::Spaceship
                    | TokenType::LogicalAnd
                    | TokenType::LogicalOr
                    | TokenType::NullCoalesce
                    | TokenType::Not
                    | TokenType::BitAnd
                    | TokenType::BitOr
                    | TokenType::BitXor
                    | TokenType::Shl
                    | TokenType::Shr
                    | TokenType::Incr
                    | TokenType::Decr
                    | TokenType::NamespaceSeparator
            )
    }

    /// Tokens that cannot start a new statement: a newline right before one
    /// of these continues the current statement.
    pub fn cannot_start_statement(&self) -> bool {
        self.is_compound_assign()
            || matches!(
                self,
                TokenType::LBracket
                    | TokenType::RBracket
                    | TokenType::LBrace
                    | TokenType::RBrace
                    | TokenType::LParen
                    | TokenType::RParen
                    | TokenType::ArrayKeyValue
                    | TokenType::ObjectOperator
                    | TokenType::NullsafeOperator
                    | TokenType::ScopeResolution
                    | TokenType::Dot
                    | TokenType::Mul
                    | TokenType::Quo
                    | TokenType::Rem
                    | TokenType::Power
                    | TokenType::Assign
                    | TokenType::Eq
                    | TokenType::Ne
                    | TokenType::EqStrict
                    | TokenType::NeStrict
                    | TokenType::Lt
                    | TokenType::Gt
                    | TokenType::Le
                    | TokenType::Ge
                    | TokenType::Spaceship
                    | TokenType::LogicalAnd
                    | TokenType::LogicalOr
                    | TokenType::NullCoalesce
                    | TokenType::Ternary
                    | TokenType::Colon
                    | TokenType::BitOr
                    | TokenType::BitXor
                    | TokenType::Shl
                    | TokenType::Shr
                    | TokenType::Instanceof
                    | TokenType::Like
            )
    }
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match DEFINITIONS.iter().find(|(kind, _, _)| kind == self) {
            Some((_, literal, _)) => write!(f, "{}", literal),
            None => write!(f, "{:?}", self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literals_are_unique() {
        for (i, (_, literal, _)) in DEFINITIONS.iter().enumerate() {
            assert!(
                DEFINITIONS[i + 1..].iter().all(|(_, other, _)| other != literal),
                "duplicate literal {literal}"
            );
        }
    }

    #[test]
    fn classification() {
        assert!(TokenType::While.is_keyword());
        assert!(TokenType::This.is_keyword());
        assert!(TokenType::Null.is_literal_value());
        assert!(!TokenType::Add.is_keyword());
        assert!(TokenType::ConcatAssign.continues_statement());
        assert!(TokenType::ObjectOperator.cannot_start_statement());
        assert!(!TokenType::Variable.continues_statement());
        assert_eq!(TokenType::ScopeResolution.to_string(), "::");
        assert_eq!(TokenType::Identifier.to_string(), "Identifier");
    }
}
