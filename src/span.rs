use std::fmt::Display;

/// Source position handle carried by tokens and statements.
///
/// Offsets are absolute byte offsets into the source, lines and columns are
/// 0-based (columns count characters, not bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self {
            start: start.offset,
            end: end.offset,
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
        }
    }

    pub fn start_position(&self) -> Position {
        Position {
            offset: self.start,
            line: self.start_line,
            column: self.start_column,
        }
    }

    pub fn end_position(&self) -> Position {
        Position {
            offset: self.end,
            line: self.end_line,
            column: self.end_column,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Span::default()
    }
}

impl std::ops::Add<Span> for Span {
    type Output = Span;

    fn add(self, other: Span) -> Span {
        let start = if self.start < other.start { &self } else { &other };
        let end = if self.end > other.end { &self } else { &other };

        Span {
            start: start.start,
            end: end.end,
            start_line: start.start_line,
            start_column: start.start_column,
            end_line: end.end_line,
            end_column: end.end_column,
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start_line + 1, self.start_column + 1)
    }
}

/// A single point in the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}
