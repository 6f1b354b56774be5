use rustc_hash::FxHashMap;

use super::{scan::is_identifier_continue, token_type::DEFINITIONS, TokenType, WordType};

#[derive(Debug, Default)]
struct Node {
    children: FxHashMap<char, Node>,
    leaf: Option<(TokenType, WordType)>,
}

/// Prefix tree over every literal in the definition table, walked for
/// maximal-munch matching.
#[derive(Debug)]
pub struct Trie {
    root: Node,
}

impl Trie {
    pub fn from_definitions() -> Self {
        let mut root = Node::default();
        for (kind, literal, word_type) in DEFINITIONS {
            let mut node = &mut root;
            for c in literal.chars() {
                node = node.children.entry(c).or_default();
            }
            node.leaf = Some((*kind, *word_type));
        }
        Self { root }
    }

    /// Longest literal matching the start of `source`. Returns the token
    /// type and its length in bytes.
    ///
    /// A leaf that ends in an identifier character is rejected when another
    /// identifier character follows it, so `classes` never matches `class`.
    /// When `words_only` is set only keyword and literal-value leaves count.
    pub fn longest_match(&self, source: &str, words_only: bool) -> Option<(TokenType, usize)> {
        let mut node = &self.root;
        let mut best = None;
        let mut chars = source.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            let Some(next) = node.children.get(&c) else {
                break;
            };
            node = next;

            let Some((kind, word_type)) = node.leaf else {
                continue;
            };
            if words_only && !matches!(word_type, WordType::Keyword | WordType::Literal) {
                continue;
            }
            let followed_by_word = chars
                .peek()
                .is_some_and(|(_, following)| is_identifier_continue(*following));
            if is_identifier_continue(c) && followed_by_word {
                continue;
            }
            best = Some((kind, offset + c.len_utf8()));
        }

        best
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefers_longest_operator() {
        let trie = Trie::from_definitions();
        assert_eq!(trie.longest_match("<=> 1", false), Some((TokenType::Spaceship, 3)));
        assert_eq!(trie.longest_match("<= 1", false), Some((TokenType::Le, 2)));
        assert_eq!(trie.longest_match("**=", false), Some((TokenType::PowerAssign, 3)));
        assert_eq!(trie.longest_match("...", false), Some((TokenType::Ellipsis, 3)));
    }

    #[test]
    fn keywords_do_not_prefix_identifiers() {
        let trie = Trie::from_definitions();
        assert_eq!(trie.longest_match("class Foo", true), Some((TokenType::Class, 5)));
        assert_eq!(trie.longest_match("classes", true), None);
        assert_eq!(trie.longest_match("int", true), None);
        assert_eq!(trie.longest_match("$thisValue", false), Some((TokenType::Dollar, 1)));
        assert_eq!(trie.longest_match("$this->a", false), Some((TokenType::This, 5)));
    }

    #[test]
    fn words_only_skips_operators() {
        let trie = Trie::from_definitions();
        assert_eq!(trie.longest_match("+", true), None);
        assert_eq!(trie.longest_match("null)", true), Some((TokenType::Null, 4)));
    }
}
