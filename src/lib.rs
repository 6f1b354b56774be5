pub mod ast;
pub mod preprocessor;
pub mod span;
pub mod tokenizer;
pub mod tree_walk_interpreter;
