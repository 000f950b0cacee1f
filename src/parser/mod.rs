pub mod tokenizer;

pub use tokenizer::{tokenize, AttrValue, Attribute, Position, QuoteKind, Span, Token, ROOT_ATTR};
