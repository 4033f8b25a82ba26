pub mod highlight;
pub mod terminal;

pub use highlight::{mark_sentences, Emphasis, SentenceMark};
pub use terminal::{paint, Screen, TerminalSession};
