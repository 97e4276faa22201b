//! Streamed assistant responses: fragment assembly and markup rendering.

pub mod assembler;
pub mod render;

pub use assembler::{MessageUpdate, ResponseAssembler, decode_fragment_text, separator};
pub use render::{HtmlRenderer, MarkupRenderer, PlainRenderer, is_rich_format};
