//! BibTeX reading and writing
//!
//! The parser is hand-written and tolerant: it accepts the common
//! delimiter and value styles, expands `@string` macros, and preserves
//! everything it does not understand (comments, preambles, free text,
//! non-standard entry types) so a read/write cycle never drops content.
//! The writer emits one canonical layout regardless of the input's
//! formatting.

pub mod parser;
pub mod writer;

pub use parser::parse;
pub use writer::render;

use bibmend_common::{Entry, Result};
use std::path::Path;

/// One parsed `.bib` file: entries interleaved with opaque blocks, in
/// input order.
#[derive(Debug, Clone)]
pub struct Bibliography {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
pub enum Block {
    Entry(Entry),
    /// `@comment`, `@preamble`, `@string`, or free text between entries,
    /// reproduced verbatim on output.
    Opaque(String),
}

impl Bibliography {
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Entry(entry) => Some(entry),
            Block::Opaque(_) => None,
        })
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.blocks.iter_mut().filter_map(|block| match block {
            Block::Entry(entry) => Some(entry),
            Block::Opaque(_) => None,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }
}

/// Read and parse one `.bib` file.
pub fn read_file(path: &Path) -> Result<Bibliography> {
    let text = std::fs::read_to_string(path)?;
    parser::parse(&text)
}
