pub mod accum;
pub mod assembler;
pub mod bitfield;
pub mod error;
pub mod expr;
pub mod labels;
pub mod matcher;
pub mod output;
pub mod source;
pub mod table;

pub mod isa;

pub use accum::Accum;
pub use assembler::{assemble, Assembler, Assembly, Section};
pub use bitfield::{Bitfield, SignMode};
pub use error::{AsmError, ExprError};
pub use expr::{BinOp, Expr, Incr, MemRef};
pub use labels::LabelTable;
pub use matcher::{encode_word, match_insn, merge_matches, Match, Reloc};
pub use output::{write_sections, OutputFormat};
pub use source::{Item, Line};
pub use table::{Atom, Features, Isa, ProgTypes, Row, Selector, Table};
