use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::assembler::{Section, DEFAULT_SECTION};
use crate::table::Isa;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Raw,
    /// One `0x%02x,` per line.
    Hex8,
    /// One little-endian `0x%08x,` word per line.
    Hex32,
    /// `uint8_t name[] = { ... };`
    CArray8,
    /// `uint32_t name[] = { ... };`
    CArray32,
}

impl OutputFormat {
    pub fn default_for(isa: &Isa) -> Self {
        if isa.opunit == 4 {
            OutputFormat::Hex32
        } else {
            OutputFormat::Hex8
        }
    }

    fn is_c(self) -> bool {
        matches!(self, OutputFormat::CArray8 | OutputFormat::CArray32)
    }

    fn words(self) -> bool {
        matches!(self, OutputFormat::Hex32 | OutputFormat::CArray32)
    }
}

/// Writes all sections in order, skipping an empty default section.
pub fn write_sections<W: Write>(w: &mut W, sections: &[Section], fmt: OutputFormat) -> io::Result<()> {
    let mut first = true;
    for s in sections {
        if s.name == DEFAULT_SECTION && s.bytes.is_empty() {
            continue;
        }
        if fmt == OutputFormat::Raw {
            w.write_all(&s.bytes)?;
            continue;
        }
        if fmt.is_c() {
            if !first {
                writeln!(w)?;
            }
            let ty = if fmt.words() { "uint32_t" } else { "uint8_t" };
            writeln!(w, "{ty} {}[] = {{", s.name)?;
        }
        let indent = if fmt.is_c() { "\t" } else { "" };
        if fmt.words() {
            for chunk in s.bytes.chunks(4) {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                writeln!(w, "{indent}0x{:08x},", u32::from_le_bytes(word))?;
            }
        } else {
            for b in &s.bytes {
                writeln!(w, "{indent}0x{b:02x},")?;
            }
        }
        if fmt.is_c() {
            writeln!(w, "}};")?;
        }
        first = false;
    }
    Ok(())
}
