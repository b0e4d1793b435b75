use tracing::debug;

use crate::error::AsmError;
use crate::expr::Expr;
use crate::labels::LabelTable;
use crate::matcher::{match_insn, no_match, Match};
use crate::source::Line;
use crate::table::{Isa, Selector};

/// Name of the section in effect before any `.section` directive.
pub const DEFAULT_SECTION: &str = "default";

/// Largest `.skip` count or `.align` boundary, in bytes.
pub const MAX_PAD: u64 = u32::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Label value of the first byte.
    pub base: u64,
    pub bytes: Vec<u8>,
}

/// Converged output of a whole program.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// In creation order, starting with the default section.
    pub sections: Vec<Section>,
    pub labels: LabelTable,
    pub iterations: usize,
}

impl Assembly {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataKind {
    Bits,
    Unsigned,
    Signed,
}

impl DataKind {
    fn letter(self) -> char {
        match self {
            DataKind::Bits => 'b',
            DataKind::Unsigned => 'u',
            DataKind::Signed => 's',
        }
    }

    fn fits(self, bits: u32, num: u64) -> bool {
        if bits >= 64 {
            return true;
        }
        let half = 1u64 << (bits - 1);
        match self {
            DataKind::Bits => true,
            DataKind::Unsigned => num < 1u64 << bits,
            DataKind::Signed => num < half || num >= half.wrapping_neg(),
        }
    }
}

#[derive(Debug, Clone)]
enum Directive {
    Section { name: String, base: Option<u64> },
    Align(u64),
    Skip(u64),
    Equ { name: String, expr: Expr },
    Data { kind: DataKind, bits: u32, args: Vec<Expr> },
}

/// `.b32` -> (Bits, 32). Widths must be a non-zero multiple of 8 up to 64.
fn data_width(name: &str) -> Option<(DataKind, u32)> {
    let rest = name.strip_prefix('.')?;
    let mut chars = rest.chars();
    let kind = match chars.next()? {
        'b' => DataKind::Bits,
        'u' => DataKind::Unsigned,
        's' => DataKind::Signed,
        _ => return None,
    };
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let bits: u32 = digits.parse().ok()?;
    (bits > 0 && bits <= 64 && bits % 8 == 0).then_some((kind, bits))
}

impl Directive {
    fn parse(name: &str, args: &[Expr], line: usize) -> Result<Self, AsmError> {
        let bad = || AsmError::BadDirective { directive: name.to_string(), line };
        let count = |args: &[Expr]| match args {
            [e] => e.const_value().filter(|&n| n <= MAX_PAD),
            _ => None,
        };
        match name {
            ".section" => match args {
                [Expr::Label(n)] => Ok(Directive::Section { name: n.clone(), base: None }),
                [Expr::Label(n), Expr::Num(b)] => Ok(Directive::Section { name: n.clone(), base: Some(*b) }),
                _ => Err(bad()),
            },
            ".align" => match count(args) {
                Some(n) if n > 0 => Ok(Directive::Align(n)),
                _ => Err(bad()),
            },
            ".skip" => count(args).map(Directive::Skip).ok_or_else(bad),
            ".equ" => match args {
                [Expr::Label(n), e] if e.is_imm() => Ok(Directive::Equ { name: n.clone(), expr: e.clone() }),
                _ => Err(bad()),
            },
            _ => {
                let Some((kind, bits)) = data_width(name) else {
                    return Err(AsmError::UnknownDirective { directive: name.to_string(), line });
                };
                if !args.iter().all(Expr::is_imm) {
                    return Err(bad());
                }
                Ok(Directive::Data { kind, bits, args: args.to_vec() })
            }
        }
    }
}

/// Candidate list of one instruction and the one currently chosen.
/// Candidates are only ever abandoned, never revisited.
#[derive(Debug)]
struct Slot {
    cands: Vec<Match>,
    cur: usize,
}

impl Slot {
    fn current(&self) -> &Match {
        &self.cands[self.cur]
    }

    fn oplen(&self, idx: usize, opunit: usize) -> usize {
        self.cands[idx].oplen.unwrap_or(opunit)
    }
}

#[derive(Debug)]
enum Step {
    Insn(Slot),
    Label(String),
    Dir(Directive),
}

/// Sections under construction during one pass.
struct Sections {
    list: Vec<Section>,
    cur: usize,
}

impl Sections {
    fn new() -> Self {
        Self {
            list: vec![Section { name: DEFAULT_SECTION.to_string(), base: 0, bytes: Vec::new() }],
            cur: 0,
        }
    }

    fn bytes(&mut self) -> &mut Vec<u8> {
        &mut self.list[self.cur].bytes
    }

    fn pos(&self) -> u64 {
        self.list[self.cur].bytes.len() as u64
    }

    fn label_value(&self, posunit: u64) -> u64 {
        self.pos() / posunit + self.list[self.cur].base
    }

    /// Switches to `name`; a base only applies when the section is new.
    fn switch(&mut self, name: &str, base: Option<u64>) {
        self.cur = match self.list.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.list.push(Section { name: name.to_string(), base: base.unwrap_or(0), bytes: Vec::new() });
                self.list.len() - 1
            }
        };
    }

    fn zeros(&mut self, n: u64) {
        let bytes = self.bytes();
        bytes.resize(bytes.len() + n as usize, 0);
    }

    fn align(&mut self, n: u64) {
        let pos = self.pos();
        self.zeros(pos.div_ceil(n) * n - pos);
    }

    fn put(&mut self, data: &[u8]) {
        self.bytes().extend_from_slice(data);
    }
}

/// Drives a program to a fixed point over label values and candidate choice.
pub struct Assembler<'a> {
    isa: &'a Isa,
    steps: Vec<Step>,
}

impl<'a> Assembler<'a> {
    /// Matches every instruction and validates every directive.
    pub fn new(isa: &'a Isa, sel: &Selector, lines: &[Line]) -> Result<Self, AsmError> {
        let mut steps = Vec::with_capacity(lines.len());
        for (i, l) in lines.iter().enumerate() {
            let line = i + 1;
            steps.push(match l {
                Line::Insn(items) => {
                    let cands = match_insn(isa, sel, items);
                    if cands.is_empty() {
                        return Err(no_match(items, line));
                    }
                    debug!(line, candidates = cands.len(), "matched");
                    Step::Insn(Slot { cands, cur: 0 })
                }
                Line::Label(name) => Step::Label(name.clone()),
                Line::Directive { name, args } => Step::Dir(Directive::parse(name, args, line)?),
            });
        }
        Ok(Self { isa, steps })
    }

    fn oplen(&self, slot: &Slot) -> usize {
        slot.oplen(slot.cur, self.isa.opunit)
    }

    fn misaligned(&self, len: usize, pos: u64) -> bool {
        self.isa.align_long && len == 8 && pos & 7 != 0
    }

    pub fn run(mut self) -> Result<Assembly, AsmError> {
        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut labels = LabelTable::default();
            self.layout(&mut labels)?;
            let (sections, dirty) = self.emit(&labels)?;
            debug!(iterations, dirty, labels = labels.len(), "relaxation pass done");
            if !dirty {
                return Ok(Assembly { sections, labels, iterations });
            }
        }
    }

    /// Binds every label from the currently chosen lengths.
    fn layout(&self, labels: &mut LabelTable) -> Result<(), AsmError> {
        let posunit = self.isa.posunit;
        let mut out = Sections::new();
        for (i, step) in self.steps.iter().enumerate() {
            let line = i + 1;
            match step {
                Step::Insn(slot) => {
                    let len = self.oplen(slot);
                    if self.misaligned(len, out.pos()) {
                        out.align(8);
                    }
                    out.zeros(len as u64);
                }
                Step::Label(name) => labels.define(name, out.label_value(posunit), line)?,
                Step::Dir(Directive::Equ { name, expr }) => {
                    let val = expr.eval(labels).map_err(|e| e.at(line))?;
                    labels.define(name, val, line)?;
                }
                Step::Dir(Directive::Data { bits, args, .. }) => {
                    out.zeros(u64::from(bits / 8) * args.len() as u64);
                }
                Step::Dir(d) => place(&mut out, d),
            }
        }
        Ok(())
    }

    /// Resolves relocations and writes bytes. Returns whether any
    /// candidate choice changed, which invalidates this pass.
    fn emit(&mut self, labels: &LabelTable) -> Result<(Vec<Section>, bool), AsmError> {
        let posunit = self.isa.posunit;
        let mut out = Sections::new();
        let mut dirty = false;
        for i in 0..self.steps.len() {
            let line = i + 1;
            let len = match &self.steps[i] {
                Step::Insn(slot) => self.oplen(slot),
                Step::Label(_) => continue,
                Step::Dir(Directive::Data { kind, bits, args }) => {
                    let width = (bits / 8) as usize;
                    for (index, a) in args.iter().enumerate() {
                        let num = a.eval(labels).map_err(|e| e.at(line))?;
                        if !kind.fits(*bits, num) {
                            return Err(AsmError::DataOverflow {
                                directive: format!(".{}{}", kind.letter(), bits),
                                index,
                                line,
                            });
                        }
                        out.put(&num.to_le_bytes()[..width]);
                    }
                    continue;
                }
                Step::Dir(d) => {
                    place(&mut out, d);
                    continue;
                }
            };

            if self.misaligned(len, out.pos()) {
                self.realign(i, line)?;
                dirty = true;
                out.align(8);
            }

            let cpos = out.label_value(posunit);
            let Step::Insn(slot) = &mut self.steps[i] else {
                continue;
            };
            match slot.current().resolve(labels, cpos).map_err(|e| e.at(line))? {
                Some(acc) => out.put(&acc.to_le_bytes(len)),
                None => {
                    debug!(line, candidate = slot.cur, "relocation does not fit, dropping candidate");
                    slot.cur += 1;
                    if slot.cur == slot.cands.len() {
                        return Err(AsmError::RelocationFailed { line });
                    }
                    dirty = true;
                    out.zeros(len as u64);
                }
            }
        }
        Ok((out.list, dirty))
    }

    /// Moves the instruction before line `line` (labels skipped) to its next
    /// candidate whose length differs by 4 bytes modulo 8.
    fn realign(&mut self, idx: usize, line: usize) -> Result<(), AsmError> {
        let opunit = self.isa.opunit;
        let prev = (0..idx).rev().find(|&j| !matches!(self.steps[j], Step::Label(_)));
        let Some(Step::Insn(slot)) = prev.map(|j| &mut self.steps[j]) else {
            return Err(AsmError::AlignmentUnshrinkable { line });
        };
        let have = slot.oplen(slot.cur, opunit);
        let next = (slot.cur + 1..slot.cands.len()).find(|&k| slot.oplen(k, opunit).abs_diff(have) % 8 == 4);
        match next {
            Some(k) => {
                debug!(line, from = have, to = slot.oplen(k, opunit), "realigning predecessor");
                slot.cur = k;
                Ok(())
            }
            None => Err(AsmError::AlignmentUnshrinkable { line }),
        }
    }
}

/// Position-only directives, identical in both passes.
fn place(out: &mut Sections, d: &Directive) {
    match d {
        Directive::Section { name, base } => out.switch(name, *base),
        Directive::Align(n) => out.align(*n),
        Directive::Skip(n) => out.zeros(*n),
        Directive::Equ { .. } | Directive::Data { .. } => {}
    }
}

/// Assembles a whole program.
pub fn assemble(isa: &Isa, sel: &Selector, lines: &[Line]) -> Result<Assembly, AsmError> {
    Assembler::new(isa, sel, lines)?.run()
}
