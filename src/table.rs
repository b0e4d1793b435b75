use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::bitfield::Bitfield;

/// Upper bound on atoms in a single row.
pub const MAX_ATOMS: usize = 16;

bitflags! {
/// Processor features. Bit meanings belong to each ISA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Features: u32 {
const _ = !0;
}
}

bitflags! {
/// Shader program types a row is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgTypes: u32 {
const VERTEX = 1 << 0;
const GEOMETRY = 1 << 1;
const FRAGMENT = 1 << 2;
const COMPUTE = 1 << 3;
}
}

/// Processor-variant filter applied to every row and special register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub features: Features,
    pub ptypes: ProgTypes,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            features: Features::from_bits_retain(!0),
            ptypes: ProgTypes::all(),
        }
    }
}

impl Selector {
    /// Rows require all of `features`; an empty `ptypes` means any type.
    pub fn accepts(&self, features: Features, ptypes: ProgTypes) -> bool {
        self.features.contains(features) && (ptypes.is_empty() || ptypes.intersects(self.ptypes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialMode {
    /// A register spelled by a fixed name, e.g. `$rz`.
    Named(&'static str),
    /// The literal `0`.
    Zero,
    /// The literal `1`.
    One,
    /// The discard placeholder `_`.
    Discard,
}

/// Alternate encoding of a register operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialReg {
    pub num: u64,
    pub mode: SpecialMode,
    pub features: Features,
}

impl SpecialReg {
    pub fn new(num: u64, mode: SpecialMode) -> Self {
        Self { num, mode, features: Features::empty() }
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }
}

/// Register operand: `name` + decimal index + `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reg {
    /// `None` for a lone register that only exists as index 0.
    pub bf: Option<Bitfield>,
    pub name: &'static str,
    pub suffix: &'static str,
    pub specials: Vec<SpecialReg>,
    /// Half registers: `$r3l` is index 6, `$r3h` is index 7.
    pub hilo: bool,
}

impl Reg {
    pub fn new(name: &'static str, bf: Bitfield) -> Self {
        Self { bf: Some(bf), name, suffix: "", specials: Vec::new(), hilo: false }
    }

    pub fn single(name: &'static str) -> Self {
        Self { bf: None, name, suffix: "", specials: Vec::new(), hilo: false }
    }

    pub fn suffix(mut self, suffix: &'static str) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn hilo(mut self) -> Self {
        self.hilo = true;
        self
    }

    pub fn special(mut self, sr: SpecialReg) -> Self {
        self.specials.push(sr);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncrMode {
    #[default]
    None,
    /// Offset applied after the access: `[$a1]++4`.
    Post,
    /// Offset applied before the access: `[++4 $a1]`.
    Pre,
}

/// Memory operand descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mem {
    /// Address space name; `None` matches a bare, non-bracketed address.
    pub space: Option<&'static str>,
    /// Numeric suffix on the space name, e.g. the 3 in `c3[...]`.
    pub idx: Option<Bitfield>,
    pub reg: Option<Reg>,
    pub imm: Option<Bitfield>,
    /// Scaled secondary register.
    pub reg2: Option<Reg>,
    pub reg2shr: u64,
    pub incr: IncrMode,
}

impl Mem {
    pub fn new(space: &'static str) -> Self {
        Self { space: Some(space), ..Self::default() }
    }

    pub fn bare() -> Self {
        Self::default()
    }

    pub fn idx(mut self, bf: Bitfield) -> Self {
        self.idx = Some(bf);
        self
    }

    pub fn reg(mut self, reg: Reg) -> Self {
        self.reg = Some(reg);
        self
    }

    pub fn imm(mut self, bf: Bitfield) -> Self {
        self.imm = Some(bf);
        self
    }

    pub fn reg2(mut self, reg: Reg, shr: u64) -> Self {
        self.reg2 = Some(reg);
        self.reg2shr = shr;
        self
    }

    pub fn incr(mut self, incr: IncrMode) -> Self {
        self.incr = incr;
        self
    }
}

/// Consecutive register list operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VecDesc {
    pub name: &'static str,
    pub bf: Bitfield,
    pub cnt: Bitfield,
    /// Occupancy mask; without one every slot must be a register.
    pub mask: Option<Bitfield>,
}

/// One step of a table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Name(&'static str),
    /// Identifier operand spelled exactly like this.
    Cmd(&'static str),
    Table(Arc<Table>),
    /// Sets the encoded length in bytes.
    OpLen(usize),
    /// Immediate that must be known at match time.
    Imm(Bitfield),
    /// Immediate that may be deferred to a relocation.
    RelImm(Bitfield),
    Reg(Reg),
    Mem(Mem),
    Vec(VecDesc),
    /// `start:end` pair, stored as start and length.
    BitRange(Bitfield, Bitfield),
    Discard,
    SubStart,
    SubEnd,
    Nop,
    Fail,
}

impl Atom {
    pub fn table(t: &Arc<Table>) -> Self {
        Atom::Table(Arc::clone(t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub val: u64,
    pub mask: u64,
    pub atoms: Vec<Atom>,
    pub features: Features,
    pub ptypes: ProgTypes,
}

impl Row {
    pub fn new(val: u64, mask: u64, atoms: Vec<Atom>) -> Self {
        debug_assert!(atoms.len() <= MAX_ATOMS, "row has {} atoms", atoms.len());
        Self { val, mask, atoms, features: Features::empty(), ptypes: ProgTypes::empty() }
    }

    /// Catch-all that never matches.
    pub fn fail() -> Self {
        Self::new(0, 0, vec![Atom::Fail])
    }

    /// Catch-all that matches without consuming anything.
    pub fn empty() -> Self {
        Self::new(0, 0, Vec::new())
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn ptypes(mut self, ptypes: ProgTypes) -> Self {
        self.ptypes = ptypes;
        self
    }
}

/// Ordered rows closed by a required default row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Row>,
    default: Row,
}

impl Table {
    pub fn new(rows: Vec<Row>, default: Row) -> Self {
        Self { rows, default }
    }

    /// Two-way table on a single flag bit.
    pub fn flag(bit: u32, off: Vec<Atom>, on: Vec<Atom>) -> Self {
        let m = 1u64 << bit;
        Self::new(vec![Row::new(0, m, off), Row::new(m, m, on)], Row::fail())
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().chain(std::iter::once(&self.default))
    }
}

/// A complete instruction set description.
#[derive(Debug, Clone)]
pub struct Isa {
    pub name: &'static str,
    pub root: Arc<Table>,
    /// Natural word size in bytes, used to pick the default output format.
    pub opunit: usize,
    /// Bytes per label unit.
    pub posunit: u64,
    pub max_oplen: usize,
    /// 8-byte instructions must start on an 8-byte boundary.
    pub align_long: bool,
    pub variants: Vec<(&'static str, Features)>,
}

impl Isa {
    pub fn variant(&self, name: &str) -> Option<Features> {
        self.variants.iter().find(|(n, _)| *n == name).map(|&(_, f)| f)
    }
}
