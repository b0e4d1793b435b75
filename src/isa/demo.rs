//! A small GPU-flavoured ISA used to exercise the assembler end to end.
//!
//! Word layout (little-endian, 4 or 8 bytes):
//!
//! | bits    | field                                   |
//! |---------|-----------------------------------------|
//! | 0       | long flag (set on 8-byte forms)         |
//! | 1..7    | opcode                                  |
//! | 7       | modifier (`sat`, or memory space `s`)   |
//! | 8..14   | destination register                    |
//! | 14..20  | source register A                       |
//! | 20..32  | source register B or 12-bit immediate   |
//! | 32..64  | 32-bit immediate (long forms only)      |
//!
//! Labels count 4-byte units. 8-byte forms must be 8-byte aligned.

use std::sync::{Arc, OnceLock};

use crate::bitfield::Bitfield;
use crate::table::{
    Atom, Features, IncrMode, Isa, Mem, ProgTypes, Reg, Row, SpecialMode, SpecialReg, Table, VecDesc,
};

pub const BASE: Features = Features::from_bits_retain(1 << 0);
/// Scaled and post-increment addressing, bit extraction.
pub const EXT: Features = Features::from_bits_retain(1 << 1);

const OPMASK: u64 = 0x7F;
const LONG: u64 = 1;
const MOD: u64 = 1 << 7;
/// Register number of `$rz`.
pub const RZ: u64 = 63;

pub mod op {
    pub const NOP: u64 = 0x00;
    pub const MOV: u64 = 0x01;
    pub const MOVI: u64 = 0x02;
    pub const ADD: u64 = 0x03;
    pub const ADDI: u64 = 0x04;
    pub const BRA: u64 = 0x05;
    pub const SCL: u64 = 0x07;
    pub const LD: u64 = 0x08;
    pub const LDC: u64 = 0x0A;
    pub const LDX: u64 = 0x0B;
    pub const LDP: u64 = 0x0C;
    pub const ST: u64 = 0x0D;
    pub const LDV: u64 = 0x0E;
    pub const EXT: u64 = 0x0F;
    pub const KIL: u64 = 0x3E;
    pub const EXIT: u64 = 0x3F;
}

fn rz_specials(reg: Reg, zero: bool) -> Reg {
    let reg = reg
        .special(SpecialReg::new(RZ, SpecialMode::Named("$rz")))
        .special(SpecialReg::new(RZ, SpecialMode::Discard));
    if zero {
        reg.special(SpecialReg::new(RZ, SpecialMode::Zero))
    } else {
        reg
    }
}

fn dst() -> Reg {
    rz_specials(Reg::new("$r", Bitfield::unsigned(8, 6)), false)
}

fn src_a() -> Reg {
    rz_specials(Reg::new("$r", Bitfield::unsigned(14, 6)), true)
}

fn src_b() -> Reg {
    rz_specials(Reg::new("$r", Bitfield::unsigned(20, 6)), true)
}

fn imm12() -> Bitfield {
    Bitfield::signed(20, 12)
}

fn imm32() -> Bitfield {
    Bitfield::unsigned(32, 32)
}

/// Short and long rows for one opcode; `long` gets the long flag.
fn pair(code: u64, short: Vec<Atom>, long: Vec<Atom>) -> [Row; 2] {
    let mut short = short;
    let mut long = long;
    short.push(Atom::OpLen(4));
    long.push(Atom::OpLen(8));
    [Row::new(code << 1, OPMASK, short), Row::new(code << 1 | LONG, OPMASK, long)]
}

fn same(code: u64, atoms: Vec<Atom>) -> [Row; 2] {
    pair(code, atoms.clone(), atoms)
}

fn space_table(imm: Bitfield) -> Arc<Table> {
    let mem = |space| Atom::Mem(Mem::new(space).reg(src_a()).imm(imm.clone()));
    Arc::new(Table::new(
        vec![Row::new(0, MOD, vec![mem("g")]), Row::new(MOD, MOD, vec![mem("s")])],
        Row::fail(),
    ))
}

fn build() -> Isa {
    let sat = Arc::new(Table::flag(7, vec![], vec![Atom::Name("sat")]));
    let mem12 = space_table(imm12());
    let mem32 = space_table(imm32());
    let name = Atom::Name;
    let reg = |r: Reg| Atom::Reg(r);

    let mut rows = Vec::new();
    rows.extend(same(op::NOP, vec![name("nop")]));
    rows.extend(same(op::MOV, vec![name("mov"), reg(dst()), reg(src_a())]));
    rows.extend(pair(
        op::MOVI,
        vec![name("mov"), reg(dst()), Atom::RelImm(imm12())],
        vec![name("mov"), reg(dst()), Atom::RelImm(imm32())],
    ));
    rows.extend(same(
        op::ADD,
        vec![name("add"), Atom::table(&sat), reg(dst()), reg(src_a()), reg(src_b())],
    ));
    rows.extend(pair(
        op::ADDI,
        vec![name("add"), Atom::table(&sat), reg(dst()), reg(src_a()), Atom::RelImm(imm12())],
        vec![name("add"), Atom::table(&sat), reg(dst()), reg(src_a()), Atom::RelImm(imm32())],
    ));
    rows.extend(pair(
        op::BRA,
        vec![name("bra"), Atom::RelImm(imm12().pcrel(1))],
        vec![name("bra"), Atom::RelImm(imm32())],
    ));
    rows.extend(same(
        op::SCL,
        vec![
            name("scl"),
            reg(dst()),
            reg(src_a()),
            Atom::Imm(Bitfield::unsigned(20, 3).lut(&[1, 2, 4, 8, 16, 32, 64, 128])),
        ],
    ));
    rows.extend(pair(
        op::LD,
        vec![name("ld"), reg(dst()), Atom::table(&mem12)],
        vec![name("ld"), reg(dst()), Atom::table(&mem32)],
    ));
    rows.extend(same(
        op::LDC,
        vec![
            name("ld"),
            reg(dst()),
            Atom::Mem(Mem::new("c").idx(Bitfield::unsigned(14, 4)).imm(Bitfield::unsigned(20, 12).shr(2))),
        ],
    ));
    for r in same(
        op::LDX,
        vec![name("ld"), reg(dst()), Atom::Mem(Mem::new("g").reg(src_a()).reg2(src_b(), 2))],
    ) {
        rows.push(r.features(BASE | EXT));
    }
    for r in same(
        op::LDP,
        vec![
            name("ld"),
            reg(dst()),
            Atom::Mem(Mem::new("g").reg(src_a()).imm(imm12()).incr(IncrMode::Post)),
        ],
    ) {
        rows.push(r.features(BASE | EXT));
    }
    rows.extend(pair(
        op::ST,
        vec![name("st"), Atom::table(&mem12), reg(data_reg())],
        vec![name("st"), Atom::table(&mem32), reg(data_reg())],
    ));
    rows.extend(same(
        op::LDV,
        vec![
            name("ldv"),
            Atom::Vec(VecDesc {
                name: "$r",
                bf: Bitfield::unsigned(8, 6),
                cnt: Bitfield::unsigned(20, 3),
                mask: None,
            }),
            Atom::Mem(Mem::new("g").reg(src_a())),
        ],
    ));
    for r in same(
        op::EXT,
        vec![
            name("ext"),
            reg(dst()),
            reg(src_a()),
            Atom::BitRange(Bitfield::unsigned(20, 6), Bitfield::unsigned(26, 6)),
        ],
    ) {
        rows.push(r.features(BASE | EXT));
    }
    for r in same(op::KIL, vec![name("kil")]) {
        rows.push(r.ptypes(ProgTypes::FRAGMENT));
    }
    rows.extend(same(op::EXIT, vec![name("exit")]));

    let rows = rows
        .into_iter()
        .map(|r| {
            let f = r.features | BASE;
            r.features(f)
        })
        .collect();

    Isa {
        name: "demo",
        root: Arc::new(Table::new(rows, Row::fail())),
        opunit: 4,
        posunit: 4,
        max_oplen: 8,
        align_long: true,
        variants: vec![("v1", BASE), ("v2", BASE | EXT)],
    }
}

/// Stored value of `st` sits in the destination field.
fn data_reg() -> Reg {
    rz_specials(Reg::new("$r", Bitfield::unsigned(8, 6)), true)
}

pub fn isa() -> &'static Isa {
    static ISA: OnceLock<Isa> = OnceLock::new();
    ISA.get_or_init(build)
}
