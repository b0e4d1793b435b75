use std::sync::Arc;

use gpuasm_rs::isa::demo;
use gpuasm_rs::{assemble, AsmError, Atom, Expr, Isa, Item, Line, Row, Selector, Table};
use pretty_assertions::assert_eq;

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn insn(items: Vec<Item>) -> Line {
    Line::insn(items)
}

fn run_demo(lines: &[Line]) -> Result<gpuasm_rs::Assembly, AsmError> {
    assemble(demo::isa(), &Selector::default(), lines)
}

fn default_words(lines: &[Line]) -> Vec<u32> {
    let asm = run_demo(lines).unwrap();
    words(&asm.sections[0].bytes)
}

#[test]
fn forward_branch_in_one_pass() {
    let lines = vec![
        insn(vec![Item::name("bra"), Item::label("L")]),
        insn(vec![Item::name("nop")]),
        Line::label("L"),
        insn(vec![Item::name("exit")]),
    ];
    let asm = run_demo(&lines).unwrap();
    assert_eq!(asm.iterations, 1);
    assert_eq!(asm.labels.get("L"), Some(2));
    // offset is counted from the word after the branch
    assert_eq!(words(&asm.sections[0].bytes), vec![0x0010_000A, 0x0000_0000, 0x0000_007E]);
}

#[test]
fn out_of_range_immediate_falls_back_to_long_form() {
    let lines = vec![
        Line::directive(".equ", vec![Expr::label("K"), Expr::num(0x12345)]),
        insn(vec![Item::name("mov"), Item::reg("$r1"), Item::label("K")]),
    ];
    let asm = run_demo(&lines).unwrap();
    assert_eq!(asm.iterations, 2);
    assert_eq!(words(&asm.sections[0].bytes), vec![0x0000_0105, 0x0001_2345]);
}

#[test]
fn growth_moves_later_labels() {
    let lines = vec![
        insn(vec![Item::name("bra"), Item::label("L")]),
        Line::directive(".skip", vec![Expr::num(0x4000)]),
        Line::label("L"),
        insn(vec![Item::name("exit")]),
    ];
    let asm = run_demo(&lines).unwrap();
    // short form cannot reach 0x1000 words ahead
    assert_eq!(asm.iterations, 2);
    assert_eq!(asm.labels.get("L"), Some(0x1002));
    let w = words(&asm.sections[0].bytes);
    assert_eq!(w.len(), 2 + 0x1000 + 1);
    assert_eq!(&w[..2], &[0x0000_000B, 0x0000_1002]);
    assert_eq!(w[w.len() - 1], 0x7E);
}

#[test]
fn misaligned_long_form_grows_predecessor() {
    let lines = vec![
        insn(vec![Item::name("nop")]),
        Line::label("L"),
        insn(vec![Item::name("mov"), Item::reg("$r1"), Item::num(0x12345)]),
    ];
    let asm = run_demo(&lines).unwrap();
    assert_eq!(asm.iterations, 2);
    assert_eq!(asm.labels.get("L"), Some(2));
    assert_eq!(
        words(&asm.sections[0].bytes),
        vec![0x0000_0001, 0x0000_0000, 0x0000_0105, 0x0001_2345]
    );
}

#[test]
fn short_forms_need_no_alignment() {
    let lines = vec![
        insn(vec![Item::name("nop")]),
        insn(vec![Item::name("mov"), Item::reg("$r1"), Item::reg("$r2")]),
        insn(vec![Item::name("add"), Item::reg("$r3"), Item::reg("$r1"), Item::num(-1i64 as u64)]),
    ];
    let asm = run_demo(&lines).unwrap();
    assert_eq!(asm.iterations, 1);
    assert_eq!(words(&asm.sections[0].bytes), vec![0x0000_0000, 0x0000_8102, 0xFFF0_4308]);
}

/// `s` is 4 bytes only, `l` 8 bytes only, `a` either.
fn lengths_isa() -> Isa {
    Isa {
        name: "lengths",
        root: Arc::new(Table::new(
            vec![
                Row::new(0x1, 0xFF, vec![Atom::Name("s"), Atom::OpLen(4)]),
                Row::new(0x2, 0xFF, vec![Atom::Name("l"), Atom::OpLen(8)]),
                Row::new(0x3, 0xFF, vec![Atom::Name("a"), Atom::OpLen(4)]),
                Row::new(0x4, 0xFF, vec![Atom::Name("a"), Atom::OpLen(8)]),
            ],
            Row::fail(),
        )),
        opunit: 4,
        posunit: 1,
        max_oplen: 8,
        align_long: true,
        variants: vec![],
    }
}

fn op(name: &str) -> Line {
    insn(vec![Item::name(name)])
}

#[test]
fn realignment_skips_labels_and_reaches_a_fixed_point() {
    let isa = lengths_isa();
    let lines = vec![op("l"), op("a"), Line::label("x"), Line::label("y"), op("l"), op("s")];
    let asm = assemble(&isa, &Selector::default(), &lines).unwrap();
    assert_eq!(asm.iterations, 2);
    assert_eq!(asm.labels.get("x"), Some(16));
    assert_eq!(asm.labels.get("y"), Some(16));
    assert_eq!(words(&asm.sections[0].bytes), vec![2, 0, 4, 0, 2, 0, 1]);
}

#[test]
fn realignment_needs_an_instruction_with_a_longer_form() {
    let isa = lengths_isa();
    let sel = Selector::default();
    let err = assemble(&isa, &sel, &[op("s"), Line::label("x"), op("l")]).unwrap_err();
    assert_eq!(err, AsmError::AlignmentUnshrinkable { line: 3 });

    let data = Line::directive(".b32", vec![Expr::num(7)]);
    let err = assemble(&isa, &sel, &[data, op("l")]).unwrap_err();
    assert_eq!(err, AsmError::AlignmentUnshrinkable { line: 2 });

    // a directive that already aligns is fine
    let lines = [op("s"), Line::directive(".align", vec![Expr::num(8)]), op("l")];
    let asm = assemble(&isa, &sel, &lines).unwrap();
    assert_eq!(words(&asm.sections[0].bytes), vec![1, 0, 2, 0]);
}

#[test]
fn fatal_errors_carry_their_line() {
    let err = run_demo(&[
        Line::directive(".equ", vec![Expr::label("K"), Expr::num(1 << 32)]),
        insn(vec![Item::name("mov"), Item::reg("$r1"), Item::label("K")]),
    ])
    .unwrap_err();
    assert_eq!(err, AsmError::RelocationFailed { line: 2 });

    let err = run_demo(&[Line::label("L"), op("nop"), Line::label("L")]).unwrap_err();
    assert_eq!(err, AsmError::LabelRedeclared { name: "L".into(), line: 3 });

    let err = run_demo(&[op("nop"), insn(vec![Item::name("bra"), Item::label("nowhere")])]).unwrap_err();
    assert_eq!(err, AsmError::UndefinedLabel { name: "nowhere".into(), line: 2 });
    assert_eq!(err.line(), 2);

    let err = run_demo(&[op("nop"), op("frob")]).unwrap_err();
    assert_eq!(err, AsmError::NoMatch { line: 2 });
}

#[test]
fn labels_count_isa_units_from_section_base() {
    let lines = vec![
        op("nop"),
        Line::directive(".section", vec![Expr::label("hi"), Expr::num(0x100)]),
        op("nop"),
        Line::label("there"),
        op("exit"),
    ];
    let asm = run_demo(&lines).unwrap();
    assert_eq!(asm.labels.get("there"), Some(0x101));
    assert_eq!(default_words(&lines), vec![0]);
    assert_eq!(asm.section("hi").map(|s| s.base), Some(0x100));
}
