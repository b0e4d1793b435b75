//! Encodings of the bundled demo instruction set.

use gpuasm_rs::isa::{self, demo};
use gpuasm_rs::{assemble, encode_word, AsmError, BinOp, Expr, Incr, Item, Line, ProgTypes, Selector};
use pretty_assertions::assert_eq;

fn variant(name: &str) -> Selector {
    Selector { features: demo::isa().variant(name).unwrap(), ptypes: ProgTypes::all() }
}

/// First word of a one-instruction program.
fn first_word(sel: &Selector, items: Vec<Item>) -> Result<u32, AsmError> {
    let asm = assemble(demo::isa(), sel, &[Line::insn(items)])?;
    let b = &asm.sections[0].bytes;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn enc(items: Vec<Item>) -> Result<u32, AsmError> {
    first_word(&Selector::default(), items)
}

fn n(s: &str) -> Item {
    Item::name(s)
}

fn r(s: &str) -> Item {
    Item::reg(s)
}

fn g(addr: Expr) -> Item {
    Item::expr(Expr::mem("g", addr))
}

#[test]
fn registry_knows_demo() {
    assert_eq!(isa::NAMES, &["demo"]);
    assert!(isa::lookup("demo").is_some_and(|i| i.name == "demo"));
    assert!(isa::lookup("nv50").is_none());
}

#[test]
fn register_moves() {
    assert_eq!(enc(vec![n("mov"), r("$r1"), r("$r2")]), Ok(0x0000_8102));
    assert_eq!(enc(vec![n("mov"), r("$r1"), r("$rz")]), Ok(0x000F_C102));
    // the register form wins for 0, the immediate form for anything else
    assert_eq!(enc(vec![n("mov"), r("$r1"), Item::num(0)]), Ok(0x000F_C102));
    assert_eq!(enc(vec![n("mov"), r("$r1"), Item::num(5)]), Ok(0x0050_0104));
    // zero is not a destination
    assert_eq!(enc(vec![n("mov"), Item::num(0), r("$r1")]), Err(AsmError::NoMatch { line: 1 }));
}

#[test]
fn arithmetic_and_modifiers() {
    assert_eq!(enc(vec![n("add"), r("$r1"), r("$r2"), r("$r3")]), Ok(0x0030_8106));
    assert_eq!(enc(vec![n("add"), n("sat"), r("$r1"), r("$r2"), r("$r3")]), Ok(0x0030_8186));
    assert_eq!(enc(vec![n("add"), r("$r1"), r("$r2"), Item::num(0x7FF)]), Ok(0x7FF0_8108));
    // scale factors come from a lookup table
    assert_eq!(enc(vec![n("scl"), r("$r1"), r("$r2"), Item::num(16)]), Ok(0x0040_810E));
    assert_eq!(enc(vec![n("scl"), r("$r1"), r("$r2"), Item::num(3)]), Err(AsmError::NoMatch { line: 1 }));
    let div0 = Item::expr(Expr::bin(BinOp::Div, Expr::num(16), Expr::num(0)));
    assert_eq!(enc(vec![n("scl"), r("$r1"), r("$r2"), div0]), Err(AsmError::DivisionByZero { line: 1 }));
}

#[test]
fn memory_spaces() {
    let plus = |a: Expr, b: u64| Expr::bin(BinOp::Add, a, Expr::num(b));
    assert_eq!(enc(vec![n("ld"), r("$r1"), g(plus(Expr::reg("$r2"), 8))]), Ok(0x0080_8110));
    let s = Item::expr(Expr::mem("s", plus(Expr::reg("$r2"), 8)));
    assert_eq!(enc(vec![n("ld"), r("$r1"), s]), Ok(0x0080_8190));
    let c = Item::expr(Expr::mem("c2", Expr::num(0x10)));
    assert_eq!(enc(vec![n("ld"), r("$r1"), c]), Ok(0x0040_8114));
    assert_eq!(enc(vec![n("st"), g(Expr::reg("$r2")), Item::num(0)]), Ok(0x0000_BF1A));
    let list = Item::expr(Expr::Vec(vec![Expr::reg("$r4"), Expr::reg("$r5")]));
    assert_eq!(enc(vec![n("ldv"), list, g(Expr::reg("$r2"))]), Ok(0x0020_841C));
}

#[test]
fn extended_forms_need_v2() {
    let scaled = || g(Expr::bin(BinOp::Add, Expr::reg("$r2"), Expr::bin(BinOp::Mul, Expr::reg("$r3"), Expr::num(4))));
    let post = || Item::expr(Expr::mem_incr("g", Expr::reg("$r2"), Incr::PostAdd(Box::new(Expr::num(4)))));
    let ext = || vec![n("ext"), r("$r1"), r("$r2"), Item::expr(Expr::Range(4, 12))];

    let v2 = variant("v2");
    assert_eq!(first_word(&v2, vec![n("ld"), r("$r1"), scaled()]), Ok(0x0030_8116));
    assert_eq!(first_word(&v2, vec![n("ld"), r("$r1"), post()]), Ok(0x0040_8118));
    assert_eq!(first_word(&v2, ext()), Ok(0x2040_811E));

    let v1 = variant("v1");
    let none: Result<u32, AsmError> = Err(AsmError::NoMatch { line: 1 });
    assert_eq!(first_word(&v1, vec![n("ld"), r("$r1"), scaled()]), none);
    assert_eq!(first_word(&v1, vec![n("ld"), r("$r1"), post()]), none);
    assert_eq!(first_word(&v1, ext()), none);
    assert_eq!(first_word(&v1, vec![n("nop")]), Ok(0));
}

#[test]
fn kil_is_fragment_only() {
    let frag = Selector { ptypes: ProgTypes::FRAGMENT, ..variant("v1") };
    let vert = Selector { ptypes: ProgTypes::VERTEX, ..variant("v1") };
    assert_eq!(first_word(&frag, vec![n("kil")]), Ok(0x7C));
    assert_eq!(first_word(&vert, vec![n("kil")]), Err(AsmError::NoMatch { line: 1 }));
    assert_eq!(first_word(&vert, vec![n("exit")]), Ok(0x7E));
}

#[test]
fn single_word_encoding() {
    let sel = Selector::default();
    let long_mov = [n("mov"), r("$r1"), Item::num(0x12345)];
    assert_eq!(encode_word(demo::isa(), &sel, &long_mov, 1), Ok(0x0001_2345_0000_0105));
    assert_eq!(
        encode_word(demo::isa(), &sel, &[n("nop")], 1),
        Err(AsmError::Ambiguous { count: 2, line: 1 })
    );
}
