use tracing::{trace, warn};

use crate::accum::{low_mask, Accum, ACCUM_BITS};
use crate::bitfield::Bitfield;
use crate::error::{AsmError, ExprError};
use crate::expr::{BinOp, Expr, Incr};
use crate::labels::LabelTable;
use crate::source::Item;
use crate::table::{Atom, IncrMode, Isa, Mem, ProgTypes, Reg, Selector, SpecialMode, Table, VecDesc};

/// Most relocations a single candidate may carry.
pub const MAX_RELOCS: usize = 8;

/// A bitfield write deferred until labels are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloc {
    pub bf: Bitfield,
    pub expr: Expr,
}

/// One (possibly partial) encoding of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Match {
    pub acc: Accum,
    /// Atom positions consumed so far.
    pub lpos: usize,
    /// Encoded length in bytes, once some atom has chosen it.
    pub oplen: Option<usize>,
    pub relocs: Vec<Reloc>,
}

impl Match {
    pub fn at(lpos: usize) -> Self {
        Self { lpos, ..Self::default() }
    }

    /// Applies every relocation for an instruction at `cpos`.
    ///
    /// `Ok(None)` when some resolved value does not fit its field; the
    /// candidate is then unusable at this position.
    pub fn resolve(&self, labels: &LabelTable, cpos: u64) -> Result<Option<Accum>, ExprError> {
        let mut acc = self.acc;
        for r in &self.relocs {
            let val = r.expr.eval(labels)?;
            if !r.bf.encode_at(&mut acc, val, cpos) {
                return Ok(None);
            }
        }
        Ok(Some(acc))
    }
}

/// Combines `prefix` with each of `tails`, dropping conflicting pairs.
///
/// The result keeps the tail's position, its length if set (else the
/// prefix's), and the prefix's relocations followed by the tail's.
pub fn merge_matches(prefix: &Match, tails: Vec<Match>) -> Vec<Match> {
    let mut res = Vec::with_capacity(tails.len());
    for tail in tails {
        if !prefix.acc.compatible(&tail.acc) {
            continue;
        }
        if prefix.relocs.len() + tail.relocs.len() > MAX_RELOCS {
            warn!(
                prefix = prefix.relocs.len(),
                tail = tail.relocs.len(),
                "too many relocations, dropping candidate"
            );
            continue;
        }
        let mut relocs = prefix.relocs.clone();
        relocs.extend(tail.relocs);
        res.push(Match {
            acc: prefix.acc.union(&tail.acc),
            lpos: tail.lpos,
            oplen: tail.oplen.or(prefix.oplen),
            relocs,
        });
    }
    res
}

fn set_rel(m: &mut Match, bf: &Bitfield, expr: &Expr) -> bool {
    if !expr.is_imm() {
        return false;
    }
    match expr.const_value() {
        Some(v) if !bf.pcrel => bf.encode(&mut m.acc, v),
        _ => {
            if m.relocs.len() >= MAX_RELOCS {
                warn!("too many relocations in one operand set");
                return false;
            }
            m.relocs.push(Reloc { bf: bf.clone(), expr: expr.clone() });
            true
        }
    }
}

/// Immediate and dynamic parts of a memory address.
#[derive(Default)]
struct AddrTerms<'e> {
    imm: Option<Expr>,
    dynamic: Vec<&'e Expr>,
}

impl<'e> AddrTerms<'e> {
    fn add_imm(&mut self, e: &Expr, flip: bool) {
        self.imm = Some(match self.imm.take() {
            None if flip => Expr::neg(e.clone()),
            None => e.clone(),
            Some(acc) if flip => Expr::bin(BinOp::Sub, acc, e.clone()),
            Some(acc) => Expr::bin(BinOp::Add, acc, e.clone()),
        });
    }

    /// At most two positive dynamic terms are accepted.
    fn split(&mut self, e: &'e Expr, flip: bool) -> bool {
        if e.is_imm() {
            self.add_imm(e, flip);
            return true;
        }
        match e {
            Expr::Bin(BinOp::Add, a, b) => self.split(a, flip) && self.split(b, flip),
            Expr::Bin(BinOp::Sub, a, b) => self.split(a, flip) && self.split(b, !flip),
            Expr::Neg(a) => self.split(a, !flip),
            _ if flip || self.dynamic.len() >= 2 => false,
            _ => {
                self.dynamic.push(e);
                true
            }
        }
    }
}

fn parse_index(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

struct Matcher<'a> {
    sel: &'a Selector,
    items: &'a [Item],
}

impl<'a> Matcher<'a> {
    fn expr_at(&self, spos: usize) -> Option<&'a Expr> {
        match self.items.get(spos) {
            Some(Item::Expr(e)) => Some(e),
            _ => None,
        }
    }

    fn item_is(&self, spos: usize, want: &Item) -> bool {
        self.items.get(spos) == Some(want)
    }

    fn table(&self, t: &Table, spos: usize) -> Vec<Match> {
        let mut res = Vec::new();
        for (i, row) in t.rows().enumerate() {
            if !self.sel.accepts(row.features, row.ptypes) {
                continue;
            }
            let seed = Match {
                acc: Accum::with_fixed(row.val, row.mask),
                lpos: spos,
                ..Match::default()
            };
            let found = self.descend(seed, &row.atoms);
            if !found.is_empty() {
                trace!(row = i, spos, count = found.len(), "row matched");
            }
            res.extend(found);
        }
        res
    }

    /// Runs a row's atoms left to right, fanning out on every ambiguity.
    fn descend(&self, seed: Match, atoms: &[Atom]) -> Vec<Match> {
        let mut cur = vec![seed];
        for atom in atoms {
            let mut next = Vec::new();
            for m in &cur {
                let found = self.atom(atom, m.lpos);
                next.extend(merge_matches(m, found));
            }
            if next.is_empty() {
                return next;
            }
            cur = next;
        }
        cur
    }

    fn atom(&self, atom: &Atom, spos: usize) -> Vec<Match> {
        let single = |ok: bool, lpos: usize| if ok { vec![Match::at(lpos)] } else { Vec::new() };
        match atom {
            Atom::Name(n) => single(matches!(self.items.get(spos), Some(Item::Name(s)) if s == n), spos + 1),
            Atom::Cmd(n) => single(matches!(self.expr_at(spos), Some(Expr::Label(s)) if s == n), spos + 1),
            Atom::SubStart => single(self.item_is(spos, &Item::SubStart), spos + 1),
            Atom::SubEnd => single(self.item_is(spos, &Item::SubEnd), spos + 1),
            Atom::Discard => single(matches!(self.expr_at(spos), Some(Expr::Discard)), spos + 1),
            Atom::Nop => single(true, spos),
            Atom::Fail => Vec::new(),
            Atom::OpLen(n) => vec![Match { oplen: Some(*n), ..Match::at(spos) }],
            Atom::Table(t) => self.table(t, spos),
            Atom::Imm(bf) => self.operand(spos, |m, e| {
                e.const_value().is_some_and(|v| bf.encode(&mut m.acc, v))
            }),
            Atom::RelImm(bf) => self.operand(spos, |m, e| set_rel(m, bf, e)),
            Atom::Reg(reg) => self.operand(spos, |m, e| self.reg(&mut m.acc, reg, e)),
            Atom::BitRange(start, len) => self.operand(spos, |m, e| match *e {
                Expr::Range(a, b) => {
                    start.encode(&mut m.acc, a) && len.encode(&mut m.acc, b.wrapping_sub(a))
                }
                _ => false,
            }),
            Atom::Mem(mem) => self.mem(mem, spos).into_iter().collect(),
            Atom::Vec(v) => self.vec(v, spos).into_iter().collect(),
        }
    }

    /// Matches one expression operand with `f`, consuming it.
    fn operand(&self, spos: usize, f: impl FnOnce(&mut Match, &Expr) -> bool) -> Vec<Match> {
        let Some(e) = self.expr_at(spos) else {
            return Vec::new();
        };
        let mut m = Match::at(spos + 1);
        if f(&mut m, e) {
            vec![m]
        } else {
            Vec::new()
        }
    }

    fn reg(&self, acc: &mut Accum, reg: &Reg, expr: &Expr) -> bool {
        let encode = |acc: &mut Accum, num: u64| match &reg.bf {
            Some(bf) => bf.encode(acc, num),
            None => num == 0,
        };
        for sr in &reg.specials {
            if !self.sel.accepts(sr.features, ProgTypes::empty()) {
                continue;
            }
            let hit = match sr.mode {
                SpecialMode::Named(name) => matches!(expr, Expr::Reg(s) if s == name),
                SpecialMode::Zero => matches!(expr, Expr::Num(0)),
                SpecialMode::One => matches!(expr, Expr::Num(1)),
                SpecialMode::Discard => matches!(expr, Expr::Discard),
            };
            if hit {
                return encode(acc, sr.num);
            }
        }
        let Expr::Reg(s) = expr else {
            return false;
        };
        let Some(rest) = s.strip_prefix(reg.name) else {
            return false;
        };
        let split = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(split);
        let num = if digits.is_empty() {
            // bare name, only valid for single registers
            if reg.bf.is_some() {
                return false;
            }
            0
        } else {
            match digits.parse::<u64>() {
                Ok(n) => n,
                Err(_) => return false,
            }
        };
        let num = if reg.hilo {
            match tail {
                "l" => num << 1,
                "h" => num << 1 | 1,
                _ => return false,
            }
        } else if tail == reg.suffix {
            num
        } else {
            return false;
        };
        encode(acc, num)
    }

    /// Register scaled by `reg << shl` or `reg * 2^shl`.
    fn shreg(&self, acc: &mut Accum, reg: &Reg, expr: &Expr, shl: u64) -> bool {
        let mut sh = 0u64;
        let mut e = expr;
        loop {
            match e {
                Expr::Bin(BinOp::Shl, a, b) => match **b {
                    Expr::Num(n) => {
                        sh = sh.saturating_add(n);
                        e = &**a;
                    }
                    _ => break,
                },
                Expr::Bin(BinOp::Mul, a, b) => {
                    let (n, inner) = match (&**a, &**b) {
                        (_, Expr::Num(n)) => (*n, a),
                        (Expr::Num(n), _) => (*n, b),
                        _ => break,
                    };
                    if !n.is_power_of_two() {
                        return false;
                    }
                    sh = sh.saturating_add(u64::from(n.trailing_zeros()));
                    e = &**inner;
                }
                _ => break,
            }
        }
        sh == shl && self.reg(acc, reg, e)
    }

    fn mem(&self, mem: &Mem, spos: usize) -> Option<Match> {
        let expr = self.expr_at(spos)?;
        let mut m = Match::at(spos + 1);
        let (addr, incr) = match (expr, mem.space) {
            (Expr::Mem(r), Some(space)) => {
                let rest = r.space.strip_prefix(space)?;
                match &mem.idx {
                    Some(bf) => {
                        if !bf.encode(&mut m.acc, parse_index(rest)?) {
                            return None;
                        }
                    }
                    None if rest.is_empty() => {}
                    None => return None,
                }
                let incr = match &r.incr {
                    Incr::None => None,
                    Incr::PostAdd(e) => Some((IncrMode::Post, (**e).clone())),
                    Incr::PostSub(e) => Some((IncrMode::Post, Expr::neg((**e).clone()))),
                    Incr::PreAdd(e) => Some((IncrMode::Pre, (**e).clone())),
                    Incr::PreSub(e) => Some((IncrMode::Pre, Expr::neg((**e).clone()))),
                };
                (&*r.addr, incr)
            }
            (Expr::Mem(_), None) | (_, Some(_)) => return None,
            (e, None) => (e, None),
        };

        let mut terms = AddrTerms::default();
        if !terms.split(addr, false) {
            return None;
        }
        match &mem.imm {
            Some(bf) => {
                let off = match (mem.incr, incr) {
                    (IncrMode::None, None) => terms.imm.take().unwrap_or(Expr::Num(0)),
                    (want, Some((got, e))) if want == got && terms.imm.is_none() => e,
                    _ => return None,
                };
                if !set_rel(&mut m, bf, &off) {
                    return None;
                }
            }
            None if terms.imm.is_none() && incr.is_none() => {}
            None => return None,
        }

        let zero = Expr::Num(0);
        let n1 = terms.dynamic.first().copied().unwrap_or(&zero);
        let n2 = terms.dynamic.get(1).copied().unwrap_or(&zero);
        let ok = match (&mem.reg, &mem.reg2) {
            (Some(r), Some(r2)) => {
                let saved = m.acc;
                if self.reg(&mut m.acc, r, n1) && self.shreg(&mut m.acc, r2, n2, mem.reg2shr) {
                    true
                } else {
                    m.acc = saved;
                    self.reg(&mut m.acc, r, n2) && self.shreg(&mut m.acc, r2, n1, mem.reg2shr)
                }
            }
            (Some(r), None) => terms.dynamic.len() < 2 && self.reg(&mut m.acc, r, n1),
            (None, Some(r2)) => {
                terms.dynamic.len() < 2 && self.shreg(&mut m.acc, r2, n1, mem.reg2shr)
            }
            (None, None) => terms.dynamic.is_empty(),
        };
        ok.then_some(m)
    }

    fn vec(&self, v: &VecDesc, spos: usize) -> Option<Match> {
        let Some(Expr::Vec(elems)) = self.expr_at(spos) else {
            return None;
        };
        let (mut start, mut cur, mut mask) = (0u64, 0u64, 0u64);
        for (i, e) in elems.iter().enumerate() {
            match e {
                Expr::Discard => {}
                Expr::Reg(s) => {
                    let num = parse_index(s.strip_prefix(v.name)?)?;
                    if mask != 0 {
                        if num != cur {
                            return None;
                        }
                        cur = cur.checked_add(1)?;
                    } else {
                        start = num;
                        cur = num.checked_add(1)?;
                    }
                    mask |= 1u64.checked_shl(u32::try_from(i).ok()?)?;
                }
                _ => return None,
            }
        }
        let cnt = elems.len() as u64;
        let mut m = Match::at(spos + 1);
        if !v.bf.encode(&mut m.acc, start) || !v.cnt.encode(&mut m.acc, cnt) {
            return None;
        }
        let ok = match &v.mask {
            Some(bf) => bf.encode(&mut m.acc, mask),
            None => cnt <= 64 && mask == low_mask(elems.len()),
        };
        ok.then_some(m)
    }
}

/// All encodings of `items` that consume every atom position.
///
/// Candidates longer than `isa.max_oplen` (or the accumulator) are dropped.
pub fn match_insn(isa: &Isa, sel: &Selector, items: &[Item]) -> Vec<Match> {
    let ctx = Matcher { sel, items };
    let all = ctx.table(&isa.root, 0);
    let total = all.len();
    let limit = isa.max_oplen.min(ACCUM_BITS / 8);
    let res: Vec<Match> = all
        .into_iter()
        .filter(|m| m.lpos == items.len())
        .filter(|m| {
            let len = m.oplen.unwrap_or(isa.opunit);
            if len > limit {
                warn!(len, limit, "encoding longer than the isa allows, dropping candidate");
            }
            len <= limit
        })
        .collect();
    trace!(total, complete = res.len(), "matched instruction");
    res
}

/// True when some operand divides a constant by zero.
fn divides_by_zero(e: &Expr) -> bool {
    match e {
        Expr::Bin(op, a, b) => {
            (*op == BinOp::Div && b.const_value() == Some(0)) || divides_by_zero(a) || divides_by_zero(b)
        }
        Expr::Neg(a) | Expr::Not(a) => divides_by_zero(a),
        Expr::Mem(r) => {
            let incr = match &r.incr {
                Incr::None => false,
                Incr::PostAdd(e) | Incr::PostSub(e) | Incr::PreAdd(e) | Incr::PreSub(e) => divides_by_zero(e),
            };
            incr || divides_by_zero(&r.addr)
        }
        Expr::Vec(v) => v.iter().any(divides_by_zero),
        Expr::Num(_) | Expr::Label(_) | Expr::Reg(_) | Expr::Discard | Expr::Range(..) => false,
    }
}

/// Diagnostic for an instruction with no candidates. A constant that
/// fails to fold is reported as such rather than as a missing row.
pub(crate) fn no_match(items: &[Item], line: usize) -> AsmError {
    let bad = items.iter().any(|it| matches!(it, Item::Expr(e) if divides_by_zero(e)));
    if bad {
        AsmError::DivisionByZero { line }
    } else {
        AsmError::NoMatch { line }
    }
}

/// Encodes a standalone instruction that must resolve to exactly one
/// 8-byte word with nothing left to relocate. `line` labels diagnostics.
pub fn encode_word(isa: &Isa, sel: &Selector, items: &[Item], line: usize) -> Result<u64, AsmError> {
    let mut found = match_insn(isa, sel, items);
    let m = match found.len() {
        0 => return Err(no_match(items, line)),
        1 => found.remove(0),
        count => return Err(AsmError::Ambiguous { count, line }),
    };
    let oplen = m.oplen.unwrap_or(isa.opunit);
    if oplen != 8 || !m.relocs.is_empty() {
        return Err(AsmError::NotAWord { oplen, relocs: m.relocs.len(), line });
    }
    Ok(m.acc.word(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(val: u64, mask: u64) -> Match {
        Match { acc: Accum::with_fixed(val, mask), ..Match::default() }
    }

    fn reloc(n: u64) -> Reloc {
        Reloc { bf: Bitfield::unsigned(0, 4), expr: Expr::num(n) }
    }

    #[test]
    fn merge_keeps_exactly_the_compatible_pairs() {
        // prefix claims 0xF0 = 0x30; tails exhaust a 2-bit overlap
        let prefix = fixed(0x30, 0xF0);
        let mut tails = Vec::new();
        for v in 0..4u64 {
            tails.push(fixed(v << 4, 0x30));
        }
        tails.push(fixed(0x5, 0x0F));
        let merged = merge_matches(&prefix, tails);
        let words: Vec<u64> = merged.iter().map(|m| m.acc.word(0)).collect();
        assert_eq!(words, vec![0x30, 0x35]);
        assert_eq!(merged[1].acc.claimed_word(0), 0xFF);
    }

    #[test]
    fn merge_inherits_length_and_orders_relocs() {
        let prefix = Match { oplen: Some(8), relocs: vec![reloc(1)], ..Match::at(0) };
        let tails = vec![
            Match { relocs: vec![reloc(2)], ..Match::at(3) },
            Match { oplen: Some(4), ..Match::at(2) },
        ];
        let merged = merge_matches(&prefix, tails);
        assert_eq!(merged[0].lpos, 3);
        assert_eq!(merged[0].oplen, Some(8));
        assert_eq!(merged[0].relocs, vec![reloc(1), reloc(2)]);
        assert_eq!(merged[1].oplen, Some(4));
    }

    #[test]
    fn merge_drops_combinations_over_the_reloc_bound() {
        let prefix = Match { relocs: vec![reloc(0); 5], ..Match::default() };
        let tails = vec![
            Match { relocs: vec![reloc(0); 3], ..Match::default() },
            Match { relocs: vec![reloc(0); 4], ..Match::default() },
        ];
        let merged = merge_matches(&prefix, tails);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].relocs.len(), MAX_RELOCS);
    }

    #[test]
    fn address_split_collects_terms() {
        let r1 = Expr::reg("$r1");
        let r2 = Expr::reg("$r2");
        let addr = Expr::bin(
            BinOp::Sub,
            Expr::bin(BinOp::Add, r1.clone(), Expr::num(0x20)),
            Expr::bin(BinOp::Sub, Expr::num(4), r2.clone()),
        );
        let mut t = AddrTerms::default();
        assert!(t.split(&addr, false));
        assert_eq!(t.dynamic, vec![&r1, &r2]);
        assert_eq!(t.imm.and_then(|e| e.const_value()), Some(0x1C));

        let negated = Expr::bin(BinOp::Sub, Expr::num(4), r1.clone());
        assert!(!AddrTerms::default().split(&negated, false));

        let three = Expr::bin(BinOp::Add, Expr::bin(BinOp::Add, r1.clone(), r2.clone()), r1);
        assert!(!AddrTerms::default().split(&three, false));
    }

    #[test]
    fn resolve_reports_misfit_and_errors() {
        let mut labels = LabelTable::default();
        labels.define("near", 3, 1).unwrap();
        labels.define("far", 300, 2).unwrap();
        let m = |name: &str| Match {
            relocs: vec![Reloc { bf: Bitfield::unsigned(0, 8), expr: Expr::label(name) }],
            ..Match::default()
        };
        assert_eq!(m("near").resolve(&labels, 0).unwrap().map(|a| a.word(0)), Some(3));
        assert_eq!(m("far").resolve(&labels, 0), Ok(None));
        assert_eq!(
            m("none").resolve(&labels, 0),
            Err(ExprError::UndefinedLabel("none".into()))
        );
    }
}
