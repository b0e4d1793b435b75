use std::sync::Arc;

use crate::accum::{low_mask, Accum};

/// One contiguous bit range of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubField {
    pub pos: usize,
    pub len: usize,
}

/// How the raw bits of a field map to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMode {
    #[default]
    Unsigned,
    /// Two's complement over the whole width.
    Signed,
    /// Negative only when both of the two top bits are set.
    SlightlySigned,
    /// Always biased by `-2^width`.
    UltraSigned,
}

/// Where a value lives inside an instruction and how it is transformed.
///
/// The second sub-range holds the more significant bits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield {
    pub sbf: [SubField; 2],
    pub mode: SignMode,
    pub shr: u32,
    pub addend: u64,
    pub xorend: u64,
    pub lut: Option<Arc<[u64]>>,
    pub pcrel: bool,
    /// Added to the current position before pc-relative adjustment.
    pub pospreadd: u64,
    pub wrapok: bool,
}

fn shl(v: u64, n: u64) -> u64 {
    u32::try_from(n).ok().and_then(|n| v.checked_shl(n)).unwrap_or(0)
}

fn shr(v: u64, n: u64) -> u64 {
    u32::try_from(n).ok().and_then(|n| v.checked_shr(n)).unwrap_or(0)
}

impl Bitfield {
    pub fn unsigned(pos: usize, len: usize) -> Self {
        Self {
            sbf: [SubField { pos, len }, SubField::default()],
            ..Self::default()
        }
    }

    pub fn signed(pos: usize, len: usize) -> Self {
        Self::unsigned(pos, len).mode(SignMode::Signed)
    }

    pub fn mode(mut self, mode: SignMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds the high sub-range of a split field.
    pub fn split(mut self, pos: usize, len: usize) -> Self {
        self.sbf[1] = SubField { pos, len };
        self
    }

    pub fn shr(mut self, shr: u32) -> Self {
        self.shr = shr;
        self
    }

    pub fn addend(mut self, addend: u64) -> Self {
        self.addend = addend;
        self
    }

    pub fn xorend(mut self, xorend: u64) -> Self {
        self.xorend = xorend;
        self
    }

    pub fn lut(mut self, lut: &[u64]) -> Self {
        self.lut = Some(Arc::from(lut));
        self
    }

    pub fn pcrel(mut self, pospreadd: u64) -> Self {
        self.pcrel = true;
        self.pospreadd = pospreadd;
        self
    }

    pub fn wrapok(mut self) -> Self {
        self.wrapok = true;
        self
    }

    /// Bits actually stored, including the implicit low `shr` bits.
    pub fn total_width(&self) -> u64 {
        u64::from(self.shr) + (self.sbf[0].len + self.sbf[1].len) as u64
    }

    fn pc_adjust(&self, cpos: u64) -> u64 {
        if !self.pcrel {
            return 0;
        }
        cpos.wrapping_add(self.pospreadd) & !low_mask(self.shr as usize)
    }

    /// Reads the field back out of `acc`. `cpos` only matters for
    /// pc-relative fields. `None` on an index past the end of the LUT.
    pub fn decode(&self, acc: &Accum, cpos: u64) -> Option<u64> {
        let mut res = 0u64;
        let mut width = u64::from(self.shr);
        for s in &self.sbf {
            res |= shl(acc.field(s.pos, s.len), width);
            width += s.len as u64;
        }
        let bit_set = |n: u64| width >= n && res & shl(1, width - n) != 0;
        let (top, below) = (bit_set(1), bit_set(2));
        let negative = match self.mode {
            SignMode::Unsigned => false,
            SignMode::Signed => top,
            SignMode::SlightlySigned => top && below,
            SignMode::UltraSigned => true,
        };
        if negative {
            res = res.wrapping_sub(shl(1, width));
        }
        if let Some(lut) = &self.lut {
            res = *lut.get(usize::try_from(res).ok()?)?;
        }
        res ^= self.xorend;
        res = res.wrapping_add(self.pc_adjust(cpos));
        Some(res.wrapping_add(self.addend))
    }

    /// Encodes an immediate that is known right now.
    pub fn encode(&self, acc: &mut Accum, value: u64) -> bool {
        self.encode_at(acc, value, 0)
    }

    /// Encodes `value` as if the instruction sat at position `cpos`.
    ///
    /// On any failure (LUT miss, claimed-bit conflict, value that does not
    /// survive the round trip) `acc` is left untouched.
    pub fn encode_at(&self, acc: &mut Accum, value: u64, cpos: u64) -> bool {
        let mut num = value
            .wrapping_sub(self.addend)
            .wrapping_sub(self.pc_adjust(cpos))
            ^ self.xorend;
        if let Some(lut) = &self.lut {
            let bits = self.sbf[0].len + self.sbf[1].len;
            let max = if bits >= 32 { usize::MAX } else { 1usize << bits };
            match lut.iter().take(max).position(|&e| e == num) {
                Some(idx) => num = idx as u64,
                None => return false,
            }
        }
        num = shr(num, u64::from(self.shr));
        let mut scratch = *acc;
        if !scratch.set_field(self.sbf[0].pos, self.sbf[0].len, num) {
            return false;
        }
        num = shr(num, self.sbf[0].len as u64);
        if !scratch.set_field(self.sbf[1].pos, self.sbf[1].len, num) {
            return false;
        }
        let total = self.total_width();
        let mask = if self.wrapok && total < 64 { low_mask(total as usize) } else { !0 };
        match self.decode(&scratch, cpos) {
            Some(back) if back & mask == value & mask => {
                *acc = scratch;
                true
            }
            _ => false,
        }
    }
}
