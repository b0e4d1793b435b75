pub mod demo; // demonstration ISA with short/long forms

use crate::table::Isa;

/// Names accepted by [`lookup`].
pub const NAMES: &[&str] = &["demo"];

pub fn lookup(name: &str) -> Option<&'static Isa> {
    match name {
        "demo" => Some(demo::isa()),
        _ => None,
    }
}
