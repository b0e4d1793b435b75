pub mod model;

use anyhow::{anyhow, Result};

use gpuasm_rs::{Features, Isa, ProgTypes, Selector};

pub use model::{export_labels, load_lines, parse_lines, LabelKV};

/// Builds the variant filter for `isa`. No variant selects every feature.
pub fn selector(isa: &Isa, variant: Option<&str>, ptypes: Option<ProgTypes>) -> Result<Selector> {
    let features = match variant {
        Some(v) => isa.variant(v).ok_or_else(|| {
            let known: Vec<&str> = isa.variants.iter().map(|(n, _)| *n).collect();
            anyhow!("unknown variant {v} for {} (known: {})", isa.name, known.join(", "))
        })?,
        None => Features::from_bits_retain(!0),
    };
    Ok(Selector { features, ptypes: ptypes.unwrap_or(ProgTypes::all()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_lookup() {
        let isa = gpuasm_rs::isa::lookup("demo").unwrap();
        let sel = selector(isa, Some("v1"), Some(ProgTypes::FRAGMENT)).unwrap();
        assert_eq!(sel.features, gpuasm_rs::isa::demo::BASE);
        assert_eq!(sel.ptypes, ProgTypes::FRAGMENT);
        assert!(selector(isa, Some("nv50"), None).is_err());
        assert_eq!(selector(isa, None, None).unwrap(), Selector::default());
    }
}
