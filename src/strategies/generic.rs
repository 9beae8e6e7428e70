use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::identity::activity_hash;
use crate::pipeline::StrategyOutcome;
use crate::types::{Batch, Fields};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Unit abbreviations and their canonical spelling
const UNIT_NORMALIZATION: &[(&str, &str)] = &[
    ("ha", "hectare"),
    ("h", "hour"),
    ("hr", "hour"),
    ("kg", "kilogram"),
    ("kgkm", "kilogram kilometer"),
    ("km", "kilometer"),
    ("kwh", "kilowatt hour"),
    ("l", "litre"),
    ("m", "meter"),
    ("m2", "square meter"),
    ("m2a", "square meter-year"),
    ("m3", "cubic meter"),
    ("mj", "megajoule"),
    ("p", "unit"),
    ("pcs", "unit"),
    ("pkm", "person kilometer"),
    ("t", "ton"),
    ("tkm", "ton kilometer"),
    ("vkm", "vehicle kilometer"),
];

const TEXT_FIELDS: [&str; 3] = ["name", "reference product", "location"];

fn normalize_unit(unit: &str) -> Option<&'static str> {
    let lower = unit.trim().to_lowercase();
    UNIT_NORMALIZATION
        .iter()
        .find(|(abbrev, _)| *abbrev == lower)
        .map(|(_, canonical)| *canonical)
}

fn collapse_whitespace(value: &mut Value) {
    if let Value::String(s) = value {
        let collapsed = WHITESPACE.replace_all(s.trim(), " ").into_owned();
        *s = collapsed;
    }
}

/// Trim and collapse runs of whitespace in names, products and locations of
/// datasets and exchanges.
pub fn normalize_whitespace(batch: &Batch) -> StrategyOutcome {
    let mut out = batch.clone();
    for ds in out.iter_mut() {
        for key in TEXT_FIELDS {
            if let Some(value) = ds.fields.get_mut(key) {
                collapse_whitespace(value);
            }
        }
        for exc in ds.exchanges_mut() {
            for key in TEXT_FIELDS {
                if let Some(value) = exc.fields.get_mut(key) {
                    collapse_whitespace(value);
                }
            }
        }
    }
    Ok(out)
}

/// Replace unit abbreviations (`kg`, `MJ`, `m3`, ...) with canonical names.
pub fn normalize_units(batch: &Batch) -> StrategyOutcome {
    let mut out = batch.clone();
    for ds in out.iter_mut() {
        if let Some(unit) = ds.str_field("unit").and_then(normalize_unit) {
            ds.set("unit", Value::from(unit))?;
        }
        for exc in ds.exchanges_mut() {
            if let Some(unit) = exc.str_field("unit").and_then(normalize_unit) {
                exc.set("unit", Value::from(unit));
            }
        }
    }
    Ok(out)
}

/// Drop a trailing `unspecified` subcategory, so `["air", "unspecified"]`
/// and `["air"]` hash the same.
pub fn drop_unspecified_subcategories(batch: &Batch) -> StrategyOutcome {
    let mut out = batch.clone();
    for exc in out.iter_mut().flat_map(|ds| ds.exchanges_mut().iter_mut()) {
        if let Some(Value::Array(categories)) = exc.fields.get_mut("categories") {
            let unspecified = categories.len() > 1
                && matches!(categories.last(), Some(Value::String(s)) if s.eq_ignore_ascii_case("unspecified"));
            if unspecified {
                categories.pop();
            }
        }
    }
    Ok(out)
}

/// Give every dataset without a `code` one derived from its activity hash.
pub fn set_code_by_activity_hash(batch: &Batch) -> StrategyOutcome {
    let mut out = batch.clone();
    for ds in out.iter_mut() {
        if ds.str_field("code").map_or(true, str::is_empty) {
            let code = activity_hash(&*ds);
            ds.set("code", Value::String(code))?;
        }
    }
    Ok(out)
}
