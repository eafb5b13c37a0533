// Field refinement: pure transformations over one record at a time

pub mod catalog;
pub mod enrich;
pub mod flatten;
pub mod normalize;
pub mod split;
pub mod structure;
pub mod years;

/// `part / whole * 100`, rounded to one decimal; `0.0` when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
