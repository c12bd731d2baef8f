//! Margin collapsing.

/// Collapse adjoining margins: the largest positive margin plus the most
/// negative one. An empty set collapses to zero.
pub fn collapse_margins(margins: &[f64]) -> f64 {
    let mut max_positive = 0.0_f64;
    let mut min_negative = 0.0_f64;
    for &margin in margins {
        if margin > max_positive {
            max_positive = margin;
        } else if margin < min_negative {
            min_negative = margin;
        }
    }
    max_positive + min_negative
}
