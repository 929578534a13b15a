use std::fmt::Write;

use crate::resolver::ResolvedMixture;

const RULE_WIDTH: usize = 86;
const NAME_FIELD: usize = 80;

/// Renders the datasets and sampling weights of a resolved mixture as a
/// boxed table, one dataset per line.
pub fn format_mixture(mixture: &ResolvedMixture) -> String {
    let rule = "#".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "# Loading the following {} datasets (incl. sampling weight):{:>24} #",
        mixture.len(),
        ""
    );
    for (dataset, weight) in mixture.iter() {
        let pad = NAME_FIELD.saturating_sub(dataset.name.len());
        let _ = writeln!(out, "# {}: {:=>pad$.6} #", dataset.name, weight);
    }
    let _ = writeln!(out, "{rule}");
    out
}
