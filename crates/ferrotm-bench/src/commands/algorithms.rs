//! List the available protocols

use ferrotm_core::Algorithm;
use serde_json::json;

use crate::{output::Output, BenchError};

/// Print every protocol with its description
pub fn execute(json: bool) -> Result<(), BenchError> {
    let list: Vec<_> = Algorithm::ALL
        .iter()
        .map(|a| {
            json!({
                "name": a.name(),
                "description": a.description(),
                "irrevocable": a.supports_irrevocability(),
            })
        })
        .collect();

    let mut out = Output::new(json).field_value("algorithms", json!(list));
    for a in Algorithm::ALL {
        out = out.line(format!("{:<14} {}", a.name(), a.description()));
    }
    out.print();
    Ok(())
}
