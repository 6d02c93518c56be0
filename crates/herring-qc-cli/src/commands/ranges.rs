use anyhow::Result;
use herring_qc_lib::core::qc::{format_bound, QcEngine};

use crate::cli::RangesArgs;

pub fn run(args: RangesArgs, engine: &QcEngine) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(engine.ranges())?);
        return Ok(());
    }

    println!(
        "{:<16} {:>10} {:>10} {:>10} {:>10}",
        "field", "poss. min", "poss. max", "prob. min", "prob. max"
    );
    for (field, def) in engine.ranges().iter() {
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10}",
            field.as_str(),
            format_bound(def.possible.min),
            format_bound(def.possible.max),
            format_bound(def.probable.min),
            format_bound(def.probable.max),
        );
    }
    Ok(())
}
