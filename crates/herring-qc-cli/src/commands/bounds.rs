use anyhow::{bail, Result};
use herring_qc_lib::core::qc::{Bounds, QcEngine, TestKind};

use crate::cli::BoundsArgs;

/// Probable bounds of a ratio test for a given independent value
pub fn compute(engine: &QcEngine, args: &BoundsArgs) -> Result<Bounds> {
    let def = engine.catalog().get(args.test_id)?;
    let TestKind::Ratio { rule } = def.kind else {
        bail!("test {} is a {} test, not a ratio test", def.id, def.kind.label());
    };
    match rule.bounds(args.independent, args.maturity) {
        Some(bounds) => Ok(bounds),
        None => bail!("test {} needs a maturity stage between 1 and 8", def.id),
    }
}

pub fn run(args: BoundsArgs, engine: &QcEngine) -> Result<()> {
    let bounds = compute(engine, &args)?;
    println!("{bounds}");
    Ok(())
}
