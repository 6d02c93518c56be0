use anyhow::Result;
use herring_qc_lib::core::qc::{QcEngine, TestCatalog, TestDefinition};
use herring_qc_lib::core::SampleType;

use crate::cli::CatalogArgs;

/// Definitions selected by the arguments, in id order
pub fn select(args: &CatalogArgs, engine: &QcEngine) -> Vec<TestDefinition> {
    let catalog = if args.legacy {
        TestCatalog::legacy()
    } else {
        engine.catalog().clone()
    };
    let sample_type: Option<SampleType> = args.sample_type.map(Into::into);
    catalog
        .tests
        .into_iter()
        .filter(|t| sample_type.map_or(true, |s| t.applies_to(s)))
        .collect()
}

pub fn run(args: CatalogArgs, engine: &QcEngine) -> Result<()> {
    let tests = select(&args, engine);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&tests)?);
        return Ok(());
    }

    for def in &tests {
        let scope: Vec<&str> = def.scope.iter().map(|s| s.as_str()).collect();
        let deps = def.kind.dependencies();
        let deps = if deps.is_empty() {
            String::new()
        } else {
            format!(" <- {deps:?}")
        };
        println!(
            "{:>4}  {:<20} {:<30} {}{}",
            def.id,
            def.kind.label(),
            scope.join(","),
            def.description,
            deps
        );
    }
    Ok(())
}
