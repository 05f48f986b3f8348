//! `strata check`: Resolve and link every declared type.

use anyhow::bail;
use serde::Serialize;

use crate::output::{print_json, StyledOutput};
use crate::world::World;

#[derive(Debug, Serialize)]
struct Outcome {
    loader: String,
    name: String,
    defined_by: Option<String>,
    error: Option<String>,
}

pub fn execute(world: &World, json: bool, out: &mut StyledOutput) -> anyhow::Result<()> {
    let mut outcomes = Vec::new();
    for loader in &world.loaders {
        for decl in world.manifest.types_for(loader.name()) {
            let outcome = match loader.resolve_and_link(&decl.name) {
                Ok(handle) => Outcome {
                    loader: loader.name().to_string(),
                    name: decl.name.clone(),
                    defined_by: handle.loader().map(|l| l.name().to_string()),
                    error: None,
                },
                Err(err) => Outcome {
                    loader: loader.name().to_string(),
                    name: decl.name.clone(),
                    defined_by: None,
                    error: Some(err.to_string()),
                },
            };
            outcomes.push(outcome);
        }
    }

    let failures = outcomes.iter().filter(|o| o.error.is_some()).count();
    if json {
        print_json(&outcomes)?;
    } else {
        for outcome in &outcomes {
            match &outcome.error {
                None => out.ok(&format!("{} [{}]", outcome.name, outcome.loader)),
                Some(error) => out.failed(&format!("{} [{}]: {}", outcome.name, outcome.loader, error)),
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} types failed to load", outcomes.len());
    }
    Ok(())
}
