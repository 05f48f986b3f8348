//! `strata members`: List public or declared members.

use serde::Serialize;
use strata_engine::Member;

use crate::output::{print_json, StyledOutput};
use crate::world::World;

#[derive(Debug, Serialize)]
struct MembersReport {
    #[serde(rename = "type")]
    type_name: String,
    declared: bool,
    fields: Vec<Member>,
    constructors: Vec<Member>,
    methods: Vec<Member>,
}

pub fn execute(
    world: &World,
    loader: Option<&str>,
    name: &str,
    declared: bool,
    json: bool,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let loader = world.loader(loader)?;
    let handle = loader.resolve(name)?;
    let reflector = world.runtime.reflector(None);

    let report = if declared {
        MembersReport {
            type_name: handle.name().to_string(),
            declared,
            fields: reflector.declared_fields(&handle)?,
            constructors: reflector.declared_constructors(&handle)?,
            methods: reflector.declared_methods(&handle)?,
        }
    } else {
        MembersReport {
            type_name: handle.name().to_string(),
            declared,
            fields: reflector.fields(&handle)?,
            constructors: reflector.constructors(&handle)?,
            methods: reflector.methods(&handle)?,
        }
    };

    if json {
        return print_json(&report);
    }

    out.heading(&report.type_name);
    for (label, members) in [
        ("fields", &report.fields),
        ("constructors", &report.constructors),
        ("methods", &report.methods),
    ] {
        out.field(label, &members.len().to_string());
        for member in members {
            out.item(&format!("{}  ({})", member.descriptor(), member.declaring_type));
        }
    }
    Ok(())
}
