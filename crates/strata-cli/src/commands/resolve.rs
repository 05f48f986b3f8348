//! `strata resolve`: Resolve a type and describe it.

use serde::Serialize;

use crate::output::{print_json, StyledOutput};
use crate::world::World;

#[derive(Debug, Serialize)]
struct TypeReport {
    name: String,
    requested_from: String,
    defined_by: Option<String>,
    package: String,
    interface: bool,
    superclass: Option<String>,
    interfaces: Vec<String>,
    enclosing: Option<String>,
    code_source: Option<String>,
    linked: bool,
}

pub fn execute(
    world: &World,
    loader: Option<&str>,
    name: &str,
    link: bool,
    json: bool,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let loader = world.loader(loader)?;
    let handle = if link {
        loader.resolve_and_link(name)?
    } else {
        loader.resolve(name)?
    };

    let report = TypeReport {
        name: handle.name().to_string(),
        requested_from: loader.name().to_string(),
        defined_by: handle.loader().map(|l| l.name().to_string()),
        package: handle.package_name().to_string(),
        interface: handle.is_interface(),
        superclass: handle.superclass().map(|s| s.name().to_string()),
        interfaces: handle.interfaces().iter().map(|i| i.name().to_string()).collect(),
        enclosing: handle.enclosing_type()?.map(|e| e.name().to_string()),
        code_source: handle.security().code_source.clone(),
        linked: handle.is_linked(),
    };

    if json {
        return print_json(&report);
    }

    out.heading(&report.name);
    out.field("kind", if report.interface { "interface" } else { "class" });
    out.field("loader", report.defined_by.as_deref().unwrap_or("<dropped>"));
    out.field("package", &report.package);
    if let Some(superclass) = &report.superclass {
        out.field("extends", superclass);
    }
    if !report.interfaces.is_empty() {
        out.field("implements", &report.interfaces.join(", "));
    }
    if let Some(enclosing) = &report.enclosing {
        out.field("enclosed by", enclosing);
    }
    out.field("linked", &report.linked.to_string());
    Ok(())
}
