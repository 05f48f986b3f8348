//! `strata annotations`: List effective or declared annotations.

use strata_engine::AnnotationValue;

use crate::output::{print_json, StyledOutput};
use crate::world::World;

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
    let annotations = if declared {
        reflector.declared_annotations(&handle)?
    } else {
        reflector.annotations(&handle)?
    };

    if json {
        return print_json(&annotations);
    }

    out.heading(handle.name());
    for annotation in &annotations {
        let elements: Vec<String> = annotation
            .elements
            .iter()
            .map(|(key, value)| format!("{key} = {}", render(value)))
            .collect();
        let inherited = if annotation.inherited { " (inherited kind)" } else { "" };
        out.item(&format!("@{}({}){}", annotation.kind, elements.join(", "), inherited));
    }
    Ok(())
}

fn render(value: &AnnotationValue) -> String {
    match value {
        AnnotationValue::Bool(b) => b.to_string(),
        AnnotationValue::Int(i) => i.to_string(),
        AnnotationValue::Str(s) => format!("{s:?}"),
        AnnotationValue::List(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        AnnotationValue::Type(t) => format!("{t}.class"),
    }
}
