//! Runtime and loader graph built from a manifest

use anyhow::{anyhow, Context};
use std::path::Path;
use std::sync::Arc;
use strata_engine::{ImageSource, Loader, LoaderBuilder, LoaderType, Runtime, RuntimeConfig};

use crate::manifest::WorldManifest;

/// A runtime plus the loaders a manifest declares
pub struct World {
    pub runtime: Arc<Runtime>,
    /// Loaders in declaration order
    pub loaders: Vec<Arc<Loader>>,
    pub manifest: WorldManifest,
}

impl World {
    /// Load the manifest at `path`, with an optional configuration override
    pub fn open(path: &Path, config: Option<&Path>) -> anyhow::Result<Self> {
        let manifest = WorldManifest::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        let config = match config {
            Some(config_path) => RuntimeConfig::load(config_path)
                .with_context(|| format!("loading {}", config_path.display()))?,
            None => manifest.runtime.clone(),
        };
        Self::build(manifest, config, &path.display().to_string())
    }

    /// Build a world from a validated manifest
    pub fn build(manifest: WorldManifest, config: RuntimeConfig, origin: &str) -> anyhow::Result<Self> {
        let runtime = Runtime::builder().config(config).build();
        let mut loaders: Vec<Arc<Loader>> = Vec::with_capacity(manifest.loaders.len());

        for decl in &manifest.loaders {
            let loader_type = LoaderType::derive(&format!("{}Loader", decl.name), runtime.base_loader_type());
            if decl.parallel {
                runtime.capabilities().register(&loader_type);
            }

            let source = ImageSource::with_origin(origin);
            for ty in manifest.types_for(&decl.name) {
                source
                    .insert(ty.to_image()?)
                    .with_context(|| format!("encoding {}", ty.name))?;
            }

            let mut builder = LoaderBuilder::new(&decl.name, &loader_type).source(source);
            if let Some(parent) = decl
                .parent
                .as_deref()
                .and_then(|p| loaders.iter().find(|l| l.name() == p))
            {
                builder = builder.parent(parent);
            }
            loaders.push(builder.build(&runtime));
        }

        tracing::info!(loaders = loaders.len(), types = manifest.types.len(), "world ready");
        Ok(Self {
            runtime,
            loaders,
            manifest,
        })
    }

    /// Loader by name, or the last declared loader
    pub fn loader(&self, name: Option<&str>) -> anyhow::Result<&Arc<Loader>> {
        match name {
            Some(name) => self
                .loaders
                .iter()
                .find(|l| l.name() == name)
                .ok_or_else(|| anyhow!("no loader named {name}")),
            None => self
                .loaders
                .last()
                .ok_or_else(|| anyhow!("manifest declares no loaders")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(toml: &str) -> World {
        let manifest = WorldManifest::from_str(toml).unwrap();
        let config = manifest.runtime.clone();
        World::build(manifest, config, "test").unwrap()
    }

    #[test]
    fn test_build_graph() {
        let world = world(
            r#"
[[loader]]
name = "boot"

[[loader]]
name = "app"
parent = "boot"
parallel = false

[[type]]
name = "lib.Base"
loader = "boot"

[[type]]
name = "app.Main"
loader = "app"
extends = "lib.Base"
"#,
        );
        let app = world.loader(None).unwrap();
        assert_eq!(app.name(), "app");
        assert!(!app.is_parallel_capable());
        assert!(world.loader(Some("boot")).unwrap().is_parallel_capable());

        let main = app.resolve("app.Main").unwrap();
        assert_eq!(main.superclass().unwrap().name(), "lib.Base");
        assert_eq!(main.security().code_source.as_deref(), Some("test"));
        assert!(world.loader(Some("missing")).is_err());
    }
}
