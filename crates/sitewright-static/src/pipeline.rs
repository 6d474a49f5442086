//! The site's task graph.
//!
//! ```text
//! build   = clean -> (compile -> useref) | extra | image | font
//! compile = style | script | page
//! ```

use std::sync::Arc;

use sitewright_tasks::{
    concurrent, reference, sequential, BuildRun, RegistryError, Runner, Stage, TaskRegistry,
};

use crate::clean::Clean;
use crate::config::{ConfigError, SiteConfig};
use crate::images::OptimizeImages;
use crate::minify::MinifyByExtension;
use crate::pages::PageRenderer;
use crate::scripts::ScriptCompiler;
use crate::styles::ScssCompiler;
use crate::useref::Useref;

/// Task names registered by [`SitePipeline`].
pub mod tasks {
    pub const CLEAN: &str = "clean";
    pub const STYLE: &str = "style";
    pub const SCRIPT: &str = "script";
    pub const PAGE: &str = "page";
    pub const IMAGE: &str = "image";
    pub const FONT: &str = "font";
    pub const EXTRA: &str = "extra";
    pub const USEREF: &str = "useref";
    pub const COMPILE: &str = "compile";
    pub const BUILD: &str = "build";
}

/// Registers every site task against one config snapshot.
#[derive(Debug, Clone)]
pub struct SitePipeline {
    config: Arc<SiteConfig>,
    runner: Runner,
}

impl SitePipeline {
    pub fn new(config: SiteConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = register_tasks(&config)?;

        Ok(Self {
            config,
            runner: Runner::new(Arc::new(registry)),
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Run any registered task by name.
    pub async fn run(&self, name: &str) -> Result<BuildRun, RegistryError> {
        self.runner.run(name).await
    }

    pub async fn clean(&self) -> Result<BuildRun, RegistryError> {
        self.run(tasks::CLEAN).await
    }

    /// Compile styles, scripts and pages into `temp`.
    pub async fn compile(&self) -> Result<BuildRun, RegistryError> {
        self.run(tasks::COMPILE).await
    }

    /// Produce the deployable tree in `dist`.
    pub async fn build(&self) -> Result<BuildRun, RegistryError> {
        self.run(tasks::BUILD).await
    }
}

fn register_tasks(config: &SiteConfig) -> Result<TaskRegistry, ConfigError> {
    let mut registry = TaskRegistry::new();
    let src = &config.src;
    let paths = &config.paths;

    registry.register_job(Clean::new([config.dist.clone(), config.temp.clone()]))?;

    registry.register_job(
        Stage::new(tasks::STYLE, config.group(src, &paths.styles)?, &config.temp)
            .source_maps(!config.production)
            .pipe(Arc::new(ScssCompiler::new([src.clone()]))),
    )?;

    registry.register_job(
        Stage::new(tasks::SCRIPT, config.group(src, &paths.scripts)?, &config.temp)
            .source_maps(!config.production)
            .pipe(Arc::new(ScriptCompiler::new())),
    )?;

    let pages = PageRenderer::new(src, config.data_dir())
        .with_package(config.root.join("package.json"))
        .with_locals(config.data.clone());
    registry.register_job(
        Stage::new(tasks::PAGE, config.group(src, &paths.pages)?, &config.temp)
            .pipe(Arc::new(pages)),
    )?;

    registry.register_job(
        Stage::new(tasks::IMAGE, config.group(src, &paths.images)?, &config.dist)
            .pipe(Arc::new(OptimizeImages)),
    )?;

    // Fonts ship as-is.
    registry.register_job(Stage::new(
        tasks::FONT,
        config.group(src, &paths.fonts)?,
        &config.dist,
    ))?;

    registry.register_job(
        Stage::new(tasks::EXTRA, config.group(&config.public, &["**".to_string()])?, &config.dist)
            .optional(true),
    )?;

    registry.register_job(
        Stage::new(tasks::USEREF, config.group(&config.temp, &paths.pages)?, &config.dist)
            .optional(true)
            .pipe(Arc::new(Useref::new([config.temp.clone(), config.root.clone()])))
            .pipe(Arc::new(MinifyByExtension)),
    )?;

    registry.register(
        tasks::COMPILE,
        concurrent([
            reference(tasks::STYLE),
            reference(tasks::SCRIPT),
            reference(tasks::PAGE),
        ]),
    )?;

    registry.register(
        tasks::BUILD,
        sequential([
            reference(tasks::CLEAN),
            concurrent([
                sequential([reference(tasks::COMPILE), reference(tasks::USEREF)]),
                reference(tasks::EXTRA),
                reference(tasks::IMAGE),
                reference(tasks::FONT),
            ]),
        ]),
    )?;

    tracing::debug!("Registered {} site tasks", registry.len());
    Ok(registry)
}
