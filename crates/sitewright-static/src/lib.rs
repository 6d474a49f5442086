//! Site configuration, default transforms and the build task graph.
//!
//! Styles, scripts and pages compile into `temp`; the bundling step reads
//! the compiled pages back, concatenates and minifies what their build
//! blocks reference, and writes the deployable tree to `dist`.

pub mod clean;
pub mod config;
pub mod images;
pub mod minify;
pub mod pages;
pub mod pipeline;
pub mod scripts;
pub mod styles;
pub mod useref;

pub use clean::Clean;
pub use config::{
    production_from_env, AssetPaths, ConfigError, ServerSettings, SiteConfig, CONFIG_FILE,
};
pub use pipeline::{tasks, SitePipeline};
