//! Configuration schema types for `frontkit.toml`
//!
//! Defines the structure and validation rules for a frontkit project.
//! Every section is optional; missing values fall back to the layout the
//! stages expect (`src/` in, `dist/` out).

use lightningcss::targets::{Browsers, Targets};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,
    /// Source tree root
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Distribution tree root
    #[serde(default = "default_dist")]
    pub dist: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), dist: default_dist() }
    }
}

fn default_name() -> String {
    "site".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

/// Development server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false }
    }
}

/// Failure notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Also raise a desktop notification when a stage fails
    #[serde(default)]
    pub desktop: bool,
}

/// Markup stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Page templates, relative to the source root. Each page becomes one output.
    #[serde(default = "default_pages")]
    pub pages: PathBuf,
    /// Template search path for `{% include %}` / `{% extends %}`
    #[serde(default = "default_components")]
    pub components: PathBuf,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self { pages: default_pages(), components: default_components() }
    }
}

fn default_pages() -> PathBuf {
    PathBuf::from("html/pages")
}

fn default_components() -> PathBuf {
    PathBuf::from("html/components")
}

/// Compiler turning the stylesheet entry into plain CSS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleCompiler {
    /// Full Sass: variables, nesting, mixins, `@use`
    #[default]
    Sass,
    /// Only `@import` partial inlining; the rest must already be CSS
    Imports,
}

/// Style stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Stylesheet entry point, relative to the source root
    #[serde(default = "default_style_entry")]
    pub entry: String,
    /// Built-in compiler, ignored when `command` is set
    #[serde(default)]
    pub compiler: StyleCompiler,
    /// Optional external compiler used instead of the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Browserslist queries driving vendor prefixes and syntax lowering
    #[serde(default = "default_browser_targets")]
    pub targets: Vec<String>,
    /// Write `.map` files next to the stylesheets
    #[serde(default)]
    pub source_maps: bool,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_style_entry(),
            compiler: StyleCompiler::default(),
            command: None,
            targets: default_browser_targets(),
            source_maps: false,
        }
    }
}

impl StylesConfig {
    /// Resolve `targets` into browser versions. An empty list means no lowering.
    pub fn browser_targets(&self) -> Result<Targets, String> {
        if self.targets.is_empty() {
            return Ok(Targets::default());
        }
        let browsers = Browsers::from_browserslist(self.targets.iter().map(String::as_str)).map_err(|e| e.to_string())?;
        Ok(Targets { browsers, ..Targets::default() })
    }
}

fn default_style_entry() -> String {
    "scss/style.scss".to_string()
}

fn default_browser_targets() -> Vec<String> {
    vec!["last 3 versions".to_string()]
}

/// Script stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Script entry point, relative to the source root
    #[serde(default = "default_script_entry")]
    pub entry: String,
    /// Bundler invocation producing the readable bundle
    #[serde(default = "default_bundle_command")]
    pub command: Vec<String>,
    /// Bundler invocation producing the `.min.js` bundle
    #[serde(default = "default_minify_command")]
    pub minify_command: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: default_script_entry(),
            command: default_bundle_command(),
            minify_command: default_minify_command(),
        }
    }
}

fn default_script_entry() -> String {
    "js/script.js".to_string()
}

fn default_bundle_command() -> Vec<String> {
    vec!["esbuild".to_string(), "{input}".to_string(), "--bundle".to_string()]
}

fn default_minify_command() -> Vec<String> {
    vec![
        "esbuild".to_string(),
        "{input}".to_string(),
        "--bundle".to_string(),
        "--minify".to_string(),
    ]
}

/// Font stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontsConfig {
    /// Converter invocation; without `{output}` the font is piped through stdin/stdout
    #[serde(default = "default_font_command")]
    pub command: Vec<String>,
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self { command: default_font_command() }
    }
}

fn default_font_command() -> Vec<String> {
    vec!["ttf2woff2".to_string()]
}

/// Image stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Enable the re-encoding pass over raster images
    #[serde(default)]
    pub optimize: bool,
    /// JPEG quality used by the re-encoding pass (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { optimize: false, jpeg_quality: default_jpeg_quality() }
    }
}

fn default_jpeg_quality() -> u8 {
    80
}

/// Complete frontkit.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Project metadata and tree roots
    #[serde(default)]
    pub project: ProjectConfig,
    /// Development server
    #[serde(default)]
    pub server: ServerConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Failure notifications
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Markup stage
    #[serde(default)]
    pub markup: MarkupConfig,
    /// Style stage
    #[serde(default)]
    pub styles: StylesConfig,
    /// Script stage
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Font stage
    #[serde(default)]
    pub fonts: FontsConfig,
    /// Image stages
    #[serde(default)]
    pub images: ImagesConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "server.port")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frontkit.toml: '{}' {}", self.field, self.message)
    }
}

impl SiteConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.project.dist.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "project.dist".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.project.src == self.project.dist {
            errors.push(ConfigValidationError {
                field: "project.dist".to_string(),
                message: "must differ from project.src".to_string(),
            });
        }

        if self.styles.entry.is_empty() {
            errors.push(ConfigValidationError {
                field: "styles.entry".to_string(),
                message: "must name a stylesheet".to_string(),
            });
        }

        if let Err(e) = self.styles.browser_targets() {
            errors.push(ConfigValidationError {
                field: "styles.targets".to_string(),
                message: format!("is not a valid browser query: {}", e),
            });
        }

        if self.scripts.entry.is_empty() {
            errors.push(ConfigValidationError {
                field: "scripts.entry".to_string(),
                message: "must name a script".to_string(),
            });
        }

        for (field, command) in [
            ("scripts.command", &self.scripts.command),
            ("scripts.minify_command", &self.scripts.minify_command),
            ("fonts.command", &self.fonts.command),
        ] {
            if command.is_empty() {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "must name a program".to_string(),
                });
            }
        }

        if matches!(&self.styles.command, Some(command) if command.is_empty()) {
            errors.push(ConfigValidationError {
                field: "styles.command".to_string(),
                message: "must name a program".to_string(),
            });
        }

        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            errors.push(ConfigValidationError {
                field: "images.jpeg_quality".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
