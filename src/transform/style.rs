//! Stylesheet transform.
//!
//! The entry stylesheet is compiled to CSS, then parsed with lightningcss and
//! written twice: `<stem>.css` expanded and `<stem>.min.css` minified. Both
//! passes lower nesting and add vendor prefixes for the configured browser
//! targets, and each can carry a `.map` source map.
//!
//! Compilation is full Sass through grass by default. The `imports` compiler
//! only inlines `@import`ed partials (Sass partial naming: `_name.scss`,
//! `name.scss`, `name.css`, `name/_index.scss`) and drops full-line `//`
//! comments. An external compiler configured through `styles.command` takes
//! precedence over both; its stdout is post-processed the same way.

use super::command::invoke;
use super::{minified_name, read_text, write_output, Transform, TransformContext, TransformError};
use crate::config::StyleCompiler;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::Targets;
use parcel_sourcemap::SourceMap;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*@import[ \t]+([^;]+);[ \t]*\r?$"#).expect("import regex is valid")
    })
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([^"']+)["']"#).expect("quoted regex is valid"))
}

/// Stylesheet transform.
#[derive(Debug, Clone, Default)]
pub struct Style {
    compiler: StyleCompiler,
    command: Option<Vec<String>>,
    targets: Targets,
    source_maps: bool,
}

impl Style {
    /// Compile with the built-in Sass compiler, without browser targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given built-in compiler.
    pub fn with_compiler(mut self, compiler: StyleCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Compile with an external program first; its stdout is the stylesheet.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    /// Browsers to lower syntax and add prefixes for.
    pub fn with_targets(mut self, targets: Targets) -> Self {
        self.targets = targets;
        self
    }

    /// Write a source map next to each stylesheet.
    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }

    fn compile_source(&self, entry: &Path) -> Result<String, TransformError> {
        if let Some(command) = &self.command {
            let stdout = invoke(command, entry, None)?.unwrap_or_default();
            return String::from_utf8(stdout)
                .map_err(|_| TransformError::rejected(entry, "compiler output is not UTF-8"));
        }

        match self.compiler {
            StyleCompiler::Sass => compile_sass(entry),
            StyleCompiler::Imports => inline_imports(entry, &mut HashSet::new()),
        }
    }
}

/// Compile a Sass entry to expanded CSS. Imports resolve relative to the entry.
pub fn compile_sass(entry: &Path) -> Result<String, TransformError> {
    let options = grass::Options::default().style(grass::OutputStyle::Expanded);
    grass::from_path(entry, &options).map_err(|e| TransformError::rejected(entry, e))
}

/// Inline every local `@import` of `path`, each partial at most once.
pub fn inline_imports(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<String, TransformError> {
    let canonical = path.canonicalize().map_err(|e| TransformError::io(path, e))?;
    if !seen.insert(canonical) {
        return Ok(String::new());
    }

    let source = strip_line_comments(&read_text(path)?);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in import_re().captures_iter(&source) {
        let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let targets: Vec<&str> =
            quoted_re().captures_iter(list.as_str()).filter_map(|c| c.get(1)).map(|m| m.as_str()).collect();
        if targets.is_empty() || targets.iter().any(|t| is_remote(t)) || list.as_str().contains("url(") {
            continue;
        }

        out.push_str(&source[last..whole.start()]);
        for target in targets {
            let partial = resolve_partial(dir, target)
                .ok_or_else(|| TransformError::rejected(path, format!("cannot find import '{}'", target)))?;
            out.push_str(&inline_imports(&partial, seen)?);
            out.push('\n');
        }
        last = whole.end();
    }
    out.push_str(&source[last..]);

    Ok(out)
}

fn is_remote(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://") || target.starts_with("//")
}

fn strip_line_comments(source: &str) -> String {
    source
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the file a Sass-style import refers to.
pub fn resolve_partial(dir: &Path, target: &str) -> Option<PathBuf> {
    let requested = dir.join(target);
    let parent = requested.parent().unwrap_or(dir);
    let name = requested.file_name()?.to_string_lossy().into_owned();

    let candidates: Vec<PathBuf> = if requested.extension().is_some() {
        vec![requested.clone(), parent.join(format!("_{}", name))]
    } else {
        vec![
            parent.join(format!("_{}.scss", name)),
            parent.join(format!("{}.scss", name)),
            parent.join(format!("_{}.css", name)),
            parent.join(format!("{}.css", name)),
            requested.join("_index.scss"),
        ]
    };

    candidates.into_iter().find(|c| c.is_file())
}

/// Printed stylesheet pair, with source maps when requested.
#[derive(Debug, Clone, Default)]
pub struct CompiledCss {
    pub expanded: String,
    pub minified: String,
    pub expanded_map: Option<String>,
    pub minified_map: Option<String>,
}

/// Parse `css` and print it expanded and minified for `targets`.
pub fn expand_and_minify(
    css: &str,
    filename: &str,
    targets: Targets,
    source_maps: bool,
) -> Result<CompiledCss, String> {
    let options = ParserOptions { filename: filename.to_string(), ..ParserOptions::default() };
    let mut sheet = StyleSheet::parse(css, options).map_err(|e| e.to_string())?;
    let map_source = source_maps.then_some((filename, css));

    let (expanded, expanded_map) = print(&sheet, false, targets, map_source)?;

    sheet.minify(MinifyOptions { targets, ..MinifyOptions::default() }).map_err(|e| e.to_string())?;
    let (minified, minified_map) = print(&sheet, true, targets, map_source)?;

    Ok(CompiledCss { expanded, minified, expanded_map, minified_map })
}

fn print(
    sheet: &StyleSheet<'_>,
    minify: bool,
    targets: Targets,
    map_source: Option<(&str, &str)>,
) -> Result<(String, Option<String>), String> {
    let mut map = map_source.map(new_source_map).transpose()?;
    let printed = sheet
        .to_css(PrinterOptions { minify, targets, source_map: map.as_mut(), ..PrinterOptions::default() })
        .map_err(|e| e.to_string())?;

    let json = match map.as_mut() {
        Some(map) => Some(map.to_json(None).map_err(|e| format!("source map: {:?}", e))?),
        None => None,
    };
    Ok((printed.code, json))
}

fn new_source_map((filename, source): (&str, &str)) -> Result<SourceMap, String> {
    let mut map = SourceMap::new("/");
    let index = map.add_source(filename);
    map.set_source_content(index as usize, source).map_err(|e| format!("source map: {:?}", e))?;
    Ok(map)
}

/// Write a stylesheet, plus its `.map` and the trailing map reference.
fn write_stylesheet(path: &Path, mut code: String, map: Option<String>) -> Result<Vec<PathBuf>, TransformError> {
    let Some(map) = map else {
        write_output(path, code)?;
        return Ok(vec![path.to_path_buf()]);
    };

    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let map_path = path.with_file_name(format!("{}.map", name));
    code.push_str(&format!("\n/*# sourceMappingURL={}.map */\n", name));
    write_output(path, code)?;
    write_output(&map_path, map)?;
    Ok(vec![path.to_path_buf(), map_path])
}

impl Transform for Style {
    fn describe(&self) -> String {
        let compiler = match (&self.command, self.compiler) {
            (Some(command), _) => command.join(" "),
            (None, StyleCompiler::Sass) => "grass".to_string(),
            (None, StyleCompiler::Imports) => "import inliner".to_string(),
        };
        format!("{} + lightningcss", compiler)
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        let mut outputs = Vec::with_capacity(ctx.files.len() * 2);

        for file in ctx.files {
            let css = self.compile_source(&file.path)?;
            let filename = file.relative.to_string_lossy();
            let compiled = expand_and_minify(&css, &filename, self.targets, self.source_maps)
                .map_err(|e| TransformError::rejected(&file.path, e))?;

            let output = ctx.output_for(file).with_extension("css");
            let min_output = minified_name(&output);
            outputs.extend(write_stylesheet(&output, compiled.expanded, compiled.expanded_map)?);
            outputs.extend(write_stylesheet(&min_output, compiled.minified, compiled.minified_map)?);
        }

        Ok(outputs)
    }
}
