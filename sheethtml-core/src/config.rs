//! Converter configuration: conversion options and template files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::OptionsError;
use crate::templates::Templates;

/// Main converter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub options: ConvertOptions,
    #[serde(default)]
    pub templates: TemplatePaths,
}

impl ConverterConfig {
    /// Load configuration from a TOML file. Relative template paths are
    /// resolved against the directory of the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: ConverterConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.options.validate()?;
        if let Some(base) = path.parent() {
            config.templates.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Templates with file overrides applied over the built-in defaults
    pub fn load_templates(&self) -> Result<Templates> {
        self.templates.load()
    }
}

/// Conversion behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Rewrite `#Sheet!A1` links into sheet navigation anchors
    pub update_local_links: bool,
    /// Open http(s) links in a new browsing context
    pub update_external_links: bool,
    pub apply_conditional_formatting: bool,
    /// Skip malformed conditional-formatting rules instead of failing
    pub fail_ok: bool,
    pub max_sheets: Option<usize>,
    pub max_rows: Option<u32>,
    pub max_cols: Option<u32>,
    pub locale: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            update_local_links: true,
            update_external_links: true,
            apply_conditional_formatting: false,
            fail_ok: true,
            max_sheets: None,
            max_rows: None,
            max_cols: None,
            locale: "en_US".to_string(),
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_sheets == Some(0) {
            return Err(OptionsError::ZeroLimit { name: "max_sheets" });
        }
        if self.max_rows == Some(0) {
            return Err(OptionsError::ZeroLimit { name: "max_rows" });
        }
        if self.max_cols == Some(0) {
            return Err(OptionsError::ZeroLimit { name: "max_cols" });
        }
        if self.locale.trim().is_empty() {
            return Err(OptionsError::EmptyLocale);
        }
        Ok(())
    }
}

/// Optional files replacing the built-in templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePaths {
    pub sheet_html: Option<PathBuf>,
    pub sheetname_html: Option<PathBuf>,
    pub index_html: Option<PathBuf>,
    pub fonts_html: Option<PathBuf>,
    pub core_css: Option<PathBuf>,
    pub user_css: Option<PathBuf>,
    pub safari_js: Option<PathBuf>,
}

impl TemplatePaths {
    fn entries_mut(&mut self) -> [&mut Option<PathBuf>; 7] {
        [
            &mut self.sheet_html,
            &mut self.sheetname_html,
            &mut self.index_html,
            &mut self.fonts_html,
            &mut self.core_css,
            &mut self.user_css,
            &mut self.safari_js,
        ]
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in self.entries_mut().into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn load(&self) -> Result<Templates> {
        let mut templates = Templates::default();
        let overrides = [
            (&self.sheet_html, &mut templates.sheet_html),
            (&self.sheetname_html, &mut templates.sheetname_html),
            (&self.index_html, &mut templates.index_html),
            (&self.fonts_html, &mut templates.fonts_html),
            (&self.core_css, &mut templates.core_css),
            (&self.user_css, &mut templates.user_css),
            (&self.safari_js, &mut templates.safari_js),
        ];
        for (path, slot) in overrides {
            if let Some(path) = path {
                *slot = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read template {}", path.display()))?;
            }
        }
        Ok(templates)
    }
}
