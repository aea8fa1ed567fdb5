//! Conversion entry point: workbook in, self-contained HTML document out

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::conditional::evaluate_sheet;
use crate::config::ConvertOptions;
use crate::error::{ConvertError, RichValueError};
use crate::html::{Document, escape_html};
use crate::postprocess::{CfRelation, LinkOptions, apply_cf_styles, stamp_generator, update_links};
use crate::reader::{Package, PartSource, Workbook, read_package};
use crate::render::layout::PlacementBox;
use crate::render::{
    CellFormatter, CellStyleResolver, ColorResolver, LayoutBuilder, StyleRegistry,
    generate_incell_css, render_table,
};
use crate::rich_value::{RichValueMap, resolve_rich_values};
use crate::templates::{Templates, fill};

/// Value of the generator stamp written into every document
pub const GENERATOR: &str = concat!("sheethtml ", env!("CARGO_PKG_VERSION"));

/// Class prefix of the conditional-formatting overlay rules
pub const CF_CLASS_PREFIX: &str = "sheethtml_cf";

/// Result of one conversion, for batch callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionOutcome {
    pub ok: bool,
    pub error: Option<String>,
}

/// Converts workbooks with one set of templates and options.
///
/// Every conversion owns its style registries, so one converter can be
/// shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    templates: Templates,
    options: ConvertOptions,
}

impl Converter {
    pub fn new(templates: Templates, options: ConvertOptions) -> Result<Self, ConvertError> {
        templates.validate()?;
        options.validate()?;
        Ok(Self { templates, options })
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert `source` into `dest`, reporting failures in the outcome
    pub fn convert(&self, source: &Path, dest: &Path) -> ConversionOutcome {
        match self.try_convert(source, dest) {
            Ok(()) => ConversionOutcome {
                ok: true,
                error: None,
            },
            Err(e) => {
                error!(
                    "Conversion of {} to {} failed: {}",
                    source.display(),
                    dest.display(),
                    e
                );
                ConversionOutcome {
                    ok: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Convert `source` into `dest`. A pre-existing `dest` is only replaced
    /// once the new document is complete.
    pub fn try_convert(&self, source: &Path, dest: &Path) -> Result<(), ConvertError> {
        info!("Reading {}", source.display());
        let read_error = |error| ConvertError::Read {
            path: source.to_path_buf(),
            error,
        };
        let mut package = Package::open(source).map_err(read_error)?;
        let workbook = read_package(&mut package, source).map_err(read_error)?;

        let html = self.render(&workbook, &mut package)?;

        info!("Writing {}", dest.display());
        write_atomic(dest, &html)
    }

    /// Render `workbook` to the final document; `package` provides the raw
    /// parts for in-cell images
    pub fn render<S: PartSource>(
        &self,
        workbook: &Workbook,
        package: &mut S,
    ) -> Result<String, ConvertError> {
        let options = &self.options;
        let colors = ColorResolver::new(workbook.theme_colors.clone());
        let resolver = CellStyleResolver::new(&workbook.styles, &colors);
        let formatter = CellFormatter::new(&options.locale);
        let builder = LayoutBuilder::new(&workbook.styles, &resolver, &formatter)
            .with_limits(options.max_rows, options.max_cols);

        let mut registry = StyleRegistry::new();
        let mut cf_registry = StyleRegistry::with_prefix(CF_CLASS_PREFIX);

        let rich_values = load_rich_values(package);

        let sheet_ids: HashMap<String, String> = workbook
            .sheets
            .iter()
            .map(|s| (s.name.clone(), s.encoded_id()))
            .collect();

        let mut tables = Vec::new();
        let mut navigation = Vec::new();
        let mut used_rich_values = BTreeSet::new();
        let mut placement_boxes: Vec<PlacementBox> = Vec::new();
        let mut relations = Vec::new();

        let sheets = workbook
            .visible_sheets()
            .take(options.max_sheets.unwrap_or(usize::MAX));
        for sheet in sheets {
            info!(
                "Rendering sheet[{}] '{}' as {}",
                sheet.index,
                sheet.name,
                sheet.encoded_id()
            );
            let model = builder.build(sheet, &mut registry);
            used_rich_values.extend(model.used_rich_values.iter().copied());
            placement_boxes.extend(model.placement_boxes.iter().cloned());

            let sheet_name = escape_html(&sheet.name);
            let table = render_table(&model);
            tables.push(fill(
                "sheet_html",
                &self.templates.sheet_html,
                &[
                    ("enc_sheet_name", model.encoded_id.as_str()),
                    ("sheet_name", sheet_name.as_str()),
                    ("table_generated_html", table.as_str()),
                ],
            )?);
            navigation.push(fill(
                "sheetname_html",
                &self.templates.sheetname_html,
                &[
                    ("enc_sheet_name", model.encoded_id.as_str()),
                    ("sheet_name", sheet_name.as_str()),
                ],
            )?);

            if options.apply_conditional_formatting {
                for matched in evaluate_sheet(sheet, options.fail_ok)? {
                    let Some(dxf) = workbook.styles.dxfs.get(matched.dxf_id) else {
                        warn!(
                            "Differential style {} out of range for {}!{}",
                            matched.dxf_id, matched.sheet, matched.cell_ref
                        );
                        continue;
                    };
                    let classes = resolver.differential_classes(dxf, &mut cf_registry);
                    if classes.is_empty() {
                        continue;
                    }
                    relations.push(CfRelation {
                        sheet: matched.sheet,
                        cell_ref: matched.cell_ref.to_string(),
                        classes,
                    });
                }
            }
        }
        if tables.is_empty() {
            warn!("{} has no visible sheets", workbook.path.display());
        }

        let incell_css = if used_rich_values.is_empty() {
            String::new()
        } else {
            generate_incell_css(&used_rich_values, &placement_boxes, &rich_values, package)
        };
        debug!(
            "Generated {} style rules and {} conditional formatting rules",
            registry.len(),
            cf_registry.len()
        );

        let source_filename = workbook
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sheets_html = tables.join("\n");
        let navigation_html = navigation.join("\n");
        let core_css = format!("<style>{}</style>", self.templates.core_css);
        let user_css = format!("<style>{}</style>", self.templates.user_css);
        let generated_css = format!("<style>{}</style>", registry.css());
        let generated_incell_css = format!("<style>{}</style>", incell_css);
        let safari_js = format!("<script>{}</script>", self.templates.safari_js);
        let conditional_css = format!(
            "<style>/*conditional formatting*/\n{}</style>",
            cf_registry.css()
        );
        let source_filename = escape_html(&source_filename);

        let html = fill(
            "index_html",
            &self.templates.index_html,
            &[
                ("sheets_generated_html", sheets_html.as_str()),
                ("sheets_names_generated_html", navigation_html.as_str()),
                ("source_filename", source_filename.as_str()),
                ("fonts_html", self.templates.fonts_html.as_str()),
                ("core_css_html", core_css.as_str()),
                ("user_css_html", user_css.as_str()),
                ("generated_css_html", generated_css.as_str()),
                ("generated_incell_css_html", generated_incell_css.as_str()),
                ("safari_js", safari_js.as_str()),
                ("conditional_css_html", conditional_css.as_str()),
            ],
        )?;

        let link_options = LinkOptions {
            update_local_links: options.update_local_links,
            update_external_links: options.update_external_links,
        };
        let document = Document::parse(&html);
        update_links(&document, &sheet_ids, link_options);
        apply_cf_styles(&document, &relations);
        stamp_generator(&document, GENERATOR);
        document.to_html().map_err(ConvertError::Serialize)
    }
}

/// In-cell image targets; any failure only disables in-cell images
fn load_rich_values<S: PartSource>(package: &mut S) -> RichValueMap {
    match resolve_rich_values(package) {
        Ok(map) => {
            debug!("Resolved {} rich value images", map.len());
            map
        }
        Err(e @ RichValueError::MissingParts(_)) => {
            debug!("No in-cell images: {}", e);
            RichValueMap::new()
        }
        Err(e) => {
            warn!("Unable to read in-cell images: {}", e);
            RichValueMap::new()
        }
    }
}

/// Write through a temporary file in the destination directory
fn write_atomic(dest: &Path, contents: &str) -> Result<(), ConvertError> {
    let write_error = |source| ConvertError::Write {
        path: dest.to_path_buf(),
        source,
    };
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(contents.as_bytes()).map_err(write_error)?;
    file.flush().map_err(write_error)?;
    file.persist(dest).map_err(|e| write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_atomic_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.html");
        fs::write(&dest, "old").unwrap();
        write_atomic(&dest, "new").unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("out.html");
        let err = write_atomic(&dest, "x").unwrap_err();
        assert!(matches!(err, ConvertError::Write { .. }));
    }

    #[test]
    fn test_missing_source_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output.html");
        fs::write(&dest, "existing-content").unwrap();

        let outcome = Converter::default().convert(&dir.path().join("missing.xlsx"), &dest);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("missing.xlsx"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "existing-content");
    }

    #[test]
    fn test_invalid_templates_and_options() {
        let templates = Templates {
            sheet_html: "<section>{sheet_name}</section>".into(),
            ..Default::default()
        };
        let err = Converter::new(templates, ConvertOptions::default()).unwrap_err();
        assert!(err.to_string().contains("sheet_html"));

        let options = ConvertOptions {
            max_cols: Some(0),
            ..Default::default()
        };
        let err = Converter::new(Templates::default(), options).unwrap_err();
        assert_eq!(err.to_string(), "max_cols must be at least 1 when set");
    }
}
