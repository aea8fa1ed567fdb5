//! Derivation of CSS classes and inline styles from cell formatting

use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::color::ColorResolver;
use super::style_registry::{BorderDirection, StyleDescriptor, StyleRegistry};
use crate::reader::styles::{Alignment, Border, CellXf, DifferentialStyle, Fill, Font, Stylesheet};
use crate::reader::workbook::{CellRef, Sheet};

const DEFAULT_FONT_SIZE: f64 = 11.0;

/// Classes and inline declarations derived for one rendered cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStyle {
    pub inline: Vec<(String, String)>,
    pub classes: BTreeSet<String>,
}

pub struct CellStyleResolver<'a> {
    styles: &'a Stylesheet,
    colors: &'a ColorResolver,
}

impl<'a> CellStyleResolver<'a> {
    pub fn new(styles: &'a Stylesheet, colors: &'a ColorResolver) -> Self {
        Self { styles, colors }
    }

    /// Style of a cell at `(row, col)`; `merge_members` lists every cell of the
    /// merge the cell anchors so their borders show on the anchor's edges
    pub fn resolve(
        &self,
        sheet: &Sheet,
        row: u32,
        col: u32,
        merge_members: &[CellRef],
        registry: &mut StyleRegistry,
    ) -> CellStyle {
        let mut style = CellStyle::default();
        let xf = self.cell_xf(sheet, row, col);

        if let Some(border) = xf.and_then(|xf| self.styles.borders.get(xf.border_id)) {
            style.classes.extend(self.border_classes(border, registry));
        }
        for member in merge_members {
            if let Some(border) = self
                .cell_xf(sheet, member.row, member.col)
                .and_then(|xf| self.styles.borders.get(xf.border_id))
            {
                style.classes.extend(self.border_classes(border, registry));
            }
        }

        let Some(xf) = xf else {
            return style;
        };

        style.inline.extend(alignment_styles(&xf.alignment));

        if let Some(fill) = self.styles.fills.get(xf.fill_id) {
            match fill.pattern_type.as_deref() {
                Some("solid") => {
                    if let Some(class) = fill
                        .fg_color
                        .as_ref()
                        .and_then(|c| self.colors.resolve(c))
                        .and_then(|argb| registry.register(StyleDescriptor::BackgroundColor(argb)))
                    {
                        style.classes.insert(class);
                    }
                }
                Some("none") | None => {}
                Some(other) => debug!("Pattern type is not supported: {}", other),
            }
        }

        if let Some(font) = self.styles.fonts.get(xf.font_id) {
            style.classes.extend(self.font_classes(font, true, registry));
        }

        style
    }

    /// Classes for a differential style, registered in `registry`
    pub fn differential_classes(
        &self,
        dxf: &DifferentialStyle,
        registry: &mut StyleRegistry,
    ) -> BTreeSet<String> {
        let mut classes = BTreeSet::new();
        if let Some(font) = &dxf.font {
            classes.extend(self.font_classes(font, false, registry));
        }
        if let Some(fill) = &dxf.fill
            && let Some(class) = self
                .fill_color(fill)
                .and_then(|argb| registry.register(StyleDescriptor::BackgroundColor(argb)))
        {
            classes.insert(class);
        }
        if let Some(border) = &dxf.border {
            classes.extend(self.border_classes(border, registry));
        }
        classes
    }

    fn cell_xf(&self, sheet: &Sheet, row: u32, col: u32) -> Option<&'a CellXf> {
        let style_id = sheet.get_cell(row, col).map(|c| c.style_id).unwrap_or(0);
        match self.styles.cell_xfs.get(style_id) {
            Some(xf) => Some(xf),
            None if self.styles.cell_xfs.is_empty() => None,
            None => {
                warn!(
                    "Style index {} out of range for {}!{}, using the default style",
                    style_id,
                    sheet.name,
                    CellRef::new(row, col)
                );
                self.styles.cell_xfs.first()
            }
        }
    }

    /// Differential fills usually carry their color in `bgColor`
    fn fill_color(&self, fill: &Fill) -> Option<String> {
        fill.bg_color
            .as_ref()
            .and_then(|c| self.colors.resolve(c))
            .or_else(|| fill.fg_color.as_ref().and_then(|c| self.colors.resolve(c)))
    }

    fn border_classes(&self, border: &Border, registry: &mut StyleRegistry) -> Vec<String> {
        border
            .sides()
            .into_iter()
            .filter_map(|(name, side)| {
                let style = side.style.as_deref()?;
                let direction = BorderDirection::from_name(name)?;
                let color = side.color.as_ref().and_then(|c| self.colors.resolve(c));
                registry.register_border(style, direction, color)
            })
            .collect()
    }

    fn font_classes(&self, font: &Font, with_size: bool, registry: &mut StyleRegistry) -> Vec<String> {
        let mut descriptors = Vec::new();
        if with_size {
            let size = font.size.unwrap_or(DEFAULT_FONT_SIZE).max(0.0) as u32;
            descriptors.push(StyleDescriptor::FontSize(size));
        }
        if let Some(argb) = font.color.as_ref().and_then(|c| self.colors.resolve(c)) {
            descriptors.push(StyleDescriptor::FontColor(argb));
        }
        if font.bold {
            descriptors.push(StyleDescriptor::Bold);
        }
        if font.italic {
            descriptors.push(StyleDescriptor::Italic);
        }
        if font.underline {
            descriptors.push(StyleDescriptor::Underline);
        }
        descriptors
            .into_iter()
            .filter_map(|d| registry.register(d))
            .collect()
    }
}

fn alignment_styles(alignment: &Alignment) -> Vec<(String, String)> {
    let mut styles = Vec::new();
    let horizontal = alignment.horizontal.as_deref().and_then(|h| match h {
        "general" => None,
        "centerContinuous" => Some("center"),
        "fill" => Some("left"),
        "distributed" => Some("justify"),
        other => Some(other),
    });
    if let Some(h) = horizontal {
        styles.push(("text-align".to_string(), h.to_string()));
    }
    let vertical = alignment.vertical.as_deref().map(|v| match v {
        "center" | "distributed" | "justify" => "middle",
        other => other,
    });
    if let Some(v) = vertical {
        styles.push(("vertical-align".to_string(), v.to_string()));
    }
    styles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::styles::{BorderSide, Color};
    use crate::reader::workbook::{Cell, CellValue};

    fn stylesheet() -> Stylesheet {
        Stylesheet {
            fonts: vec![
                Font {
                    size: Some(11.0),
                    ..Default::default()
                },
                Font {
                    size: Some(14.0),
                    bold: true,
                    color: Some(Color::rgb("FFFF0000")),
                    ..Default::default()
                },
            ],
            fills: vec![
                Fill::default(),
                Fill {
                    pattern_type: Some("solid".into()),
                    fg_color: Some(Color::rgb("FFFFFF00")),
                    bg_color: None,
                },
            ],
            borders: vec![
                Border::default(),
                Border {
                    left: BorderSide {
                        style: Some("thin".into()),
                        color: None,
                    },
                    ..Default::default()
                },
                Border {
                    right: BorderSide {
                        style: Some("medium".into()),
                        color: Some(Color::rgb("FF0000FF")),
                    },
                    ..Default::default()
                },
            ],
            cell_xfs: vec![
                CellXf::default(),
                CellXf {
                    font_id: 1,
                    fill_id: 1,
                    border_id: 1,
                    alignment: Alignment {
                        horizontal: Some("center".into()),
                        vertical: Some("center".into()),
                        wrap_text: false,
                    },
                    ..Default::default()
                },
                CellXf {
                    border_id: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cell_style() {
        let styles = stylesheet();
        let colors = ColorResolver::default();
        let resolver = CellStyleResolver::new(&styles, &colors);
        let mut registry = StyleRegistry::new();

        let mut sheet = Sheet::new("Data", 0);
        sheet.insert_cell(Cell::new(1, 1, CellValue::Text("x".into())).with_style(1));

        let style = resolver.resolve(&sheet, 1, 1, &[], &mut registry);
        let classes: Vec<&str> = style.classes.iter().map(String::as_str).collect();
        assert_eq!(
            classes,
            vec![
                "border_thin_l",
                "xlsx_cell_background_color_FFFFFF00",
                "xlsx_cell_font_bold",
                "xlsx_cell_font_color_FFFF0000",
                "xlsx_cell_font_size_14",
            ]
        );
        assert_eq!(
            style.inline,
            vec![
                ("text-align".to_string(), "center".to_string()),
                ("vertical-align".to_string(), "middle".to_string()),
            ]
        );
    }

    #[test]
    fn test_merge_members_contribute_borders() {
        let styles = stylesheet();
        let colors = ColorResolver::default();
        let resolver = CellStyleResolver::new(&styles, &colors);
        let mut registry = StyleRegistry::new();

        let mut sheet = Sheet::new("Data", 0);
        sheet.insert_cell(Cell::new(1, 2, CellValue::Empty).with_style(2));
        let members = [CellRef::new(1, 1), CellRef::new(1, 2)];

        let style = resolver.resolve(&sheet, 1, 1, &members, &mut registry);
        assert!(style.classes.contains("border_medium_r_FF0000FF"));
        assert!(style.classes.contains("xlsx_cell_font_size_11"));
    }

    #[test]
    fn test_out_of_range_style_falls_back_to_default() {
        let styles = stylesheet();
        let colors = ColorResolver::default();
        let resolver = CellStyleResolver::new(&styles, &colors);
        let mut registry = StyleRegistry::new();

        let mut sheet = Sheet::new("Data", 0);
        sheet.insert_cell(Cell::new(1, 1, CellValue::Number(1.0)).with_style(42));
        let style = resolver.resolve(&sheet, 1, 1, &[], &mut registry);
        assert_eq!(
            style.classes.into_iter().collect::<Vec<_>>(),
            vec!["xlsx_cell_font_size_11".to_string()]
        );
    }

    #[test]
    fn test_differential_classes_use_background_color() {
        let styles = Stylesheet::default();
        let colors = ColorResolver::default();
        let resolver = CellStyleResolver::new(&styles, &colors);
        let mut registry = StyleRegistry::with_prefix("sheethtml_cf");
        let dxf = DifferentialStyle {
            font: Some(Font {
                bold: true,
                ..Default::default()
            }),
            fill: Some(Fill {
                pattern_type: None,
                fg_color: Some(Color::rgb("FF000000")),
                bg_color: Some(Color::rgb("FFFFC7CE")),
            }),
            border: None,
        };
        let classes = resolver.differential_classes(&dxf, &mut registry);
        assert_eq!(
            classes.into_iter().collect::<Vec<_>>(),
            vec![
                "sheethtml_cf_xlsx_cell_background_color_FFFFC7CE".to_string(),
                "sheethtml_cf_xlsx_cell_font_bold".to_string(),
            ]
        );
    }
}
