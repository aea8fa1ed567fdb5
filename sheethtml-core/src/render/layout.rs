//! Worksheet layout: walks cells, merges and dimensions into a render model

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::cell_style::CellStyleResolver;
use super::format::CellFormatter;
use super::incell::data_uri;
use super::style_registry::{StyleDescriptor, StyleRegistry};
use crate::reader::parser_utils::column_letter;
use crate::reader::styles::Stylesheet;
use crate::reader::workbook::{CellRef, Sheet};

/// Pixels per column width unit
pub const COL_WIDTH_FACTOR: f64 = 17.0 / 2.77734375;
pub const COL_WIDTH_DEFAULT: u32 = 65;
pub const ROW_HEIGHT_DEFAULT: u32 = 19;

pub const INCELL_IMAGE_CLASS: &str = "incell-image";

/// Class shared by every cell showing the image of rich value `vm_id`
pub fn rich_value_class(vm_id: u32) -> String {
    format!("vm-richvaluerel_rid{}", vm_id)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellRender {
    /// `SheetName!A1`
    pub id: String,
    pub row: u32,
    pub col: u32,
    /// Already HTML-safe display text
    pub text: String,
    pub classes: BTreeSet<String>,
    pub inline: Vec<(String, String)>,
    pub colspan: u32,
    pub rowspan: u32,
    pub rich_value_id: Option<u32>,
}

impl CellRender {
    pub fn style_attribute(&self) -> String {
        self.inline
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRender {
    pub letter: String,
    pub width: u32,
    pub hidden: bool,
}

impl ColumnRender {
    fn new(col: u32) -> Self {
        Self {
            letter: column_letter(col),
            width: COL_WIDTH_DEFAULT,
            hidden: false,
        }
    }

    pub fn visibility(&self) -> &'static str {
        if self.hidden { "collapse" } else { "visible" }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRender {
    pub row: u32,
    pub height: u32,
    pub hidden: bool,
    pub cells: Vec<CellRender>,
}

/// Picture drawn over the sheet, positioned inside its anchor cell
#[derive(Debug, Clone, PartialEq)]
pub struct FloatingImage {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub src: String,
}

/// Pixel box available to the image of one rich-value cell
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementBox {
    pub vm_id: u32,
    pub class_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetRenderModel {
    pub sheet_name: String,
    pub encoded_id: String,
    pub rows: Vec<RowRender>,
    pub columns: Vec<ColumnRender>,
    /// Floating images keyed by 1-based `(col, row)`
    pub images: BTreeMap<(u32, u32), Vec<FloatingImage>>,
    pub used_rich_values: BTreeSet<u32>,
    pub placement_boxes: Vec<PlacementBox>,
    pub table_width: u32,
}

struct MergeInfo {
    colspan: u32,
    rowspan: u32,
    members: Vec<CellRef>,
}

struct PendingBox {
    vm_id: u32,
    class_name: String,
    row: u32,
    col: u32,
    colspan: u32,
    rowspan: u32,
}

/// Builds [`WorksheetRenderModel`]s, one sheet at a time
pub struct LayoutBuilder<'a> {
    stylesheet: &'a Stylesheet,
    styles: &'a CellStyleResolver<'a>,
    formatter: &'a CellFormatter,
    max_rows: Option<u32>,
    max_cols: Option<u32>,
}

impl<'a> LayoutBuilder<'a> {
    pub fn new(
        stylesheet: &'a Stylesheet,
        styles: &'a CellStyleResolver<'a>,
        formatter: &'a CellFormatter,
    ) -> Self {
        Self {
            stylesheet,
            styles,
            formatter,
            max_rows: None,
            max_cols: None,
        }
    }

    /// Clamp the rendered grid
    pub fn with_limits(mut self, max_rows: Option<u32>, max_cols: Option<u32>) -> Self {
        self.max_rows = max_rows;
        self.max_cols = max_cols;
        self
    }

    pub fn build(&self, sheet: &Sheet, registry: &mut StyleRegistry) -> WorksheetRenderModel {
        let mut model = WorksheetRenderModel {
            sheet_name: sheet.name.clone(),
            encoded_id: sheet.encoded_id(),
            ..Default::default()
        };
        let Some((extent_rows, extent_cols)) = sheet.extent() else {
            return model;
        };
        let max_row = self.max_rows.map_or(extent_rows, |m| extent_rows.min(m));
        let max_col = self.max_cols.map_or(extent_cols, |m| extent_cols.min(m));

        let (excluded, merges) = merge_layout(sheet, max_row, max_col);
        model.columns = (1..=max_col).map(ColumnRender::new).collect();

        let mut pending = Vec::new();
        for row in 1..=max_row {
            let dimension = sheet.row_dimension(row);
            let hidden = dimension.is_some_and(|d| d.hidden);
            let height = match dimension {
                Some(d) if d.hidden => 0,
                Some(d) if d.custom_height => d
                    .height
                    .map(|h| h.round().max(0.0) as u32)
                    .unwrap_or(ROW_HEIGHT_DEFAULT),
                _ => ROW_HEIGHT_DEFAULT,
            };
            let mut render_row = RowRender {
                row,
                height,
                hidden,
                cells: Vec::new(),
            };
            if hidden {
                model.rows.push(render_row);
                continue;
            }

            for col in 1..=max_col {
                if excluded.contains(&(row, col)) {
                    continue;
                }
                let merge = merges.get(&(row, col));
                let cell = self.render_cell(sheet, row, col, height, merge, registry);
                if let Some(vm_id) = cell.rich_value_id {
                    model.used_rich_values.insert(vm_id);
                    pending.push(PendingBox {
                        vm_id,
                        class_name: placement_class(sheet.index, row, col),
                        row,
                        col,
                        colspan: cell.colspan,
                        rowspan: cell.rowspan,
                    });
                }
                render_row.cells.push(cell);
            }
            model.rows.push(render_row);
        }

        self.apply_column_dimensions(sheet, &mut model.columns);

        model.placement_boxes = pending
            .into_iter()
            .map(|p| placement_box(p, &model.columns, &model.rows))
            .collect();

        model.table_width = model
            .columns
            .iter()
            .filter(|c| !c.hidden)
            .map(|c| c.width)
            .sum();

        for image in &sheet.images {
            if image.row > max_row || image.col > max_col {
                debug!(
                    "Image {} on {} is outside the rendered area",
                    image.target, sheet.name
                );
                continue;
            }
            model
                .images
                .entry((image.col, image.row))
                .or_default()
                .push(FloatingImage {
                    width: image.width,
                    height: image.height,
                    offset_x: image.offset_x,
                    offset_y: image.offset_y,
                    src: data_uri(&image.data, &image.target),
                });
        }

        model
    }

    fn render_cell(
        &self,
        sheet: &Sheet,
        row: u32,
        col: u32,
        height: u32,
        merge: Option<&MergeInfo>,
        registry: &mut StyleRegistry,
    ) -> CellRender {
        let cell = sheet.get_cell(row, col);
        let mut render = CellRender {
            id: format!("{}!{}", sheet.name, CellRef::new(row, col)),
            row,
            col,
            text: cell
                .map(|c| {
                    self.formatter
                        .format_cell(c, self.stylesheet.format_code(c.style_id))
                })
                .unwrap_or_default(),
            colspan: merge.map_or(1, |m| m.colspan),
            rowspan: merge.map_or(1, |m| m.rowspan),
            ..Default::default()
        };

        if let Some(class) = registry.register(StyleDescriptor::Height(height)) {
            render.classes.insert(class);
        }

        let members = merge.map(|m| m.members.as_slice()).unwrap_or(&[]);
        let style = self.styles.resolve(sheet, row, col, members, registry);
        render.inline = style.inline;
        render.classes.extend(style.classes);

        if let Some(vm_id) = cell.and_then(|c| c.rich_value_id) {
            render.text.clear();
            render.rich_value_id = Some(vm_id);
            render
                .inline
                .push(("position".to_string(), "relative".to_string()));
            render
                .inline
                .push(("overflow".to_string(), "hidden".to_string()));
            render.classes.insert(rich_value_class(vm_id));
            render.classes.insert(placement_class(sheet.index, row, col));
            render.classes.insert(INCELL_IMAGE_CLASS.to_string());
        }

        render
    }

    fn apply_column_dimensions(&self, sheet: &Sheet, columns: &mut [ColumnRender]) {
        let catalogue_len = columns.len() as u32;
        for dimension in &sheet.column_dimensions {
            if dimension.min > catalogue_len {
                debug!(
                    "Column override {}:{} on {} is outside the rendered columns",
                    dimension.min, dimension.max, sheet.name
                );
                continue;
            }
            let width = if dimension.hidden {
                0
            } else if dimension.custom_width {
                dimension
                    .width
                    .map(|w| (w * COL_WIDTH_FACTOR).round().max(0.0) as u32)
                    .unwrap_or(COL_WIDTH_DEFAULT)
            } else {
                COL_WIDTH_DEFAULT
            };
            for col in dimension.min.max(1)..=dimension.max.min(catalogue_len) {
                let column = &mut columns[(col - 1) as usize];
                column.width = width;
                column.hidden = dimension.hidden;
            }
        }
    }
}

/// Per-cell class targeted by the in-cell image sizing rule
pub fn placement_class(sheet_index: usize, row: u32, col: u32) -> String {
    format!("cell_{}_{}_{}", sheet_index, col - 1, row - 1)
}

/// Cells hidden behind merge anchors, and span info keyed by anchor
fn merge_layout(
    sheet: &Sheet,
    max_row: u32,
    max_col: u32,
) -> (HashSet<(u32, u32)>, HashMap<(u32, u32), MergeInfo>) {
    let mut excluded = HashSet::new();
    let mut merges = HashMap::new();
    for range in &sheet.merged_cells {
        let anchor = range.start;
        let members: Vec<CellRef> = range.cells().collect();
        for member in &members {
            if *member != anchor {
                excluded.insert((member.row, member.col));
            }
        }
        let last_col = range.end.col.min(max_col).max(anchor.col);
        let last_row = range.end.row.min(max_row).max(anchor.row);
        merges.insert(
            (anchor.row, anchor.col),
            MergeInfo {
                colspan: last_col - anchor.col + 1,
                rowspan: last_row - anchor.row + 1,
                members,
            },
        );
    }
    (excluded, merges)
}

fn placement_box(pending: PendingBox, columns: &[ColumnRender], rows: &[RowRender]) -> PlacementBox {
    let width: u32 = (pending.col..pending.col + pending.colspan)
        .map(|c| {
            columns
                .get((c - 1) as usize)
                .map_or(COL_WIDTH_DEFAULT, |column| column.width)
        })
        .sum();
    let height: u32 = (pending.row..pending.row + pending.rowspan)
        .map(|r| {
            rows.get((r - 1) as usize)
                .map_or(ROW_HEIGHT_DEFAULT, |row| row.height)
        })
        .sum();
    PlacementBox {
        vm_id: pending.vm_id,
        class_name: pending.class_name,
        width: if width == 0 { COL_WIDTH_DEFAULT } else { width },
        height: if height == 0 { ROW_HEIGHT_DEFAULT } else { height },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::styles::CellXf;
    use crate::reader::workbook::{
        Cell, CellRange, CellValue, ColumnDimension, RowDimension, SheetImage,
    };
    use crate::render::color::ColorResolver;

    fn stylesheet() -> Stylesheet {
        Stylesheet {
            cell_xfs: vec![CellXf::default()],
            ..Default::default()
        }
    }

    fn build(sheet: &Sheet) -> (WorksheetRenderModel, StyleRegistry) {
        build_limited(sheet, None, None)
    }

    fn build_limited(
        sheet: &Sheet,
        max_rows: Option<u32>,
        max_cols: Option<u32>,
    ) -> (WorksheetRenderModel, StyleRegistry) {
        let styles = stylesheet();
        let colors = ColorResolver::default();
        let resolver = CellStyleResolver::new(&styles, &colors);
        let formatter = CellFormatter::default();
        let mut registry = StyleRegistry::new();
        let model = LayoutBuilder::new(&styles, &resolver, &formatter)
            .with_limits(max_rows, max_cols)
            .build(sheet, &mut registry);
        (model, registry)
    }

    fn cell_ids(model: &WorksheetRenderModel) -> Vec<String> {
        model
            .rows
            .iter()
            .flat_map(|r| r.cells.iter().map(|c| c.id.clone()))
            .collect()
    }

    #[test]
    fn test_merge_members_are_excluded() {
        let mut sheet = Sheet::new("Data", 0);
        sheet.insert_cell(Cell::new(1, 1, CellValue::Text("merged".into())));
        sheet.insert_cell(Cell::new(1, 3, CellValue::Number(1.0)));
        sheet.insert_cell(Cell::new(2, 3, CellValue::Number(2.0)));
        sheet
            .merged_cells
            .push(CellRange::new(CellRef::new(1, 1), CellRef::new(2, 2)));

        let (model, _) = build(&sheet);
        assert_eq!(cell_ids(&model), vec!["Data!A1", "Data!C1", "Data!C2"]);
        let anchor = &model.rows[0].cells[0];
        assert_eq!((anchor.colspan, anchor.rowspan), (2, 2));
        assert_eq!(anchor.text, "merged");
        assert_eq!(model.table_width, 3 * COL_WIDTH_DEFAULT);
    }

    #[test]
    fn test_hidden_rows_keep_their_slot() {
        let mut sheet = Sheet::new("Data", 0);
        for row in 1..=3 {
            sheet.insert_cell(Cell::new(row, 1, CellValue::Number(row as f64)));
        }
        sheet.row_dimensions.insert(
            2,
            RowDimension {
                hidden: true,
                ..Default::default()
            },
        );
        sheet.row_dimensions.insert(
            3,
            RowDimension {
                height: Some(30.4),
                custom_height: true,
                hidden: false,
            },
        );

        let (model, registry) = build(&sheet);
        assert_eq!(model.rows.len(), 3);
        assert!(model.rows[1].cells.is_empty());
        assert_eq!(model.rows[1].height, 0);
        assert_eq!(model.rows[2].height, 30);
        assert!(model.rows[2].cells[0].classes.contains("xlsx_element_height_30"));
        assert!(registry.css().contains(".xlsx_element_height_19 { height: 19px; }"));
    }

    #[test]
    fn test_column_overrides() {
        let mut sheet = Sheet::new("Data", 0);
        sheet.insert_cell(Cell::new(1, 4, CellValue::Empty));
        sheet.column_dimensions.push(ColumnDimension {
            min: 1,
            max: 2,
            width: Some(20.0),
            custom_width: true,
            ..Default::default()
        });
        sheet.column_dimensions.push(ColumnDimension {
            min: 3,
            max: 3,
            width: Some(50.0),
            custom_width: true,
            hidden: true,
            ..Default::default()
        });
        sheet.column_dimensions.push(ColumnDimension {
            min: 10,
            max: 12,
            width: Some(5.0),
            custom_width: true,
            ..Default::default()
        });

        let (model, _) = build(&sheet);
        let widths: Vec<u32> = model.columns.iter().map(|c| c.width).collect();
        assert_eq!(widths, vec![122, 122, 0, 65]);
        assert_eq!(model.columns[2].visibility(), "collapse");
        assert_eq!(model.columns[3].letter, "D");
        assert_eq!(model.table_width, 122 + 122 + 65);
    }

    #[test]
    fn test_rich_value_cells() {
        let mut sheet = Sheet::new("Pics", 2);
        sheet.insert_cell(Cell::new(2, 2, CellValue::Error("#VALUE!".into())).with_rich_value(1));
        sheet
            .merged_cells
            .push(CellRange::new(CellRef::new(2, 2), CellRef::new(3, 3)));
        sheet.column_dimensions.push(ColumnDimension {
            min: 3,
            max: 3,
            hidden: true,
            ..Default::default()
        });

        let (model, _) = build(&sheet);
        let cell = &model.rows[1].cells[1];
        assert_eq!(cell.id, "Pics!B2");
        assert!(cell.text.is_empty());
        assert!(cell.classes.contains("vm-richvaluerel_rid1"));
        assert!(cell.classes.contains("cell_2_1_1"));
        assert!(cell.classes.contains(INCELL_IMAGE_CLASS));
        assert_eq!(cell.style_attribute(), "position: relative; overflow: hidden");
        assert_eq!(model.used_rich_values, BTreeSet::from([1]));
        assert_eq!(
            model.placement_boxes,
            vec![PlacementBox {
                vm_id: 1,
                class_name: "cell_2_1_1".into(),
                width: 65,
                height: 38,
            }]
        );
    }

    #[test]
    fn test_degenerate_box_uses_defaults() {
        let mut sheet = Sheet::new("Pics", 0);
        sheet.insert_cell(Cell::new(1, 1, CellValue::Empty).with_rich_value(4));
        sheet.column_dimensions.push(ColumnDimension {
            min: 1,
            max: 1,
            hidden: true,
            ..Default::default()
        });
        let (model, _) = build(&sheet);
        assert_eq!(model.placement_boxes[0].width, COL_WIDTH_DEFAULT);
        assert_eq!(model.placement_boxes[0].height, ROW_HEIGHT_DEFAULT);
    }

    #[test]
    fn test_limits_and_floating_images() {
        let mut sheet = Sheet::new("Data", 0);
        for row in 1..=5 {
            for col in 1..=5 {
                sheet.insert_cell(Cell::new(row, col, CellValue::Number(1.0)));
            }
        }
        sheet.images.push(SheetImage {
            row: 2,
            col: 2,
            offset_x: 3,
            offset_y: 4,
            width: 10,
            height: 20,
            target: "xl/media/image1.png".into(),
            data: vec![1, 2, 3],
        });
        sheet.images.push(SheetImage {
            row: 5,
            col: 5,
            target: "xl/media/image2.png".into(),
            ..Default::default()
        });

        let (model, _) = build_limited(&sheet, Some(2), Some(3));
        assert_eq!(model.rows.len(), 2);
        assert_eq!(model.columns.len(), 3);
        assert_eq!(model.images.len(), 1);
        let image = &model.images[&(2, 2)][0];
        assert_eq!(image.src, "data:image/png;base64,AQID");
        assert_eq!((image.offset_x, image.offset_y), (3, 4));
    }

    #[test]
    fn test_empty_sheet() {
        let (model, _) = build(&Sheet::new("Empty", 0));
        assert!(model.rows.is_empty());
        assert!(model.columns.is_empty());
        assert_eq!(model.table_width, 0);
        assert_eq!(model.encoded_id, "sheet_000");
    }
}
