//! Workbook data structures

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use super::parser_utils::column_letter;
use super::styles::Stylesheet;

/// Represents a complete workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub path: PathBuf,
    pub sheets: Vec<Sheet>,
    pub styles: Stylesheet,
    /// Theme palette as `AARRGGBB` strings, in theme index order
    pub theme_colors: Vec<String>,
}

impl Workbook {
    /// Sheets that are rendered, in source order
    pub fn visible_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter().filter(|s| s.is_visible())
    }
}

/// Sheet visibility as declared in `xl/workbook.xml`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "hidden" => SheetState::Hidden,
            "veryHidden" => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    /// 0-based position in the workbook
    pub index: usize,
    pub state: SheetState,
    /// Cells keyed by 1-based (row, col)
    pub cells: BTreeMap<(u32, u32), Cell>,
    pub merged_cells: Vec<CellRange>,
    pub column_dimensions: Vec<ColumnDimension>,
    pub row_dimensions: HashMap<u32, RowDimension>,
    pub conditional_formatting: Vec<ConditionalFormatting>,
    /// Pictures floating over the grid, anchored at a cell
    pub images: Vec<SheetImage>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            ..Default::default()
        }
    }

    /// Display-name independent identifier used for section ids and anchors
    pub fn encoded_id(&self) -> String {
        encoded_sheet_id(self.index)
    }

    pub fn is_visible(&self) -> bool {
        self.state == SheetState::Visible
    }

    /// Get a cell at the given 1-based position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Value at a position, `Empty` when the cell does not exist
    pub fn value_at(&self, row: u32, col: u32) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.get_cell(row, col).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    pub fn insert_cell(&mut self, cell: Cell) {
        self.cells.insert((cell.row, cell.col), cell);
    }

    pub fn row_dimension(&self, row: u32) -> Option<&RowDimension> {
        self.row_dimensions.get(&row)
    }

    /// Bottom-right corner of the populated area, merges included
    pub fn extent(&self) -> Option<(u32, u32)> {
        let cells = self.cells.keys().copied();
        let merges = self.merged_cells.iter().map(|m| (m.end.row, m.end.col));
        cells.chain(merges).fold(None, |acc, (row, col)| match acc {
            None => Some((row, col)),
            Some((max_row, max_col)) => Some((max_row.max(row), max_col.max(col))),
        })
    }
}

/// `sheet_<hex index>` zero-padded to three digits
pub fn encoded_sheet_id(index: usize) -> String {
    format!("sheet_{:03x}", index)
}

/// Represents a single cell
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    /// Index into the stylesheet's cellXfs
    pub style_id: usize,
    /// Rich-value (`vm`) id, present only for cells holding an in-cell image
    pub rich_value_id: Option<u32>,
    pub hyperlink: Option<Hyperlink>,
}

impl Cell {
    pub fn new(row: u32, col: u32, value: CellValue) -> Self {
        Self {
            row,
            col,
            value,
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style_id: usize) -> Self {
        self.style_id = style_id;
        self
    }

    pub fn with_rich_value(mut self, vm_id: u32) -> Self {
        self.rich_value_id = Some(vm_id);
        self
    }

    pub fn reference(&self) -> CellRef {
        CellRef::new(self.row, self.col)
    }

    /// Excel-style coordinate (e.g., "A1")
    pub fn coordinate(&self) -> String {
        self.reference().to_string()
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    Error(String),
    Formula {
        formula: String,
        cached: Box<CellValue>,
    },
}

impl CellValue {
    /// Create a formula cell with its cached result
    pub fn formula(f: impl Into<String>, cached: CellValue) -> Self {
        CellValue::Formula {
            formula: f.into(),
            cached: Box::new(cached),
        }
    }

    /// Value that is displayed: the cached result for formulas
    pub fn result(&self) -> &CellValue {
        match self {
            CellValue::Formula { cached, .. } => cached.result(),
            other => other,
        }
    }

    /// Check if the displayed value is empty
    pub fn is_empty(&self) -> bool {
        match self.result() {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Check if the displayed value is an error
    pub fn is_error(&self) -> bool {
        matches!(self.result(), CellValue::Error(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.result() {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// 1-based cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row)
    }
}

/// Rectangular, inclusive range of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// Build a range, normalizing the corners so `start` is top-left
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start.row && row <= self.end.row && col >= self.start.col && col <= self.end.col
    }

    /// Member cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| CellRef::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// `<col>` override covering the 1-based columns `min..=max`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDimension {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub custom_width: bool,
    pub hidden: bool,
}

/// `<row>` properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowDimension {
    pub height: Option<f64>,
    pub custom_height: bool,
    pub hidden: bool,
}

/// Cell hyperlink, either external (`target`) or in-document (`location`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hyperlink {
    pub target: Option<String>,
    pub location: Option<String>,
}

impl Hyperlink {
    pub fn href(&self) -> Option<String> {
        match (&self.target, &self.location) {
            (Some(target), Some(location)) => Some(format!("{}#{}", target, location)),
            (Some(target), None) => Some(target.clone()),
            (None, Some(location)) => Some(format!("#{}", location)),
            (None, None) => None,
        }
    }
}

/// `<conditionalFormatting>` block: ranges plus the rules applied to them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalFormatting {
    pub ranges: Vec<CellRange>,
    pub rules: Vec<CfRule>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfRule {
    pub rule_type: String,
    pub dxf_id: Option<usize>,
    pub priority: i64,
    pub stop_if_true: bool,
    pub operator: Option<String>,
    pub text: Option<String>,
    pub formulas: Vec<String>,
}

/// Picture anchored at a cell, sizes in pixels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetImage {
    pub row: u32,
    pub col: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
    /// Package path of the media part
    pub target: String,
    pub data: Vec<u8>,
}
