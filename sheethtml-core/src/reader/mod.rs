//! XLSX package reader using custom XML parsers

use anyhow::{Context, Result};

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

pub mod drawings;
pub mod parser_utils;
pub mod styles;
pub mod workbook;
pub mod xlsx_parser;

use self::xlsx_parser::XlsxReader;
pub use styles::Stylesheet;
pub use workbook::{
    Cell, CellRange, CellRef, CellValue, CfRule, ColumnDimension, ConditionalFormatting,
    Hyperlink, RowDimension, Sheet, SheetImage, SheetState, Workbook,
};

/// Read access to the raw parts of an OPC package
pub trait PartSource {
    fn has_part(&self, name: &str) -> bool;
    fn read_part(&mut self, name: &str) -> io::Result<Vec<u8>>;
}

/// Trait for spreadsheet format readers
pub trait WorkbookReader {
    fn read_sheets(&mut self) -> Result<Vec<Sheet>>;
    fn read_styles(&mut self) -> Result<Stylesheet>;
    fn read_theme_colors(&mut self) -> Result<Vec<String>>;
}

/// A zip-backed spreadsheet package
pub struct Package<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl Package<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> Package<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).context("Failed to open zip archive")?;
        Ok(Self { archive })
    }
}

impl<R: Read + Seek> PartSource for Package<R> {
    fn has_part(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    fn read_part(&mut self, name: &str) -> io::Result<Vec<u8>> {
        let mut file = self.archive.by_name(name).map_err(|err| match err {
            ZipError::FileNotFound => {
                io::Error::new(io::ErrorKind::NotFound, format!("part not found: {}", name))
            }
            ZipError::Io(io_err) => io_err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path_ref = path.as_ref();
    let mut package = Package::open(path_ref)?;
    read_package(&mut package, path_ref)
}

/// Read the workbook model from an already opened package
pub fn read_package<S: PartSource>(package: &mut S, path: &Path) -> Result<Workbook> {
    let is_xlsx = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("xlsx") || s.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false);
    if !is_xlsx && !package.has_part("xl/workbook.xml") {
        return Err(anyhow::anyhow!("Unsupported file format"));
    }

    let mut reader = XlsxReader::new(package)?;
    let styles = reader.read_styles()?;
    let theme_colors = reader.read_theme_colors()?;
    let sheets = reader.read_sheets()?;

    Ok(Workbook {
        path: path.to_path_buf(),
        sheets,
        styles,
        theme_colors,
    })
}
