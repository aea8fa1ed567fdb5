//! sheethtml: Core library rendering XLSX workbooks into HTML
//!
//! A workbook is read into an in-memory model, every visible sheet is laid
//! out as an HTML table with generated CSS classes, and the result is
//! assembled from templates into one self-contained document.

pub mod conditional;
pub mod config;
pub mod convert;
pub mod error;
pub mod html;
pub mod postprocess;
pub mod reader;
pub mod render;
pub mod rich_value;
pub mod templates;

pub use config::{ConvertOptions, ConverterConfig, TemplatePaths};
pub use convert::{ConversionOutcome, Converter, GENERATOR};
pub use error::{ConvertError, OptionsError, RichValueError, TemplateError};
pub use reader::{Workbook, read_workbook};
pub use templates::Templates;
