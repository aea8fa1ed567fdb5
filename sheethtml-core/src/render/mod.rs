//! Rendering of worksheets to HTML tables and CSS

pub mod cell_style;
pub mod color;
pub mod format;
pub mod incell;
pub mod layout;
pub mod style_registry;
pub mod table;

pub use cell_style::{CellStyle, CellStyleResolver};
pub use color::ColorResolver;
pub use format::CellFormatter;
pub use incell::generate_incell_css;
pub use layout::{LayoutBuilder, WorksheetRenderModel};
pub use style_registry::{BorderDirection, StyleDescriptor, StyleRegistry};
pub use table::render_table;
