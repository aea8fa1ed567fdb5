//! HTML `<table>` rendering of a worksheet render model

use super::layout::{CellRender, FloatingImage, WorksheetRenderModel};
use crate::html::escape_html;

const IMAGE_PLACEHOLDER: &str = r#"<img alt="" loading="lazy" decoding="async" />"#;

pub fn render_table(model: &WorksheetRenderModel) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<table style=\"border:0; border-collapse: collapse; width: {}px; table-layout: fixed;\">\n",
        model.table_width
    ));

    html.push_str("<colgroup>\n");
    for column in &model.columns {
        html.push_str(&format!(
            "<col style=\"width: {}px; visibility: {}\" data-value=\"{}\">\n",
            column.width,
            column.visibility(),
            column.letter
        ));
    }
    html.push_str("</colgroup>\n<tbody>\n");

    // Sizing row pinning the column widths
    html.push_str("<tr style=\"height: 0;\">");
    for column in &model.columns {
        html.push_str(&format!(
            "<td style=\"width: {}px; padding: 0;\"></td>",
            column.width
        ));
    }
    html.push_str("</tr>\n");

    for row in &model.rows {
        html.push_str("<tr>");
        for cell in &row.cells {
            let images = model
                .images
                .get(&(cell.col, cell.row))
                .map(|images| images.as_slice())
                .unwrap_or(&[]);
            html.push_str(&render_cell(cell, images));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>");
    html
}

fn render_cell(cell: &CellRender, images: &[FloatingImage]) -> String {
    let mut td = format!("<td id=\"{}\"", escape_html(&cell.id));
    if cell.colspan > 1 {
        td.push_str(&format!(" colspan=\"{}\"", cell.colspan));
    }
    if cell.rowspan > 1 {
        td.push_str(&format!(" rowspan=\"{}\"", cell.rowspan));
    }
    let style = cell.style_attribute();
    if !style.is_empty() {
        td.push_str(&format!(" style=\"{}\"", escape_html(&style)));
    }
    if !cell.classes.is_empty() {
        let classes: Vec<&str> = cell.classes.iter().map(String::as_str).collect();
        td.push_str(&format!(" class=\"{}\"", escape_html(&classes.join(" "))));
    }
    td.push('>');

    for image in images {
        td.push_str(&format!(
            "<img width=\"{}\" height=\"{}\" style=\"margin-left: {}px; margin-top: {}px; position: absolute\" src=\"{}\"/>",
            image.width, image.height, image.offset_x, image.offset_y, image.src
        ));
    }
    td.push_str(&cell.text);
    if cell.rich_value_id.is_some() {
        td.push_str(IMAGE_PLACEHOLDER);
    }
    td.push_str("</td>");
    td
}
