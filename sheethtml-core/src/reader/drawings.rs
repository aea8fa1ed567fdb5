//! Pictures anchored on a worksheet through its drawing part

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::BufReader;
use tracing::warn;

use super::PartSource;
use super::parser_utils::{attr_value, read_text_node, rels_path_for};
use super::workbook::SheetImage;
use super::xlsx_parser::read_relationships;

/// English Metric Units per pixel at 96 dpi
const EMU_PER_PIXEL: f64 = 9525.0;

/// Picture anchor as read from `xdr:oneCellAnchor` / `xdr:twoCellAnchor`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureAnchor {
    /// 0-based anchor column and row
    pub col: u32,
    pub row: u32,
    pub col_offset: i64,
    pub row_offset: i64,
    /// Extent in EMU, from the anchor or the picture's shape properties
    pub cx: i64,
    pub cy: i64,
    pub embed: String,
}

pub fn emu_to_pixels(emu: i64) -> u32 {
    (emu.max(0) as f64 / EMU_PER_PIXEL).round() as u32
}

/// Collect picture anchors from a drawing part
pub fn parse_drawing(data: &[u8]) -> Result<Vec<PictureAnchor>> {
    let mut reader = Reader::from_reader(BufReader::new(data));
    reader.config_mut().trim_text(true);

    let mut anchors = Vec::new();
    let mut current: Option<PictureAnchor> = None;
    let mut has_picture = false;
    let mut in_from = false;
    let mut in_pic = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"oneCellAnchor" | b"twoCellAnchor" => {
                    current = Some(PictureAnchor::default());
                    has_picture = false;
                }
                b"from" => in_from = true,
                b"pic" => {
                    in_pic = true;
                    has_picture = true;
                }
                name @ (b"col" | b"row" | b"colOff" | b"rowOff") if in_from => {
                    let name = name.to_vec();
                    let text = read_text_node(&mut reader)?;
                    if let Some(anchor) = current.as_mut() {
                        let value = text.trim().parse::<i64>().unwrap_or(0);
                        match name.as_slice() {
                            b"col" => anchor.col = value.max(0) as u32,
                            b"row" => anchor.row = value.max(0) as u32,
                            b"colOff" => anchor.col_offset = value,
                            _ => anchor.row_offset = value,
                        }
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"ext" => {
                    if let Some(anchor) = current.as_mut() {
                        let cx = attr_value(&e, b"cx").and_then(|v| v.parse::<i64>().ok());
                        let cy = attr_value(&e, b"cy").and_then(|v| v.parse::<i64>().ok());
                        // The anchor extent wins over the shape's transform
                        if let (Some(cx), Some(cy)) = (cx, cy)
                            && (!in_pic || anchor.cx == 0)
                        {
                            anchor.cx = cx;
                            anchor.cy = cy;
                        }
                    }
                }
                b"blip" => {
                    if let Some(anchor) = current.as_mut()
                        && let Some(embed) = attr_value(&e, b"embed")
                    {
                        anchor.embed = embed;
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"from" => in_from = false,
                b"pic" => in_pic = false,
                b"oneCellAnchor" | b"twoCellAnchor" => {
                    if let Some(anchor) = current.take()
                        && has_picture
                        && !anchor.embed.is_empty()
                    {
                        anchors.push(anchor);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(anchors)
}

/// Load every picture of a drawing part together with its image bytes
pub fn load_drawing_images<S: PartSource>(package: &mut S, drawing_path: &str) -> Result<Vec<SheetImage>> {
    let data = package
        .read_part(drawing_path)
        .with_context(|| format!("Failed to read {}", drawing_path))?;
    let anchors = parse_drawing(&data)?;
    if anchors.is_empty() {
        return Ok(Vec::new());
    }

    let rels = read_relationships(package, &rels_path_for(drawing_path))?;

    let mut images = Vec::with_capacity(anchors.len());
    for anchor in anchors {
        let Some(rel) = rels.iter().find(|rel| rel.id == anchor.embed && !rel.external) else {
            warn!("Picture relationship '{}' not found in {}", anchor.embed, drawing_path);
            continue;
        };
        let bytes = match package.read_part(&rel.target) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Unable to read picture '{}': {}", rel.target, err);
                continue;
            }
        };
        let (mut width, mut height) = (emu_to_pixels(anchor.cx), emu_to_pixels(anchor.cy));
        if (width == 0 || height == 0)
            && let Ok((w, h)) = crate::render::incell::probe_dimensions(&bytes)
        {
            width = w;
            height = h;
        }
        images.push(SheetImage {
            row: anchor.row + 1,
            col: anchor.col + 1,
            offset_x: emu_to_pixels(anchor.col_offset),
            offset_y: emu_to_pixels(anchor.row_offset),
            width,
            height,
            target: rel.target.clone(),
            data: bytes,
        });
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWING_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"
          xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <xdr:oneCellAnchor>
    <xdr:from><xdr:col>1</xdr:col><xdr:colOff>95250</xdr:colOff><xdr:row>2</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:ext cx="952500" cy="476250"/>
    <xdr:pic>
      <xdr:nvPicPr><xdr:cNvPr id="2" name="Picture 1"/><xdr:cNvPicPr/></xdr:nvPicPr>
      <xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill>
      <xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="10" cy="10"/></a:xfrm></xdr:spPr>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:oneCellAnchor>
  <xdr:twoCellAnchor>
    <xdr:from><xdr:col>0</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>0</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:to><xdr:col>3</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>3</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to>
    <xdr:sp><xdr:spPr/></xdr:sp>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
</xdr:wsDr>"#;

    #[test]
    fn test_parse_drawing_pictures_only() {
        let anchors = parse_drawing(DRAWING_XML.as_bytes()).unwrap();
        assert_eq!(anchors.len(), 1);
        let anchor = &anchors[0];
        assert_eq!((anchor.col, anchor.row), (1, 2));
        assert_eq!(anchor.embed, "rId1");
        assert_eq!(emu_to_pixels(anchor.cx), 100);
        assert_eq!(emu_to_pixels(anchor.cy), 50);
        assert_eq!(emu_to_pixels(anchor.col_offset), 10);
    }
}
