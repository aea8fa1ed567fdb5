//! Stylesheet (`xl/styles.xml`) and theme (`xl/theme/theme1.xml`) parsing

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::BufRead;

use super::parser_utils::{attr_flag, attr_value};

/// Color reference as stored in the package, resolved later against the theme
#[derive(Debug, Clone, PartialEq)]
pub enum ColorKind {
    Rgb(String),
    Theme(u32),
    Indexed(u32),
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Color {
    pub kind: ColorKind,
    pub tint: f64,
}

impl Color {
    pub fn rgb(argb: impl Into<String>) -> Self {
        Self {
            kind: ColorKind::Rgb(argb.into()),
            tint: 0.0,
        }
    }

    pub fn theme(index: u32, tint: f64) -> Self {
        Self {
            kind: ColorKind::Theme(index),
            tint,
        }
    }

    /// Read a color element (`color`, `fgColor`, `bgColor`)
    fn from_element(e: &BytesStart<'_>) -> Option<Self> {
        let tint = attr_value(e, b"tint")
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0);
        let kind = if let Some(rgb) = attr_value(e, b"rgb") {
            ColorKind::Rgb(rgb)
        } else if let Some(theme) = attr_value(e, b"theme").and_then(|t| t.parse().ok()) {
            ColorKind::Theme(theme)
        } else if let Some(indexed) = attr_value(e, b"indexed").and_then(|i| i.parse().ok()) {
            ColorKind::Indexed(indexed)
        } else if attr_flag(e, b"auto") {
            ColorKind::Auto
        } else {
            return None;
        };
        Some(Self { kind, tint })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    pub pattern_type: Option<String>,
    pub fg_color: Option<Color>,
    pub bg_color: Option<Color>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorderSide {
    pub style: Option<String>,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Border {
    pub left: BorderSide,
    pub right: BorderSide,
    pub top: BorderSide,
    pub bottom: BorderSide,
}

impl Border {
    /// Sides in the order classes are derived: right, left, top, bottom
    pub fn sides(&self) -> [(&'static str, &BorderSide); 4] {
        [
            ("right", &self.right),
            ("left", &self.left),
            ("top", &self.top),
            ("bottom", &self.bottom),
        ]
    }

    fn side_mut(&mut self, name: &[u8]) -> Option<&mut BorderSide> {
        match name {
            b"left" | b"start" => Some(&mut self.left),
            b"right" | b"end" => Some(&mut self.right),
            b"top" => Some(&mut self.top),
            b"bottom" => Some(&mut self.bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub wrap_text: bool,
}

/// One `cellXfs/xf` record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellXf {
    pub num_fmt_id: u32,
    pub font_id: usize,
    pub fill_id: usize,
    pub border_id: usize,
    pub alignment: Alignment,
}

/// Style delta referenced by conditional formatting rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DifferentialStyle {
    pub font: Option<Font>,
    pub fill: Option<Fill>,
    pub border: Option<Border>,
}

#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    pub num_fmts: HashMap<u32, String>,
    pub fonts: Vec<Font>,
    pub fills: Vec<Fill>,
    pub borders: Vec<Border>,
    pub cell_xfs: Vec<CellXf>,
    pub dxfs: Vec<DifferentialStyle>,
}

impl Stylesheet {
    /// Number format code for a cell style index
    pub fn format_code(&self, style_id: usize) -> &str {
        let num_fmt_id = self.cell_xfs.get(style_id).map(|xf| xf.num_fmt_id).unwrap_or(0);
        self.num_fmts
            .get(&num_fmt_id)
            .map(String::as_str)
            .or_else(|| builtin_format(num_fmt_id))
            .unwrap_or("General")
    }
}

/// Built-in number formats that are not written to `styles.xml`
pub fn builtin_format(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    Fonts,
    Fills,
    Borders,
    CellXfs,
    Dxfs,
}

/// Parse `xl/styles.xml`
pub fn parse_styles<R: BufRead>(source: R) -> Result<Stylesheet> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut styles = Stylesheet::default();
    let mut section = Section::None;
    let mut font: Option<Font> = None;
    let mut fill: Option<Fill> = None;
    let mut border: Option<Border> = None;
    let mut side: Option<Vec<u8>> = None;
    let mut xf: Option<CellXf> = None;
    let mut dxf: Option<DifferentialStyle> = None;

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        let (e, is_empty) = match &event {
            Event::Start(e) => (Some(e.clone()), false),
            Event::Empty(e) => (Some(e.clone()), true),
            Event::End(end) => {
                match end.local_name().as_ref() {
                    b"fonts" | b"fills" | b"borders" | b"cellXfs" | b"dxfs" => {
                        section = Section::None
                    }
                    b"font" => finish_font(&mut styles, section, &mut dxf, font.take()),
                    b"fill" => finish_fill(&mut styles, section, &mut dxf, fill.take()),
                    b"border" => finish_border(&mut styles, section, &mut dxf, border.take()),
                    b"left" | b"right" | b"top" | b"bottom" | b"start" | b"end" => side = None,
                    b"xf" => {
                        if let Some(done) = xf.take() {
                            styles.cell_xfs.push(done);
                        }
                    }
                    b"dxf" => {
                        if let Some(done) = dxf.take() {
                            styles.dxfs.push(done);
                        }
                    }
                    _ => {}
                }
                (None, false)
            }
            Event::Eof => break,
            _ => (None, false),
        };

        if let Some(e) = e {
            match e.local_name().as_ref() {
                b"numFmt" => {
                    let id = attr_value(&e, b"numFmtId").and_then(|v| v.parse::<u32>().ok());
                    let code = attr_value(&e, b"formatCode");
                    if let (Some(id), Some(code)) = (id, code)
                        && !code.is_empty()
                    {
                        styles.num_fmts.insert(id, code);
                    }
                }
                b"fonts" if !is_empty => section = Section::Fonts,
                b"fills" if !is_empty => section = Section::Fills,
                b"borders" if !is_empty => section = Section::Borders,
                b"cellXfs" if !is_empty => section = Section::CellXfs,
                b"dxfs" if !is_empty => section = Section::Dxfs,
                b"dxf" => {
                    if is_empty {
                        styles.dxfs.push(DifferentialStyle::default());
                    } else {
                        dxf = Some(DifferentialStyle::default());
                    }
                }
                b"font" => {
                    if is_empty {
                        finish_font(&mut styles, section, &mut dxf, Some(Font::default()));
                    } else {
                        font = Some(Font::default());
                    }
                }
                b"b" | b"i" | b"u" | b"sz" if font.is_some() => {
                    if let Some(font) = font.as_mut() {
                        apply_font_property(font, &e);
                    }
                }
                b"fill" => {
                    if is_empty {
                        finish_fill(&mut styles, section, &mut dxf, Some(Fill::default()));
                    } else {
                        fill = Some(Fill::default());
                    }
                }
                b"patternFill" => {
                    if let Some(fill) = fill.as_mut() {
                        fill.pattern_type = attr_value(&e, b"patternType");
                    }
                }
                b"fgColor" => {
                    if let Some(fill) = fill.as_mut() {
                        fill.fg_color = Color::from_element(&e);
                    }
                }
                b"bgColor" => {
                    if let Some(fill) = fill.as_mut() {
                        fill.bg_color = Color::from_element(&e);
                    }
                }
                b"border" => {
                    if is_empty {
                        finish_border(&mut styles, section, &mut dxf, Some(Border::default()));
                    } else {
                        border = Some(Border::default());
                    }
                }
                name @ (b"left" | b"right" | b"top" | b"bottom" | b"start" | b"end") => {
                    if let Some(border) = border.as_mut()
                        && let Some(target) = border.side_mut(name)
                    {
                        target.style = attr_value(&e, b"style");
                        if !is_empty {
                            side = Some(name.to_vec());
                        }
                    }
                }
                b"color" => {
                    if let (Some(border), Some(name)) = (border.as_mut(), side.as_deref()) {
                        if let Some(target) = border.side_mut(name) {
                            target.color = Color::from_element(&e);
                        }
                    } else if let Some(font) = font.as_mut() {
                        font.color = Color::from_element(&e);
                    }
                }
                b"xf" if section == Section::CellXfs => {
                    let parsed = CellXf {
                        num_fmt_id: parse_index(&e, b"numFmtId") as u32,
                        font_id: parse_index(&e, b"fontId"),
                        fill_id: parse_index(&e, b"fillId"),
                        border_id: parse_index(&e, b"borderId"),
                        alignment: Alignment::default(),
                    };
                    if is_empty {
                        styles.cell_xfs.push(parsed);
                    } else {
                        xf = Some(parsed);
                    }
                }
                b"alignment" => {
                    if let Some(xf) = xf.as_mut() {
                        xf.alignment = Alignment {
                            horizontal: attr_value(&e, b"horizontal"),
                            vertical: attr_value(&e, b"vertical"),
                            wrap_text: attr_flag(&e, b"wrapText"),
                        };
                    }
                }
                _ => {}
            }
        }
        buf.clear();
    }

    Ok(styles)
}

fn parse_index(e: &BytesStart<'_>, name: &[u8]) -> usize {
    attr_value(e, name)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}

fn apply_font_property(font: &mut Font, e: &BytesStart<'_>) {
    let val = attr_value(e, b"val");
    match e.local_name().as_ref() {
        b"b" => font.bold = val.is_none_or(|v| v != "0" && v != "false"),
        b"i" => font.italic = val.is_none_or(|v| v != "0" && v != "false"),
        b"u" => font.underline = val.is_none_or(|v| v != "none"),
        b"sz" => font.size = val.and_then(|v| v.parse::<f64>().ok()),
        _ => {}
    }
}

fn finish_font(
    styles: &mut Stylesheet,
    section: Section,
    dxf: &mut Option<DifferentialStyle>,
    font: Option<Font>,
) {
    let Some(font) = font else { return };
    if let Some(dxf) = dxf.as_mut() {
        dxf.font = Some(font);
    } else if section == Section::Fonts {
        styles.fonts.push(font);
    }
}

fn finish_fill(
    styles: &mut Stylesheet,
    section: Section,
    dxf: &mut Option<DifferentialStyle>,
    fill: Option<Fill>,
) {
    let Some(fill) = fill else { return };
    if let Some(dxf) = dxf.as_mut() {
        dxf.fill = Some(fill);
    } else if section == Section::Fills {
        styles.fills.push(fill);
    }
}

fn finish_border(
    styles: &mut Stylesheet,
    section: Section,
    dxf: &mut Option<DifferentialStyle>,
    border: Option<Border>,
) {
    let Some(border) = border else { return };
    if let Some(dxf) = dxf.as_mut() {
        dxf.border = Some(border);
    } else if section == Section::Borders {
        styles.borders.push(border);
    }
}

/// Parse the color scheme of `xl/theme/theme1.xml` into `AARRGGBB` entries,
/// in document order (dk1, lt1, dk2, lt2, accent1..6, hlink, folHlink)
pub fn parse_theme_colors<R: BufRead>(source: R) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut colors = Vec::new();
    let mut in_scheme = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"clrScheme" => in_scheme = true,
            Event::End(e) if e.local_name().as_ref() == b"clrScheme" => in_scheme = false,
            Event::Start(e) | Event::Empty(e) if in_scheme => match e.local_name().as_ref() {
                b"srgbClr" => {
                    if let Some(val) = attr_value(&e, b"val") {
                        colors.push(format!("FF{}", val.to_ascii_uppercase()));
                    }
                }
                b"sysClr" => {
                    if let Some(val) = attr_value(&e, b"lastClr") {
                        colors.push(format!("FF{}", val.to_ascii_uppercase()));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(colors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="0.000"/></numFmts>
  <fonts count="2">
    <font><sz val="11"/><color theme="1"/><name val="Calibri"/></font>
    <font><b/><i/><u/><sz val="14"/><color rgb="FFFF0000"/></font>
  </fonts>
  <fills count="2">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FF00FF00"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <borders count="2">
    <border><left/><right/><top/><bottom/><diagonal/></border>
    <border><left style="thin"><color rgb="FF000000"/></left><right style="medium"/><top/><bottom style="dashed"><color theme="4" tint="0.5"/></bottom></border>
  </borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
    <xf numFmtId="164" fontId="1" fillId="1" borderId="1" applyAlignment="1"><alignment horizontal="center" vertical="top" wrapText="1"/></xf>
  </cellXfs>
  <dxfs count="1">
    <dxf><font><b/><color rgb="FF9C0006"/></font><fill><patternFill><bgColor rgb="FFFFC7CE"/></patternFill></fill></dxf>
  </dxfs>
</styleSheet>"#;

    #[test]
    fn test_parse_styles() {
        let styles = parse_styles(STYLES_XML.as_bytes()).unwrap();
        assert_eq!(styles.fonts.len(), 2);
        assert_eq!(styles.fills.len(), 2);
        assert_eq!(styles.borders.len(), 2);
        assert_eq!(styles.cell_xfs.len(), 2);
        assert_eq!(styles.dxfs.len(), 1);

        let font = &styles.fonts[1];
        assert!(font.bold && font.italic && font.underline);
        assert_eq!(font.size, Some(14.0));
        assert_eq!(font.color, Some(Color::rgb("FFFF0000")));
        assert_eq!(styles.fonts[0].color, Some(Color::theme(1, 0.0)));

        assert_eq!(styles.fills[1].pattern_type.as_deref(), Some("solid"));
        assert_eq!(styles.fills[1].fg_color, Some(Color::rgb("FF00FF00")));

        let border = &styles.borders[1];
        assert_eq!(border.left.style.as_deref(), Some("thin"));
        assert_eq!(border.left.color, Some(Color::rgb("FF000000")));
        assert_eq!(border.right.style.as_deref(), Some("medium"));
        assert_eq!(border.bottom.color, Some(Color::theme(4, 0.5)));
        assert_eq!(border.top.style, None);

        let xf = &styles.cell_xfs[1];
        assert_eq!(xf.font_id, 1);
        assert_eq!(xf.alignment.horizontal.as_deref(), Some("center"));
        assert!(xf.alignment.wrap_text);
        assert_eq!(styles.format_code(1), "0.000");
        assert_eq!(styles.format_code(0), "General");
        assert_eq!(styles.format_code(99), "General");

        let dxf = &styles.dxfs[0];
        assert!(dxf.font.as_ref().unwrap().bold);
        assert_eq!(
            dxf.fill.as_ref().unwrap().bg_color,
            Some(Color::rgb("FFFFC7CE"))
        );
    }

    #[test]
    fn test_parse_theme_colors() {
        let theme = r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
  <a:themeElements><a:clrScheme name="Office">
    <a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>
    <a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>
    <a:dk2><a:srgbClr val="44546A"/></a:dk2>
    <a:lt2><a:srgbClr val="e7e6e6"/></a:lt2>
    <a:accent1><a:srgbClr val="4472C4"/></a:accent1>
  </a:clrScheme></a:themeElements></a:theme>"#;
        let colors = parse_theme_colors(theme.as_bytes()).unwrap();
        assert_eq!(
            colors,
            vec!["FF000000", "FFFFFFFF", "FF44546A", "FFE7E6E6", "FF4472C4"]
        );
    }
}
