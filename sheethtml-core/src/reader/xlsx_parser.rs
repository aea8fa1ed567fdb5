//! XML parsing of the XLSX workbook, worksheet and shared string parts

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufReader;
use tracing::{debug, warn};

use super::drawings::load_drawing_images;
use super::parser_utils::{
    attr_flag, attr_value, parse_cell_range, parse_cell_ref, parse_sqref, read_text_node,
    rels_path_for, resolve_relationship_target,
};
use super::styles::{Stylesheet, parse_styles, parse_theme_colors};
use super::workbook::{
    Cell, CellValue, CfRule, ColumnDimension, ConditionalFormatting, Hyperlink, RowDimension,
    Sheet, SheetState,
};
use super::{PartSource, WorkbookReader};

const WORKBOOK_XML: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_XML: &str = "xl/sharedStrings.xml";
const STYLES_XML: &str = "xl/styles.xml";
const THEME_XML: &str = "xl/theme/theme1.xml";

/// One `<Relationship>` entry of a `.rels` part
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    /// Package path for internal targets, the raw target for external ones
    pub target: String,
    pub external: bool,
}

/// Read a `.rels` part, resolving internal targets against its owner part
pub fn read_relationships<S: PartSource>(package: &mut S, rels_path: &str) -> Result<Vec<Relationship>> {
    let data = package
        .read_part(rels_path)
        .with_context(|| format!("Failed to read {}", rels_path))?;
    let mut reader = Reader::from_reader(BufReader::new(data.as_slice()));
    reader.config_mut().trim_text(true);

    let mut relationships = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let id = attr_value(&e, b"Id").unwrap_or_default();
                    let target = attr_value(&e, b"Target").unwrap_or_default();
                    let external = attr_value(&e, b"TargetMode")
                        .is_some_and(|mode| mode.eq_ignore_ascii_case("External"));
                    let target = if external {
                        target
                    } else {
                        resolve_relationship_target(rels_path, &target)
                    };
                    relationships.push(Relationship {
                        id,
                        target,
                        external,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

/// Same as [`read_relationships`] but keyed by id; a missing `.rels` part is empty
fn relationship_map<S: PartSource>(package: &mut S, rels_path: &str) -> Result<HashMap<String, Relationship>> {
    if !package.has_part(rels_path) {
        return Ok(HashMap::new());
    }
    Ok(read_relationships(package, rels_path)?
        .into_iter()
        .map(|rel| (rel.id.clone(), rel))
        .collect())
}

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    state: SheetState,
    rel_id: String,
}

/// Hyperlink as declared in the sheet, before the relationship is resolved
struct RawHyperlink {
    reference: String,
    rel_id: Option<String>,
    location: Option<String>,
}

#[derive(Default)]
struct SheetLinks {
    hyperlinks: Vec<RawHyperlink>,
    drawing_ids: Vec<String>,
}

pub struct XlsxReader<'a, S: PartSource> {
    package: &'a mut S,
    shared_strings: Vec<String>,
}

impl<'a, S: PartSource> XlsxReader<'a, S> {
    pub fn new(package: &'a mut S) -> Result<Self> {
        let shared_strings = extract_shared_strings(package)?;
        Ok(Self {
            package,
            shared_strings,
        })
    }

    fn sheet_entries(&mut self) -> Result<Vec<SheetEntry>> {
        let data = self
            .package
            .read_part(WORKBOOK_XML)
            .context("Failed to find xl/workbook.xml")?;
        let mut reader = Reader::from_reader(BufReader::new(data.as_slice()));
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    if e.local_name().as_ref() == b"sheet" {
                        entries.push(SheetEntry {
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            state: attr_value(&e, b"state")
                                .map(|s| SheetState::from_attr(&s))
                                .unwrap_or_default(),
                            rel_id: attr_value(&e, b"id").unwrap_or_default(),
                        });
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(entries)
    }

    fn read_sheet(&mut self, sheet: &mut Sheet, path: &str) -> Result<()> {
        let data = self
            .package
            .read_part(path)
            .with_context(|| format!("Failed to read {}", path))?;
        let links = parse_sheet_xml(&data, &self.shared_strings, sheet)
            .with_context(|| format!("Failed to parse sheet '{}'", sheet.name))?;

        let rels = relationship_map(self.package, &rels_path_for(path))?;

        for link in links.hyperlinks {
            let target = link
                .rel_id
                .as_ref()
                .and_then(|id| rels.get(id))
                .map(|rel| rel.target.clone());
            let hyperlink = Hyperlink {
                target,
                location: link.location,
            };
            let Some(range) = parse_cell_range(&link.reference) else {
                warn!("Invalid hyperlink reference '{}' in '{}'", link.reference, sheet.name);
                continue;
            };
            for cell_ref in range.cells() {
                sheet
                    .cells
                    .entry((cell_ref.row, cell_ref.col))
                    .or_insert_with(|| Cell::new(cell_ref.row, cell_ref.col, CellValue::Empty))
                    .hyperlink = Some(hyperlink.clone());
            }
        }

        for drawing_id in links.drawing_ids {
            let Some(rel) = rels.get(&drawing_id) else {
                warn!("Drawing relationship '{}' not found for '{}'", drawing_id, sheet.name);
                continue;
            };
            match load_drawing_images(self.package, &rel.target) {
                Ok(images) => sheet.images.extend(images),
                Err(err) => warn!(
                    "Unable to read drawing '{}' of sheet '{}': {:#}",
                    rel.target, sheet.name, err
                ),
            }
        }

        Ok(())
    }
}

impl<'a, S: PartSource> WorkbookReader for XlsxReader<'a, S> {
    fn read_sheets(&mut self) -> Result<Vec<Sheet>> {
        let entries = self.sheet_entries()?;
        let rels = relationship_map(self.package, WORKBOOK_RELS)?;

        let mut sheets = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let path = rels
                .get(&entry.rel_id)
                .map(|rel| rel.target.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Relationship '{}' not found for sheet '{}'",
                        entry.rel_id,
                        entry.name
                    )
                })?;

            let mut sheet = Sheet::new(entry.name, index);
            sheet.state = entry.state;
            self.read_sheet(&mut sheet, &path)?;
            debug!(
                "Read sheet[{}] '{}' with {} cells",
                index,
                sheet.name,
                sheet.cells.len()
            );
            sheets.push(sheet);
        }

        Ok(sheets)
    }

    fn read_styles(&mut self) -> Result<Stylesheet> {
        if !self.package.has_part(STYLES_XML) {
            return Ok(Stylesheet::default());
        }
        let data = self.package.read_part(STYLES_XML)?;
        parse_styles(BufReader::new(data.as_slice())).context("Failed to parse xl/styles.xml")
    }

    fn read_theme_colors(&mut self) -> Result<Vec<String>> {
        if !self.package.has_part(THEME_XML) {
            return Ok(Vec::new());
        }
        let data = self.package.read_part(THEME_XML)?;
        parse_theme_colors(BufReader::new(data.as_slice()))
            .context("Failed to parse xl/theme/theme1.xml")
    }
}

fn parse_sheet_xml(data: &[u8], shared_strings: &[String], sheet: &mut Sheet) -> Result<SheetLinks> {
    let mut reader = Reader::from_reader(BufReader::new(data));
    reader.config_mut().trim_text(true);

    let mut links = SheetLinks::default();
    let mut current_row = 0u32;
    let mut current_col = 0u32;
    let mut current_cf: Option<ConditionalFormatting> = None;
    let mut current_rule: Option<CfRule> = None;

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"col" => {
                    let min = attr_value(&e, b"min").and_then(|v| v.parse::<u32>().ok());
                    let max = attr_value(&e, b"max").and_then(|v| v.parse::<u32>().ok());
                    if let (Some(min), Some(max)) = (min, max) {
                        sheet.column_dimensions.push(ColumnDimension {
                            min,
                            max,
                            width: attr_value(&e, b"width").and_then(|v| v.parse::<f64>().ok()),
                            custom_width: attr_flag(&e, b"customWidth"),
                            hidden: attr_flag(&e, b"hidden"),
                        });
                    } else {
                        warn!(
                            "Ignoring column override without a valid min/max in '{}'",
                            sheet.name
                        );
                    }
                }
                b"row" => {
                    if let Some(r) = attr_value(&e, b"r").and_then(|v| v.parse::<u32>().ok()) {
                        current_row = r;
                    } else {
                        current_row += 1;
                    }
                    current_col = 0;
                    let dimension = RowDimension {
                        height: attr_value(&e, b"ht").and_then(|v| v.parse::<f64>().ok()),
                        custom_height: attr_flag(&e, b"customHeight"),
                        hidden: attr_flag(&e, b"hidden"),
                    };
                    if dimension != RowDimension::default() {
                        sheet.row_dimensions.insert(current_row, dimension);
                    }
                }
                b"c" => {
                    let t_attr = attr_value(&e, b"t").unwrap_or_default();
                    let style_id = attr_value(&e, b"s")
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    let vm = attr_value(&e, b"vm")
                        .and_then(|v| v.parse::<u32>().ok())
                        .filter(|vm| *vm > 0);

                    let position = attr_value(&e, b"r").and_then(|r| parse_cell_ref(&r));
                    let (row, col) = match position {
                        Some(cell_ref) => (cell_ref.row, cell_ref.col),
                        None => (current_row, current_col + 1),
                    };
                    current_col = col;

                    let value = if is_start {
                        parse_cell_contents(&mut reader, &t_attr, shared_strings)?
                    } else {
                        CellValue::Empty
                    };

                    let mut cell = Cell::new(row, col, value).with_style(style_id);
                    cell.rich_value_id = vm;
                    sheet.insert_cell(cell);
                }
                b"mergeCell" => {
                    if let Some(reference) = attr_value(&e, b"ref") {
                        match parse_cell_range(&reference) {
                            Some(range) => sheet.merged_cells.push(range),
                            None => warn!("Invalid merge range '{}' in '{}'", reference, sheet.name),
                        }
                    }
                }
                b"hyperlink" => {
                    if let Some(reference) = attr_value(&e, b"ref") {
                        links.hyperlinks.push(RawHyperlink {
                            reference,
                            rel_id: attr_value(&e, b"id"),
                            location: attr_value(&e, b"location"),
                        });
                    }
                }
                b"drawing" => {
                    if let Some(id) = attr_value(&e, b"id") {
                        links.drawing_ids.push(id);
                    }
                }
                b"conditionalFormatting" => {
                    let cf = ConditionalFormatting {
                        ranges: attr_value(&e, b"sqref")
                            .map(|sqref| parse_sqref(&sqref))
                            .unwrap_or_default(),
                        rules: Vec::new(),
                    };
                    if is_start {
                        current_cf = Some(cf);
                    }
                }
                b"cfRule" if current_cf.is_some() => {
                    let rule = CfRule {
                        rule_type: attr_value(&e, b"type").unwrap_or_default(),
                        dxf_id: attr_value(&e, b"dxfId").and_then(|v| v.parse::<usize>().ok()),
                        priority: attr_value(&e, b"priority")
                            .and_then(|v| v.parse::<i64>().ok())
                            .unwrap_or(i64::MAX),
                        stop_if_true: attr_flag(&e, b"stopIfTrue"),
                        operator: attr_value(&e, b"operator"),
                        text: attr_value(&e, b"text"),
                        formulas: Vec::new(),
                    };
                    if is_start {
                        current_rule = Some(rule);
                    } else if let Some(cf) = current_cf.as_mut() {
                        cf.rules.push(rule);
                    }
                }
                b"formula" if is_start => {
                    let text = read_text_node(&mut reader)?;
                    if let Some(rule) = current_rule.as_mut() {
                        rule.formulas.push(text);
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"cfRule" => {
                    if let (Some(rule), Some(cf)) = (current_rule.take(), current_cf.as_mut()) {
                        cf.rules.push(rule);
                    }
                }
                b"conditionalFormatting" => {
                    if let Some(cf) = current_cf.take() {
                        sheet.conditional_formatting.push(cf);
                    }
                }
                b"worksheet" => break,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(links)
}

fn parse_cell_contents<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    t_attr: &str,
    shared_strings: &[String],
) -> Result<CellValue> {
    let mut raw_value: Option<String> = None;
    let mut inline_text: Option<String> = None;
    let mut formula: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"v" => {
                    raw_value = Some(if is_start {
                        read_text_node(reader)?
                    } else {
                        String::new()
                    });
                }
                b"f" if is_start => {
                    let text = read_text_node(reader)?;
                    if !text.is_empty() {
                        formula = Some(text.trim_start_matches('=').to_string());
                    }
                }
                b"is" if is_start => {
                    // Inline string can have multiple <t> tags
                    let mut text = String::new();
                    let mut is_buf = Vec::new();
                    loop {
                        match reader.read_event_into(&mut is_buf)? {
                            Event::Start(ref ee) if ee.name().as_ref() == b"t" => {
                                text.push_str(&read_text_node(reader)?);
                            }
                            Event::End(ref ee) if ee.name().as_ref() == b"is" => break,
                            Event::Eof => break,
                            _ => {}
                        }
                        is_buf.clear();
                    }
                    inline_text = Some(text);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let value = match (t_attr, raw_value, inline_text) {
        ("inlineStr", _, Some(text)) => CellValue::Text(text),
        (_, None, _) => CellValue::Empty,
        ("s", Some(v), _) => {
            let idx = v.parse::<usize>().unwrap_or(0);
            CellValue::Text(shared_strings.get(idx).cloned().unwrap_or_default())
        }
        ("b", Some(v), _) => CellValue::Boolean(v == "1" || v.eq_ignore_ascii_case("true")),
        ("e", Some(v), _) => CellValue::Error(v),
        ("str", Some(v), _) => CellValue::Text(v),
        ("d", Some(v), _) => parse_iso_datetime(&v)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Text(v)),
        (_, Some(v), _) => match v.parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(v),
        },
    };

    Ok(match formula {
        Some(f) => CellValue::formula(f, value),
        None => value,
    })
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn extract_shared_strings<S: PartSource>(package: &mut S) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    if !package.has_part(SHARED_STRINGS_XML) {
        return Ok(strings);
    }
    let data = package.read_part(SHARED_STRINGS_XML)?;

    let mut reader = Reader::from_reader(BufReader::new(data.as_slice()));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_string = String::new();
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"rPh" => in_phonetic = true,
            Event::End(e) if e.name().as_ref() == b"rPh" => in_phonetic = false,
            Event::Start(e) if e.name().as_ref() == b"t" => {
                let text = read_text_node(&mut reader)?;
                if !in_phonetic {
                    current_string.push_str(&text);
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) if e.name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current_string));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}
