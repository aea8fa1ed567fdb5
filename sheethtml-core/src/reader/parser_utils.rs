//! Common parsing utilities shared by the package parsers

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::workbook::{CellRange, CellRef};

/// Parse a cell reference like "A1" or "$B$2" into a 1-based [`CellRef`]
pub fn parse_cell_ref(cell_ref: &str) -> Option<CellRef> {
    let mut col = 0u32;
    let mut row_str = String::new();

    for ch in cell_ref.chars() {
        if ch == '$' {
            continue;
        }
        if ch.is_ascii_alphabetic() {
            if !row_str.is_empty() {
                return None;
            }
            col = col
                .checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        } else if ch.is_ascii_digit() {
            row_str.push(ch);
        } else {
            return None;
        }
    }

    if row_str.is_empty() || col == 0 {
        return None;
    }

    let row = row_str.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }

    Some(CellRef::new(row, col))
}

/// Parse a range like "A1:B2" (or a single cell "A1") into a [`CellRange`]
pub fn parse_cell_range(range: &str) -> Option<CellRange> {
    let parts: Vec<&str> = range.split(':').collect();
    match parts.as_slice() {
        [single] => {
            let cell = parse_cell_ref(single)?;
            Some(CellRange::new(cell, cell))
        }
        [start, end] => {
            let start = parse_cell_ref(start)?;
            let end = parse_cell_ref(end)?;
            Some(CellRange::new(start, end))
        }
        _ => None,
    }
}

/// Parse a space separated list of ranges (`sqref`)
pub fn parse_sqref(sqref: &str) -> Vec<CellRange> {
    sqref.split_whitespace().filter_map(parse_cell_range).collect()
}

/// Convert a 1-based column number to letters (1 -> A, 27 -> AA)
pub fn column_letter(mut col: u32) -> String {
    let mut result = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        result.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    result.reverse();
    String::from_utf8(result).unwrap_or_default()
}

/// Read text content from an XML node
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Get an attribute value by its local name (ignores namespace prefixes)
pub fn attr_value(e: &BytesStart<'_>, local_name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == local_name {
            attr.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Interpret an OOXML boolean attribute ("1", "true")
pub fn attr_flag(e: &BytesStart<'_>, local_name: &[u8]) -> bool {
    attr_value(e, local_name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Resolve a relationship target against the part that owns the `.rels` file.
///
/// `rels_path` is the path of the `.rels` part itself, e.g.
/// `xl/richData/_rels/richValueRel.xml.rels`, whose base directory is `xl/richData`.
pub fn resolve_relationship_target(rels_path: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize_part_path(absolute);
    }

    let base_dir = rels_path
        .rsplit_once("/_rels/")
        .map(|(dir, _)| dir)
        .or_else(|| rels_path.strip_prefix("_rels/").map(|_| ""))
        .unwrap_or("");

    if base_dir.is_empty() {
        normalize_part_path(target)
    } else {
        normalize_part_path(&format!("{}/{}", base_dir, target))
    }
}

/// Path of the `.rels` part that belongs to `part` (`xl/worksheets/sheet1.xml`
/// -> `xl/worksheets/_rels/sheet1.xml.rels`)
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn normalize_part_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
