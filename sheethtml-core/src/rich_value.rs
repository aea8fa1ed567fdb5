//! Resolution of rich-value (`vm`) ids to the media parts of in-cell images.
//!
//! Excel stores in-cell pictures outside the cell value: the cell carries a
//! `vm` attribute, `xl/metadata.xml` maps value metadata records to rich value
//! indices, `xl/richData/rdrichvalue.xml` holds the rich values, whose
//! structure (`rdrichvaluestructure.xml`) tells whether they are images, and
//! `richValueRel.xml.rels` links the image relationship ids to media paths.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::{HashMap, HashSet};
use std::io::BufReader;
use tracing::{debug, warn};

use crate::error::RichValueError;
use crate::reader::PartSource;
use crate::reader::parser_utils::attr_value;
use crate::reader::xlsx_parser::read_relationships;

pub const METADATA_XML: &str = "xl/metadata.xml";
pub const RICH_VALUE_REL_RELS: &str = "xl/richData/_rels/richValueRel.xml.rels";
pub const RICH_VALUE_REL_XML: &str = "xl/richData/richValueRel.xml";
pub const RICH_VALUE_XML: &str = "xl/richData/rdrichvalue.xml";
pub const RICH_VALUE_STRUCTURE_XML: &str = "xl/richData/rdrichvaluestructure.xml";

const REQUIRED_PARTS: [&str; 4] = [
    RICH_VALUE_REL_RELS,
    METADATA_XML,
    RICH_VALUE_XML,
    RICH_VALUE_STRUCTURE_XML,
];

const IMAGE_STRUCTURE_TYPES: [&str; 1] = ["_localImage"];

/// `vm` id (1-based, as exposed on cells) to package path of the image
pub type RichValueMap = HashMap<u32, String>;

/// Build the `vm` id to media target map.
///
/// Fails closed: when any required part is missing nothing is resolved.
pub fn resolve_rich_values<S: PartSource>(package: &mut S) -> Result<RichValueMap, RichValueError> {
    let missing: Vec<String> = REQUIRED_PARTS
        .iter()
        .filter(|part| !package.has_part(part))
        .map(|part| part.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(RichValueError::MissingParts(missing));
    }

    let relationship_targets: HashMap<String, String> =
        read_relationships(package, RICH_VALUE_REL_RELS)
            .map_err(|err| RichValueError::Relationships {
                part: RICH_VALUE_REL_RELS.to_string(),
                message: format!("{:#}", err),
            })?
            .into_iter()
            .filter(|rel| !rel.external)
            .map(|rel| (rel.id, rel.target))
            .collect();
    debug!("Rich value relationship targets: {:?}", relationship_targets);

    let relationship_order = if package.has_part(RICH_VALUE_REL_XML) {
        let data = read(package, RICH_VALUE_REL_XML)?;
        Some(parse_relationship_order(&data).map_err(|source| xml_error(RICH_VALUE_REL_XML, source))?)
    } else {
        None
    };

    let data = read(package, RICH_VALUE_STRUCTURE_XML)?;
    let image_types = parse_image_structures(&data)
        .map_err(|source| xml_error(RICH_VALUE_STRUCTURE_XML, source))?;

    let data = read(package, RICH_VALUE_XML)?;
    let records = parse_rich_value_records(&data).map_err(|source| xml_error(RICH_VALUE_XML, source))?;
    let value_targets = rich_value_targets(
        &records,
        &image_types,
        relationship_order.as_deref(),
        &relationship_targets,
    );
    debug!("Rich value targets: {:?}", value_targets);

    let data = read(package, METADATA_XML)?;
    let value_metadata =
        parse_value_metadata(&data).map_err(|source| xml_error(METADATA_XML, source))?;
    let mut vm_targets = map_vm_ids(&value_metadata, &value_targets);
    vm_targets.retain(|vm_id, target| {
        let present = package.has_part(target);
        if !present {
            warn!("Image {} for rich value {} is not in the package", target, vm_id);
        }
        present
    });
    debug!("In-cell image targets by vm id: {:?}", vm_targets);

    Ok(vm_targets)
}

fn read<S: PartSource>(package: &mut S, part: &str) -> Result<Vec<u8>, RichValueError> {
    package.read_part(part).map_err(|source| RichValueError::Read {
        part: part.to_string(),
        source,
    })
}

fn xml_error(part: &str, source: quick_xml::Error) -> RichValueError {
    RichValueError::Xml {
        part: part.to_string(),
        source,
    }
}

/// Relationship ids of `richValueRel.xml`, in the order rich values index them
fn parse_relationship_order(data: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(BufReader::new(data));
    reader.config_mut().trim_text(true);

    let mut ids = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rel" => {
                ids.push(attr_value(&e, b"id").unwrap_or_default());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

/// Indices of the `<s>` structures that describe local images
fn parse_image_structures(data: &[u8]) -> Result<HashSet<usize>, quick_xml::Error> {
    let mut reader = Reader::from_reader(BufReader::new(data));
    reader.config_mut().trim_text(true);

    let mut image_types = HashSet::new();
    let mut index = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"s" => {
                if attr_value(&e, b"t").is_some_and(|t| IMAGE_STRUCTURE_TYPES.contains(&t.as_str())) {
                    image_types.insert(index);
                }
                index += 1;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(image_types)
}

/// One `<rv>` record: its structure attribute and the text of its child elements
#[derive(Debug, Clone, Default, PartialEq)]
struct RichValueRecord {
    structure: Option<String>,
    values: Vec<String>,
}

fn parse_rich_value_records(data: &[u8]) -> Result<Vec<RichValueRecord>, quick_xml::Error> {
    let mut reader = Reader::from_reader(BufReader::new(data));
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<RichValueRecord> = None;
    // Depth below the current <rv>, only direct children count as fields
    let mut depth = 0usize;
    let mut field_text: Option<String> = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"rv" && current.is_none() {
                    current = Some(RichValueRecord {
                        structure: attr_value(&e, b"s"),
                        values: Vec::new(),
                    });
                    depth = 0;
                } else if current.is_some() {
                    depth += 1;
                    if depth == 1 {
                        field_text = Some(String::new());
                    }
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"rv" && current.is_none() {
                    records.push(RichValueRecord {
                        structure: attr_value(&e, b"s"),
                        values: Vec::new(),
                    });
                } else if let Some(record) = current.as_mut()
                    && depth == 0
                {
                    record.values.push(String::new());
                }
            }
            Event::Text(t) => {
                if let Some(text) = field_text.as_mut() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => {
                if depth == 0 {
                    if e.local_name().as_ref() == b"rv"
                        && let Some(record) = current.take()
                    {
                        records.push(record);
                    }
                } else {
                    if depth == 1
                        && let (Some(record), Some(text)) = (current.as_mut(), field_text.take())
                    {
                        record.values.push(text);
                    }
                    depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(records)
}

/// Map rich value index to media target for image-typed records
fn rich_value_targets(
    records: &[RichValueRecord],
    image_types: &HashSet<usize>,
    relationship_order: Option<&[String]>,
    relationship_targets: &HashMap<String, String>,
) -> HashMap<usize, String> {
    let mut targets = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let is_image = record
            .structure
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .is_some_and(|s| image_types.contains(&s));
        if !is_image {
            continue;
        }
        if record.values.len() != 2 {
            debug!(
                "Skipping rich value {} with {} fields",
                index,
                record.values.len()
            );
            continue;
        }
        let Ok(rel_index) = record.values[0].trim().parse::<usize>() else {
            debug!("Skipping rich value {} with non-numeric relationship index", index);
            continue;
        };

        let rel_id = relationship_order
            .and_then(|order| order.get(rel_index).cloned())
            .unwrap_or_else(|| format!("rId{}", rel_index + 1));
        match relationship_targets.get(&rel_id) {
            Some(target) => {
                targets.insert(index, target.clone());
            }
            None => debug!("Rich value {} references unknown relationship {}", index, rel_id),
        }
    }
    targets
}

/// `v` attributes of `valueMetadata/bk/rc`, in document order
fn parse_value_metadata(data: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(BufReader::new(data));
    reader.config_mut().trim_text(true);

    let mut values = Vec::new();
    let mut in_value_metadata = false;
    let mut in_block = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"valueMetadata" => in_value_metadata = true,
                b"bk" if in_value_metadata => in_block = true,
                b"rc" if in_block => {
                    if let Some(v) = attr_value(&e, b"v") {
                        values.push(v);
                    }
                }
                _ => {}
            },
            Event::Empty(e) if in_block && e.local_name().as_ref() == b"rc" => {
                if let Some(v) = attr_value(&e, b"v") {
                    values.push(v);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"valueMetadata" => in_value_metadata = false,
                b"bk" => in_block = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(values)
}

/// The metadata record's `v` is the 0-based rich value index; cells expose it
/// 1-based through their `vm` attribute, hence the `+ 1`.
fn map_vm_ids(value_metadata: &[String], value_targets: &HashMap<usize, String>) -> RichValueMap {
    let mut vm_targets = RichValueMap::new();
    for raw in value_metadata {
        let Ok(index) = raw.trim().parse::<usize>() else {
            warn!("unable to parse value metadata index '{}'", raw);
            continue;
        };
        let Some(target) = value_targets.get(&index) else {
            continue;
        };
        let Ok(vm_id) = u32::try_from(index + 1) else {
            warn!("value metadata index '{}' is out of range", raw);
            continue;
        };
        vm_targets.insert(vm_id, target.clone());
    }
    vm_targets
}
