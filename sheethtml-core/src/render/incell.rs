//! CSS for images embedded in cells through rich values

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, ImageReader};
use std::collections::BTreeSet;
use std::io::Cursor;
use tracing::{debug, warn};

use super::layout::{PlacementBox, rich_value_class};
use crate::reader::PartSource;
use crate::rich_value::RichValueMap;

/// Intrinsic `(width, height)` of an encoded image, read from its header
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// Mime type from the part name, falling back to the image signature
pub fn mime_type(bytes: &[u8], target: &str) -> &'static str {
    ImageFormat::from_path(target)
        .or_else(|_| image::guess_format(bytes))
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

pub fn data_uri(bytes: &[u8], target: &str) -> String {
    format!("data:{};base64,{}", mime_type(bytes, target), STANDARD.encode(bytes))
}

/// Content and sizing rules for every rich-value image used by the rendered
/// sheets. Ids whose target cannot be loaded get no rules at all.
pub fn generate_incell_css<S: PartSource>(
    used_ids: &BTreeSet<u32>,
    boxes: &[PlacementBox],
    rich_values: &RichValueMap,
    package: &mut S,
) -> String {
    let mut rules = Vec::new();
    for &vm_id in used_ids {
        let Some(target) = rich_values.get(&vm_id) else {
            warn!("No image target for rich value {}", vm_id);
            continue;
        };
        if !package.has_part(target) {
            warn!("Image {} for rich value {} is not in the package", target, vm_id);
            continue;
        }
        let bytes = match package.read_part(target) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Unable to read image {}: {}", target, e);
                continue;
            }
        };

        rules.push(format!(
            ".{} img {{ content:url(\"{}\"); display:block; }}",
            rich_value_class(vm_id),
            data_uri(&bytes, target)
        ));

        let dimensions = match probe_dimensions(&bytes) {
            Ok((w, h)) if w > 0 && h > 0 => Some((w, h)),
            Ok(_) => None,
            Err(e) => {
                warn!("Unable to read dimensions of {}: {}", target, e);
                None
            }
        };

        for placement in boxes.iter().filter(|b| b.vm_id == vm_id) {
            rules.push(sizing_rule(placement, dimensions));
        }
    }
    debug!("Generated {} in-cell image rules", rules.len());
    rules.join("\n")
}

fn sizing_rule(placement: &PlacementBox, dimensions: Option<(u32, u32)>) -> String {
    let Some((width, height)) = dimensions else {
        return format!(
            ".{} img {{ width: 100%; height: 100%; max-width: 100%; max-height: 100%; object-fit: contain; }}",
            placement.class_name
        );
    };
    let image_ratio = width as f64 / height as f64;
    let cell_ratio = placement.width as f64 / placement.height.max(1) as f64;
    let fit = if image_ratio >= cell_ratio {
        "width: 100%; height: auto;"
    } else {
        "width: auto; height: 100%;"
    };
    format!(
        ".{} img {{ {} max-width: 100%; max-height: 100%; object-fit: contain; aspect-ratio: {} / {}; }}",
        placement.class_name, fit, width, height
    )
}
