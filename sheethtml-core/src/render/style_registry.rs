//! Deduplicating registry of generated CSS classes

use std::collections::HashMap;
use std::fmt;

use super::color::argb_to_css;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorderDirection {
    Left,
    Right,
    Top,
    Bottom,
}

impl BorderDirection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "left" => Some(BorderDirection::Left),
            "right" => Some(BorderDirection::Right),
            "top" => Some(BorderDirection::Top),
            "bottom" => Some(BorderDirection::Bottom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BorderDirection::Left => "left",
            BorderDirection::Right => "right",
            BorderDirection::Top => "top",
            BorderDirection::Bottom => "bottom",
        }
    }

    fn initial(&self) -> char {
        match self {
            BorderDirection::Left => 'l',
            BorderDirection::Right => 'r',
            BorderDirection::Top => 't',
            BorderDirection::Bottom => 'b',
        }
    }
}

impl fmt::Display for BorderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A style that becomes one CSS class. Colors are `AARRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StyleDescriptor {
    FontSize(u32),
    Height(u32),
    FontColor(String),
    BackgroundColor(String),
    Underline,
    Bold,
    Italic,
    Border {
        direction: BorderDirection,
        style: String,
        color: Option<String>,
    },
}

/// Width and line style for a spreadsheet border style, `None` when unsupported
pub fn border_declaration(style: &str) -> Option<(u32, &'static str)> {
    match style {
        "thin" => Some((1, "solid")),
        "medium" | "mediumDashDot" | "mediumDashDotDot" => Some((2, "solid")),
        "mediumDashed" => Some((2, "dashed")),
        "thick" => Some((3, "solid")),
        "dashed" => Some((1, "dashed")),
        "dotted" => Some((1, "dotted")),
        "double" => Some((1, "double")),
        _ => None,
    }
}

impl StyleDescriptor {
    /// Class name and CSS declarations, `None` for unsupported descriptors
    fn render(&self) -> Option<(String, Vec<String>)> {
        let rendered = match self {
            StyleDescriptor::FontSize(size) => (
                format!("xlsx_cell_font_size_{}", size),
                vec![format!("font-size: {}px", size)],
            ),
            StyleDescriptor::Height(height) => (
                format!("xlsx_element_height_{}", height),
                vec![format!("height: {}px", height)],
            ),
            StyleDescriptor::FontColor(argb) => (
                format!("xlsx_cell_font_color_{}", argb),
                vec![format!("color: {}", argb_to_css(argb))],
            ),
            StyleDescriptor::BackgroundColor(argb) => (
                format!("xlsx_cell_background_color_{}", argb),
                vec![format!("background-color: {}", argb_to_css(argb))],
            ),
            StyleDescriptor::Underline => (
                "xlsx_cell_font_underline".to_string(),
                vec!["text-decoration: underline".to_string()],
            ),
            StyleDescriptor::Bold => (
                "xlsx_cell_font_bold".to_string(),
                vec!["font-weight: bold".to_string()],
            ),
            StyleDescriptor::Italic => (
                "xlsx_cell_font_italic".to_string(),
                vec!["font-style: italic".to_string()],
            ),
            StyleDescriptor::Border {
                direction,
                style,
                color,
            } => {
                let (width, line) = border_declaration(style)?;
                let mut name = format!("border_{}_{}", style, direction.initial());
                let mut declarations = vec![
                    format!("border-{}-style: {}", direction, line),
                    format!("border-{}-width: {}px", direction, width),
                ];
                if let Some(argb) = color {
                    name.push('_');
                    name.push_str(argb);
                    declarations.push(format!("border-{}-color: {}", direction, argb_to_css(argb)));
                }
                (name, declarations)
            }
        };
        Some(rendered)
    }
}

/// Append-only map of style descriptors to class names.
///
/// One registry belongs to one conversion; class names stay stable for its
/// lifetime and rules come back in registration order.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    prefix: Option<String>,
    important: bool,
    rules: Vec<(String, String)>,
    by_descriptor: HashMap<StyleDescriptor, usize>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose class names carry `prefix` and whose declarations are
    /// marked `!important`, for overlays such as conditional formatting
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            important: true,
            ..Self::default()
        }
    }

    /// Register a descriptor and return its class name
    pub fn register(&mut self, descriptor: StyleDescriptor) -> Option<String> {
        if let Some(&index) = self.by_descriptor.get(&descriptor) {
            return Some(self.rules[index].0.clone());
        }

        let (base_name, declarations) = descriptor.render()?;
        let class_name = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, base_name),
            None => base_name,
        };
        let suffix = if self.important { " !important;" } else { ";" };
        let body = declarations
            .iter()
            .map(|d| format!("{}{}", d, suffix))
            .collect::<Vec<_>>()
            .join(" ");

        self.rules.push((class_name.clone(), body));
        self.by_descriptor.insert(descriptor, self.rules.len() - 1);
        Some(class_name)
    }

    pub fn register_border(
        &mut self,
        style: &str,
        direction: BorderDirection,
        color: Option<String>,
    ) -> Option<String> {
        self.register(StyleDescriptor::Border {
            direction,
            style: style.to_string(),
            color,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// CSS rules in registration order
    pub fn get_rules(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|(name, body)| format!(".{} {{ {} }}", name, body))
            .collect()
    }

    pub fn css(&self) -> String {
        self.get_rules().join("\n")
    }
}
