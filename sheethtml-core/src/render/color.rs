//! Resolution of spreadsheet color references to `AARRGGBB`

use crate::reader::styles::{Color, ColorKind};

/// Legacy indexed palette (`RRGGBB`), indices 0..=63
const INDEXED_COLORS: [&str; 64] = [
    "000000", "FFFFFF", "FF0000", "00FF00", "0000FF", "FFFF00", "FF00FF", "00FFFF", //
    "000000", "FFFFFF", "FF0000", "00FF00", "0000FF", "FFFF00", "FF00FF", "00FFFF", //
    "800000", "008000", "000080", "808000", "800080", "008080", "C0C0C0", "808080", //
    "9999FF", "993366", "FFFFCC", "CCFFFF", "660066", "FF8080", "0066CC", "CCCCFF", //
    "000080", "FF00FF", "FFFF00", "00FFFF", "800080", "800000", "008080", "0000FF", //
    "00CCFF", "CCFFFF", "CCFFCC", "FFFF99", "99CCFF", "FF99CC", "CC99FF", "FFCC99", //
    "3366FF", "33CCCC", "99CC00", "FFCC00", "FF9900", "FF6600", "666699", "969696", //
    "003366", "339966", "003300", "333300", "993300", "993366", "333399", "333333", //
];

const SYSTEM_FOREGROUND: &str = "FF000000";
const SYSTEM_BACKGROUND: &str = "FFFFFFFF";

/// Turns color references into `AARRGGBB` strings using the workbook theme
#[derive(Debug, Clone, Default)]
pub struct ColorResolver {
    theme: Vec<String>,
}

impl ColorResolver {
    pub fn new(theme: Vec<String>) -> Self {
        Self { theme }
    }

    pub fn resolve(&self, color: &Color) -> Option<String> {
        let base = match &color.kind {
            ColorKind::Rgb(rgb) => normalize_argb(rgb)?,
            ColorKind::Theme(index) => {
                // lt1/dk1 and lt2/dk2 are stored swapped in the scheme
                let index = match *index {
                    0 => 1,
                    1 => 0,
                    2 => 3,
                    3 => 2,
                    other => other,
                } as usize;
                normalize_argb(self.theme.get(index)?)?
            }
            ColorKind::Indexed(index) => match *index {
                64 => SYSTEM_FOREGROUND.to_string(),
                65 => SYSTEM_BACKGROUND.to_string(),
                i => format!("FF{}", INDEXED_COLORS.get(i as usize)?),
            },
            ColorKind::Auto => return None,
        };

        if color.tint == 0.0 {
            Some(base)
        } else {
            Some(apply_tint(&base, color.tint))
        }
    }
}

fn normalize_argb(value: &str) -> Option<String> {
    let value = value.trim().trim_start_matches('#');
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match value.len() {
        6 => Some(format!("FF{}", value.to_ascii_uppercase())),
        8 => Some(value.to_ascii_uppercase()),
        _ => None,
    }
}

/// `AARRGGBB` to a CSS `#RRGGBB` color
pub fn argb_to_css(argb: &str) -> String {
    let rgb = if argb.len() == 8 { &argb[2..] } else { argb };
    format!("#{}", rgb)
}

/// Lighten (positive) or darken (negative) a color in HSL space
pub fn apply_tint(argb: &str, tint: f64) -> String {
    let channel = |offset: usize| {
        u8::from_str_radix(argb.get(offset..offset + 2).unwrap_or("00"), 16).unwrap_or(0)
    };
    let alpha = argb.get(0..2).unwrap_or("FF");
    let (h, s, l) = rgb_to_hsl(channel(2), channel(4), channel(6));
    let l = if tint < 0.0 {
        l * (1.0 + tint)
    } else {
        l * (1.0 - tint) + tint
    };
    let (r, g, b) = hsl_to_rgb(h, s, l.clamp(0.0, 1.0));
    format!("{}{:02X}{:02X}{:02X}", alpha, r, g, b)
}

fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |mut t: f64| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    let to_byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    (
        to_byte(hue(h + 1.0 / 3.0)),
        to_byte(hue(h)),
        to_byte(hue(h - 1.0 / 3.0)),
    )
}
