//! Display text of cell values according to their number format

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::html::escape_html;
use crate::reader::workbook::{Cell, CellValue};

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Formats cell values for one locale
#[derive(Debug, Clone)]
pub struct CellFormatter {
    decimal_separator: char,
    group_separator: char,
}

impl Default for CellFormatter {
    fn default() -> Self {
        Self::new("en_US")
    }
}

impl CellFormatter {
    pub fn new(locale: &str) -> Self {
        let language = locale
            .split(['_', '-', '.'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (decimal_separator, group_separator) = match language.as_str() {
            "es" | "de" | "pt" | "it" | "nl" => (',', '.'),
            "fr" => (',', '\u{a0}'),
            _ => ('.', ','),
        };
        Self {
            decimal_separator,
            group_separator,
        }
    }

    /// HTML content of a cell: escaped text, line breaks, hyperlink
    pub fn format_cell(&self, cell: &Cell, format_code: &str) -> String {
        let text = escape_html(&self.format_value(&cell.value, format_code)).replace('\n', "<br>");
        match cell.hyperlink.as_ref().and_then(|link| link.href()) {
            Some(href) => format!("<a href=\"{}\">{}</a>", escape_html(&href), text),
            None => text,
        }
    }

    /// Plain display text of a value
    pub fn format_value(&self, value: &CellValue, format_code: &str) -> String {
        match value.result() {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => format_text(text, format_code),
            CellValue::Number(n) => self.format_number(*n, format_code),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Date(dt) => {
                let sections = split_sections(format_code);
                match sections.first() {
                    Some(section) if is_date_section(section) => {
                        format_datetime(*dt, datetime_to_serial(*dt), section)
                    }
                    _ if dt.time() == chrono::NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
                    _ => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                }
            }
            CellValue::Error(err) => err.clone(),
            CellValue::Formula { .. } => String::new(),
        }
    }

    pub fn format_number(&self, value: f64, format_code: &str) -> String {
        if !value.is_finite() {
            return "#NUM!".to_string();
        }
        let sections = split_sections(format_code);
        let (section, magnitude, explicit_sign) = if value < 0.0 && sections.len() >= 2 {
            (sections[1].as_str(), -value, true)
        } else if value == 0.0 && sections.len() >= 3 {
            (sections[2].as_str(), 0.0, true)
        } else {
            (sections.first().map(String::as_str).unwrap_or(""), value.abs(), false)
        };

        let section = strip_brackets(section);
        let body = if section.trim().is_empty() || section.trim().eq_ignore_ascii_case("general") {
            self.general(magnitude)
        } else if is_date_section(&section) {
            // Dates are never negative, the sign is meaningless here
            return match serial_to_datetime(value) {
                Some(dt) => format_datetime(dt, value, &section),
                None => "#".repeat(8),
            };
        } else if !has_digit_placeholder(&section) {
            render_literal_section(&section, &self.general(magnitude))
        } else {
            self.apply_pattern(magnitude, &section)
        };

        if value < 0.0 && !explicit_sign && !is_zero_display(&body) {
            format!("-{}", body)
        } else {
            body
        }
    }

    /// General format: integers as-is, otherwise up to 10 significant digits
    pub fn general(&self, value: f64) -> String {
        let abs = value.abs();
        let text = if value.fract() == 0.0 && abs < 1e15 {
            format!("{}", value as i64)
        } else if abs != 0.0 && !(1e-9..1e15).contains(&abs) {
            scientific(value, 5, 2, true)
        } else {
            let magnitude = abs.log10().floor() as i32;
            let decimals = (9 - magnitude).clamp(0, 15) as usize;
            trim_fraction(&format!("{:.*}", decimals, value))
        };
        text.replace('.', &self.decimal_separator.to_string())
    }

    fn apply_pattern(&self, value: f64, section: &str) -> String {
        let parsed = NumberPattern::parse(section);
        let mut scaled = value * 100f64.powi(parsed.percent as i32);
        scaled /= 1000f64.powi(parsed.scale as i32);

        let number = match parsed.exponent_digits {
            Some(exp_digits) => {
                let mantissa = scientific(scaled, parsed.frac_max, exp_digits, parsed.exponent_plus);
                mantissa.replace('.', &self.decimal_separator.to_string())
            }
            None => self.fixed(scaled, &parsed),
        };
        format!("{}{}{}", parsed.prefix, number, parsed.suffix)
    }

    fn fixed(&self, value: f64, pattern: &NumberPattern) -> String {
        let rendered = format!("{:.*}", pattern.frac_max, value);
        let (int_part, frac_part) = rendered.split_once('.').unwrap_or((&rendered, ""));

        let mut frac = frac_part.to_string();
        while frac.len() > pattern.frac_min && frac.ends_with('0') {
            frac.pop();
        }

        let mut digits = if int_part == "0" && pattern.int_min == 0 {
            String::new()
        } else {
            int_part.to_string()
        };
        while digits.len() < pattern.int_min {
            digits.insert(0, '0');
        }
        if pattern.grouping {
            digits = group_digits(&digits, self.group_separator);
        }

        if frac.is_empty() {
            if digits.is_empty() { "0".to_string() } else { digits }
        } else {
            format!("{}{}{}", digits, self.decimal_separator, frac)
        }
    }
}

/// Digit placeholders and literals of one number format section
#[derive(Debug, Default, PartialEq)]
struct NumberPattern {
    prefix: String,
    suffix: String,
    int_min: usize,
    frac_min: usize,
    frac_max: usize,
    grouping: bool,
    percent: usize,
    scale: usize,
    exponent_digits: Option<usize>,
    exponent_plus: bool,
}

impl NumberPattern {
    fn parse(section: &str) -> Self {
        let mut pattern = NumberPattern::default();
        let mut placeholders = String::new();
        let mut seen_placeholder = false;
        let mut chars = section.chars().peekable();

        let mut push_literal = |pattern: &mut NumberPattern, seen: bool, text: &str| {
            if seen {
                pattern.suffix.push_str(text);
            } else {
                pattern.prefix.push_str(text);
            }
        };

        while let Some(ch) = chars.next() {
            match ch {
                '"' => {
                    let mut literal = String::new();
                    for c in chars.by_ref() {
                        if c == '"' {
                            break;
                        }
                        literal.push(c);
                    }
                    push_literal(&mut pattern, seen_placeholder, &literal);
                }
                '\\' => {
                    if let Some(c) = chars.next() {
                        push_literal(&mut pattern, seen_placeholder, &c.to_string());
                    }
                }
                '_' => {
                    chars.next();
                    push_literal(&mut pattern, seen_placeholder, " ");
                }
                '*' => {
                    chars.next();
                }
                '%' => {
                    pattern.percent += 1;
                    push_literal(&mut pattern, seen_placeholder, "%");
                }
                '0' | '#' | '?' | '.' => {
                    seen_placeholder = true;
                    placeholders.push(ch);
                }
                ',' if seen_placeholder => placeholders.push(ch),
                'E' | 'e' if seen_placeholder && matches!(chars.peek(), Some('+') | Some('-')) => {
                    pattern.exponent_plus = chars.next() == Some('+');
                    let mut digits = 0;
                    while matches!(chars.peek(), Some('0') | Some('#') | Some('?')) {
                        chars.next();
                        digits += 1;
                    }
                    pattern.exponent_digits = Some(digits.max(1));
                }
                other => push_literal(&mut pattern, seen_placeholder, &other.to_string()),
            }
        }

        let trimmed = placeholders.trim_end_matches(',');
        pattern.scale = placeholders.len() - trimmed.len();
        let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        pattern.grouping = int_part.contains(',');
        pattern.int_min = int_part.chars().filter(|c| *c == '0').count();
        pattern.frac_min = frac_part.chars().filter(|c| *c == '0').count();
        pattern.frac_max = frac_part
            .chars()
            .filter(|c| matches!(c, '0' | '#' | '?'))
            .count();
        pattern
    }
}

fn format_text(text: &str, format_code: &str) -> String {
    let sections = split_sections(format_code);
    let section = match sections.len() {
        4 => Some(&sections[3]),
        1 if sections[0].contains('@') => Some(&sections[0]),
        _ => None,
    };
    match section {
        Some(section) => render_literal_section(&strip_brackets(section), text),
        None => text.to_string(),
    }
}

/// Render a section without digit placeholders, `@` standing for `value`
fn render_literal_section(section: &str, value: &str) -> String {
    let mut out = String::new();
    let mut chars = section.chars();
    let mut has_at = false;
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    out.push(c);
                }
            }
            '\\' => {
                if let Some(c) = chars.next() {
                    out.push(c);
                }
            }
            '_' => {
                chars.next();
                out.push(' ');
            }
            '*' => {
                chars.next();
            }
            '@' => {
                has_at = true;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }
    if has_at || section.trim().is_empty() {
        if out.trim().is_empty() { value.to_string() } else { out }
    } else {
        out
    }
}

/// Split a format code on `;` outside quotes and brackets
fn split_sections(code: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;
    for ch in code.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_quotes => {
                escaped = true;
                current.push(ch);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '[' if !in_quotes => {
                in_brackets = true;
                current.push(ch);
            }
            ']' if !in_quotes => {
                in_brackets = false;
                current.push(ch);
            }
            ';' if !in_quotes && !in_brackets => sections.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    sections.push(current);
    sections
}

/// Drop color, condition and locale brackets; keep currency symbols and
/// elapsed-time tokens
fn strip_brackets(section: &str) -> String {
    let mut out = String::new();
    let mut rest = section;
    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find(']') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let inner = &rest[start + 1..start + len];
        let lower = inner.to_ascii_lowercase();
        if let Some(currency) = inner.strip_prefix('$') {
            let symbol = currency.split('-').next().unwrap_or_default();
            if !symbol.is_empty() {
                out.push('"');
                out.push_str(symbol);
                out.push('"');
            }
        } else if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
            out.push('[');
            out.push_str(inner);
            out.push(']');
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn has_digit_placeholder(section: &str) -> bool {
    let mut in_quotes = false;
    let mut chars = section.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' | '_' | '*' if !in_quotes => {
                chars.next();
            }
            '0' | '#' | '?' if !in_quotes => return true,
            _ => {}
        }
    }
    false
}

/// Whether a (bracket-stripped) section formats dates or times
fn is_date_section(section: &str) -> bool {
    let mut in_quotes = false;
    let mut chars = section.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' | '_' | '*' if !in_quotes => {
                chars.next();
            }
            '[' if !in_quotes => return true,
            c if !in_quotes && matches!(c.to_ascii_lowercase(), 'y' | 'm' | 'd' | 'h' | 's') => {
                return true;
            }
            _ => {}
        }
    }
    false
}

fn is_zero_display(text: &str) -> bool {
    !text.chars().any(|c| c.is_ascii_digit() && c != '0')
}

fn trim_fraction(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

fn group_digits(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}

/// `1.23E+04` style rendering with `decimals` mantissa digits
fn scientific(value: f64, decimals: usize, exp_digits: usize, plus: bool) -> String {
    let rendered = format!("{:.*e}", decimals, value);
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((&rendered, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 {
        "-"
    } else if plus {
        "+"
    } else {
        ""
    };
    format!(
        "{}E{}{:0width$}",
        mantissa,
        sign,
        exponent.abs(),
        width = exp_digits
    )
}

fn excel_epoch(serial: f64) -> Option<NaiveDate> {
    // Serials before 1900-03-01 sit before the phantom 1900-02-29
    if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    }
}

/// Serial number (1900 date system) to a calendar date-time
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let days = serial.floor();
    let millis = ((serial - days) * 86_400_000.0).round() as i64;
    let date = excel_epoch(serial)?.checked_add_signed(Duration::days(days as i64))?;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(millis))
}

pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return 0.0;
    };
    let serial = (dt - epoch).num_milliseconds() as f64 / 86_400_000.0;
    if serial < 61.0 { serial - 1.0 } else { serial }
}

#[derive(Debug, Clone, PartialEq)]
enum DateToken {
    Literal(String),
    Year(usize),
    Month(usize),
    Minute(usize),
    Day(usize),
    Hour(usize),
    Second(usize),
    Fraction(usize),
    Elapsed(char, usize),
    AmPm(bool),
}

fn tokenize_date(section: &str) -> Vec<DateToken> {
    let chars: Vec<char> = section.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let lower = ch.to_ascii_lowercase();
        match lower {
            '"' => {
                let mut literal = String::new();
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    literal.push(chars[i]);
                    i += 1;
                }
                tokens.push(DateToken::Literal(literal));
                i += 1;
            }
            '\\' => {
                if let Some(c) = chars.get(i + 1) {
                    tokens.push(DateToken::Literal(c.to_string()));
                }
                i += 2;
            }
            '_' => {
                tokens.push(DateToken::Literal(" ".to_string()));
                i += 2;
            }
            '*' => i += 2,
            '[' => {
                let end = chars[i..].iter().position(|c| *c == ']').map(|p| i + p);
                match end {
                    Some(end) if end > i + 1 => {
                        let unit = chars[i + 1].to_ascii_lowercase();
                        tokens.push(DateToken::Elapsed(unit, end - i - 1));
                        i = end + 1;
                    }
                    _ => i += 1,
                }
            }
            'y' | 'm' | 'd' | 'h' | 's' => {
                let start = i;
                while i < chars.len() && chars[i].to_ascii_lowercase() == lower {
                    i += 1;
                }
                let count = i - start;
                tokens.push(match lower {
                    'y' => DateToken::Year(count),
                    'm' => DateToken::Month(count),
                    'd' => DateToken::Day(count),
                    'h' => DateToken::Hour(count),
                    _ => DateToken::Second(count),
                });
            }
            'a' => {
                let rest: String = chars[i..].iter().take(5).collect::<String>().to_ascii_lowercase();
                if rest.starts_with("am/pm") {
                    tokens.push(DateToken::AmPm(true));
                    i += 5;
                } else if rest.starts_with("a/p") {
                    tokens.push(DateToken::AmPm(false));
                    i += 3;
                } else {
                    tokens.push(DateToken::Literal(ch.to_string()));
                    i += 1;
                }
            }
            '.' if matches!(chars.get(i + 1), Some('0'))
                && matches!(tokens.last(), Some(DateToken::Second(_)) | Some(DateToken::Elapsed('s', _))) =>
            {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] == '0' {
                    i += 1;
                }
                tokens.push(DateToken::Fraction(i - start));
            }
            _ => {
                tokens.push(DateToken::Literal(ch.to_string()));
                i += 1;
            }
        }
    }

    // `m` right after hours or right before seconds means minutes
    let positions: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t, DateToken::Literal(_)))
        .map(|(i, _)| i)
        .collect();
    for (n, &pos) in positions.iter().enumerate() {
        if let DateToken::Month(count) = tokens[pos] {
            let after_hour = n > 0
                && matches!(tokens[positions[n - 1]], DateToken::Hour(_) | DateToken::Elapsed('h', _));
            let before_second = positions
                .get(n + 1)
                .is_some_and(|&next| matches!(tokens[next], DateToken::Second(_) | DateToken::Elapsed('s', _)));
            if count <= 2 && (after_hour || before_second) {
                tokens[pos] = DateToken::Minute(count);
            }
        }
    }
    tokens
}

fn format_datetime(dt: NaiveDateTime, serial: f64, section: &str) -> String {
    let tokens = tokenize_date(section);
    let twelve_hour = tokens.iter().any(|t| matches!(t, DateToken::AmPm(_)));
    let has_fraction = tokens.iter().any(|t| matches!(t, DateToken::Fraction(_)));
    let dt = if has_fraction {
        dt
    } else {
        // Round to whole seconds when no fraction is displayed
        dt + Duration::milliseconds(500)
    };

    let mut out = String::new();
    for token in &tokens {
        match token {
            DateToken::Literal(text) => out.push_str(text),
            DateToken::Year(n) if *n <= 2 => out.push_str(&format!("{:02}", dt.year() % 100)),
            DateToken::Year(_) => out.push_str(&format!("{:04}", dt.year())),
            DateToken::Month(n) => {
                let name = MONTHS[dt.month0() as usize];
                match n {
                    1 => out.push_str(&dt.month().to_string()),
                    2 => out.push_str(&format!("{:02}", dt.month())),
                    3 => out.push_str(&name[..3]),
                    4 => out.push_str(name),
                    _ => out.push_str(&name[..1]),
                }
            }
            DateToken::Day(n) => {
                let name = WEEKDAYS[dt.weekday().num_days_from_monday() as usize];
                match n {
                    1 => out.push_str(&dt.day().to_string()),
                    2 => out.push_str(&format!("{:02}", dt.day())),
                    3 => out.push_str(&name[..3]),
                    _ => out.push_str(name),
                }
            }
            DateToken::Hour(n) => {
                let hour = if twelve_hour {
                    match dt.hour() % 12 {
                        0 => 12,
                        h => h,
                    }
                } else {
                    dt.hour()
                };
                if *n >= 2 {
                    out.push_str(&format!("{:02}", hour));
                } else {
                    out.push_str(&hour.to_string());
                }
            }
            DateToken::Minute(n) => push_padded(&mut out, dt.minute(), *n),
            DateToken::Second(n) => push_padded(&mut out, dt.second(), *n),
            DateToken::Fraction(n) => {
                let millis = dt.nanosecond() / 1_000_000;
                let digits = format!("{:03}", millis.min(999));
                out.push('.');
                out.push_str(&digits[..(*n).min(3)]);
            }
            DateToken::Elapsed(unit, width) => {
                let total = match unit {
                    'h' => (serial * 24.0).floor(),
                    'm' => (serial * 1440.0).floor(),
                    _ => (serial * 86400.0).round(),
                } as i64;
                out.push_str(&format!("{:0width$}", total, width = *width));
            }
            DateToken::AmPm(full) => {
                let pm = dt.hour() >= 12;
                out.push_str(match (full, pm) {
                    (true, false) => "AM",
                    (true, true) => "PM",
                    (false, false) => "A",
                    (false, true) => "P",
                });
            }
        }
    }
    out
}

fn push_padded(out: &mut String, value: u32, width: usize) {
    if width >= 2 {
        out.push_str(&format!("{:02}", value));
    } else {
        out.push_str(&value.to_string());
    }
}
