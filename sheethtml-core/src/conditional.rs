//! Conditional-formatting evaluation: which differential style wins per cell

use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::error::ConvertError;
use crate::reader::parser_utils::parse_cell_ref;
use crate::reader::workbook::{CellRange, CellRef, CellValue, CfRule, Sheet};
use crate::render::format::{CellFormatter, datetime_to_serial};

static CELL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)$").expect("cell reference pattern is valid")
});

/// Winning differential style of one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfMatch {
    pub sheet: String,
    pub cell_ref: CellRef,
    pub dxf_id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellIsOperator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    Between,
    NotBetween,
}

impl CellIsOperator {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "greaterThan" => Some(Self::GreaterThan),
            "greaterThanOrEqual" => Some(Self::GreaterThanOrEqual),
            "lessThan" => Some(Self::LessThan),
            "lessThanOrEqual" => Some(Self::LessThanOrEqual),
            "equal" => Some(Self::Equal),
            "notEqual" => Some(Self::NotEqual),
            "between" => Some(Self::Between),
            "notBetween" => Some(Self::NotBetween),
            _ => None,
        }
    }

    fn operand_count(self) -> usize {
        match self {
            Self::Between | Self::NotBetween => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextMatch {
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Text(String),
    Boolean(bool),
    Reference {
        row: u32,
        col: u32,
        row_absolute: bool,
        col_absolute: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum RuleKind {
    CellIs {
        operator: CellIsOperator,
        operands: Vec<Operand>,
    },
    Text(TextMatch, String),
    Blanks { present: bool },
    Errors { present: bool },
    Duplicates { unique: bool },
}

struct CompiledRule {
    kind: RuleKind,
    priority: i64,
    dxf_id: Option<usize>,
    stop_if_true: bool,
    ranges: Vec<CellRange>,
    /// Top-left cell relative references are written against
    origin: CellRef,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error,
}

impl Value {
    fn of(value: &CellValue) -> Self {
        match value.result() {
            CellValue::Empty => Value::Empty,
            CellValue::Text(s) if s.is_empty() => Value::Empty,
            CellValue::Text(s) => Value::Text(s.clone()),
            CellValue::Number(n) => Value::Number(*n),
            CellValue::Boolean(b) => Value::Boolean(*b),
            CellValue::Date(dt) => Value::Number(datetime_to_serial(*dt)),
            CellValue::Error(_) => Value::Error,
            CellValue::Formula { .. } => Value::Empty,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Empty | Value::Number(_) => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
            Value::Error => 3,
        }
    }
}

/// Key used to count duplicate values; text compares case-insensitively
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Number(u64),
    Text(String),
    Boolean(bool),
}

impl ValueKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(ValueKey::Number(n.to_bits())),
            Value::Text(s) => Some(ValueKey::Text(s.to_lowercase())),
            Value::Boolean(b) => Some(ValueKey::Boolean(*b)),
            Value::Empty | Value::Error => None,
        }
    }
}

/// Evaluate every conditional-formatting rule of `sheet`, returning the
/// winning differential style per cell in row-major order.
///
/// Malformed rules are skipped with a warning when `fail_ok` is set and fail
/// the evaluation otherwise.
pub fn evaluate_sheet(sheet: &Sheet, fail_ok: bool) -> Result<Vec<CfMatch>, ConvertError> {
    let Some((max_row, max_col)) = sheet.extent() else {
        return Ok(Vec::new());
    };

    let mut rules = Vec::new();
    for block in &sheet.conditional_formatting {
        let Some(first) = block.ranges.first() else {
            continue;
        };
        let ranges: Vec<CellRange> = block
            .ranges
            .iter()
            .filter_map(|r| clamp(r, max_row, max_col))
            .collect();
        for rule in &block.rules {
            match compile(rule) {
                Ok(Some(kind)) => rules.push(CompiledRule {
                    kind,
                    priority: rule.priority,
                    dxf_id: rule.dxf_id,
                    stop_if_true: rule.stop_if_true,
                    ranges: ranges.clone(),
                    origin: first.start,
                }),
                Ok(None) => debug!(
                    "Conditional formatting rule type '{}' is not supported ({})",
                    rule.rule_type, sheet.name
                ),
                Err(message) if fail_ok => warn!(
                    "Skipping conditional formatting rule on {} ({}): {}",
                    sheet.name, first, message
                ),
                Err(message) => {
                    return Err(ConvertError::ConditionalFormatting {
                        sheet: sheet.name.clone(),
                        message: format!("{} ({})", message, first),
                    });
                }
            }
        }
    }
    rules.sort_by_key(|r| r.priority);

    let mut winners: BTreeMap<CellRef, usize> = BTreeMap::new();
    let mut decided: HashSet<CellRef> = HashSet::new();
    for rule in &rules {
        let counts = match rule.kind {
            RuleKind::Duplicates { .. } => Some(value_counts(sheet, &rule.ranges)),
            _ => None,
        };
        for range in &rule.ranges {
            for cell in range.cells() {
                if decided.contains(&cell) {
                    continue;
                }
                if !rule_matches(sheet, rule, cell, counts.as_ref()) {
                    continue;
                }
                match rule.dxf_id {
                    Some(dxf_id) => {
                        winners.insert(cell, dxf_id);
                        decided.insert(cell);
                    }
                    None if rule.stop_if_true => {
                        decided.insert(cell);
                    }
                    None => {}
                }
            }
        }
    }

    Ok(winners
        .into_iter()
        .map(|(cell_ref, dxf_id)| CfMatch {
            sheet: sheet.name.clone(),
            cell_ref,
            dxf_id,
        })
        .collect())
}

fn clamp(range: &CellRange, max_row: u32, max_col: u32) -> Option<CellRange> {
    if range.start.row > max_row || range.start.col > max_col {
        return None;
    }
    Some(CellRange::new(
        range.start,
        CellRef::new(range.end.row.min(max_row), range.end.col.min(max_col)),
    ))
}

/// `Ok(None)` for rule types that are not evaluated
fn compile(rule: &CfRule) -> Result<Option<RuleKind>, String> {
    let kind = match rule.rule_type.as_str() {
        "cellIs" => {
            let name = rule
                .operator
                .as_deref()
                .ok_or("cellIs rule without operator")?;
            let operator = CellIsOperator::parse(name)
                .ok_or_else(|| format!("unknown cellIs operator '{}'", name))?;
            if rule.formulas.len() < operator.operand_count() {
                return Err(format!(
                    "operator '{}' needs {} formula(s), found {}",
                    name,
                    operator.operand_count(),
                    rule.formulas.len()
                ));
            }
            let operands = rule.formulas[..operator.operand_count()]
                .iter()
                .map(|f| parse_operand(f))
                .collect::<Result<Vec<_>, _>>()?;
            RuleKind::CellIs { operator, operands }
        }
        "containsText" | "notContainsText" | "beginsWith" | "endsWith" => {
            let text = rule
                .text
                .clone()
                .ok_or_else(|| format!("{} rule without text", rule.rule_type))?;
            let matcher = match rule.rule_type.as_str() {
                "containsText" => TextMatch::Contains,
                "notContainsText" => TextMatch::NotContains,
                "beginsWith" => TextMatch::BeginsWith,
                _ => TextMatch::EndsWith,
            };
            RuleKind::Text(matcher, text.to_lowercase())
        }
        "containsBlanks" => RuleKind::Blanks { present: true },
        "notContainsBlanks" => RuleKind::Blanks { present: false },
        "containsErrors" => RuleKind::Errors { present: true },
        "notContainsErrors" => RuleKind::Errors { present: false },
        "duplicateValues" => RuleKind::Duplicates { unique: false },
        "uniqueValues" => RuleKind::Duplicates { unique: true },
        _ => return Ok(None),
    };
    Ok(Some(kind))
}

fn parse_operand(formula: &str) -> Result<Operand, String> {
    let text = formula.trim();
    let text = text.strip_prefix('=').unwrap_or(text).trim();

    if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Ok(Operand::Text(inner.replace("\"\"", "\"")));
    }
    if text.eq_ignore_ascii_case("TRUE") {
        return Ok(Operand::Boolean(true));
    }
    if text.eq_ignore_ascii_case("FALSE") {
        return Ok(Operand::Boolean(false));
    }
    if let Ok(number) = text.parse::<f64>() {
        return Ok(Operand::Number(number));
    }
    if let Some(caps) = CELL_REFERENCE.captures(text)
        && let Some(target) = parse_cell_ref(text)
    {
        return Ok(Operand::Reference {
            row: target.row,
            col: target.col,
            col_absolute: !caps[1].is_empty(),
            row_absolute: !caps[3].is_empty(),
        });
    }
    Err(format!("unsupported formula '{}'", formula))
}

fn operand_value(sheet: &Sheet, operand: &Operand, origin: CellRef, cell: CellRef) -> Value {
    match operand {
        Operand::Number(n) => Value::Number(*n),
        Operand::Text(s) if s.is_empty() => Value::Empty,
        Operand::Text(s) => Value::Text(s.clone()),
        Operand::Boolean(b) => Value::Boolean(*b),
        Operand::Reference {
            row,
            col,
            row_absolute,
            col_absolute,
        } => {
            let shift = |base: u32, absolute: bool, from: u32, to: u32| -> Option<u32> {
                if absolute {
                    Some(base)
                } else {
                    (base as i64 + to as i64 - from as i64).try_into().ok()
                }
            };
            let target_row = shift(*row, *row_absolute, origin.row, cell.row);
            let target_col = shift(*col, *col_absolute, origin.col, cell.col);
            match (target_row, target_col) {
                (Some(r), Some(c)) if r > 0 && c > 0 => Value::of(sheet.value_at(r, c)),
                _ => Value::Error,
            }
        }
    }
}

/// Spreadsheet comparison: numbers sort before text, text before booleans;
/// an empty cell takes the type of the other side
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Error, _) | (_, Value::Error) => None,
        (Value::Empty, Value::Empty) => Some(Ordering::Equal),
        (Value::Empty, Value::Text(t)) => Some("".cmp(&t.to_lowercase().as_str())),
        (Value::Text(t), Value::Empty) => Some(t.to_lowercase().as_str().cmp("")),
        (Value::Empty, Value::Boolean(b)) => Some(false.cmp(b)),
        (Value::Boolean(b), Value::Empty) => Some(b.cmp(&false)),
        (Value::Empty, other) => compare(&Value::Number(0.0), other),
        (other, Value::Empty) => compare(other, &Value::Number(0.0)),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (a, b) => Some(a.type_rank().cmp(&b.type_rank())),
    }
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Empty => Some(String::new()),
        Value::Text(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(CellFormatter::default().general(*n)),
        Value::Boolean(true) => Some("true".to_string()),
        Value::Boolean(false) => Some("false".to_string()),
        Value::Error => None,
    }
}

fn value_counts(sheet: &Sheet, ranges: &[CellRange]) -> HashMap<ValueKey, usize> {
    let mut counts = HashMap::new();
    let mut seen = HashSet::new();
    for range in ranges {
        for cell in range.cells() {
            if !seen.insert(cell) {
                continue;
            }
            if let Some(key) = ValueKey::of(&Value::of(sheet.value_at(cell.row, cell.col))) {
                *counts.entry(key).or_default() += 1;
            }
        }
    }
    counts
}

fn rule_matches(
    sheet: &Sheet,
    rule: &CompiledRule,
    cell: CellRef,
    counts: Option<&HashMap<ValueKey, usize>>,
) -> bool {
    let value = Value::of(sheet.value_at(cell.row, cell.col));
    match &rule.kind {
        RuleKind::CellIs { operator, operands } => {
            if value == Value::Error {
                return false;
            }
            let first = operand_value(sheet, &operands[0], rule.origin, cell);
            let ordering = compare(&value, &first);
            match operator {
                CellIsOperator::GreaterThan => ordering == Some(Ordering::Greater),
                CellIsOperator::GreaterThanOrEqual => {
                    matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                }
                CellIsOperator::LessThan => ordering == Some(Ordering::Less),
                CellIsOperator::LessThanOrEqual => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
                CellIsOperator::Equal => ordering == Some(Ordering::Equal),
                CellIsOperator::NotEqual => ordering.is_some_and(|o| o != Ordering::Equal),
                CellIsOperator::Between | CellIsOperator::NotBetween => {
                    let second = operand_value(sheet, &operands[1], rule.origin, cell);
                    let (low, high) = match compare(&first, &second) {
                        Some(Ordering::Greater) => (second, first),
                        Some(_) => (first, second),
                        None => return false,
                    };
                    let (Some(above_low), Some(below_high)) =
                        (compare(&value, &low), compare(&value, &high))
                    else {
                        return false;
                    };
                    let inside = above_low != Ordering::Less && below_high != Ordering::Greater;
                    if *operator == CellIsOperator::Between {
                        inside
                    } else {
                        !inside
                    }
                }
            }
        }
        RuleKind::Text(matcher, needle) => {
            let Some(text) = display_text(&value) else {
                return false;
            };
            match matcher {
                TextMatch::Contains => text.contains(needle.as_str()),
                TextMatch::NotContains => !text.contains(needle.as_str()),
                TextMatch::BeginsWith => text.starts_with(needle.as_str()),
                TextMatch::EndsWith => text.ends_with(needle.as_str()),
            }
        }
        RuleKind::Blanks { present } => {
            let blank = match &value {
                Value::Empty => true,
                Value::Text(s) => s.trim().is_empty(),
                _ => false,
            };
            blank == *present
        }
        RuleKind::Errors { present } => (value == Value::Error) == *present,
        RuleKind::Duplicates { unique } => {
            let Some(key) = ValueKey::of(&value) else {
                return false;
            };
            let count = counts.and_then(|c| c.get(&key)).copied().unwrap_or(0);
            if *unique { count == 1 } else { count > 1 }
        }
    }
}
