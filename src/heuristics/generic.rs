use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use super::grid::CellGrid;
use super::{ExtractedInvoice, InvoiceField, Party};

/// How many columns to the right of a label we look for its value.
const RIGHT_REACH: u32 = 4;
/// How many rows below a label we look for its value.
const BELOW_REACH: u32 = 3;
/// Name plus address lines kept for an exporter/consignee block.
const MAX_PARTY_LINES: usize = 5;

struct LabelRule {
    field: InvoiceField,
    re: Regex,
}

/// Label patterns, matched against the normalised label text
/// (lowercase, single spaces, trailing `:`/`.` removed).
static LABEL_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    let rule = |field, pattern: &str| LabelRule {
        field,
        re: Regex::new(pattern).expect("label pattern must compile"),
    };
    vec![
        rule(
            InvoiceField::Exporter,
            r"^(?:name of )?(?:exporter|shipper|seller)(?:\s*/\s*(?:exporter|shipper|seller))?(?:\s+(?:name|details|name\s*(?:&|and)\s*address))?$",
        ),
        rule(
            InvoiceField::Consignee,
            r"^(?:name of )?(?:consignee|buyer|importer)(?:\s*/\s*(?:consignee|buyer|importer))?(?:\s+(?:name|details|name\s*(?:&|and)\s*address))?$",
        ),
        rule(
            InvoiceField::InvoiceNo,
            r"^(?:commercial\s+)?(?:invoice|inv)\.?\s*(?:no|number|num|#)\.?(?:\s*(?:&|and)\s*date)?$",
        ),
        rule(
            InvoiceField::FinalDestination,
            r"^(?:(?:country|port|place) of\s+)?final\s+destination(?:\s+country)?$|^place of delivery$|^(?:country of\s+)?destination(?:\s+country)?$",
        ),
        rule(
            InvoiceField::InvoiceDate,
            r"^(?:invoice\s+)?date(?:\s+of\s+invoice)?$",
        ),
        rule(InvoiceField::PortOfLoading, r"^port\s+of\s+loading$"),
        rule(
            InvoiceField::Vessel,
            r"^(?:vessel|flight)(?:\s*/\s*(?:voyage|flight))?(?:\s+no)?$",
        ),
    ]
});

static INVOICE_NO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-/.]*$").expect("valid regex"));

static PLACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\p{L}[\p{L} .,'()\-/]*[\p{L}.)]$").expect("valid regex")
});

static INVOICE_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(INV[-/ ]?[A-Z0-9\-/]*\d[A-Z0-9\-/]*)").expect("valid regex")
});

static SHIP_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bTo\s*:\s*(\p{L}[\p{L} .'\-]*\p{L})").expect("valid regex")
});

/// Run every field rule over one sheet.
pub fn extract(grid: &CellGrid) -> ExtractedInvoice {
    ExtractedInvoice {
        exporter: find_party(grid, InvoiceField::Exporter),
        consignee: find_party(grid, InvoiceField::Consignee),
        invoice_no: find_value(grid, InvoiceField::InvoiceNo, accept_invoice_no)
            .or_else(|| fallback_invoice_no(grid)),
        final_destination: find_value(grid, InvoiceField::FinalDestination, accept_place)
            .or_else(|| fallback_destination(grid)),
        invoice_date: find_value(grid, InvoiceField::InvoiceDate, parse_date),
        port_of_loading: find_value(grid, InvoiceField::PortOfLoading, accept_text),
        vessel: find_value(grid, InvoiceField::Vessel, accept_text),
    }
}

/// Parse the date spellings that show up on export invoices.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d", "%B %d, %Y", "%B %d %Y",
        "%d %B %Y", "%d %B, %Y", "%d-%b-%Y", "%d-%b-%y",
    ];
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    let s = squash(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&s, fmt).ok())
                .map(|ts| ts.date())
        })
}

// ---------------------------------------------------------------------------
// Label recognition
// ---------------------------------------------------------------------------

/// Classify a cell as a label. Returns the field and any value written inline
/// after the label (`"Invoice No: X-1"`, or a label line followed by more lines).
fn classify(text: &str) -> Option<(InvoiceField, Option<String>)> {
    let (first, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (text, None),
    };

    let (head, inline) = match first.split_once(':') {
        Some((head, tail)) => {
            let joined = match rest {
                Some(rest) => format!("{tail}\n{rest}"),
                None => tail.to_string(),
            };
            (head, Some(joined))
        }
        None => (first, rest.map(str::to_string)),
    };

    let key = normalize(head);
    if key.is_empty() {
        return None;
    }

    LABEL_RULES
        .iter()
        .find(|rule| rule.re.is_match(&key))
        .map(|rule| {
            let inline = inline
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            (rule.field, inline)
        })
}

fn is_label(text: &str) -> bool {
    classify(text).is_some()
}

fn normalize(label: &str) -> String {
    squash(&label.to_lowercase())
        .trim_end_matches([':', '.', ' '])
        .to_string()
}

/// Collapse runs of whitespace into single spaces.
fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Positional lookup
// ---------------------------------------------------------------------------

/// First non-empty cell to the right of `(row, col)`. Another label ends the region.
fn right_of(grid: &CellGrid, row: u32, col: u32) -> Option<&str> {
    (col + 1..=col + RIGHT_REACH)
        .find_map(|c| grid.get(row, c))
        .filter(|text| !is_label(text))
}

/// First non-empty cell below `(row, col)`. Another label ends the region.
fn below(grid: &CellGrid, row: u32, col: u32) -> Option<&str> {
    (row + 1..=row + BELOW_REACH)
        .find_map(|r| grid.get(r, col))
        .filter(|text| !is_label(text))
}

/// Scan labels of `field` in row-major order and return the first accepted value.
/// Inline text is tried first, then the right neighbour, then the cell below.
fn find_value<T>(grid: &CellGrid, field: InvoiceField, accept: fn(&str) -> Option<T>) -> Option<T> {
    for (row, col, text) in grid.cells() {
        let Some((label, inline)) = classify(text) else {
            continue;
        };
        if label != field {
            continue;
        }

        let found = inline
            .as_deref()
            .and_then(accept)
            .or_else(|| right_of(grid, row, col).and_then(accept))
            .or_else(|| below(grid, row, col).and_then(accept));
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Party blocks usually hang below their label, so "below" is tried before "right".
fn find_party(grid: &CellGrid, field: InvoiceField) -> Option<Party> {
    for (row, col, text) in grid.cells() {
        let Some((label, inline)) = classify(text) else {
            continue;
        };
        if label != field {
            continue;
        }

        let found = inline
            .as_deref()
            .and_then(party_from_text)
            .or_else(|| party_below(grid, row, col))
            .or_else(|| right_of(grid, row, col).and_then(party_from_text));
        if found.is_some() {
            return found;
        }
    }
    None
}

fn party_below(grid: &CellGrid, row: u32, col: u32) -> Option<Party> {
    let start = (row + 1..=row + BELOW_REACH).find(|r| grid.get(*r, col).is_some())?;

    let mut lines = Vec::new();
    let mut r = start;
    while let Some(text) = grid.get(r, col) {
        if is_label(text) || lines.len() >= MAX_PARTY_LINES {
            break;
        }
        lines.extend(split_lines(text));
        r += 1;
    }
    lines.truncate(MAX_PARTY_LINES);
    party_from_lines(lines)
}

fn party_from_text(text: &str) -> Option<Party> {
    party_from_lines(split_lines(text))
}

fn party_from_lines(mut lines: Vec<String>) -> Option<Party> {
    if lines.is_empty() {
        return None;
    }
    let name = lines.remove(0);
    if !name.chars().any(char::is_alphabetic) || parse_date(&name).is_some() {
        return None;
    }
    let address = (!lines.is_empty()).then(|| lines.join(", "));
    Some(Party { name, address })
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(squash)
        .filter(|line| !line.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Value checks
// ---------------------------------------------------------------------------

/// Accept the whole value, or its first token, if it looks like an invoice number.
fn accept_invoice_no(raw: &str) -> Option<String> {
    let raw = raw.trim();
    std::iter::once(raw)
        .chain(raw.split_whitespace().next())
        .map(|c| c.trim_end_matches([',', ';', '.']))
        .find(|c| INVOICE_NO.is_match(c) && c.chars().any(|ch| ch.is_ascii_digit()))
        .map(str::to_string)
}

fn accept_place(raw: &str) -> Option<String> {
    let value = squash(raw);
    (value.len() >= 2 && PLACE.is_match(&value)).then_some(value)
}

fn accept_text(raw: &str) -> Option<String> {
    let value = squash(raw);
    value.chars().any(char::is_alphabetic).then_some(value)
}

// ---------------------------------------------------------------------------
// Unlabelled fallbacks
// ---------------------------------------------------------------------------

fn fallback_invoice_no(grid: &CellGrid) -> Option<String> {
    grid.cells()
        .filter(|(_, _, text)| !is_label(text))
        .find_map(|(_, _, text)| INVOICE_FALLBACK.captures(text).map(|c| c[1].to_string()))
}

fn fallback_destination(grid: &CellGrid) -> Option<String> {
    grid.cells()
        .find_map(|(_, _, text)| SHIP_TO.captures(text).map(|c| squash(&c[1])))
}
