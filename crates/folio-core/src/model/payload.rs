//! Typed views over block payloads.
//!
//! Blocks carry their payload as free-form JSON so unknown and legacy fields
//! survive a round trip. The structs here are read out of and written back
//! into that JSON when a mutation needs typed access.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::model::block::{Block, BlockType};

pub const DEFAULT_CURRENCY: &str = "GBP";

/// Default payload for a freshly created block of `kind`.
#[must_use]
pub fn default_payload(kind: &BlockType) -> Value {
    match kind {
        BlockType::Section
        | BlockType::Subtitle
        | BlockType::H3
        | BlockType::Paragraph
        | BlockType::OrderedItem
        | BlockType::UnorderedItem => json!({ "value": "" }),
        BlockType::Quote => json!({ "quote": "", "source": "", "caption": "" }),
        BlockType::Image | BlockType::Embed => json!({ "url": "", "caption": "" }),
        BlockType::Signature => json!({ "name": "", "date": 0, "signature": "" }),
        BlockType::Table => to_value_or_empty(&TableData::default()),
        BlockType::CostTable => to_value_or_empty(&CostTableData::default()),
        BlockType::Divider | BlockType::Payment | BlockType::Unknown(_) => json!({}),
    }
}

fn to_value_or_empty<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| json!({}))
}

// ---------------------------------------------------------------------------
// turn_into
// ---------------------------------------------------------------------------

/// Options for converting a block into another type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnInto {
    /// Initial URL for image blocks.
    pub url: Option<String>,
    /// Currency for cost tables.
    pub currency: Option<String>,
    /// Drop the text when converting between text types.
    pub clear_content: bool,
}

/// Change `block` into `kind`, resetting its payload to the new type's
/// default. Text-to-text conversions keep the text; headings lose inline
/// markup since they render as plain text.
pub fn turn_into(block: &mut Block, kind: BlockType, options: &TurnInto) {
    let previous_text = block.text_value().unwrap_or_default().to_string();
    block.data = default_payload(&kind);

    match &kind {
        BlockType::Paragraph | BlockType::OrderedItem | BlockType::UnorderedItem => {
            let value = if options.clear_content { String::new() } else { previous_text };
            block.set_text_value(value);
        }
        BlockType::Section | BlockType::Subtitle | BlockType::H3 => {
            let value = if options.clear_content {
                String::new()
            } else {
                strip_tags(&previous_text)
            };
            block.set_text_value(value);
        }
        BlockType::Image => {
            block.set_field("url", Value::String(options.url.clone().unwrap_or_default()));
        }
        BlockType::CostTable => {
            let currency = options
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
            block.set_field("currency", Value::String(currency));
        }
        BlockType::Payment => {
            block.set_field("percentage", json!(100));
        }
        _ => {}
    }

    block.kind = kind;
}

/// Remove `<...>` tags from editor markup.
#[must_use]
pub fn strip_tags(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            // `<>` is not a tag
            Some(0) => {
                out.push_str("<>");
                rest = &after[1..];
            }
            Some(close) => rest = &after[close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Number parsing
// ---------------------------------------------------------------------------

/// Parse the longest numeric prefix of `raw` (leading whitespace allowed).
/// Returns `None` when no digits are found.
#[must_use]
pub fn parse_number_prefix(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }
    end += exponent_len(&bytes[end..]);
    trimmed[..end].parse().ok()
}

/// Length of a complete `e[+-]digits` exponent at the start of `rest`, or 0.
fn exponent_len(rest: &[u8]) -> usize {
    if !matches!(rest.first(), Some(b'e' | b'E')) {
        return 0;
    }
    let sign = usize::from(matches!(rest.get(1), Some(b'+' | b'-')));
    let digits = rest[1 + sign..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 { 0 } else { 1 + sign + digits }
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number_prefix(s),
        _ => None,
    }
}

/// Keep only characters that can be part of a rate (`0-9 . -`), so that
/// `"£1,200.50"` reads as `1200.50`.
#[must_use]
pub fn sanitize_rate(raw: &Value) -> String {
    match raw {
        Value::String(s) => s
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

// Stored cost tables are not always well formed: totals that were not
// finite when written come back as `null`, and older clients stored the
// discount as a number.

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_number(&value).filter(|n| n.is_finite()).unwrap_or(0.0))
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_i64().unwrap_or_else(|| {
        value_as_number(&value)
            .filter(|n| n.is_finite())
            .map_or(0, |n| n.trunc() as i64)
    }))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Cost table
// ---------------------------------------------------------------------------

/// A titled group of rows. Each row is `[description, rate, quantity, total]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTableSection {
    #[serde(deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(deserialize_with = "lenient_number")]
    pub total: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub rows: Vec<Vec<Value>>,
}

impl Default for CostTableSection {
    fn default() -> Self {
        Self {
            title: String::new(),
            total: 0.0,
            rows: vec![empty_cost_row()],
        }
    }
}

fn empty_cost_row() -> Vec<Value> {
    vec![json!(""), json!(0), json!(0), json!(0)]
}

impl CostTableSection {
    pub fn add_row(&mut self) {
        self.rows.push(empty_cost_row());
    }

    /// Recompute every row total and the section total.
    pub fn calculate_total(&mut self) {
        let mut total = 0.0;
        for row in &mut self.rows {
            while row.len() < 4 {
                row.push(json!(0));
            }
            let rate = parse_number_prefix(&sanitize_rate(&row[1]));
            let quantity = value_as_number(&row[2]);
            match (rate, quantity) {
                (Some(rate), Some(quantity)) => {
                    let line = rate * quantity;
                    row[3] = json!(line);
                    total += line;
                }
                _ => row[3] = Value::Null,
            }
        }
        self.total = if total.is_finite() { total } else { 0.0 };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CostTableData {
    #[serde(deserialize_with = "null_as_default")]
    pub headers: Vec<Option<String>>,
    #[serde(deserialize_with = "null_as_default")]
    pub sections: Vec<CostTableSection>,
    /// Bumped on structural edits so editors can rebuild their inputs.
    #[serde(deserialize_with = "lenient_integer")]
    pub version: i64,
    #[serde(deserialize_with = "lenient_text")]
    pub currency: String,
    /// The discount as typed by the user, e.g. `"10"` for 10%.
    #[serde(deserialize_with = "lenient_text")]
    pub discount: String,
    #[serde(deserialize_with = "lenient_number")]
    pub discount_percent: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub discount_value: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub subtotal: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub total: f64,
    #[serde(deserialize_with = "lenient_text")]
    pub subtotal_label: String,
    #[serde(deserialize_with = "lenient_text")]
    pub total_label: String,
    #[serde(deserialize_with = "lenient_text")]
    pub discount_label: String,
}

/// The editable labels of a cost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostTableLabel {
    Subtotal,
    Total,
    Discount,
}

impl Default for CostTableData {
    fn default() -> Self {
        Self {
            headers: vec![None; 4],
            sections: vec![CostTableSection::default()],
            version: 0,
            currency: DEFAULT_CURRENCY.to_string(),
            discount: String::new(),
            discount_percent: 0.0,
            discount_value: 0.0,
            subtotal: 0.0,
            total: 0.0,
            subtotal_label: "Subtotal".to_string(),
            total_label: "Total".to_string(),
            discount_label: "% discount".to_string(),
        }
    }
}

impl CostTableData {
    /// Typed view of a cost table block, `None` for other types or
    /// undecodable payloads.
    #[must_use]
    pub fn from_block(block: &Block) -> Option<Self> {
        if block.kind != BlockType::CostTable {
            return None;
        }
        Self::decode(block).ok()
    }

    /// Decode the payload regardless of the block's type.
    ///
    /// # Errors
    ///
    /// When the payload is not an object or a field has the wrong shape,
    /// e.g. `sections` holding a string.
    pub fn decode(block: &Block) -> serde_json::Result<Self> {
        Self::deserialize(&block.data)
    }

    /// Write back into `block.data`, keeping fields this struct does not know.
    pub fn write_to(&self, block: &mut Block) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            for (key, value) in fields {
                block.set_field(&key, value);
            }
        }
    }

    /// Recompute section totals, subtotal, discount and grand total.
    pub fn recompute(&mut self) {
        let mut subtotal = 0.0;
        for section in &mut self.sections {
            section.calculate_total();
            subtotal += section.total;
        }
        self.subtotal = subtotal;
        let discount = parse_number_prefix(&self.discount).map_or(0.0, |p| p / 100.0);
        self.discount_value = round_half_up(discount * self.subtotal);
        self.discount_percent = discount * 100.0;
        self.total = self.subtotal - self.discount_value;
    }

    pub fn set_label(&mut self, label: CostTableLabel, value: impl Into<String>) {
        let slot = match label {
            CostTableLabel::Subtotal => &mut self.subtotal_label,
            CostTableLabel::Total => &mut self.total_label,
            CostTableLabel::Discount => &mut self.discount_label,
        };
        *slot = value.into();
    }

    /// Insert an empty section after `index`, or at the end when `index` is
    /// past it.
    pub fn add_section(&mut self, index: usize) {
        let at = (index + 1).min(self.sections.len());
        self.sections.insert(at, CostTableSection::default());
    }

    /// Returns `false` when `index` is out of range.
    pub fn remove_section(&mut self, index: usize) -> bool {
        if index >= self.sections.len() {
            return false;
        }
        self.sections.remove(index);
        true
    }

    /// Swap section `index` with the one above or below. Returns `false`
    /// when there is no such neighbour.
    pub fn move_section(&mut self, index: usize, direction: MoveDirection) -> bool {
        let Some(target) = neighbour(index, direction, self.sections.len()) else {
            return false;
        };
        self.sections.swap(index, target);
        true
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Direction for moving a table row or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableData {
    #[serde(deserialize_with = "null_as_default")]
    pub rows: Vec<Vec<String>>,
    #[serde(deserialize_with = "null_as_default")]
    pub headers: Vec<String>,
}

/// One edit to a plain table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEdit {
    AddRow,
    RemoveRow(usize),
    AddColumn,
    RemoveColumn(usize),
    UpdateCell { row: usize, column: usize, value: String },
    UpdateHeader { index: usize, value: String },
    MoveRow { index: usize, direction: MoveDirection },
    MoveColumn { index: usize, direction: MoveDirection },
}

impl Default for TableData {
    fn default() -> Self {
        Self {
            rows: vec![vec![String::new(); 2]; 2],
            headers: vec![String::new(); 2],
        }
    }
}

impl TableData {
    #[must_use]
    pub fn from_block(block: &Block) -> Option<Self> {
        if block.kind != BlockType::Table {
            return None;
        }
        Self::decode(block).ok()
    }

    /// # Errors
    ///
    /// When the payload does not have the table shape.
    pub fn decode(block: &Block) -> serde_json::Result<Self> {
        Self::deserialize(&block.data)
    }

    pub fn apply(&mut self, edit: TableEdit) {
        match edit {
            TableEdit::AddRow => self.add_row(),
            TableEdit::RemoveRow(index) => self.remove_row(index),
            TableEdit::AddColumn => self.add_column(),
            TableEdit::RemoveColumn(index) => self.remove_column(index),
            TableEdit::UpdateCell { row, column, value } => self.update_cell(row, column, value),
            TableEdit::UpdateHeader { index, value } => self.update_header(index, value),
            TableEdit::MoveRow { index, direction } => self.move_row(index, direction),
            TableEdit::MoveColumn { index, direction } => self.move_column(index, direction),
        }
    }

    pub fn write_to(&self, block: &mut Block) {
        block.set_field("rows", to_value_or_empty(&self.rows));
        block.set_field("headers", to_value_or_empty(&self.headers));
    }

    fn column_count(&self) -> usize {
        self.rows.first().map_or(self.headers.len(), Vec::len)
    }

    pub fn add_row(&mut self) {
        let width = self.column_count();
        self.rows.push(vec![String::new(); width]);
    }

    pub fn remove_row(&mut self, index: usize) {
        if index < self.rows.len() {
            self.rows.remove(index);
        }
    }

    pub fn add_column(&mut self) {
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.push(String::new());
    }

    pub fn remove_column(&mut self, index: usize) {
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
        if index < self.headers.len() {
            self.headers.remove(index);
        }
    }

    pub fn update_cell(&mut self, row: usize, column: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value.into();
        }
    }

    pub fn update_header(&mut self, index: usize, value: impl Into<String>) {
        if let Some(header) = self.headers.get_mut(index) {
            *header = value.into();
        }
    }

    /// Swap row `index` with its neighbour. Moves past either edge are ignored.
    pub fn move_row(&mut self, index: usize, direction: MoveDirection) {
        if let Some(target) = neighbour(index, direction, self.rows.len()) {
            self.rows.swap(index, target);
        }
    }

    /// Swap column `index` with its neighbour in every row and the headers.
    pub fn move_column(&mut self, index: usize, direction: MoveDirection) {
        let Some(target) = neighbour(index, direction, self.column_count()) else {
            return;
        };
        for row in &mut self.rows {
            if index < row.len() && target < row.len() {
                row.swap(index, target);
            }
        }
        if index < self.headers.len() && target < self.headers.len() {
            self.headers.swap(index, target);
        }
    }

    #[must_use]
    pub fn has_headers(&self) -> bool {
        self.headers.iter().any(|h| !h.is_empty())
    }
}

fn neighbour(index: usize, direction: MoveDirection, len: usize) -> Option<usize> {
    let target = match direction {
        MoveDirection::Up | MoveDirection::Left => index.checked_sub(1)?,
        MoveDirection::Down | MoveDirection::Right => index + 1,
    };
    (index < len && target < len).then_some(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_keeps_value_when_turned_into_list_item() {
        let mut block = Block::text(BlockType::Paragraph, "<b>hello</b>");
        turn_into(&mut block, BlockType::UnorderedItem, &TurnInto::default());
        assert_eq!(block.kind, BlockType::UnorderedItem);
        assert_eq!(block.text_value(), Some("<b>hello</b>"));
    }

    #[test]
    fn heading_conversion_strips_markup() {
        let mut block = Block::text(BlockType::Paragraph, "<b>Intro</b> <i>part</i>");
        turn_into(&mut block, BlockType::Section, &TurnInto::default());
        assert_eq!(block.text_value(), Some("Intro part"));
    }

    #[test]
    fn clear_content_empties_text() {
        let mut block = Block::text(BlockType::Paragraph, "gone");
        let options = TurnInto {
            clear_content: true,
            ..TurnInto::default()
        };
        turn_into(&mut block, BlockType::Subtitle, &options);
        assert_eq!(block.text_value(), Some(""));
    }

    #[test]
    fn image_and_cost_table_take_options() {
        let mut image = Block::text(BlockType::Paragraph, "x");
        let options = TurnInto {
            url: Some("https://img.example/a.png".into()),
            currency: Some("EUR".into()),
            clear_content: false,
        };
        turn_into(&mut image, BlockType::Image, &options);
        assert_eq!(image.data["url"], "https://img.example/a.png");
        assert_eq!(image.data["caption"], "");

        let mut table = Block::text(BlockType::Paragraph, "x");
        turn_into(&mut table, BlockType::CostTable, &options);
        let typed = CostTableData::from_block(&table).expect("cost table payload");
        assert_eq!(typed.currency, "EUR");
        assert_eq!(typed.sections.len(), 1);
    }

    #[test]
    fn payment_starts_at_full_percentage() {
        let mut block = Block::new(BlockType::Paragraph);
        turn_into(&mut block, BlockType::Payment, &TurnInto::default());
        assert_eq!(block.data["percentage"], 100);
    }

    #[test]
    fn strip_tags_handles_unclosed_and_empty() {
        assert_eq!(strip_tags("a<br/>b"), "ab");
        assert_eq!(strip_tags("a < b"), "a < b");
        assert_eq!(strip_tags("<>x"), "<>x");
    }

    #[test]
    fn number_prefix_matches_loose_parsing() {
        assert_eq!(parse_number_prefix("12abc"), Some(12.0));
        assert_eq!(parse_number_prefix(" -3.5"), Some(-3.5));
        assert_eq!(parse_number_prefix("1.2.3"), Some(1.2));
        assert_eq!(parse_number_prefix("abc"), None);
        assert_eq!(parse_number_prefix("2."), Some(2.0));
        assert_eq!(parse_number_prefix(".5x"), Some(0.5));
        assert_eq!(parse_number_prefix(""), None);
    }

    #[test]
    fn number_prefix_reads_exponents() {
        assert_eq!(parse_number_prefix("1e3"), Some(1000.0));
        assert_eq!(parse_number_prefix("2.5E-1kg"), Some(0.25));
        assert_eq!(parse_number_prefix("4e+2"), Some(400.0));
        assert_eq!(parse_number_prefix("7e"), Some(7.0));
        assert_eq!(parse_number_prefix("7e-x"), Some(7.0));
    }

    #[test]
    fn stored_cost_table_with_null_totals_decodes() {
        let mut block = Block::new(BlockType::CostTable);
        block.data = json!({
            "headers": ["Item", "Rate", "Qty", "Cost"],
            "sections": [{"title": "Design", "total": null, "rows": [["Logo", "100", 2, null]]}],
            "currency": "USD",
            "discount": 10,
            "subtotal": null,
            "total": null,
            "version": 3
        });
        let data = CostTableData::decode(&block).expect("lenient decode");
        assert_eq!(data.sections[0].title, "Design");
        assert!(data.sections[0].total.abs() < f64::EPSILON);
        assert_eq!(data.discount, "10");
        assert_eq!(data.currency, "USD");
        assert_eq!(data.version, 3);
        assert_eq!(data.headers[1].as_deref(), Some("Rate"));
        assert!(CostTableData::from_block(&block).is_some());
    }

    #[test]
    fn malformed_cost_table_is_reported() {
        let mut block = Block::new(BlockType::CostTable);
        block.data = json!({"sections": "Design"});
        assert!(CostTableData::decode(&block).is_err());
        assert!(CostTableData::from_block(&block).is_none());
    }

    #[test]
    fn cost_table_section_edits() {
        let mut data = CostTableData::default();
        data.sections[0].title = "First".into();
        data.add_section(0);
        data.add_section(99);
        assert_eq!(data.sections.len(), 3);
        data.sections[2].title = "Last".into();

        assert!(data.move_section(2, MoveDirection::Up));
        assert_eq!(data.sections[1].title, "Last");
        assert!(!data.move_section(0, MoveDirection::Up));
        assert!(!data.move_section(5, MoveDirection::Down));

        assert!(data.remove_section(0));
        assert!(!data.remove_section(7));
        assert_eq!(data.sections[0].title, "Last");

        data.set_label(CostTableLabel::Total, "Grand total");
        assert_eq!(data.total_label, "Grand total");
    }

    #[test]
    fn cost_table_recompute_with_discount() {
        let mut data = CostTableData::default();
        data.sections[0].rows = vec![
            vec![json!("Design"), json!("£1,000"), json!(2), json!(0)],
            vec![json!("Build"), json!("500"), json!("3"), json!(0)],
        ];
        data.sections.push(CostTableSection {
            title: "Extras".into(),
            total: 0.0,
            rows: vec![vec![json!("Hosting"), json!(25), json!(4), json!(0)]],
        });
        data.discount = "10".into();
        data.recompute();

        assert!((data.sections[0].total - 3500.0).abs() < f64::EPSILON);
        assert!((data.sections[1].total - 100.0).abs() < f64::EPSILON);
        assert!((data.subtotal - 3600.0).abs() < f64::EPSILON);
        assert!((data.discount_value - 360.0).abs() < f64::EPSILON);
        assert!((data.discount_percent - 10.0).abs() < 1e-9);
        assert!((data.total - 3240.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_table_bad_inputs_count_as_zero() {
        let mut data = CostTableData::default();
        data.sections[0].rows = vec![vec![json!("?"), json!(""), json!(2), json!(0)]];
        data.discount = "lots".into();
        data.recompute();
        assert_eq!(data.sections[0].rows[0][3], Value::Null);
        assert!(data.subtotal.abs() < f64::EPSILON);
        assert!(data.total.abs() < f64::EPSILON);
    }

    #[test]
    fn cost_table_write_back_keeps_unknown_fields() {
        let mut block = Block::new(BlockType::CostTable);
        block.set_field("legacy", json!(true));
        let mut data = CostTableData::from_block(&block).expect("decode");
        data.discount = "5".into();
        data.write_to(&mut block);
        assert_eq!(block.data["legacy"], true);
        assert_eq!(block.data["discount"], "5");
    }

    #[test]
    fn table_row_and_column_edits() {
        let mut table = TableData::default();
        table.update_cell(0, 0, "a");
        table.update_cell(1, 1, "d");
        table.add_row();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[2].len(), 2);

        table.add_column();
        assert_eq!(table.headers.len(), 3);
        assert!(table.rows.iter().all(|r| r.len() == 3));

        table.move_row(0, MoveDirection::Down);
        assert_eq!(table.rows[1][0], "a");
        table.move_column(0, MoveDirection::Right);
        assert_eq!(table.rows[1][1], "a");

        table.remove_column(1);
        assert!(table.rows.iter().all(|r| r.len() == 2));
        table.remove_row(0);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn table_moves_past_edges_are_ignored() {
        let mut table = TableData::default();
        table.update_cell(0, 0, "top");
        table.move_row(0, MoveDirection::Up);
        assert_eq!(table.rows[0][0], "top");
        table.move_column(1, MoveDirection::Right);
        assert_eq!(table.rows[0][0], "top");
    }

    #[test]
    fn table_edits_apply_by_value() {
        let mut table = TableData::default();
        table.apply(TableEdit::UpdateHeader { index: 0, value: "Name".into() });
        table.apply(TableEdit::AddColumn);
        table.apply(TableEdit::UpdateCell { row: 1, column: 2, value: "x".into() });
        table.apply(TableEdit::MoveColumn { index: 2, direction: MoveDirection::Left });
        assert_eq!(table.headers, vec!["Name", "", ""]);
        assert_eq!(table.rows[1], vec!["", "x", ""]);
        table.apply(TableEdit::RemoveRow(0));
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn table_with_null_headers_decodes() {
        let mut block = Block::new(BlockType::Table);
        block.data = json!({"rows": [["a", "b"]], "headers": null});
        let table = TableData::decode(&block).expect("decode");
        assert!(table.headers.is_empty());
        assert_eq!(table.rows, vec![vec!["a", "b"]]);
    }

    #[test]
    fn table_headers_detection() {
        let mut table = TableData::default();
        assert!(!table.has_headers());
        table.update_header(1, "Qty");
        assert!(table.has_headers());
    }
}
