//! HTML rendering of a parsed section tree.
//!
//! Text payloads are editor markup and are emitted as stored. Everything
//! else that ends up in markup (URLs, captions, table cells, names) is
//! escaped. Blocks of a type this build does not know render as nothing and
//! are reported in [`Rendered::skipped`]; one bad block never blanks the
//! document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::block::{Block, BlockType, Uid};
use crate::model::payload::{CostTableData, TableData};
use crate::outline::{ListKind, Node, Placed, slug};

/// Where the markup is going to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderContext {
    /// The editable view: blocks carry their uid and drag state.
    Editor,
    /// Read-only preview for the author.
    Preview,
    /// A published link; signature and payment blocks need the share uid.
    Shared { share_uid: String },
}

/// Serializable name of a [`RenderContext`] for config and CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Editor,
    #[default]
    Preview,
    Shared,
}

impl RenderMode {
    /// Build the context, using `share_uid` for the shared mode.
    #[must_use]
    pub fn context(self, share_uid: Option<&str>) -> RenderContext {
        match self {
            Self::Editor => RenderContext::Editor,
            Self::Preview => RenderContext::Preview,
            Self::Shared => RenderContext::Shared {
                share_uid: share_uid.unwrap_or_default().to_string(),
            },
        }
    }
}

/// Rendered markup plus the uids of blocks that produced nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub skipped: Vec<Uid>,
}

/// Render `nodes` for `context`.
#[must_use]
pub fn render_html(nodes: &[Node<'_>], context: &RenderContext) -> Rendered {
    let mut renderer = Renderer {
        context,
        out: Rendered::default(),
    };
    renderer.nodes(nodes);
    renderer.out
}

struct Renderer<'c> {
    context: &'c RenderContext,
    out: Rendered,
}

impl Renderer<'_> {
    fn push(&mut self, s: &str) {
        self.out.html.push_str(s);
    }

    fn nodes(&mut self, nodes: &[Node<'_>]) {
        for node in nodes {
            match node {
                Node::Section { heading, children } => {
                    let uid = escape(heading.block.uid.as_str());
                    let anchor = escape(&slug(heading.block.text_value().unwrap_or_default()));
                    self.push(&format!(
                        "<div id=\"container-{uid}\"><a id=\"{anchor}\"></a><div class=\"block-container-highlight\">"
                    ));
                    self.block(heading);
                    self.nodes(children);
                    self.push("</div></div>");
                }
                Node::List { kind, items } => {
                    let tag = match kind {
                        ListKind::Ordered => "ol",
                        ListKind::Unordered => "ul",
                    };
                    self.push(&format!("<{tag}>"));
                    for item in items {
                        self.block(item);
                    }
                    self.push(&format!("</{tag}>"));
                }
                Node::Leaf(placed) => self.block(placed),
            }
        }
    }

    fn block(&mut self, placed: &Placed<'_>) {
        match render_block(placed, self.context) {
            Some(markup) => self.push(&markup),
            None => {
                warn!(
                    uid = %placed.block.uid,
                    kind = %placed.block.kind,
                    "skipping block that cannot be rendered"
                );
                self.out.skipped.push(placed.block.uid.clone());
            }
        }
    }
}

/// Markup for one block, `None` for unknown types and for table payloads
/// that do not decode.
#[must_use]
pub fn render_block(placed: &Placed<'_>, context: &RenderContext) -> Option<String> {
    let block = placed.block;
    let text = || block.text_value().unwrap_or_default();

    let html = match &block.kind {
        BlockType::Section => tagged("h2", placed, context, None, text()),
        BlockType::Subtitle => tagged("h3", placed, context, None, text()),
        BlockType::H3 => tagged("h4", placed, context, None, text()),
        BlockType::Paragraph => tagged("p", placed, context, None, text()),
        BlockType::OrderedItem | BlockType::UnorderedItem => {
            tagged("li", placed, context, None, text())
        }
        BlockType::Quote => {
            let quote = field(block, "quote");
            // Older documents stored the attribution as `caption`.
            let source = match field(block, "source") {
                "" => field(block, "caption"),
                source => source,
            };
            let inner = format!("<p>{quote}</p><cite>{}</cite>", escape(source));
            tagged("blockquote", placed, context, None, &inner)
        }
        BlockType::Image => {
            let inner = format!(
                "<img src=\"{}\" alt=\"{caption}\"><figcaption>{caption}</figcaption>",
                escape(field(block, "url")),
                caption = escape(field(block, "caption")),
            );
            tagged("figure", placed, context, Some("image"), &inner)
        }
        BlockType::Embed => {
            let inner = format!(
                "<iframe src=\"{}\"></iframe><figcaption>{}</figcaption>",
                escape(field(block, "url")),
                escape(field(block, "caption")),
            );
            tagged("figure", placed, context, Some("embed"), &inner)
        }
        BlockType::Divider => format!("<hr{}>", attributes(placed, context, None)),
        BlockType::Table => {
            let table = TableData::from_block(block)?;
            tagged("table", placed, context, None, &table_body(&table))
        }
        BlockType::CostTable => {
            let table = CostTableData::from_block(block)?;
            tagged("table", placed, context, Some("cost-table"), &cost_table_body(&table))
        }
        BlockType::Signature => {
            let signed = !field(block, "signature").is_empty();
            let inner = format!(
                "<span class=\"name\">{}</span><span class=\"state\">{}</span>",
                escape(field(block, "name")),
                if signed { "signed" } else { "awaiting signature" },
            );
            tagged("div", placed, context, Some("signature"), &inner)
        }
        BlockType::Payment => {
            let amount = block.data.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
            let percentage = block
                .data
                .get("percentage")
                .and_then(Value::as_f64)
                .unwrap_or(100.0);
            let inner = format!(
                "<span class=\"amount\">{amount:.2}</span><span class=\"percentage\">{percentage}%</span>"
            );
            tagged("div", placed, context, Some("payment"), &inner)
        }
        BlockType::Unknown(_) => return None,
    };
    Some(html)
}

fn tagged(
    tag: &str,
    placed: &Placed<'_>,
    context: &RenderContext,
    class: Option<&str>,
    inner: &str,
) -> String {
    format!("<{tag}{}>{inner}</{tag}>", attributes(placed, context, class))
}

fn attributes(placed: &Placed<'_>, context: &RenderContext, class: Option<&str>) -> String {
    let mut classes: Vec<&str> = class.into_iter().collect();
    let mut attrs = String::new();

    match context {
        RenderContext::Editor => {
            attrs.push_str(&format!(" data-uid=\"{}\"", escape(placed.block.uid.as_str())));
            if placed.being_dragged {
                classes.push("dragging");
            }
        }
        RenderContext::Shared { share_uid } => {
            if matches!(placed.block.kind, BlockType::Signature | BlockType::Payment) {
                attrs.push_str(&format!(" data-share-uid=\"{}\"", escape(share_uid)));
            }
        }
        RenderContext::Preview => {}
    }

    if classes.is_empty() {
        attrs
    } else {
        format!(" class=\"{}\"{attrs}", classes.join(" "))
    }
}

fn field<'b>(block: &'b Block, key: &str) -> &'b str {
    block.data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn table_body(table: &TableData) -> String {
    let mut out = String::new();
    if table.has_headers() {
        out.push_str("<thead><tr>");
        for header in &table.headers {
            out.push_str(&format!("<th>{}</th>", escape(header)));
        }
        out.push_str("</tr></thead>");
    }
    out.push_str("<tbody>");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", escape(cell)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody>");
    out
}

fn cost_table_body(table: &CostTableData) -> String {
    let mut out = String::new();
    if table.headers.iter().any(Option::is_some) {
        out.push_str("<thead><tr>");
        for header in &table.headers {
            out.push_str(&format!(
                "<th>{}</th>",
                escape(header.as_deref().unwrap_or_default())
            ));
        }
        out.push_str("</tr></thead>");
    }
    out.push_str("<tbody>");
    for section in &table.sections {
        if !section.title.is_empty() {
            out.push_str(&format!(
                "<tr class=\"section\"><th colspan=\"4\">{}</th></tr>",
                escape(&section.title)
            ));
        }
        for row in &section.rows {
            out.push_str("<tr>");
            for cell in row.iter().take(4) {
                out.push_str(&format!("<td>{}</td>", escape(&cell_text(cell))));
            }
            out.push_str("</tr>");
        }
    }
    out.push_str("</tbody><tfoot>");
    out.push_str(&summary_row(&table.subtotal_label, table.subtotal));
    if table.discount_value.abs() > f64::EPSILON {
        let label = format!("{} {}", table.discount_percent, table.discount_label);
        out.push_str(&summary_row(&label, -table.discount_value));
    }
    out.push_str(&summary_row(&table.total_label, table.total));
    out.push_str("</tfoot>");
    out
}

fn summary_row(label: &str, amount: f64) -> String {
    format!(
        "<tr><th colspan=\"3\">{}</th><td>{amount:.2}</td></tr>",
        escape(label)
    )
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Escape text for use in HTML content and double-quoted attributes.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
