//! Small DOM helpers shared by the extractors.

use scraper::{ElementRef, Html, Node, Selector};
use vendex_core::normalize::collapse_whitespace;
use vendex_core::{AppError, CellRef};

pub(crate) fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e:?}")))
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Text of an element, leaving out every descendant element named in `skip`.
pub(crate) fn text_excluding(el: ElementRef<'_>, skip: &[&str]) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if skip.contains(&e.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.push_str(&text_excluding(child_el, skip));
                }
            }
            _ => {}
        }
    }
    out
}

pub(crate) fn attr(doc: &Html, css: &str, name: &str) -> Result<Option<String>, AppError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(name))
        .map(String::from))
}

/// Rows of `table`, looking through `thead`/`tbody`/`tfoot` but not into nested tables.
pub(crate) fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| c.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

pub(crate) fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

/// 1-based column of a row.
pub(crate) fn nth_cell(cells: &[ElementRef<'_>], col: usize) -> Option<String> {
    col.checked_sub(1)
        .and_then(|i| cells.get(i))
        .map(|c| element_text(*c))
}

/// The cell at `cell` in the first table matching `tables` that has one.
pub(crate) fn find_cell<'a>(doc: &'a Html, tables: &Selector, cell: CellRef) -> Option<ElementRef<'a>> {
    let row = cell.row.checked_sub(1)?;
    let col = cell.col.checked_sub(1)?;
    doc.select(tables).find_map(|table| {
        table_rows(table)
            .get(row)
            .and_then(|r| row_cells(*r).get(col).copied())
    })
}

/// Parse a single `<tr>` outside its page. The wrapper keeps the parser
/// from dropping table tags it finds out of context.
pub(crate) fn parse_row(markup: &str) -> Html {
    Html::parse_fragment(&format!("<table>{markup}</table>"))
}
