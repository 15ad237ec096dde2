//! Line-item extraction from the platform's HTML invoice view.
//!
//! Used only when an event carries no structured items. The parser is
//! deliberately narrow: find the table header row naming qty/description/
//! price, then read data rows until a totals row. Unparseable rows are
//! skipped so a template hiccup degrades to fewer items, never to a failed
//! delivery.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::resolver::SourceItem;

static ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(.+?)\s+\$([0-9][0-9,]*\.?\d*)\s+\$([0-9][0-9,]*\.?\d*)$")
        .expect("row pattern")
});

/// Extracts candidate line items from an HTML invoice document.
pub fn extract_items(html: &str) -> Vec<SourceItem> {
    let mut items = Vec::new();
    let mut in_items = false;
    for row in table_rows(html) {
        let text = strip_tags(&row);
        let lowered = text.to_lowercase();
        if !in_items {
            if lowered.contains("qty") && lowered.contains("description") && lowered.contains("price")
            {
                in_items = true;
            }
            continue;
        }
        if lowered.starts_with("subtotal") || lowered.starts_with("total") {
            break;
        }
        if let Some(item) = parse_row(&text) {
            items.push(item);
        }
    }
    items
}

/// Splits the document into `<tr>` fragments, tags included.
fn table_rows(html: &str) -> Vec<String> {
    let lowered = html.to_ascii_lowercase();
    let mut rows = Vec::new();
    let mut cursor = 0;
    while cursor < lowered.len() {
        let Some(start_offset) = lowered[cursor..].find("<tr") else {
            break;
        };
        let start = cursor + start_offset;
        let (end, next) = match lowered[start..].find("</tr>") {
            Some(offset) => (start + offset, start + offset + "</tr>".len()),
            None => (lowered.len(), lowered.len()),
        };
        rows.push(html[start..end].to_string());
        cursor = next;
    }
    rows
}

/// Parses one tag-stripped row of the shape `<qty> <name> $<price> $<total>`.
fn parse_row(text: &str) -> Option<SourceItem> {
    let captures = ROW_PATTERN.captures(text)?;
    let quantity: u32 = captures[1].parse().ok()?;
    if quantity == 0 {
        return None;
    }
    let raw_name = &captures[2];
    // Trailing "- description" segments belong to the invoice prose, not
    // the product name.
    let name = match raw_name.split_once(" - ") {
        Some((head, _)) => head,
        None => raw_name,
    };
    let price = parse_money(&captures[3])?;
    Some(SourceItem {
        name: name.trim().to_string(),
        quantity,
        price: Some(price),
    })
}

fn parse_money(raw: &str) -> Option<Decimal> {
    raw.replace(',', "").parse().ok()
}

/// Flattens an HTML fragment to its visible text with whitespace collapsed.
fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if in_tag => {}
            _ => text.push(ch),
        }
    }
    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE: &str = r#"
        <html><body>
        <h1>Invoice #1204</h1>
        <table>
          <tr><th>Qty</th><th>Description</th><th>Unit Price</th><th>Total</th></tr>
          <tr><td>2</td><td>Glazed Donut</td><td>$2.50</td><td>$5.00</td></tr>
          <tr><td>1</td><td>Coffee Box - serves 10</td><td>$18.00</td><td>$18.00</td></tr>
          <tr><td>3</td><td>Fruit &amp; Cheese Tray</td><td>$1,200.00</td><td>$3,600.00</td></tr>
          <tr><td colspan="3">Subtotal</td><td>$3,623.00</td></tr>
          <tr><td colspan="3">Total</td><td>$3,623.00</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn extracts_rows_after_the_header() {
        let items = extract_items(INVOICE);
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].name, "Glazed Donut");
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].price, Some(Decimal::new(250, 2)));

        assert_eq!(items[1].name, "Coffee Box");
        assert_eq!(items[1].quantity, 1);

        assert_eq!(items[2].name, "Fruit & Cheese Tray");
        assert_eq!(items[2].price, Some(Decimal::new(120_000, 2)));
    }

    #[test]
    fn stops_at_the_subtotal_row() {
        let items = extract_items(INVOICE);
        assert!(items.iter().all(|item| !item.name.contains("Subtotal")));
    }

    #[test]
    fn skips_rows_that_do_not_parse() {
        let html = r#"
        <table>
          <tr><th>Qty</th><th>Description</th><th>Price</th></tr>
          <tr><td>2</td><td>Glazed Donut</td><td>$2.50</td><td>$5.00</td></tr>
          <tr><td colspan="4">-- catering notes: deliver to loading dock --</td></tr>
          <tr><td>1</td><td>Coffee Box</td><td>$18.00</td><td>$18.00</td></tr>
          <tr><td>Total</td></tr>
        </table>
        "#;
        let items = extract_items(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "Coffee Box");
    }

    #[test]
    fn no_header_row_means_no_items() {
        let html = "<table><tr><td>2</td><td>Donut</td><td>$1.00</td><td>$2.00</td></tr></table>";
        assert!(extract_items(html).is_empty());
    }

    #[test]
    fn returns_empty_for_non_table_documents() {
        assert!(extract_items("<html><body><p>No invoice here.</p></body></html>").is_empty());
        assert!(extract_items("").is_empty());
    }

    #[test]
    fn zero_quantity_rows_are_dropped() {
        let html = r#"
        <table>
          <tr><th>Qty</th><th>Description</th><th>Price</th></tr>
          <tr><td>0</td><td>Phantom Item</td><td>$4.00</td><td>$0.00</td></tr>
        </table>
        "#;
        assert!(extract_items(html).is_empty());
    }
}
