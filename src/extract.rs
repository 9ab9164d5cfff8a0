//! Zoning fields from the rendered parcel profile report.
//!
//! The report is a single `table#basic` of label/value cells. Labels are
//! matched by substring, exactly as the portal prints them.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use crate::error::ExtractionError;
use crate::model::ZoningFields;

pub const TABLE_ID: &str = "basic";
pub const ZONE_LABEL: &str = "Zone(s):";
pub const FLOOD_HAZARD_LABEL: &str = "Flood Hazard Zone:";
pub const NOT_FOUND: &str = "Not Found";

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#basic").expect("static selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));

pub fn extract_zoning(html: &str) -> Result<ZoningFields, ExtractionError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&TABLE)
        .next()
        .ok_or(ExtractionError::TableNotFound(TABLE_ID))?;

    let zones = zone_list(table);
    let flood_hazard_zone = flood_hazard_zone(table).unwrap_or_else(|| NOT_FOUND.to_string());
    debug!(?zones, %flood_hazard_zone, "report fields extracted");

    Ok(ZoningFields {
        zones,
        flood_hazard_zone,
    })
}

/// Zones listed under the `Zone(s):` label, in document order.
///
/// The label cell spans one row per zone. The first zone sits in the last
/// cell of the label's own row; each following spanned row carries its zone
/// in its first cell. A missing row ends the walk with what was collected.
fn zone_list(table: ElementRef<'_>) -> Vec<String> {
    let Some(label) = table.select(&CELL).find(|td| raw_text(*td).contains(ZONE_LABEL)) else {
        return Vec::new();
    };
    let span = label
        .value()
        .attr("rowspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);

    let Some(mut row) = enclosing_row(label) else {
        return Vec::new();
    };

    let mut zones = Vec::new();
    if let Some(cell) = row.select(&CELL).last() {
        zones.push(cell_text(cell));
    }
    for _ in 1..span {
        let Some(next) = next_sibling_row(row) else {
            break;
        };
        if let Some(cell) = next.select(&CELL).next() {
            zones.push(cell_text(cell));
        }
        row = next;
    }
    zones
}

fn flood_hazard_zone(table: ElementRef<'_>) -> Option<String> {
    let label = table
        .select(&CELL)
        .find(|td| raw_text(*td).contains(FLOOD_HAZARD_LABEL))?;
    let value = label
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")?;
    Some(cell_text(value))
}

fn enclosing_row(cell: ElementRef<'_>) -> Option<ElementRef<'_>> {
    cell.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
}

fn next_sibling_row(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
}

fn raw_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Text nodes trimmed and joined with single spaces.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: &str) -> String {
        format!("<html><body><table id=\"basic\"><tbody>{rows}</tbody></table></body></html>")
    }

    #[test]
    fn walks_spanned_rows_in_order() {
        let html = page(
            r#"<tr><td rowspan="3">Zone(s):</td><td>A1-1</td></tr>
               <tr><td>A2-4</td></tr>
               <tr><td>RD1.5</td></tr>
               <tr><td>Flood Hazard Zone:</td><td> Outside Flood Zone </td></tr>"#,
        );
        let fields = extract_zoning(&html).unwrap();
        assert_eq!(fields.zones, vec!["A1-1", "A2-4", "RD1.5"]);
        assert_eq!(fields.flood_hazard_zone, "Outside Flood Zone");
    }

    #[test]
    fn single_zone_without_rowspan() {
        let html = page("<tr><td>Zone(s):</td><td>C2</td></tr>");
        let fields = extract_zoning(&html).unwrap();
        assert_eq!(fields.zones, vec!["C2"]);
    }

    #[test]
    fn missing_labels_degrade_to_defaults() {
        let html = page("<tr><td>Address:</td><td>1 MAIN ST</td></tr>");
        let fields = extract_zoning(&html).unwrap();
        assert!(fields.zones.is_empty());
        assert_eq!(fields.flood_hazard_zone, NOT_FOUND);
    }

    #[test]
    fn short_table_yields_partial_zone_list() {
        let html = page(r#"<tr><td rowspan="4">Zone(s):</td><td>R1</td></tr><tr><td>R2</td></tr>"#);
        let fields = extract_zoning(&html).unwrap();
        assert_eq!(fields.zones, vec!["R1", "R2"]);
    }

    #[test]
    fn unparsable_rowspan_counts_as_one() {
        let html = page(r#"<tr><td rowspan="x">Zone(s):</td><td>R3</td></tr><tr><td>ignored</td></tr>"#);
        assert_eq!(extract_zoning(&html).unwrap().zones, vec!["R3"]);
    }

    #[test]
    fn oversized_rowspan_stops_at_the_last_row() {
        for span in ["18446744073709551615", "100000000000000"] {
            let html = page(&format!(
                r#"<tr><td rowspan="{span}">Zone(s):</td><td>R1</td></tr><tr><td>R2</td></tr>"#
            ));
            assert_eq!(extract_zoning(&html).unwrap().zones, vec!["R1", "R2"]);
        }
    }

    #[test]
    fn flood_label_without_value_cell_is_not_found() {
        let html = page("<tr><td>Zone(s):</td><td>R1</td></tr><tr><td>Flood Hazard Zone:</td></tr>");
        assert_eq!(extract_zoning(&html).unwrap().flood_hazard_zone, NOT_FOUND);
    }

    #[test]
    fn missing_table_is_an_error() {
        let err = extract_zoning("<html><body><table id=\"other\"></table></body></html>").unwrap_err();
        assert_eq!(err, ExtractionError::TableNotFound("basic"));
    }

    #[test]
    fn labels_are_case_sensitive() {
        let html = page("<tr><td>zone(s):</td><td>R1</td></tr>");
        assert!(extract_zoning(&html).unwrap().zones.is_empty());
    }

    #[test]
    fn repeated_extraction_is_identical() {
        let html = page(r#"<tr><td rowspan="2">Zone(s):</td><td>R1</td></tr><tr><td>HPOZ</td></tr>"#);
        assert_eq!(extract_zoning(&html).unwrap(), extract_zoning(&html).unwrap());
    }
}
