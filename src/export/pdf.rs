use std::io::BufWriter;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use tracing::info;

use super::{COLUMNS, ExportError, ExportMeta, row_values};
use crate::record::ShipmentRecord;

// A4 landscape, millimetres.
const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 12.0;
const ROW_HEIGHT: f32 = 5.0;
const FONT_SIZE: f32 = 7.0;
/// Rough Helvetica advance at [`FONT_SIZE`], used to decide where to cut cell text.
const CHAR_WIDTH: f32 = 1.3;

const COLUMN_WIDTHS: [f32; 12] = [
    16.0, 24.0, 18.0, 34.0, 34.0, 24.0, 26.0, 16.0, 16.0, 24.0, 18.0, 18.0,
];

/// Render a paginated record table. Returns PDF bytes.
pub fn to_pdf(records: &[ShipmentRecord], meta: &ExportMeta) -> Result<Vec<u8>, ExportError> {
    let (doc, page1, layer1) =
        PdfDocument::new(&meta.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;

    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = PAGE_HEIGHT - MARGIN;

    layer.use_text(&meta.title, 14.0, Mm(MARGIN), Mm(y), &bold);
    y -= 6.0;
    layer.use_text(
        format!(
            "Generated {} - {} record(s)",
            meta.generated_at.format("%Y-%m-%d %H:%M UTC"),
            records.len()
        ),
        8.0,
        Mm(MARGIN),
        Mm(y),
        &font,
    );
    y -= 8.0;

    draw_row(&layer, y, &COLUMNS.map(str::to_string), &bold);
    y -= ROW_HEIGHT;

    let mut pages = 1;
    for record in records {
        if y < MARGIN {
            pages += 1;
            let (page, layer_idx) =
                doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {pages}"));
            layer = doc.get_page(page).get_layer(layer_idx);
            y = PAGE_HEIGHT - MARGIN;
            draw_row(&layer, y, &COLUMNS.map(str::to_string), &bold);
            y -= ROW_HEIGHT;
        }

        let mut values = row_values(record);
        values[0] = short_id(&values[0]);
        draw_row(&layer, y, &values, &font);
        y -= ROW_HEIGHT;
    }

    if records.is_empty() {
        layer.use_text(
            "No records match the current filter.",
            9.0,
            Mm(MARGIN),
            Mm(y),
            &font,
        );
    }

    info!(pages, rows = records.len(), "PDF table rendered");

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_error)?;
    buf.into_inner()
        .map_err(|e| ExportError::Pdf(format!("buffer error: {e}")))
}

fn draw_row(layer: &PdfLayerReference, y: f32, values: &[String; 12], font: &IndirectFontRef) {
    let mut x = MARGIN;
    for (value, width) in values.iter().zip(COLUMN_WIDTHS) {
        if !value.is_empty() {
            let max_chars = (width / CHAR_WIDTH) as usize;
            layer.use_text(truncate(value, max_chars), FONT_SIZE, Mm(x), Mm(y), font);
        }
        x += width;
    }
}

/// Cut `text` to `max_chars`, marking the cut with "...".
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn pdf_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Pdf(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDraft;
    use chrono::Utc;

    fn records(n: usize) -> Vec<ShipmentRecord> {
        (0..n)
            .map(|i| {
                let mut draft = RecordDraft::default();
                draft.set("exporter", "Green Valley Farms Private Limited Nashik").unwrap();
                draft.set("consignee", "Fresh Imports GmbH").unwrap();
                draft.set("invoice_no", &format!("GV-{i:04}")).unwrap();
                draft.set("final_destination", "Germany").unwrap();
                draft.set("commodity", "Grapes").unwrap();
                draft.build(Utc::now()).unwrap()
            })
            .collect()
    }

    fn meta() -> ExportMeta {
        ExportMeta {
            title: "PQ Certification Records".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Germany", 10), "Germany");
        assert_eq!(truncate("Green Valley Farms", 10), "Green V...");
        assert_eq!(truncate("abc", 2), "...");
    }

    #[test]
    fn test_long_table_paginates() {
        let bytes = to_pdf(&records(80), &meta()).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 2);
    }

    #[test]
    fn test_empty_table_is_single_page() {
        let bytes = to_pdf(&[], &meta()).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
