use rust_xlsxwriter::{DocProperties, Format, Workbook, XlsxError};

use super::{COLUMNS, ExportMeta, QUANTITY_COLUMN, row_values};
use crate::record::ShipmentRecord;

/// One `Records` sheet: bold header row, one row per record.
pub fn to_xlsx(records: &[ShipmentRecord], meta: &ExportMeta) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let properties = DocProperties::new()
        .set_title(&meta.title)
        .set_comment(format!("Generated {}", meta.generated_at.to_rfc3339()));
    workbook.set_properties(&properties);

    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Records")?;

    for (col, title) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in row_values(record).iter().enumerate() {
            // Numeric so the column can be summed.
            if col == QUANTITY_COLUMN {
                if let Some(quantity) = record.quantity {
                    sheet.write_number(row, col as u16, quantity)?;
                }
                continue;
            }
            if !value.is_empty() {
                sheet.write_string(row, col as u16, value)?;
            }
        }
    }

    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();
    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDraft;
    use calamine::{Data, Reader, open_workbook_auto_from_rs};
    use chrono::Utc;
    use std::io::Cursor;

    #[test]
    fn test_sheet_layout() {
        let mut draft = RecordDraft::default();
        for assignment in [
            "exporter=Andes Berry Co",
            "consignee=Pacific Fresh Inc",
            "invoice_no=ABC-9",
            "final_destination=United States",
            "commodity=Blueberries",
            "quantity=18.5",
        ] {
            draft.assign(assignment).unwrap();
        }
        let record = draft.build(Utc::now()).unwrap();
        let meta = ExportMeta {
            title: "PQ Certification Records".to_string(),
            generated_at: Utc::now(),
        };

        let bytes = to_xlsx(std::slice::from_ref(&record), &meta).unwrap();

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Records".to_string()]);
        let range = workbook.worksheet_range("Records").unwrap();
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Invoice No".to_string())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("ABC-9".to_string())));
        assert_eq!(
            range.get_value((1, QUANTITY_COLUMN as u32)),
            Some(&Data::Float(18.5))
        );
        assert_eq!(range.height(), 2);
    }
}
