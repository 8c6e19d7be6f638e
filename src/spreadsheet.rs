//! The admin workbook, written in the SpreadsheetML 2003 dialect: a single
//! named sheet, one hyperlink-typed column and a picklist validation on the
//! status column.  The same layout is read back on import.

use crate::error::ValidationError;

use tracing::error;

pub fn wrap_workbook(xml: String) -> String {
    format!(
        "<?xml version=\"1.0\"?><?mso-application progid=\"Excel.Sheet\"?>{xml}"
    )
}

mod xml {
    use xmlserde_derives::{XmlDeserialize, XmlSerialize};

    pub fn empty_string() -> String {
        String::new()
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    #[xmlserde(root = b"Workbook")]
    pub struct Workbook {
        #[xmlserde(name = b"xmlns", ty = "attr")]
        pub xmlns: Option<String>,
        #[xmlserde(name = b"xmlns:ss", ty = "attr")]
        pub xmlns_ss: Option<String>,
        #[xmlserde(name = b"Worksheet", ty = "child")]
        pub worksheet: Worksheet,
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct Worksheet {
        #[xmlserde(name = b"ss:Name", ty = "attr")]
        pub name: String,
        #[xmlserde(name = b"Table", ty = "child")]
        pub table: Table,
        #[xmlserde(name = b"DataValidation", ty = "child")]
        pub validation: Option<DataValidation>,
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct Table {
        #[xmlserde(name = b"Row", ty = "child")]
        pub rows: Vec<Row>,
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct Row {
        #[xmlserde(name = b"Cell", ty = "child")]
        pub cells: Vec<Cell>,
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct Cell {
        #[xmlserde(name = b"ss:HRef", ty = "attr")]
        pub href: Option<String>,
        #[xmlserde(name = b"Data", ty = "child")]
        pub data: Option<Data>,
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct Data {
        #[xmlserde(name = b"ss:Type", ty = "attr", default = "empty_string")]
        pub ty: String,
        #[xmlserde(ty = "text", default = "empty_string")]
        pub value: String,
    }

    /// Cell-level picklist constraint, in the Excel namespace.
    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct DataValidation {
        #[xmlserde(name = b"xmlns", ty = "attr")]
        pub xmlns: Option<String>,
        #[xmlserde(name = b"Range", ty = "child")]
        pub range: TextElem,
        #[xmlserde(name = b"Type", ty = "child")]
        pub ty: TextElem,
        #[xmlserde(name = b"Value", ty = "child")]
        pub value: TextElem,
    }

    #[derive(XmlSerialize, XmlDeserialize)]
    pub struct TextElem {
        #[xmlserde(ty = "text", default = "empty_string")]
        pub value: String,
    }
}

const SPREADSHEET_NS: &str = "urn:schemas-microsoft-com:office:spreadsheet";
const EXCEL_NS: &str = "urn:schemas-microsoft-com:office:excel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Text(String),
    Link { url: String, label: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCell {
    pub text: String,
    pub href: Option<String>,
}

fn make_cell(kind: &CellKind) -> xml::Cell {
    let (href, label) = match kind {
        CellKind::Text(text) => (None, text.clone()),
        CellKind::Link { url, label } => (Some(url.clone()), label.clone()),
    };
    xml::Cell {
        href,
        data: Some(xml::Data {
            ty: "String".to_string(),
            value: label,
        }),
    }
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// Render the export workbook: a header row, one row per request, and a
/// picklist validation pinned to the status column.
pub fn render_workbook(
    sheet_name: &str,
    header: &[&str],
    rows: &[Vec<CellKind>],
    status_column: usize,
    statuses: &[&str],
) -> String {
    let mut all_rows = Vec::with_capacity(rows.len() + 1);
    all_rows.push(xml::Row {
        cells: header
            .iter()
            .map(|h| make_cell(&CellKind::Text(h.to_string())))
            .collect(),
    });
    for row in rows {
        all_rows.push(xml::Row {
            cells: row.iter().map(make_cell).collect(),
        });
    }

    let col = column_letter(status_column);
    let last_data_row = rows.len() + 1;
    let validation = xml::DataValidation {
        xmlns: Some(EXCEL_NS.to_string()),
        range: xml::TextElem {
            value: format!("{col}2:{col}{}", last_data_row.max(2)),
        },
        ty: xml::TextElem {
            value: "List".to_string(),
        },
        value: xml::TextElem {
            value: format!("\"{}\"", statuses.join(",")),
        },
    };

    let workbook = xml::Workbook {
        xmlns: Some(SPREADSHEET_NS.to_string()),
        xmlns_ss: Some(SPREADSHEET_NS.to_string()),
        worksheet: xml::Worksheet {
            name: sheet_name.to_string(),
            table: xml::Table { rows: all_rows },
            validation: Some(validation),
        },
    };
    wrap_workbook(xmlserde::xml_serialize(workbook))
}

/// Parse an uploaded workbook back into rows of cells, header included.
pub fn parse_workbook(xml_text: &str) -> Result<Vec<Vec<ParsedCell>>, ValidationError> {
    let workbook: xml::Workbook = xmlserde::xml_deserialize_from_str(xml_text).map_err(|e| {
        error!(error = %e, "failed to parse uploaded workbook");
        ValidationError::new("the uploaded file is not a valid workbook")
    })?;
    Ok(workbook
        .worksheet
        .table
        .rows
        .into_iter()
        .map(|row| {
            row.cells
                .into_iter()
                .map(|cell| ParsedCell {
                    text: cell.data.map(|d| d.value).unwrap_or_default(),
                    href: cell.href,
                })
                .collect()
        })
        .collect())
}
