use std::io::Cursor;

use docx_rs::{AlignmentType, Docx, Paragraph, Run, Table, TableCell, TableRow};
use serde::Serialize;

use crate::report::ReportError;

const TITLE_SIZE: usize = 32;
const CAPTION_SIZE: usize = 26;
const BODY_SIZE: usize = 20;

/// A captioned table of preformatted cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    pub caption: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSections {
    pub title: String,
    pub period: String,
    pub summaries: Vec<TableData>,
    pub detail: Option<TableData>,
    pub footer: String,
    pub record_count: usize,
}

fn text_paragraph(text: &str, size: usize, bold: bool) -> Paragraph {
    let mut run = Run::new().add_text(text).size(size);
    if bold {
        run = run.bold();
    }
    Paragraph::new().add_run(run)
}

fn table_row(cells: &[String], bold: bool) -> TableRow {
    TableRow::new(
        cells
            .iter()
            .map(|cell| TableCell::new().add_paragraph(text_paragraph(cell, BODY_SIZE, bold)))
            .collect(),
    )
}

fn build_table(data: &TableData) -> Table {
    let mut rows = Vec::with_capacity(data.rows.len() + 1);
    rows.push(table_row(&data.header, true));
    rows.extend(data.rows.iter().map(|row| table_row(row, false)));
    Table::new(rows)
}

/// Serializes the sections into a `.docx` document held in memory.
pub fn render(sections: &ReportSections) -> Result<Vec<u8>, ReportError> {
    let title = text_paragraph(&sections.title, TITLE_SIZE, true).align(AlignmentType::Center);
    let period = text_paragraph(&sections.period, BODY_SIZE, false).align(AlignmentType::Center);
    let mut doc = Docx::new().add_paragraph(title).add_paragraph(period);

    for table in &sections.summaries {
        doc = doc
            .add_paragraph(text_paragraph(&table.caption, CAPTION_SIZE, true))
            .add_table(build_table(table));
    }
    if let Some(detail) = &sections.detail {
        doc = doc
            .add_paragraph(text_paragraph(&detail.caption, CAPTION_SIZE, true))
            .add_table(build_table(detail));
    }
    doc = doc.add_paragraph(
        Paragraph::new()
            .add_run(Run::new().add_text(&sections.footer).size(BODY_SIZE).italic())
            .align(AlignmentType::Right),
    );

    let mut buffer = Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buffer)
        .map_err(|err| ReportError::Render(err.to_string()))?;
    Ok(buffer.into_inner())
}
