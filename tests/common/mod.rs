//! Shared builders for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use zip::write::SimpleFileOptions;

use data_pipeline::config::PipelineConfig;
use data_pipeline::error::PipelineError;
use data_pipeline::pipeline::downloads::{FetchedResponse, LinkFetcher};
use data_pipeline::pipeline::types::BucketKind;
use data_pipeline::pipeline::Pipeline;
use data_pipeline::reporting::RecordingSink;
use data_pipeline::store::MemoryStore;

pub const PROCESS: &str = "energy-sparks-process";
pub const UNPROCESSABLE: &str = "energy-sparks-unprocessable";

/// Bytes of a file under `tests/fixtures/`.
pub fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("missing fixture {}: {e}", path.display()))
}

pub fn base_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_bucket(BucketKind::Process, PROCESS)
        .with_bucket(BucketKind::Unprocessable, UNPROCESSABLE)
}

/// Fetcher that replays canned responses in order of registration and logs
/// every request. Unknown links fail at transport level.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Vec<(String, FetchedResponse)>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, link: &str, response: FetchedResponse) -> Self {
        self.responses.push((link.to_string(), response));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkFetcher for ScriptedFetcher {
    async fn get(&self, url: &str) -> Result<FetchedResponse, PipelineError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.responses
            .iter()
            .find(|(link, _)| link == url)
            .map(|(_, resp)| resp.clone())
            .ok_or_else(|| PipelineError::Transport(format!("connection refused: {url}")))
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub fetcher: Arc<ScriptedFetcher>,
}

pub fn harness(config: PipelineConfig, fetcher: ScriptedFetcher) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let fetcher = Arc::new(fetcher);
    let pipeline = Pipeline::new(config, store.clone(), sink.clone(), fetcher.clone());
    Harness {
        pipeline,
        store,
        sink,
        fetcher,
    }
}

// ── Archives ────────────────────────────────────────────────────────

pub fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
            continue;
        }
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ── Spreadsheets ────────────────────────────────────────────────────

pub enum Cell<'a> {
    /// No `<c>` element at all; the position stays part of the grid.
    Empty,
    Text(&'a str),
    Number(f64),
    /// Excel serial day number styled with the built-in date format.
    Date(f64),
}

/// Cell style 1 carries built-in number format 14 (`m/d/yyyy`).
const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

/// Minimal Office Open XML workbook, one worksheet per entry, inline strings.
pub fn xlsx_of(sheets: &[(&str, Vec<Vec<Cell<'_>>>)]) -> Vec<u8> {
    let mut files: Vec<(String, String)> = Vec::new();

    let overrides: String = (1..=sheets.len())
        .map(|n| {
            format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            )
        })
        .collect();
    files.push((
        "[Content_Types].xml".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>{overrides}</Types>"#
        ),
    ));
    files.push((
        "_rels/.rels".into(),
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.into(),
    ));

    let sheet_entries: String = sheets
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            format!(r#"<sheet name="{name}" sheetId="{id}" r:id="rId{id}"/>"#, id = i + 1)
        })
        .collect();
    files.push((
        "xl/workbook.xml".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{sheet_entries}</sheets></workbook>"#
        ),
    ));

    let mut rels: String = (1..=sheets.len())
        .map(|n| {
            format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            )
        })
        .collect();
    rels.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        sheets.len() + 1
    ));
    files.push((
        "xl/_rels/workbook.xml.rels".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        ),
    ));
    files.push(("xl/styles.xml".into(), STYLES_XML.into()));

    for (i, (_, rows)) in sheets.iter().enumerate() {
        let mut data = String::new();
        for (r, row) in rows.iter().enumerate() {
            data.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, cell) in row.iter().enumerate() {
                let reference = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                match cell {
                    Cell::Empty => {}
                    Cell::Text(text) => data.push_str(&format!(
                        r#"<c r="{reference}" t="inlineStr"><is><t>{text}</t></is></c>"#
                    )),
                    Cell::Number(value) => {
                        data.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#))
                    }
                    Cell::Date(serial) => {
                        data.push_str(&format!(r#"<c r="{reference}" s="1"><v>{serial}</v></c>"#))
                    }
                }
            }
            data.push_str("</row>");
        }
        files.push((
            format!("xl/worksheets/sheet{}.xml", i + 1),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData></worksheet>"#
            ),
        ));
    }

    let entries: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(name, body)| (name.as_str(), body.as_bytes()))
        .collect();
    zip_of(&entries)
}
