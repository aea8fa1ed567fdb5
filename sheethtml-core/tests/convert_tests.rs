use sheethtml_core::{ConvertOptions, Converter, Templates};
use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellXfs>
  <dxfs count="1">
    <dxf><font><b/><color rgb="FF9C0006"/></font><fill><patternFill><bgColor rgb="FFFFC7CE"/></patternFill></fill></dxf>
  </dxfs>
</styleSheet>"#;

const DATA_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="inlineStr"><is><t>Header &amp; more</t></is></c>
      <c r="C1"><v>10</v></c>
      <c r="D1" t="inlineStr"><is><t>Go</t></is></c>
    </row>
    <row r="2"><c r="C2"><v>1</v></c></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B2"/></mergeCells>
  <conditionalFormatting sqref="C1:C2">
    <cfRule type="cellIs" dxfId="0" priority="1" operator="greaterThan"><formula>5</formula></cfRule>
  </conditionalFormatting>
  <hyperlinks><hyperlink ref="D1" location="'Other Sheet'!A1"/></hyperlinks>
</worksheet>"#;

const PLAIN_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData><row r="1"><c r="A1"><v>42</v></c></row></sheetData>
</worksheet>"#;

const IMAGE_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData><row r="1"><c r="A1" t="e" vm="1"><v>#VALUE!</v></c></row></sheetData>
</worksheet>"#;

/// (name, state, worksheet xml)
type SheetSpec<'a> = (&'a str, Option<&'a str>, &'a str);

/// Write a minimal XLSX package with the given sheets and extra parts
fn create_xlsx(path: &Path, sheets: &[SheetSpec], extra: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{}">"#, RELS_NS);
    for (i, (name, state, _)) in sheets.iter().enumerate() {
        let state = state.map(|s| format!(r#" state="{}""#, s)).unwrap_or_default();
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}"{} r:id="rId{}"/>"#,
            name,
            i + 1,
            state,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            WORKSHEET_REL,
            i + 1
        ));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(rels.as_bytes())?;
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES_XML.as_bytes())?;
    for (i, (_, _, xml)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(xml.as_bytes())?;
    }
    for (name, content) in extra {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image::RgbaImage::new(width, height)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

fn rich_value_parts() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        (
            "xl/richData/_rels/richValueRel.xml.rels",
            format!(
                r#"<Relationships xmlns="{}"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/></Relationships>"#,
                RELS_NS
            )
            .into_bytes(),
        ),
        (
            "xl/richData/richValueRel.xml",
            br#"<richValueRels xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><rel r:id="rId1"/></richValueRels>"#.to_vec(),
        ),
        (
            "xl/richData/rdrichvaluestructure.xml",
            br#"<rvStructures count="1"><s t="_localImage"><k n="_rvRel:LocalImageIdentifier" t="i"/><k n="CalcOrigin" t="i"/></s></rvStructures>"#.to_vec(),
        ),
        (
            "xl/richData/rdrichvalue.xml",
            br#"<rvData count="1"><rv s="0"><v>0</v><v>5</v></rv></rvData>"#.to_vec(),
        ),
        (
            "xl/metadata.xml",
            br#"<metadata><valueMetadata count="1"><bk><rc t="1" v="0"/></bk></valueMetadata></metadata>"#.to_vec(),
        ),
        ("xl/media/image1.png", png(4, 2)),
    ]
}

/// Opening `<td>` tag of the cell with the given id
fn td_tag<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let start = html.find(&format!("<td id=\"{}\"", id))?;
    let end = start + html[start..].find('>')?;
    Some(&html[start..=end])
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_merges_conditional_formatting_and_links() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("report.xlsx");
    let dest = dir.path().join("report.html");
    create_xlsx(
        &source,
        &[
            ("Data", None, DATA_SHEET),
            ("Other Sheet", None, PLAIN_SHEET),
        ],
        &[],
    )?;

    let options = ConvertOptions {
        apply_conditional_formatting: true,
        ..Default::default()
    };
    let converter = Converter::new(Templates::default(), options)?;
    let outcome = converter.convert(&source, &dest);
    assert!(outcome.ok, "{:?}", outcome.error);
    let html = fs::read_to_string(&dest)?;

    assert!(html.contains("<title>report.xlsx</title>"));
    assert!(html.contains(r#"<meta name="generator" content="sheethtml "#));
    assert!(html.contains("<!-- Generated by sheethtml "));

    let anchor = td_tag(&html, "Data!A1").expect("merge anchor is rendered");
    assert!(anchor.contains(r#"colspan="2""#));
    assert!(anchor.contains(r#"rowspan="2""#));
    assert!(!anchor.contains("sheethtml_cf_"));
    assert!(html.contains("Header &amp; more"));
    assert!(td_tag(&html, "Data!B1").is_none());
    assert!(td_tag(&html, "Data!A2").is_none());

    let matched = td_tag(&html, "Data!C1").expect("C1 is rendered");
    assert!(matched.contains("sheethtml_cf_"));
    let unmatched = td_tag(&html, "Data!C2").expect("C2 is rendered");
    assert!(!unmatched.contains("sheethtml_cf_"));
    assert!(html.contains("/*conditional formatting*/"));
    assert!(html.contains("!important"));

    assert!(html.contains(
        r##"<a href="about:srcdoc#sheet_001" class="xlsx_sheet-link sharepoint_visible">Go</a>"##
    ));
    assert!(html.contains(r##"<a href="#sheet_001" class="xlsx_sheet-link js_visible">Go</a>"##));
    Ok(())
}

#[test]
fn test_conditional_formatting_is_opt_in() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("data.xlsx");
    let dest = dir.path().join("data.html");
    create_xlsx(&source, &[("Data", None, DATA_SHEET)], &[])?;

    Converter::default().try_convert(&source, &dest)?;
    let html = fs::read_to_string(&dest)?;
    assert!(!html.contains("sheethtml_cf_"));
    Ok(())
}

#[test]
fn test_hidden_sheets_are_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("book.xlsx");
    let dest = dir.path().join("book.html");
    create_xlsx(
        &source,
        &[
            ("Visible", None, PLAIN_SHEET),
            ("Secret", Some("hidden"), PLAIN_SHEET),
            ("Deep", Some("veryHidden"), PLAIN_SHEET),
            ("Last", None, PLAIN_SHEET),
        ],
        &[],
    )?;

    Converter::default().try_convert(&source, &dest)?;
    let html = fs::read_to_string(&dest)?;
    assert!(html.contains(r#"id="sheet_000""#));
    assert!(html.contains(r#"id="sheet_003""#));
    assert!(!html.contains("Secret"));
    assert!(!html.contains("Deep"));
    assert!(html.contains(r##"href="#sheet_003">Last</a>"##));
    Ok(())
}

#[test]
fn test_hidden_only_workbook_emits_empty_navigation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("hidden.xlsx");
    let dest = dir.path().join("hidden.html");
    create_xlsx(&source, &[("Secret", Some("hidden"), PLAIN_SHEET)], &[])?;

    let outcome = Converter::default().convert(&source, &dest);
    assert!(outcome.ok, "{:?}", outcome.error);
    let html = fs::read_to_string(&dest)?;
    assert!(html.contains("<nav class=\"xlsx_sheet-names\"><ul>\n\n</ul></nav>"));
    assert!(!html.contains("<table"));
    assert!(!html.contains("Secret"));
    Ok(())
}

#[test]
fn test_max_sheets_limits_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("book.xlsx");
    let dest = dir.path().join("book.html");
    create_xlsx(
        &source,
        &[("First", None, PLAIN_SHEET), ("Second", None, PLAIN_SHEET)],
        &[],
    )?;

    let options = ConvertOptions {
        max_sheets: Some(1),
        ..Default::default()
    };
    Converter::new(Templates::default(), options)?.try_convert(&source, &dest)?;
    let html = fs::read_to_string(&dest)?;
    assert!(html.contains("First"));
    assert!(!html.contains("Second"));
    Ok(())
}

#[test]
fn test_incell_image_is_embedded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("images.xlsx");
    let dest = dir.path().join("images.html");
    create_xlsx(&source, &[("Pictures", None, IMAGE_SHEET)], &rich_value_parts())?;

    Converter::default().try_convert(&source, &dest)?;
    let html = fs::read_to_string(&dest)?;
    assert!(html.contains(r#".vm-richvaluerel_rid1 img { content:url("data:image/png;base64,"#));
    assert!(html.contains(".cell_0_0_0 img {"));
    let cell = td_tag(&html, "Pictures!A1").expect("image cell is rendered");
    assert!(cell.contains("incell-image"));
    assert!(html.contains(r#"<img alt="" loading="lazy" decoding="async"></td>"#));
    Ok(())
}

#[test]
fn test_unresolved_rich_value_warns() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("images.xlsx");
    let dest = dir.path().join("images.html");
    create_xlsx(&source, &[("Pictures", None, IMAGE_SHEET)], &[])?;

    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let outcome = tracing::subscriber::with_default(subscriber, || {
        Converter::default().convert(&source, &dest)
    });

    assert!(outcome.ok, "{:?}", outcome.error);
    assert!(logs.contents().contains("No image target for rich value 1"));
    let html = fs::read_to_string(&dest)?;
    assert!(!html.contains("data:image/png"));
    Ok(())
}

#[test]
fn test_failed_conversion_keeps_existing_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("broken.xlsx");
    let dest = dir.path().join("broken.html");
    fs::write(&source, b"not a zip archive")?;
    fs::write(&dest, "previous")?;

    let outcome = Converter::default().convert(&source, &dest);
    assert!(!outcome.ok);
    assert!(outcome.error.unwrap().contains("broken.xlsx"));
    assert_eq!(fs::read_to_string(&dest)?, "previous");
    assert_eq!(fs::read_dir(dir.path())?.count(), 2);
    Ok(())
}

#[test]
fn test_custom_templates_are_used() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("custom.xlsx");
    let dest = dir.path().join("custom.html");
    create_xlsx(&source, &[("Only", None, PLAIN_SHEET)], &[])?;

    let templates = Templates {
        sheet_html: "<article id=\"{enc_sheet_name}\">{table_generated_html}</article>".into(),
        sheetname_html: "<b>{sheet_name}</b>".into(),
        index_html: "<html><head></head><body>{sheets_names_generated_html}{sheets_generated_html}</body></html>".into(),
        ..Default::default()
    };
    Converter::new(templates, ConvertOptions::default())?.try_convert(&source, &dest)?;
    let html = fs::read_to_string(&dest)?;
    assert!(html.starts_with(r#"<html><head><meta name="generator""#));
    assert!(html.contains("<b>Only</b><article id=\"sheet_000\"><table"));
    assert!(html.ends_with("</article></body></html>"));
    Ok(())
}

#[test]
fn test_script_templates_are_not_rewritten() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("script.xlsx");
    let dest = dir.path().join("script.html");
    create_xlsx(&source, &[("Data", None, DATA_SHEET), ("Other Sheet", None, PLAIN_SHEET)], &[])?;

    let safari_js = r#"var link = '<a href="https://example.com">' + '</a>';"#;
    let templates = Templates {
        safari_js: safari_js.into(),
        ..Default::default()
    };
    Converter::new(templates, ConvertOptions::default())?.try_convert(&source, &dest)?;
    let html = fs::read_to_string(&dest)?;
    assert!(html.contains(&format!("<script>{}</script>", safari_js)));
    assert!(html.contains(r##"<a href="#sheet_001" class="xlsx_sheet-link js_visible">Go</a>"##));
    Ok(())
}
