mod common;

use std::process::Command;

use compound_alias_table::{
    ExtractorBackend, PageSelection, PairingPolicy, PipelineError, PipelineOptions,
    SegmenterStrategy, WarningCode, extract_page_text, find_table_pages, open_pdf,
    page_text_path, parse_page_text_to_csv, read_page_list, run_all,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn all_writes_single_record_from_table_page() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    let output = dir.path().join("aliases.csv");
    common::write_manual_pdf(&input, &common::manual_pages()).expect("PDF fixture should be created");

    let report = run_all(&input, &output, &PipelineOptions::default()).expect("run should succeed");

    let csv = std::fs::read_to_string(&output).expect("CSV should be readable");
    assert_eq!(
        csv,
        "databank,alias_or_code,registered_name\nPURE11,H2O,WATER\n",
        "report: {report:?}"
    );
    assert_eq!(report.scan.table_pages, vec![2]);
    assert_eq!(report.parse.record_count, 1);
    assert!(page_text_path(&output).exists());
}

#[test]
fn staged_commands_match_single_pass() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    let page_list = dir.path().join("pages.txt");
    let page_text = dir.path().join("pages_text.txt");
    let output = dir.path().join("aliases.csv");
    let tables = dir.path().join("tables");
    common::write_manual_pdf(&input, &common::manual_pages()).expect("PDF fixture should be created");
    let options = PipelineOptions::default();

    let scan = find_table_pages(&input, Some(&page_list), &options).expect("scan should succeed");
    assert_eq!(scan.page_count, 3);
    assert_eq!(scan.table_pages, vec![2]);
    assert_eq!(scan.scores[&1], 0);

    let selection = read_page_list(&page_list).expect("page list should be readable");
    assert_eq!(selection.iter().collect::<Vec<_>>(), vec![2]);

    let extracted =
        extract_page_text(&input, &selection, &page_text, &options).expect("extract should succeed");
    assert_eq!(extracted.pages_written, vec![2]);
    let text = std::fs::read_to_string(&page_text).expect("page text should be readable");
    assert!(text.starts_with("===== PAGE 2 =====\n---\nAlias\n---\nName\n---\n"), "{text}");

    let report = parse_page_text_to_csv(&page_text, &output, Some(&tables), &options)
        .expect("parse should succeed");
    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.record_count, 1);
    assert!(tables.join("table_01.txt").exists());
    let table_csv =
        std::fs::read_to_string(tables.join("table_01.csv")).expect("table CSV should be readable");
    assert_eq!(table_csv, "databank,alias_or_code,registered_name\nPURE11,H2O,WATER\n");
}

#[test]
fn out_of_range_pages_are_reported() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    let page_text = dir.path().join("pages_text.txt");
    common::write_manual_pdf(&input, &common::manual_pages()).expect("PDF fixture should be created");

    let selection: PageSelection = "2,9".parse().expect("selection should parse");
    let report = extract_page_text(&input, &selection, &page_text, &PipelineOptions::default())
        .expect("extract should succeed");

    assert_eq!(report.pages_written, vec![2]);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].page, Some(9));
}

#[test]
fn cli_all_exits_zero_and_writes_report() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    let output = dir.path().join("aliases.csv");
    let report = dir.path().join("report.json");
    common::write_manual_pdf(&input, &common::manual_pages()).expect("PDF fixture should be created");

    let status = Command::new(env!("CARGO_BIN_EXE_alias-table"))
        .arg("all")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .status()
        .expect("CLI should run");

    assert!(status.success());
    let body = std::fs::read_to_string(&report).expect("report should be readable");
    let json: serde_json::Value = serde_json::from_str(&body).expect("report should be JSON");
    assert_eq!(json["parse"]["record_count"], 1);
    assert_eq!(json["scan"]["table_pages"][0], 2);
}

#[test]
fn cli_exits_two_when_no_table_page_is_found() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("prose.pdf");
    let output = dir.path().join("aliases.csv");
    common::write_manual_pdf(&input, &[vec!["Nothing to see here."]])
        .expect("PDF fixture should be created");

    let result = Command::new(env!("CARGO_BIN_EXE_alias-table"))
        .args(["all", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .output()
        .expect("CLI should run");

    assert_eq!(result.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("nothing produced: no page was classified as a table page"),
        "unexpected stderr: {stderr}"
    );
    let csv = std::fs::read_to_string(&output).expect("empty CSV should still be written");
    assert_eq!(csv, "databank,alias_or_code,registered_name\n");
}

#[test]
fn cli_exits_one_on_missing_input() {
    let dir = tempdir().expect("tempdir should be created");
    let output = Command::new(env!("CARGO_BIN_EXE_alias-table"))
        .arg("find-pages")
        .arg("--input")
        .arg(dir.path().join("missing.pdf"))
        .output()
        .expect("CLI should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "unexpected stderr: {stderr}");
}

#[test]
fn cli_rejects_unknown_strategy() {
    let dir = tempdir().expect("tempdir should be created");
    let output = Command::new(env!("CARGO_BIN_EXE_alias-table"))
        .args(["--segmenter", "columns", "merge", "--input"])
        .arg(dir.path())
        .arg("--output")
        .arg(dir.path().join("merged.csv"))
        .output()
        .expect("CLI should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown segmenter 'columns'"), "unexpected stderr: {stderr}");
}

#[test]
fn plain_text_backend_keeps_page_boundaries() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    let page_text = dir.path().join("pages_text.txt");
    common::write_manual_pdf(&input, &common::manual_pages()).expect("PDF fixture should be created");
    let options = PipelineOptions {
        backend: ExtractorBackend::PlainText,
        ..PipelineOptions::default()
    };

    let source = open_pdf(&input, ExtractorBackend::PlainText).expect("PDF should open");
    assert_eq!(source.backend_name(), "plain-text");
    assert_eq!(source.page_count(), 3);

    let scan = find_table_pages(&input, None, &options).expect("scan should succeed");
    assert_eq!(scan.table_pages, vec![2]);

    let selection: PageSelection = "2".parse().expect("selection should parse");
    let extracted =
        extract_page_text(&input, &selection, &page_text, &options).expect("extract should succeed");
    assert_eq!(extracted.pages_written, vec![2]);
    let text = std::fs::read_to_string(&page_text).expect("page text should be readable");
    assert!(text.contains("WATER"), "{text}");
    assert!(!text.contains("Introduction"), "{text}");
}

#[test]
fn unreadable_page_is_reported_and_the_run_continues() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    let output = dir.path().join("aliases.csv");
    common::write_pdf_with_unreadable_page(&input, &common::manual_pages(), 2)
        .expect("PDF fixture should be created");

    let report = run_all(&input, &output, &PipelineOptions::default()).expect("run should succeed");

    assert_eq!(report.scan.page_count, 4);
    assert_eq!(report.scan.table_pages, vec![3]);
    assert!(
        report
            .scan
            .warnings
            .iter()
            .any(|warning| warning.code == WarningCode::PageExtractionFailed
                && warning.page == Some(2)),
        "warnings: {:?}",
        report.scan.warnings
    );
    let csv = std::fs::read_to_string(&output).expect("CSV should be readable");
    assert_eq!(csv, "databank,alias_or_code,registered_name\nPURE11,H2O,WATER\n");
}

#[test]
fn auto_backend_fails_only_when_every_backend_fails() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("manual.pdf");
    std::fs::write(&input, "this file is not a PDF").expect("fixture should be written");

    let err = match open_pdf(&input, ExtractorBackend::Auto) {
        Ok(_) => panic!("a non-PDF file should not open"),
        Err(err) => err,
    };
    assert!(matches!(err, PipelineError::PdfUnreadable { .. }), "{err}");

    common::write_manual_pdf(&input, &common::manual_pages()).expect("PDF fixture should be created");
    let source = open_pdf(&input, ExtractorBackend::Auto).expect("a valid PDF should open");
    assert_eq!(source.page_count(), 3);
}

#[test]
fn inline_layout_page_text_parses_one_row_per_line() {
    let dir = tempdir().expect("tempdir should be created");
    let page_text = dir.path().join("pages_text.txt");
    let output = dir.path().join("aliases.csv");
    std::fs::write(
        &page_text,
        "===== [PAGE 12] =====\n\
         Alias Name P11 P10\n\
         H2O WATER X X\n\
         CH3COOH ACETIC ACID X\n\
         \n\
         ===== [PAGE 13] =====\n",
    )
    .expect("fixture should be written");
    let options = PipelineOptions {
        segmenter: SegmenterStrategy::InlineHeader,
        pairing: PairingPolicy::SingleLine,
        delimit_lines: false,
        ..PipelineOptions::default()
    };

    let report =
        parse_page_text_to_csv(&page_text, &output, None, &options).expect("parse should succeed");

    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.record_count, 2);
    let csv = std::fs::read_to_string(&output).expect("CSV should be readable");
    assert_eq!(
        csv,
        "databank,alias_or_code,registered_name\nPURE11,CH3COOH,ACETIC-ACID\nPURE11,H2O,WATER\n"
    );
}

#[test]
fn cli_no_delimiters_reads_inline_rows() {
    let dir = tempdir().expect("tempdir should be created");
    let page_text = dir.path().join("pages_text.txt");
    let output = dir.path().join("aliases.csv");
    std::fs::write(
        &page_text,
        "===== [PAGE 1] =====\nALIAS NAME P11\nN2 NITROGEN X\n",
    )
    .expect("fixture should be written");

    let status = Command::new(env!("CARGO_BIN_EXE_alias-table"))
        .args(["--no-delimiters", "parse", "--input"])
        .arg(&page_text)
        .arg("--output")
        .arg(&output)
        .status()
        .expect("CLI should run");

    assert!(status.success());
    let csv = std::fs::read_to_string(&output).expect("CSV should be readable");
    assert_eq!(csv, "databank,alias_or_code,registered_name\nPURE11,N2,NITROGEN\n");
}
