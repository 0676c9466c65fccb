use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;
use tooling_sync::changes::CommentLog;
use tooling_sync::config::Settings;
use tooling_sync::io::excel_read;
use tooling_sync::io::excel_write::{self, ExportWorkbook};
use tooling_sync::forecast;
use tooling_sync::layout::{self, COL_EXPIRATION, HEADERS, LAST_IMPORT_LABEL, WorkbookRow};
use tooling_sync::normalize::date::date_to_serial;
use tooling_sync::model::{NewTooling, ToolingId, ToolingRecord};
use tooling_sync::records;
use tooling_sync::store::{SqliteStore, ToolingStore};
use tooling_sync::sync::{self, RowMutation, SkipReason};
use tooling_sync::ToolError;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn serial(cell: Option<&DataType>) -> Option<f64> {
    match cell {
        Some(DataType::Float(value)) | Some(DataType::DateTime(value)) => Some(*value),
        Some(DataType::Int(value)) => Some(*value as f64),
        _ => None,
    }
}

fn seeded_store() -> (SqliteStore, Vec<ToolingId>) {
    let store = SqliteStore::open_in_memory().expect("store");
    store.migrate().expect("migrate");

    let mut ids = Vec::new();
    for (pn, supplier, life, produced) in [
        ("PN-100", "Acme Tools", 10_000.0, 2_500.0),
        ("PN-200", "Acme Tools", 5_000.0, 0.0),
        ("PN-900", "Other Co", 1_000.0, 10.0),
    ] {
        let mut new = NewTooling::new(pn, supplier);
        new.pn_description = format!("{pn} housing");
        new.tool_description = "Injection mould".into();
        new.tooling_life_qty = life;
        new.produced = produced;
        new.date_remaining_tooling_life = Some("2025-01-15".into());
        new.annual_volume_forecast = Some(1_200.0);
        new.date_annual_volume = Some("2025-01-01".into());
        let record = records::create_tooling(&store, new, None, now()).expect("create");
        ids.push(record.id);
    }
    (store, ids)
}

fn stored_rows(store: &SqliteStore, supplier: &str) -> Vec<WorkbookRow> {
    store
        .list_for_supplier(supplier)
        .expect("list")
        .iter()
        .map(WorkbookRow::from_record)
        .collect()
}

fn workbook_bytes(rows: Vec<WorkbookRow>, supplier: &str) -> Vec<u8> {
    let workbook = ExportWorkbook {
        supplier: supplier.to_string(),
        rows,
        last_import: None,
        exported_at: now(),
    };
    excel_write::workbook_to_buffer(&workbook, &Settings::default()).expect("workbook bytes")
}

/// Hand-built workbook with arbitrary headers and one row of numeric cells.
fn custom_workbook(
    headers: &[&str],
    cells: &[(u16, f64)],
    with_verification: Option<&str>,
) -> Vec<u8> {
    let settings = Settings::default();
    let mut workbook = Workbook::new();

    let data = workbook.add_worksheet();
    data.set_name(&settings.data_sheet).expect("data sheet name");
    for (col, header) in headers.iter().enumerate() {
        data.write_string(0, col as u16, *header).expect("header");
    }
    for (col, value) in cells {
        data.write_number(1, *col, *value).expect("value");
    }

    let info = workbook.add_worksheet();
    info.set_name(&settings.info_sheet).expect("info sheet name");
    info.write_string(0, 0, "Supplier").expect("label");
    info.write_string(0, 1, "Acme Tools").expect("supplier");

    if let Some(key) = with_verification {
        let verification = workbook.add_worksheet();
        verification
            .set_name(&settings.verification_sheet)
            .expect("verification sheet name");
        verification.write_string(0, 0, "key").expect("label");
        verification.write_string(0, 1, key).expect("key");
    }
    workbook.save_to_buffer().expect("custom workbook")
}

#[test]
fn unmodified_export_reimports_without_updates() {
    let (store, _) = seeded_store();
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("acme.xlsx");

    let exported = sync::export_to_file(&store, "Acme Tools", &path, &Settings::default(), now())
        .expect("export");
    assert_eq!(exported, 2);

    let first = sync::import_file(&path, "Acme Tools", &store, &Settings::default(), now())
        .expect("first import");
    assert_eq!((first.created, first.updated), (0, 0));
    assert!(first.skips.contains(&(2, SkipReason::Unchanged(1))));

    let second = sync::import_file(&path, "Acme Tools", &store, &Settings::default(), now())
        .expect("second import");
    assert_eq!((second.created, second.updated), (0, 0));
    assert_eq!(
        store.last_import("acme tools").expect("metadata").as_deref(),
        Some("2025-06-01T09:00:00.000Z")
    );
}

#[test]
fn edited_rows_become_updates_and_new_rows_creations() {
    let (store, ids) = seeded_store();
    let mut rows = stored_rows(&store, "Acme Tools");
    rows[0].produced = 4_000.0;
    rows[0].production_date = Some(ymd(2025, 5, 20));
    rows[1].supplier_comment = "Tool sent for repair".into();
    rows.push(WorkbookRow {
        pn: "PN-300".into(),
        pn_description: "Bracket".into(),
        tooling_life_qty: 2_000.0,
        supplier_comment: "New die".into(),
        ..WorkbookRow::default()
    });
    let bytes = workbook_bytes(rows, "Acme Tools");

    let outcome = sync::import_workbook(&bytes, "Acme Tools", &store, &Settings::default(), now())
        .expect("import");
    assert_eq!((outcome.created, outcome.updated), (1, 2));

    let RowMutation::Update { record, changes, .. } = &outcome.mutations[0] else {
        panic!("first mutation should be an update");
    };
    assert_eq!(record.id, ids[0]);
    assert_eq!(record.remaining_tooling_life_pcs, 6_000.0);
    let labels: Vec<&str> = changes.iter().map(|change| change.label.as_str()).collect();
    assert_eq!(labels, vec!["Produced (qty)", "Production Date"]);
    assert_eq!(changes[1].old_formatted, "15/01/2025");
    assert_eq!(changes[1].new_formatted, "20/05/2025");

    let RowMutation::Update { changes, record, .. } = &outcome.mutations[1] else {
        panic!("second mutation should be an update");
    };
    assert!(changes.is_empty());
    let log = CommentLog::parse(&record.comments);
    let last = log.entries().last().expect("comment entry");
    assert_eq!(last.text, "Tool sent for repair");
    assert_eq!(last.origin.as_deref(), Some("import"));

    let RowMutation::Create { record, .. } = &outcome.mutations[2] else {
        panic!("third mutation should be a creation");
    };
    assert_eq!(record.supplier, "Acme Tools");
    assert_eq!(CommentLog::parse(&record.comments).len(), 2);

    let created = sync::apply_mutations(&store, &outcome).expect("apply");
    assert_eq!(created.len(), 1);
    let stored = store.get(ids[0]).expect("get").expect("stored");
    assert_eq!(stored.produced, 4_000.0);
    assert_eq!(stored.date_remaining_tooling_life.as_deref(), Some("2025-05-20"));
}

#[test]
fn import_rewrites_file_with_new_ids_and_no_comments() {
    let (store, ids) = seeded_store();
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("acme.xlsx");

    let mut rows = stored_rows(&store, "Acme Tools");
    rows[0].supplier_comment = "Checked".into();
    rows.push(WorkbookRow {
        pn: "PN-400".into(),
        tooling_life_qty: 800.0,
        ..WorkbookRow::default()
    });
    let foreign = WorkbookRow {
        id: Some(ids[2]),
        pn: "PN-900".into(),
        tooling_life_qty: 1_000.0,
        produced: 640.0,
        supplier_comment: "Counted on Friday".into(),
        ..WorkbookRow::default()
    };
    rows.push(foreign.clone());
    std::fs::write(&path, workbook_bytes(rows, "Acme Tools")).expect("write workbook");

    let outcome = sync::import_file(&path, "Acme Tools", &store, &Settings::default(), now())
        .expect("import");
    assert_eq!((outcome.created, outcome.updated), (1, 1));
    assert_eq!(outcome.retained, vec![foreign.clone()]);

    let rewritten = std::fs::read(&path).expect("read rewritten file");
    let inbound =
        excel_read::read_workbook(&rewritten, "Acme Tools", &Settings::default()).expect("read");
    let filled: Vec<&WorkbookRow> = inbound
        .rows
        .iter()
        .map(|sheet_row| &sheet_row.row)
        .filter(|row| !row.is_blank())
        .collect();
    assert_eq!(filled.len(), 4);
    assert!(filled.iter().all(|row| row.id.is_some()));
    assert!(filled[..3].iter().all(|row| row.supplier_comment.is_empty()));
    assert_eq!(filled[3], &foreign);
    assert_eq!(store.get(ids[2]).expect("get").expect("stored").produced, 10.0);

    let again = sync::import_file(&path, "Acme Tools", &store, &Settings::default(), now())
        .expect("re-import");
    assert_eq!((again.created, again.updated), (0, 0));
}

#[test]
fn exported_file_carries_formulas_padding_and_import_stamp() {
    let (store, _) = seeded_store();
    let settings = Settings::default();
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("acme.xlsx");
    sync::export_to_file(&store, "Acme Tools", &path, &settings, now()).expect("export");

    let mut workbook: Xlsx<_> = open_workbook(&path).expect("open export");
    let formulas = workbook
        .worksheet_formula(&settings.data_sheet)
        .expect("data sheet")
        .expect("formulas");
    let expected = layout::expiration_formula(2);
    assert_eq!(
        formulas.get_value((1, COL_EXPIRATION as u32)).map(String::as_str),
        Some(expected.trim_start_matches('='))
    );
    assert_eq!(
        formulas.end().map(|(row, _)| row),
        Some(2 + settings.padding_rows)
    );

    let values = workbook
        .worksheet_range(&settings.data_sheet)
        .expect("data sheet")
        .expect("values");
    let cached = forecast::compute_expiration(
        10_000.0,
        2_500.0,
        Some(1_200.0),
        Some(ymd(2025, 1, 15)),
        now().date_naive(),
    )
    .expect("expiration");
    assert_eq!(
        serial(values.get_value((1, COL_EXPIRATION as u32))),
        Some(date_to_serial(cached))
    );

    sync::import_file(&path, "Acme Tools", &store, &settings, now()).expect("import");
    let mut reopened: Xlsx<_> = open_workbook(&path).expect("open rewritten");
    let info = reopened
        .worksheet_range(&settings.info_sheet)
        .expect("info sheet")
        .expect("info values");
    let stamp = info
        .rows()
        .find(|row| row.first().and_then(DataType::get_string) == Some(LAST_IMPORT_LABEL))
        .and_then(|row| row.get(1).and_then(DataType::get_string).map(str::to_string));
    assert_eq!(stamp.as_deref(), Some("2025-06-01T09:00:00.000Z"));
}

#[test]
fn rows_of_other_suppliers_are_skipped() {
    let (store, ids) = seeded_store();
    let mut rows = stored_rows(&store, "Acme Tools");
    rows[0].id = Some(ids[2]);
    rows[0].produced = 999.0;
    let bytes = workbook_bytes(rows, "Acme Tools");

    let outcome = sync::import_workbook(&bytes, "Acme Tools", &store, &Settings::default(), now())
        .expect("import");
    assert_eq!(outcome.updated, 0);
    assert!(outcome.skips.contains(&(2, SkipReason::UnknownId(ids[2]))));
}

#[test]
fn workbook_for_another_supplier_is_rejected() {
    let (store, _) = seeded_store();
    let bytes = workbook_bytes(stored_rows(&store, "Acme Tools"), "Acme Tools");

    let error = sync::import_workbook(&bytes, "Other Co", &store, &Settings::default(), now())
        .expect_err("supplier mismatch");
    assert!(matches!(error, ToolError::SupplierMismatch { .. }));

    let spaced = sync::import_workbook(&bytes, "  ACME tools ", &store, &Settings::default(), now());
    assert!(spaced.is_ok());
}

#[test]
fn verification_sheet_is_required() {
    let records: Vec<ToolingRecord> = Vec::new();
    let missing = custom_workbook(&HEADERS, &[], None);
    let error = sync::import_workbook(&missing, "Acme Tools", &records, &Settings::default(), now())
        .expect_err("missing verification sheet");
    assert!(matches!(error, ToolError::VerificationFailed(_)));

    let wrong = custom_workbook(&HEADERS, &[], Some("some other key"));
    let error = sync::import_workbook(&wrong, "Acme Tools", &records, &Settings::default(), now())
        .expect_err("wrong verification key");
    assert!(matches!(error, ToolError::VerificationFailed(_)));
}

#[test]
fn legacy_header_alias_is_accepted() {
    let (store, ids) = seeded_store();
    let key = Settings::default().verification_key;
    let mut headers = HEADERS.to_vec();
    headers[7] = "Forecast";
    let cells = [(0, ids[0] as f64), (4, 10_000.0), (5, 3_000.0)];

    let bytes = custom_workbook(&headers, &cells, Some(&key));
    let outcome = sync::import_workbook(&bytes, "Acme Tools", &store, &Settings::default(), now())
        .expect("alias accepted");
    assert_eq!(outcome.updated, 1);
}

#[test]
fn missing_column_is_reported_by_position() {
    let records: Vec<ToolingRecord> = Vec::new();
    let key = Settings::default().verification_key;
    let mut headers = HEADERS.to_vec();
    headers.remove(4);

    let bytes = custom_workbook(&headers, &[], Some(&key));
    let error = sync::import_workbook(&bytes, "Acme Tools", &records, &Settings::default(), now())
        .expect_err("header mismatch");
    assert!(matches!(error, ToolError::HeaderMismatch { .. }));
    assert!(error.is_structural());
    assert!(error.to_string().contains("Column 5 (E): expected 'Tooling Life*', found 'Produced*'"));
}
