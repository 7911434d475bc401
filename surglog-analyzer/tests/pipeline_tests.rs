//! End-to-end: encrypted log file → surgeries → storage rows

mod helpers;

use helpers::{at, LogBuilder, DEVICE_KEY, FALLBACK_KEY, FOREIGN_KEY};
use std::path::PathBuf;
use surglog_analyzer::decode::{KeyCandidate, LogDecodeError};
use surglog_analyzer::{LogPipeline, PipelineError, PipelineOptions, ANALYZER_VERSION};
use tempfile::TempDir;

/// Power on, one surgery with a monopolar scissors session, power off
fn surgery_log(key_source: &str) -> String {
    LogBuilder::new(key_source)
        .line(at(8, 0, 0), 0xa01e, [0; 4])
        .line(at(8, 5, 0), 0x310e, [10, 20, 0, 0])
        .line(at(8, 5, 5), 0x1000501e, [0, 0, 5, 0])
        .line(at(8, 5, 10), 0x1000500e, [0, 0, 4, 0])
        .line(at(8, 20, 0), 0x2040a, [7, 0, 0, 0])
        .line(at(8, 45, 10), 0x310e, [20, 10, 0, 0])
        .line(at(8, 46, 10), 0x1000500e, [0, 4, 0, 0])
        .line(at(8, 51, 10), 0xa02e, [0; 4])
        .build()
}

fn options(key: Option<&str>, device_id: Option<&str>) -> PipelineOptions {
    PipelineOptions {
        key: key.map(str::to_string),
        fallback_key: FALLBACK_KEY.to_string(),
        explanation_catalog: None,
        device_id: device_id.map(str::to_string),
    }
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_file_to_rows() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "device.log", &surgery_log(DEVICE_KEY));

    let pipeline = LogPipeline::from_options(&options(Some(DEVICE_KEY), Some("RB-07"))).unwrap();
    let report = pipeline.process_file(&path).unwrap();

    assert_eq!(report.stats.selected_key, Some(KeyCandidate::User));
    assert_eq!(report.events.len(), 8);
    assert_eq!(report.surgeries.len(), 1);

    let surgery = &report.surgeries[0];
    assert_eq!(surgery.start_time, Some(at(8, 5, 0)));
    assert_eq!(surgery.end_time, Some(at(8, 46, 10)));
    assert_eq!(surgery.arm_usage[0].len(), 1);

    let rows = pipeline.rows(&report);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.surgery_id, "RB-07-202403010805");
    assert_eq!(row.device_id, "RB-07");
    assert_eq!(row.start_time.as_deref(), Some("2024-03-01 08:05:00"));
    assert_eq!(row.end_time.as_deref(), Some("2024-03-01 08:46:10"));
    assert!(row.has_fault);
    assert!(!row.success);
    assert!(!row.is_remote);

    let data = &row.structured_data;
    assert_eq!(data.power_cycles.len(), 1);
    assert_eq!(data.power_cycles[0].on_time.as_deref(), Some("2024-03-01 08:00:00"));
    assert_eq!(data.power_cycles[0].off_time.as_deref(), Some("2024-03-01 08:51:10"));

    let usage = &data.arms[0].instrument_usage;
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].instrument_type, 5);
    assert_eq!(usage[0].tool_type, "monopolar curved scissors");
    assert_eq!(usage[0].end_time.as_deref(), Some("2024-03-01 08:46:10"));

    let stats = &data.surgery_stats;
    assert_eq!(stats.faults.len(), 1);
    assert_eq!(stats.faults[0].error_code, "2040a");
    assert_eq!(stats.faults[0].param1, 7);
    assert_eq!(stats.state_machine.len(), 2);
    assert_eq!(stats.state_machine[0].state, 20);

    assert_eq!(data.stages.surgery_start.as_deref(), Some("2024-03-01 08:05:00"));
    assert_eq!(data.stages.power_off.as_deref(), Some("2024-03-01 08:51:10"));
    assert_eq!(data.meta.analyzer_version, ANALYZER_VERSION);
    assert!(!data.meta.is_abnormal_shutdown);
}

#[test]
fn test_invalid_utf8_line_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let key = helpers::key(FALLBACK_KEY);

    let mut bytes = helpers::encrypt_line(at(8, 0, 0), 0xa01e, [0; 4], &key).into_bytes();
    bytes.push(b'\n');
    bytes.extend_from_slice(b"DT#2024-03-01-08:01:00 \xff\xfe 0 0 0 0\n");
    bytes.extend(helpers::encrypt_line(at(8, 2, 0), 0x1000520e, [3, 0, 0, 0], &key).into_bytes());
    bytes.push(b'\n');
    let path = temp_dir.path().join("corrupt.log");
    std::fs::write(&path, &bytes).unwrap();

    let pipeline = LogPipeline::from_options(&options(None, None)).unwrap();
    let report = pipeline.process_file(&path).unwrap();

    assert_eq!(report.events.len(), 2);
    assert_eq!(report.stats.lines_seen, 3);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.errors.get("malformed_line"), Some(&1));
    assert_eq!(report.events[0].error_code, "a01e");
    assert_eq!(report.events[1].param1, 3);
}

#[test]
fn test_rows_serialize_to_storage_json() {
    let pipeline = LogPipeline::from_options(&options(None, None)).unwrap();
    let report = pipeline
        .process_at("inline", &surgery_log(FALLBACK_KEY), at(12, 0, 0))
        .unwrap();
    let rows = pipeline.rows(&report);

    let json = serde_json::to_value(&rows).unwrap();
    let row = &json[0];
    assert_eq!(row["surgery_id"], "UNKNOWN-202403010805");
    assert_eq!(row["success"], false);
    assert_eq!(row["structured_data"]["arms"].as_array().unwrap().len(), 4);
    assert_eq!(row["structured_data"]["arms"][0]["arm_id"], 1);
    assert_eq!(row["structured_data"]["surgery_stats"]["faults"][0]["type"], "error");
    assert!(row["structured_data"]["power_cycles"][0]["on_time"].is_string());
}

#[test]
fn test_catalog_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = write(
        &temp_dir,
        "catalog.toml",
        "[codes]\n\"2040a\" = \"Joint {0} over limit\"\n",
    );
    let log = write(&temp_dir, "device.log", &surgery_log(FALLBACK_KEY));

    let opts = PipelineOptions {
        explanation_catalog: Some(catalog),
        ..options(None, None)
    };
    let pipeline = LogPipeline::from_options(&opts).unwrap();
    let report = pipeline.process_file(&log).unwrap();

    let alarm = &report.surgeries[0].alarm_details[0];
    assert_eq!(alarm.message, "Joint 7 over limit");
}

#[test]
fn test_foreign_key_log_reports_no_plausible_key() {
    let pipeline = LogPipeline::from_options(&options(Some(DEVICE_KEY), None)).unwrap();
    let err = pipeline
        .process_at("foreign.log", &surgery_log(FOREIGN_KEY), at(12, 0, 0))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Decode(LogDecodeError::NoPlausibleKey)));
}

#[test]
fn test_pipeline_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<LogPipeline>();

    let pipeline = std::sync::Arc::new(LogPipeline::from_options(&options(None, None)).unwrap());
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let pipeline = std::sync::Arc::clone(&pipeline);
            std::thread::spawn(move || {
                pipeline
                    .process_at(&format!("log-{}", i), &surgery_log(FALLBACK_KEY), at(12, 0, 0))
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let report = handle.join().unwrap();
        assert_eq!(report.surgeries.len(), 1);
    }
}
