#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::TempDir;

fn leg(id: &str, offer: &str, ship: &str, start: &str, nights: u32) -> Value {
    json!({
        "id": id,
        "offer": {"code": offer, "roomType": "Balcony"},
        "sailing": {
            "shipName": ship,
            "sailDate": start,
            "nights": nights,
            "departurePort": "Miami",
            "arrivalPort": "Miami"
        }
    })
}

struct Fixture {
    dir: TempDir,
    rows: PathBuf,
    config: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let rows = dir.path().join("rows.json");
    let data = json!([
        leg("a", "X1", "Oasis", "2025-06-01", 7),
        leg("b", "X2", "Oasis", "2025-06-08", 3),
        leg("c", "X3", "Oasis", "2025-06-11", 4),
        leg("d", "X4", "Icon", "2025-06-08", 5),
    ]);
    fs::write(&rows, serde_json::to_vec(&data).expect("encode rows")).expect("write rows");
    // Points at a file that does not exist so a user config never leaks in.
    let config = dir.path().join("berth.toml");
    Fixture { dir, rows, config }
}

fn json_stdout(fx: &Fixture, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("berth")
        .arg("--config")
        .arg(&fx.config)
        .args(["--format", "json"])
        .args(args)
        .arg("--rows")
        .arg(&fx.rows)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn filter_applies_where_clauses() {
    let fx = fixture();
    let json = json_stdout(&fx, &["filter", "--where", "nights greater than 3"]);
    let ids: Vec<&str> = json
        .as_array()
        .expect("row array")
        .iter()
        .filter_map(|row| row["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["a", "c", "d"]);
}

#[test]
fn values_come_from_the_static_index_without_filters() {
    let fx = fixture();
    let json = json_stdout(&fx, &["values", "--field", "ship"]);
    assert_eq!(json["field"], "ship");
    assert_eq!(json["source"], "static");
    let values = json["values"].as_array().expect("values");
    assert_eq!(values.len(), 2);

    let filtered = json_stdout(&fx, &["values", "--field", "nights", "--where", "ship in Oasis"]);
    assert_eq!(filtered["source"], "dynamic");
    assert_eq!(filtered["values"], json!(["3", "4", "7"]));
}

#[test]
fn linkable_reports_the_connection() {
    let fx = fixture();
    let json = json_stdout(&fx, &["linkable", "a", "b"]);
    assert_eq!(json["linkable"], true);
    assert_eq!(json["connection"], "same-ship");

    let json = json_stdout(&fx, &["linkable", "a", "d"]);
    assert_eq!(json["linkable"], false);

    let json = json_stdout(&fx, &["linkable", "a", "d", "--side-by-side"]);
    assert_eq!(json["connection"], "side-by-side");
}

#[test]
fn chains_lists_candidates_and_saves() {
    let fx = fixture();
    let json = json_stdout(&fx, &["chains", "--root", "a"]);
    assert_eq!(json["chain"], json!(["a"]));
    assert_eq!(json["candidates"][0]["rowId"], "b");
    assert_eq!(json["candidates"][0]["tier"], "perfect");

    let saved = fx.dir.path().join("chains.jsonl");
    let output = cargo_bin_cmd!("berth")
        .arg("--config")
        .arg(&fx.config)
        .args(["chains", "--root", "a", "--leg", "b", "--save"])
        .arg(&saved)
        .arg("--rows")
        .arg(&fx.rows)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8 stdout");
    assert!(text.contains("chain: a -> b"));
    assert!(text.contains("saved B2B-"));
    let stored = fs::read_to_string(&saved).expect("saved chains");
    assert_eq!(stored.lines().count(), 1);
}

#[test]
fn chains_save_reports_inside_json() {
    let fx = fixture();
    let saved = fx.dir.path().join("chains.jsonl");
    let path = saved.to_str().expect("utf8 path");
    let json = json_stdout(&fx, &["chains", "--root", "a", "--leg", "b", "--save", path]);
    assert_eq!(json["chain"], json!(["a", "b"]));
    assert!(json["saved"]["id"].as_str().is_some_and(|id| id.starts_with("B2B-")));
    assert_eq!(json["saved"]["legs"], 2);

    let unsaved = json_stdout(&fx, &["chains", "--root", "a"]);
    assert!(unsaved["saved"].is_null());
}

#[test]
fn csv_rows_filter_in_text_mode() {
    let fx = fixture();
    let csv = fx.dir.path().join("rows.csv");
    fs::write(
        &csv,
        "id,offer code,ship,sail date,nights\nr1,X1,Oasis,2025-06-01,7\nr2,X2,Icon,2025-06-10,5\nr3,X3,Oasis,2025-06-11,10\n",
    )
    .expect("write csv");
    let output = cargo_bin_cmd!("berth")
        .arg("--config")
        .arg(&fx.config)
        .args(["filter", "--where", "ship in Oasis", "--rows"])
        .arg(&csv)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("2 of 3 rows"));
}

#[test]
fn unknown_inputs_fail_with_a_message() {
    let fx = fixture();
    let stderr = |args: &[&str]| {
        let output = cargo_bin_cmd!("berth")
            .arg("--config")
            .arg(&fx.config)
            .args(args)
            .arg("--rows")
            .arg(&fx.rows)
            .assert()
            .failure()
            .get_output()
            .stderr
            .clone();
        String::from_utf8_lossy(&output).into_owned()
    };
    assert!(stderr(&["values", "--field", "color"]).contains("unknown field 'color'"));
    assert!(stderr(&["linkable", "a", "zz"]).contains("row 'zz' is not in the row file"));
}
