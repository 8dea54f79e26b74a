use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const WORKSPACE: &str = r#"{
  "collectionOrder": ["c1"],
  "collections": {
    "c1": {
      "id": "c1",
      "title": "Work",
      "noteOrder": ["n2", "n1"],
      "notes": {
        "n1": {
          "id": "n1",
          "title": "Plan",
          "boxes": [
            {
              "id": "box-2", "x": 340.0, "y": 10.0, "width": 300.0, "height": 120.0,
              "zIndex": 2,
              "content": [{"type": "paragraph", "children": [{"text": "Ship it"}]}]
            },
            {
              "id": "box-1", "x": 10.0, "y": 10.0, "width": 300.0, "height": 120.0,
              "zIndex": 1,
              "content": [
                {"type": "heading-one", "children": [{"text": "Goals", "bold": true}]},
                {"type": "paragraph", "children": [{"text": "Write the sync engine"}]}
              ]
            }
          ],
          "createdAt": 1700000000000,
          "updatedAt": 1700000000000,
          "zoom": 1.0,
          "pan": {"x": 0.0, "y": 0.0},
          "version": 4
        },
        "n2": {
          "id": "n2",
          "title": "Ideas",
          "boxes": [],
          "createdAt": 1700000000000,
          "updatedAt": 1700000000000,
          "version": 1
        }
      }
    }
  }
}"#;

fn corkboard(storage: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("corkboard").expect("binary builds");
    cmd.env_remove("CORKBOARD_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(storage.join("missing.yml"))
        .arg("--storage-dir")
        .arg(storage);
    cmd
}

fn imported() -> Result<tempfile::TempDir, Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file = dir.path().join("export.json");
    fs::write(&file, WORKSPACE)?;
    corkboard(dir.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 1 collection(s), 2 note(s)"));
    Ok(dir)
}

#[test]
fn notes_lists_cached_collections_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let dir = imported()?;
    let output = corkboard(dir.path()).arg("notes").output()?;
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8(output.stdout)?, @r"
    Work [c1]
      - Ideas [n2] v1, 0 box(es)
      - Plan [n1] v4, 2 box(es)
    ");
    Ok(())
}

#[test]
fn show_prints_boxes_bottom_up() -> Result<(), Box<dyn std::error::Error>> {
    let dir = imported()?;
    let output = corkboard(dir.path()).args(["show", "n1"]).output()?;
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8(output.stdout)?, @r"
    Plan [n1] in c1
    version 4, zoom 1.00, pan (0, 0)

    box-1 at (10, 10) 300x120 z=1
      Goals
      Write the sync engine

    box-2 at (340, 10) 300x120 z=2
      Ship it
    ");

    corkboard(dir.path())
        .args(["show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn export_round_trips_the_import() -> Result<(), Box<dyn std::error::Error>> {
    let dir = imported()?;
    let out = dir.path().join("again.json");
    corkboard(dir.path())
        .arg("export")
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let exported: Value = serde_json::from_str(&fs::read_to_string(&out)?)?;
    assert_eq!(exported["collectionOrder"], serde_json::json!(["c1"]));
    assert_eq!(exported["collections"]["c1"]["noteOrder"], serde_json::json!(["n2", "n1"]));
    assert_eq!(exported["collections"]["c1"]["notes"]["n1"]["version"], 4);
    assert_eq!(
        exported["collections"]["c1"]["notes"]["n1"]["boxes"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );
    Ok(())
}

#[test]
fn invalid_import_leaves_cache_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let dir = imported()?;
    let bad = dir.path().join("bad.json");
    // Order lists a collection that does not exist.
    fs::write(&bad, r#"{"collectionOrder": ["ghost"], "collections": {}}"#)?;
    corkboard(dir.path())
        .arg("import")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid workspace export"));

    corkboard(dir.path())
        .args(["notes", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Plan\""));
    Ok(())
}

#[test]
fn empty_cache_reports_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    corkboard(dir.path())
        .arg("notes")
        .assert()
        .success()
        .stdout("No collections cached.\n");
    Ok(())
}
