use hexpatch::{patch_file, Error, MemoryImage, PatchApplier, PatchDocument, Target};
use pic14_arch::{DeviceProfile, PIC16F1704};
use tempfile::TempDir;
use test_log::test;

const PATCH: &str = r#"{
  "original_file": "stock.hex",
  "patch_version": "1.0",
  "modifications": {
    "timer4_hook": {
      "address": 80,
      "code": [8192],
      "links": [{ "index": 0, "base": "burst" }],
      "description": "Timer4 ISR hook for burst mode monitoring"
    },
    "burst_logic": {
      "free_space": { "base": "burst", "offset": 0 },
      "code": [12319, 8],
      "description": "Main burst mode state machine"
    },
    "burst_init": {
      "free_space": { "base": "burst", "offset": 16 },
      "code": [496, 8]
    }
  },
  "variable_allocation": { "BURST_ENABLE": 112, "BURST_STATE": 113 },
  "i2c_commands": { "BURST_ENABLE": 80 },
  "safety_notes": ["Verify on a current-limited supply"]
}"#;

fn stock(dir: &TempDir) -> std::path::PathBuf {
    let mut image = MemoryImage::new();
    for w in 0x0000..0x0200 {
        image.set_word(w, 0x3000 | (w & 0xFF) as u16);
    }
    for w in 0x0180..0x01A0 {
        image.set_word(w, 0x3FFF);
    }
    let path = dir.path().join("stock.hex");
    image.save(&path).unwrap();
    path
}

#[test]
fn document_file_drives_pipeline() {
    let dir = TempDir::new().unwrap();
    let input = stock(&dir);
    let patch = dir.path().join("patch.json");
    std::fs::write(&patch, PATCH).unwrap();

    let doc = PatchDocument::load(&patch).unwrap();
    assert_eq!(doc.original_file, "stock.hex");
    let plan = doc.to_plan().unwrap();
    assert_eq!(plan.free_space_requests()["burst"], 18);
    assert_eq!(plan.commands()["BURST_ENABLE"], 0x50);

    let output = dir.path().join("patched.hex");
    let report = patch_file(&input, &output, &plan, &PatchApplier::new(&PIC16F1704)).unwrap();
    assert_eq!(report.base("burst"), Some(0x0180));

    let patched = MemoryImage::load(&output).unwrap();
    assert_eq!(patched.word(0x0050), Some(0x2180));
    assert_eq!(patched.word(0x0180), Some(12319));
    assert_eq!(patched.word(0x0190), Some(496));
    assert_eq!(patched.word(0x0182), Some(0x3FFF));
}

#[test]
fn document_written_back_reloads() {
    let dir = TempDir::new().unwrap();
    let plan = PatchDocument::from_json(PATCH).unwrap().to_plan().unwrap();
    let doc = PatchDocument::from_plan(&plan, "stock.hex", "1.0");
    let path = dir.path().join("out.json");
    doc.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"command_table\""));
    let back = PatchDocument::load(&path).unwrap();
    let names: Vec<&String> = back.modifications.keys().collect();
    assert_eq!(names, vec!["timer4_hook", "burst_logic", "burst_init"]);
    assert_eq!(
        back.to_plan().unwrap().get("burst_init").unwrap().target(),
        &Target::free_space("burst", 16)
    );
}

#[test]
fn yaml_profile_changes_free_space_rules() {
    let dir = TempDir::new().unwrap();
    let input = stock(&dir);

    let mut profile = PIC16F1704.clone();
    profile.name = "PIC16F1704-strict".to_string();
    profile.unimplemented = 0x3FFE;
    profile.scan.start = 0x0100;
    let yaml_path = dir.path().join("strict.yaml");
    std::fs::write(&yaml_path, profile.to_yaml().unwrap()).unwrap();
    let profile = DeviceProfile::load(&yaml_path).unwrap();
    assert_eq!(profile.name, "PIC16F1704-strict");

    let plan = PatchDocument::from_json(PATCH).unwrap().to_plan().unwrap();
    let output = dir.path().join("patched.hex");
    let report = patch_file(&input, &output, &plan, &PatchApplier::new(&profile)).unwrap();
    assert_eq!(report.base("burst"), Some(0x0200));
}

#[test]
fn broken_documents() {
    let dir = TempDir::new().unwrap();
    let missing = PatchDocument::load(dir.path().join("none.json")).unwrap_err();
    assert!(matches!(missing, Error::Io { .. }));

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"modifications\": { \"x\": { \"code\": [1] } } }").unwrap();
    let doc = PatchDocument::load(&path).unwrap();
    assert!(matches!(doc.to_plan(), Err(Error::Plan(_))));

    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(PatchDocument::load(&path), Err(Error::Json(_))));
}
