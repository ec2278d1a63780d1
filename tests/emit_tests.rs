use std::fs;

use ktp_parser::{emit_result, parse_ktp_text, sha256_hex};

#[test]
fn emit_writes_result_and_meta_json() {
    let result = parse_ktp_text("NIK : 3171071234567890\nNama : BUDI SANTOSO");
    let meta = serde_json::json!({
        "doc_id": "budi-ktp",
        "raw_sha256": sha256_hex(result.raw_text.as_bytes()),
        "confidence": result.confidence,
        "success": result.success,
    });

    let td = tempfile::tempdir().unwrap();
    let outdir = td.path().join("out");
    let paths = emit_result(&result, &meta, outdir.to_str().unwrap(), "budi-ktp").expect("emit ok");

    let result_json = fs::read_to_string(&paths.result_path).unwrap();
    assert!(result_json.contains("\"rawText\""));
    assert!(result_json.contains("3171071234567890"));
    let roundtrip: ktp_parser::ParseResult = serde_json::from_str(&result_json).unwrap();
    assert_eq!(roundtrip, result);

    let meta_json = fs::read_to_string(&paths.meta_path).unwrap();
    assert!(meta_json.contains("\"doc_id\""));
    assert!(meta_json.contains("\"raw_sha256\""));

    // no tmp files left behind
    let leftovers: Vec<_> = fs::read_dir(&outdir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn sha256_hex_is_stable() {
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(sha256_hex(b"ktp"), sha256_hex(b"ktp"));
}
