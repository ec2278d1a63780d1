use std::collections::HashSet;
use std::path::Path;

use ktp_parser::{
    emit_result, enumerate_texts, parse_ktp_text, sha256_hex, validate_config, BatchConfig,
    EnumerateError,
};

fn slugify(base: &str) -> String {
    let mut out = String::with_capacity(base.len());
    let mut prev_dash = false;
    for ch in base.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "doc".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unique_slug(slug: String, used: &mut HashSet<String>) -> String {
    if used.insert(slug.clone()) {
        return slug;
    }
    let mut i = 1;
    loop {
        let candidate = format!("{}-{}", slug, i);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        i += 1;
    }
}

fn main() {
    // Simple CLI flags parsing
    let args: Vec<String> = std::env::args().collect();
    let mut min_confidence_flag: Option<u8> = None;
    if let Some(pos) = args.iter().position(|a| a == "--min-confidence") {
        if let Some(val) = args.get(pos + 1) {
            if let Ok(n) = val.parse::<u8>() {
                min_confidence_flag = Some(n.min(100));
            }
        }
    }
    let mut config_path = String::from("ktp.yaml");
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(val) = args.get(pos + 1) {
            if !val.starts_with("--") {
                config_path = val.clone();
            }
        }
    }

    // 1) Read and validate ktp.yaml when present; fall back to defaults
    let cfg_file = Path::new(&config_path);
    let cfg: BatchConfig = if cfg_file.exists() {
        match validate_config(cfg_file) {
            Ok(c) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "validate_config",
                        "file": config_path,
                        "status": "ok",
                        "input_glob": c.input_glob(),
                        "output_dir": c.output_dir()
                    })
                );
                c
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "validate_config",
                        "file": config_path,
                        "error": e.to_string(),
                        "error_code": 3
                    })
                );
                std::process::exit(3);
            }
        }
    } else {
        BatchConfig { id: "ktp-batch".to_string(), input: None, output: None, min_confidence: None }
    };
    let min_confidence = min_confidence_flag.or(cfg.min_confidence).unwrap_or(0);

    // 2) Enumerate OCR text dumps
    let mut used_doc_ids: HashSet<String> = HashSet::new();
    match enumerate_texts(&cfg.input_glob()) {
        Ok(files) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "enumerate_texts",
                    "count": files.len(),
                })
            );

            // 3) Per file: read -> parse -> emit
            for file in files {
                let started_ms = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i128)
                    .unwrap_or(0);
                let raw = match std::fs::read(&file) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool": "read_text",
                                "file": file,
                                "error": e.to_string()
                            })
                        );
                        continue;
                    }
                };

                let result = parse_ktp_text(&raw);
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "parse_ktp_text",
                        "file": file,
                        "success": result.success,
                        "confidence": result.confidence,
                        "missing_fields": result.missing_fields.len()
                    })
                );

                let fname = file.file_stem().and_then(|s| s.to_str()).unwrap_or("doc");
                let doc_id = unique_slug(slugify(fname), &mut used_doc_ids);
                let finished_ms = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i128)
                    .unwrap_or(0);
                let meta = serde_json::json!({
                    "doc_id": doc_id,
                    "source": file,
                    "raw_sha256": sha256_hex(raw.as_bytes()),
                    "success": result.success,
                    "confidence": result.confidence,
                    "missing_fields": result.missing_fields,
                    "below_min_confidence": result.confidence < min_confidence,
                    "timestamps": {"started_ms": started_ms, "finished_ms": finished_ms},
                });
                match emit_result(&result, &meta, &cfg.output_dir(), &doc_id) {
                    Ok(paths) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool": "emit_result",
                                "file": file,
                                "result_path": paths.result_path,
                                "meta_path": paths.meta_path
                            })
                        );
                    }
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool": "emit_result",
                                "file": file,
                                "error": e.to_string(),
                                "error_code": 6
                            })
                        );
                        std::process::exit(6);
                    }
                }
            }
        }
        Err(err) => {
            let EnumerateError::NoFilesFound { guidance } = err;
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "enumerate_texts",
                    "error": "NoFilesFound",
                    "error_code": 1
                })
            );
            eprintln!("{}", guidance);
            std::process::exit(1);
        }
    }
}
