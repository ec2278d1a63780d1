use std::path::{Path, PathBuf};

use globwalk::GlobWalkerBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed required-field set: JSON key plus human-readable label, in display
/// order. golDarah is the one field that is extracted but never required.
pub const REQUIRED_KTP_FIELDS: [(&str, &str); 13] = [
    ("nik", "NIK"),
    ("nama", "Nama"),
    ("tempatTglLahir", "Tempat/Tgl Lahir"),
    ("jenisKelamin", "Jenis Kelamin"),
    ("alamat", "Alamat"),
    ("rtRw", "RT/RW"),
    ("kelDesa", "Kel/Desa"),
    ("kecamatan", "Kecamatan"),
    ("agama", "Agama"),
    ("statusPerkawinan", "Status Perkawinan"),
    ("pekerjaan", "Pekerjaan"),
    ("kewarganegaraan", "Kewarganegaraan"),
    ("berlakuHingga", "Berlaku Hingga"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct KtpRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nik: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nama: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempat_tgl_lahir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jenis_kelamin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gol_darah: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alamat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rt_rw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kel_desa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kecamatan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agama: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_perkawinan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pekerjaan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kewarganegaraan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub berlaku_hingga: Option<String>,
    pub raw_text: String,
}

impl KtpRecord {
    /// Look up a field by its JSON key (the keys used in REQUIRED_KTP_FIELDS).
    pub fn field(&self, key: &str) -> Option<&str> {
        let slot = match key {
            "nik" => &self.nik,
            "nama" => &self.nama,
            "tempatTglLahir" => &self.tempat_tgl_lahir,
            "jenisKelamin" => &self.jenis_kelamin,
            "golDarah" => &self.gol_darah,
            "alamat" => &self.alamat,
            "rtRw" => &self.rt_rw,
            "kelDesa" => &self.kel_desa,
            "kecamatan" => &self.kecamatan,
            "agama" => &self.agama,
            "statusPerkawinan" => &self.status_perkawinan,
            "pekerjaan" => &self.pekerjaan,
            "kewarganegaraan" => &self.kewarganegaraan,
            "berlakuHingga" => &self.berlaku_hingga,
            _ => return None,
        };
        slot.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub success: bool,
    pub data: KtpRecord,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    pub raw_text: String,
}

/// Normalize raw OCR text: unify line endings, trim every line, drop blanks.
/// Always succeeds; empty input yields an empty string.
pub fn normalize_ocr_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_NIK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{16}\b").unwrap());
// OCR often renders the NIK as spaced groups of four digits
static RE_NIK_GROUPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}\s+\d{4}\s+\d{4}\s+\d{4}\b").unwrap());
static RE_BLOOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(AB|A|B|O)\b\s*([+-])?").unwrap());

/// A NIK is valid iff stripping non-digits leaves exactly 16 digits.
pub fn is_valid_nik(candidate: &str) -> bool {
    candidate.chars().filter(|c| c.is_ascii_digit()).count() == 16
}

/// Find the 16-digit NIK anywhere in the normalized text.
/// Primary: a standalone 16-digit run. Fallback: four whitespace-separated
/// groups of 4 digits, joined and re-validated.
pub fn extract_nik(text: &str) -> Option<String> {
    if let Some(m) = RE_NIK.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = RE_NIK_GROUPED.find(text) {
        let digits: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() == 16 && digits.chars().all(|c| c.is_ascii_digit()) {
            return Some(digits);
        }
    }
    None
}

fn value_after_colon(line: &str, max_len: usize) -> Option<String> {
    let idx = line.find(':')?;
    let value = line[idx + 1..].trim();
    if value.is_empty() || value.len() > max_len {
        return None;
    }
    Some(value.to_string())
}

/// Scan lines top to bottom for the first line whose lowercased form satisfies
/// `matches`, then recover the value from either layout the OCR produces:
/// "Label : Value" on one line, or a label-only line followed by ": Value".
/// First match wins.
fn scan_lines(lines: &[&str], max_len: usize, matches: impl Fn(&str) -> bool) -> Option<String> {
    for (i, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        if !matches(&lower) {
            continue;
        }
        if let Some(v) = value_after_colon(line, max_len) {
            return Some(v);
        }
        if let Some(next) = lines.get(i + 1) {
            if let Some(rest) = next.trim_start().strip_prefix(':') {
                let v = rest.trim();
                if !v.is_empty() && v.len() <= max_len {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

fn scan_label(lines: &[&str], labels: &[&str], excludes: &[&str], max_len: usize) -> Option<String> {
    scan_lines(lines, max_len, |lower| {
        labels.iter().any(|l| lower.contains(l)) && !excludes.iter().any(|x| lower.contains(x))
    })
}

/// "nama" is a substring of nearby labels, so exclude birth-place and sex lines.
pub fn extract_nama(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["nama"], &["tempat", "kelamin"], 100)
}

/// Birthplace and birth date stay combined; use split_tempat_tgl_lahir to split.
pub fn extract_tempat_tgl_lahir(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["tempat/tgl lahir", "tempat tgl lahir", "lahir"], &[], 100)
}

fn canonical_sex(value: &str) -> Option<String> {
    let lower = value.to_lowercase();
    if lower.contains("laki") || lower.contains("pria") {
        Some("LAKI-LAKI".to_string())
    } else if lower.contains("perempuan") || lower.contains("wanita") {
        Some("PEREMPUAN".to_string())
    } else {
        None
    }
}

/// Canonical enum output only: a matched value that does not map to
/// LAKI-LAKI or PEREMPUAN is treated as not found, never stored raw.
pub fn extract_jenis_kelamin(lines: &[&str]) -> Option<String> {
    let value = scan_label(lines, &["jenis kelamin", "kelamin"], &[], 30)?;
    canonical_sex(&value)
}

/// Isolate a clean A/B/AB/O token with optional +/- suffix; fall back to the
/// raw trimmed value when no clean token can be isolated.
pub fn extract_gol_darah(lines: &[&str]) -> Option<String> {
    let value = scan_label(lines, &["gol. darah", "gol darah", "goldarah"], &[], 30)?;
    match RE_BLOOD.captures(&value) {
        Some(cap) => {
            let mut token = cap[1].to_uppercase();
            if let Some(sign) = cap.get(2) {
                token.push_str(sign.as_str());
            }
            Some(token)
        }
        None => Some(value.trim().to_string()),
    }
}

pub fn extract_alamat(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["alamat"], &[], 150)
}

pub fn extract_rt_rw(lines: &[&str]) -> Option<String> {
    scan_lines(lines, 20, |lower| lower.contains("rt") && lower.contains("rw"))
}

/// "kel" would also hit "Jenis Kelamin", so that line is excluded.
pub fn extract_kel_desa(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["kel/desa", "kel / desa", "desa", "kel"], &["kelamin"], 100)
}

pub fn extract_kecamatan(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["kecamatan"], &[], 100)
}

pub fn extract_agama(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["agama"], &[], 50)
}

pub fn extract_status_perkawinan(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["status perkawinan", "perkawinan", "status"], &[], 50)
}

pub fn extract_pekerjaan(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["pekerjaan"], &[], 100)
}

pub fn extract_kewarganegaraan(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["kewarganegaraan", "warga negara"], &[], 30)
}

pub fn extract_berlaku_hingga(lines: &[&str]) -> Option<String> {
    scan_label(lines, &["berlaku hingga", "berlaku"], &[], 50)
}

/// Split a combined "PLACE, DD-MM-YYYY" value on the first comma.
/// Returns the place and, when a comma is present, the date part.
pub fn split_tempat_tgl_lahir(value: &str) -> (String, Option<String>) {
    match value.split_once(',') {
        Some((tempat, tgl)) => (tempat.trim().to_string(), Some(tgl.trim().to_string())),
        None => (value.trim().to_string(), None),
    }
}

/// Run every field extractor over the normalized text. Extractors are
/// independent; none reads another's output. raw_text is left for the caller.
pub fn extract_fields(text: &str) -> KtpRecord {
    let lines: Vec<&str> = text.lines().collect();
    KtpRecord {
        nik: extract_nik(text),
        nama: extract_nama(&lines),
        tempat_tgl_lahir: extract_tempat_tgl_lahir(&lines),
        jenis_kelamin: extract_jenis_kelamin(&lines),
        gol_darah: extract_gol_darah(&lines),
        alamat: extract_alamat(&lines),
        rt_rw: extract_rt_rw(&lines),
        kel_desa: extract_kel_desa(&lines),
        kecamatan: extract_kecamatan(&lines),
        agama: extract_agama(&lines),
        status_perkawinan: extract_status_perkawinan(&lines),
        pekerjaan: extract_pekerjaan(&lines),
        kewarganegaraan: extract_kewarganegaraan(&lines),
        berlaku_hingga: extract_berlaku_hingga(&lines),
        raw_text: String::new(),
    }
}

/// Produce a cleaned copy: NIK re-validated as exactly 16 digits (dropped
/// otherwise), free-text fields trimmed and upper-cased, raw_text untouched.
/// Fields that fail their rule are omitted, never kept invalid.
pub fn clean_record(record: &KtpRecord) -> KtpRecord {
    let text = |v: &Option<String>| -> Option<String> {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
    };
    let nik = record.nik.as_deref().and_then(|raw| {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 16 {
            Some(digits)
        } else {
            None
        }
    });
    KtpRecord {
        nik,
        nama: text(&record.nama),
        tempat_tgl_lahir: text(&record.tempat_tgl_lahir),
        jenis_kelamin: text(&record.jenis_kelamin),
        gol_darah: text(&record.gol_darah),
        alamat: text(&record.alamat),
        rt_rw: text(&record.rt_rw),
        kel_desa: text(&record.kel_desa),
        kecamatan: text(&record.kecamatan),
        agama: text(&record.agama),
        status_perkawinan: text(&record.status_perkawinan),
        pekerjaan: text(&record.pekerjaan),
        kewarganegaraan: text(&record.kewarganegaraan),
        berlaku_hingga: text(&record.berlaku_hingga),
        raw_text: record.raw_text.clone(),
    }
}

fn present(record: &KtpRecord, key: &str) -> bool {
    record.field(key).map(str::trim).filter(|s| !s.is_empty()).is_some()
}

/// Human-readable labels for the required fields absent from the record,
/// in REQUIRED_KTP_FIELDS order. Also the standalone post-edit re-check.
pub fn missing_fields(record: &KtpRecord) -> Vec<String> {
    REQUIRED_KTP_FIELDS
        .iter()
        .filter(|(key, _)| !present(record, key))
        .map(|(_, label)| (*label).to_string())
        .collect()
}

/// Percentage of the fixed 13-field checklist present, rounded to nearest.
pub fn confidence_score(record: &KtpRecord) -> u8 {
    let found = REQUIRED_KTP_FIELDS.iter().filter(|(key, _)| present(record, key)).count();
    ((found as f64 / REQUIRED_KTP_FIELDS.len() as f64) * 100.0).round() as u8
}

fn parse_inner(raw: &str) -> ParseResult {
    let normalized = normalize_ocr_text(raw);
    let mut record = extract_fields(&normalized);
    record.raw_text = raw.to_string();
    let cleaned = clean_record(&record);
    let missing = missing_fields(&cleaned);
    let confidence = confidence_score(&cleaned);
    ParseResult {
        success: missing.is_empty(),
        data: cleaned,
        confidence,
        missing_fields: missing,
        raw_text: raw.to_string(),
    }
}

/// Parse raw OCR text of a KTP into a structured result.
/// Never panics past this boundary: an internal fault becomes a failed
/// result with confidence 0 and the raw text round-tripped. Parsing failure
/// is data, not a control-flow error.
pub fn parse_ktp_text(raw: &str) -> ParseResult {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| parse_inner(raw))) {
        Ok(result) => result,
        Err(_) => ParseResult {
            success: false,
            data: KtpRecord { raw_text: raw.to_string(), ..KtpRecord::default() },
            confidence: 0,
            missing_fields: REQUIRED_KTP_FIELDS.iter().map(|(_, l)| (*l).to_string()).collect(),
            raw_text: raw.to_string(),
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Post-hoc validation for an already-parsed (possibly hand-edited) record.
/// Messages are user-facing Indonesian, intended for display.
pub fn validate_ktp(record: &KtpRecord) -> ValidationResult {
    let mut errors = Vec::new();
    for (key, label) in REQUIRED_KTP_FIELDS.iter() {
        match record.field(key).map(str::trim).filter(|s| !s.is_empty()) {
            None => errors.push(format!("{} wajib diisi", label)),
            Some(value) if *key == "nik" && !is_valid_nik(value) => {
                errors.push("NIK tidak valid (harus 16 digit)".to_string());
            }
            _ => {}
        }
    }
    ValidationResult { is_valid: errors.is_empty(), errors }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub id: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub min_confidence: Option<u8>,
}

impl BatchConfig {
    pub fn input_glob(&self) -> String {
        self.input.clone().unwrap_or_else(|| "./input/**/*.txt".to_string())
    }
    pub fn output_dir(&self) -> String {
        self.output.clone().unwrap_or_else(|| "./output".to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Minimal validation for the batch config file (ktp.yaml).
pub fn validate_config(path: &Path) -> Result<BatchConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let cfg: BatchConfig =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    if cfg.id.trim().is_empty() {
        return Err(ConfigError::Invalid("missing id".into()));
    }
    if let Some(mc) = cfg.min_confidence {
        if mc > 100 {
            return Err(ConfigError::Invalid("min_confidence must be 0-100".into()));
        }
    }
    Ok(cfg)
}

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("NoFilesFound")]
    NoFilesFound { guidance: String },
}

/// Enumerate OCR text dumps using a glob pattern (e.g., "./input/**/*.txt").
/// Returns a sorted list of files.
pub fn enumerate_texts(glob_pattern: &str) -> Result<Vec<PathBuf>, EnumerateError> {
    let root = if Path::new(glob_pattern).is_absolute() { "/" } else { "." };
    let pat = glob_pattern.trim_start_matches("./");
    let mut paths: Vec<PathBuf> = GlobWalkerBuilder::from_patterns(root, &[pat])
        .case_insensitive(false)
        .follow_links(false)
        .build()
        .map_err(|_| EnumerateError::NoFilesFound { guidance: folder_guidance() })?
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.is_file())
        .collect();

    paths.sort();

    if paths.is_empty() {
        return Err(EnumerateError::NoFilesFound { guidance: folder_guidance() });
    }

    Ok(paths)
}

fn folder_guidance() -> String {
    "Tidak ada berkas OCR pada pola ./input/**/*.txt\n\
Struktur yang disarankan:\n\
  ./input/<nama-pekerja>/ktp.txt\n\
Contoh: letakkan hasil OCR KTP di ./input/budi/ktp.txt"
        .to_string()
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("WriteFailed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitPaths {
    pub result_path: String,
    pub meta_path: String,
}

/// Atomically write the parse result and its meta JSON into outdir under the
/// doc_id stem (tmp file plus rename).
pub fn emit_result(
    result: &ParseResult,
    meta: &serde_json::Value,
    outdir: &str,
    doc_id: &str,
) -> Result<EmitPaths, EmitError> {
    std::fs::create_dir_all(outdir).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    let result_path = Path::new(outdir).join(format!("{}.json", doc_id));
    let meta_path = Path::new(outdir).join(format!("{}.meta.json", doc_id));

    let pid = std::process::id();
    let result_tmp = result_path.with_extension(format!("json.tmp.{}", pid));
    let meta_tmp = meta_path.with_extension(format!("meta.json.tmp.{}", pid));

    let result_bytes =
        serde_json::to_vec_pretty(result).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::write(&result_tmp, result_bytes).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    let meta_bytes =
        serde_json::to_vec_pretty(meta).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::write(&meta_tmp, meta_bytes).map_err(|e| EmitError::WriteFailed(e.to_string()))?;

    std::fs::rename(&result_tmp, &result_path)
        .map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::rename(&meta_tmp, &meta_path).map_err(|e| EmitError::WriteFailed(e.to_string()))?;

    Ok(EmitPaths {
        result_path: result_path.to_string_lossy().to_string(),
        meta_path: meta_path.to_string_lossy().to_string(),
    })
}

// Utility to compute sha256 hex, used for raw-text fingerprints in meta
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}
