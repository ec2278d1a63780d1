use ktp_parser::{parse_ktp_text, REQUIRED_KTP_FIELDS};

// Sample OCR dump with every field on a "Label : Value" line
const SAMPLE_KTP: &str = "\
PROVINSI DKI JAKARTA
KOTA JAKARTA PUSAT
NIK : 3171071234567890
Nama : BUDI SANTOSO
Tempat/Tgl Lahir : JAKARTA, 12-08-1990
Jenis Kelamin : LAKI-LAKI
Gol. Darah : O
Alamat : JL. MERDEKA NO. 10
RT/RW : 001/005
Kel/Desa : GAMBIR
Kecamatan : GAMBIR
Agama : ISLAM
Status Perkawinan : KAWIN
Pekerjaan : KARYAWAN SWASTA
Kewarganegaraan : WNI
Berlaku Hingga : SEUMUR HIDUP
";

#[test]
fn full_valid_ktp_parses_with_full_confidence() {
    let result = parse_ktp_text(SAMPLE_KTP);
    assert!(result.success);
    assert_eq!(result.confidence, 100);
    assert!(result.missing_fields.is_empty());
    assert_eq!(result.data.nik.as_deref(), Some("3171071234567890"));
    assert_eq!(result.data.nama.as_deref(), Some("BUDI SANTOSO"));
    assert_eq!(result.data.tempat_tgl_lahir.as_deref(), Some("JAKARTA, 12-08-1990"));
    assert_eq!(result.data.jenis_kelamin.as_deref(), Some("LAKI-LAKI"));
    assert_eq!(result.data.gol_darah.as_deref(), Some("O"));
    assert_eq!(result.data.rt_rw.as_deref(), Some("001/005"));
    assert_eq!(result.data.berlaku_hingga.as_deref(), Some("SEUMUR HIDUP"));
}

#[test]
fn malformed_nik_surfaces_as_missing_field() {
    let input = SAMPLE_KTP.replace("3171071234567890", "317107123456789");
    let result = parse_ktp_text(&input);
    assert!(!result.success);
    assert_eq!(result.data.nik, None);
    assert_eq!(result.missing_fields, vec!["NIK".to_string()]);
    // 12 of 13 required fields found
    assert_eq!(result.confidence, 92);
}

#[test]
fn spaced_nik_recovered_via_fallback() {
    let input = SAMPLE_KTP.replace("3171071234567890", "3171 0712 3456 7890");
    let result = parse_ktp_text(&input);
    assert_eq!(result.data.nik.as_deref(), Some("3171071234567890"));
    assert!(result.success);
}

#[test]
fn empty_input_fails_without_panicking() {
    let result = parse_ktp_text("");
    assert!(!result.success);
    assert_eq!(result.confidence, 0);
    assert_eq!(result.raw_text, "");
    assert_eq!(result.data.raw_text, "");
    assert_eq!(result.data.nik, None);
    assert_eq!(result.missing_fields.len(), REQUIRED_KTP_FIELDS.len());
}

#[test]
fn pure_noise_input_yields_zero_confidence() {
    let result = parse_ktp_text("zzzz !!! 1234 ----");
    assert!(!result.success);
    assert_eq!(result.confidence, 0);
    assert_eq!(result.missing_fields.len(), 13);
}

#[test]
fn raw_text_round_trips_verbatim() {
    for input in [SAMPLE_KTP, "", "garbage\r\nwith\rmixed endings"] {
        let result = parse_ktp_text(input);
        assert_eq!(result.raw_text, input);
        assert_eq!(result.data.raw_text, input);
    }
}

#[test]
fn parse_is_idempotent() {
    let a = parse_ktp_text(SAMPLE_KTP);
    let b = parse_ktp_text(SAMPLE_KTP);
    assert_eq!(a, b);
}

#[test]
fn confidence_matches_found_count_formula() {
    let result = parse_ktp_text(SAMPLE_KTP);
    let found = REQUIRED_KTP_FIELDS
        .iter()
        .filter(|(key, _)| result.data.field(key).is_some())
        .count();
    let expected = ((found as f64 / 13.0) * 100.0).round() as u8;
    assert_eq!(result.confidence, expected);
    assert!(result.confidence <= 100);
}

#[test]
fn success_iff_no_missing_fields() {
    for input in [SAMPLE_KTP, "Nama : BUDI", ""] {
        let result = parse_ktp_text(input);
        assert_eq!(result.success, result.missing_fields.is_empty());
        for label in &result.missing_fields {
            let key = REQUIRED_KTP_FIELDS
                .iter()
                .find(|(_, l)| *l == label.as_str())
                .map(|(k, _)| *k)
                .expect("label must come from the required table");
            assert_eq!(result.data.field(key), None);
        }
    }
}

#[test]
fn crlf_input_parses_like_lf_input() {
    let crlf = SAMPLE_KTP.replace('\n', "\r\n");
    let a = parse_ktp_text(SAMPLE_KTP);
    let b = parse_ktp_text(&crlf);
    assert_eq!(a.data.nik, b.data.nik);
    assert_eq!(a.data.nama, b.data.nama);
    assert_eq!(a.confidence, b.confidence);
}

#[test]
fn result_json_uses_camel_case_contract() {
    let result = parse_ktp_text(SAMPLE_KTP);
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"tempatTglLahir\""));
    assert!(json.contains("\"jenisKelamin\""));
    assert!(json.contains("\"rawText\""));
    // no missing fields on success, so the key is omitted
    assert!(!json.contains("\"missingFields\""));

    let failed = parse_ktp_text("Nama : BUDI");
    let json = serde_json::to_string(&failed).unwrap();
    assert!(json.contains("\"missingFields\""));
}
