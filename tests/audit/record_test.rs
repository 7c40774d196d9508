//! Tests for AVC line parsing.

use bootlogger::audit::AuditRecord;

const DENIAL: &str = r#"[   12.345678] type=1400 audit(0.0:4): avc: denied { read write } for comm="vold" name="block" dev="tmpfs" ino=42 scontext=u:r:vold:s0 tcontext=u:object_r:block_device:s0 tclass=dir permissive=0"#;

#[test]
fn parses_well_formed_denial() {
    let record = AuditRecord::parse(DENIAL);

    assert!(!record.is_stale());
    assert!(!record.granted());
    assert!(!record.permissive());
    assert_eq!(record.subject().as_str(), "vold");
    assert_eq!(record.object().as_str(), "block_device");
    assert_eq!(record.class(), "dir");
    let ops: Vec<&str> = record.operations().iter().map(String::as_str).collect();
    assert_eq!(ops, ["read", "write"]);
}

#[test]
fn required_attributes_are_removed_and_others_kept() {
    let record = AuditRecord::parse(DENIAL);
    let attrs = record.attributes();

    for key in ["scontext", "tcontext", "tclass", "permissive"] {
        assert!(!attrs.contains_key(key), "{key} should be consumed");
    }
    assert_eq!(attrs.get("comm").map(String::as_str), Some("vold"));
    assert_eq!(attrs.get("name").map(String::as_str), Some("block"));
    assert_eq!(attrs.get("ino").map(String::as_str), Some("42"));
}

#[test]
fn granted_lines_parse_as_granted() {
    let line = "avc: granted { execute } for scontext=u:r:init:s0 tcontext=u:object_r:shell_exec:s0 tclass=file permissive=1";
    let record = AuditRecord::parse(line);

    assert!(!record.is_stale());
    assert!(record.granted());
    assert!(record.permissive());
}

#[test]
fn unexpected_context_shape_is_preserved() {
    let line = "avc: denied { read } for scontext=kernel tcontext=u:object_r:proc:s0 tclass=file permissive=0";
    let record = AuditRecord::parse(line);

    assert!(!record.is_stale());
    assert_eq!(record.subject().as_str(), "kernel");
    assert_eq!(record.object().as_str(), "proc");
}

#[test]
fn unknown_acl_status_is_stale() {
    let line = "avc: audited { read } for scontext=u:r:init:s0 tcontext=u:r:init:s0 tclass=file permissive=0";
    let record = AuditRecord::parse(line);

    assert!(record.is_stale());
    assert!(record.operations().is_empty());
    assert_eq!(record.class(), "");
}

#[test]
fn missing_required_attribute_is_stale() {
    for missing in ["scontext", "tcontext", "tclass", "permissive"] {
        let attrs: Vec<String> = [
            ("scontext", "u:r:init:s0"),
            ("tcontext", "u:object_r:proc:s0"),
            ("tclass", "file"),
            ("permissive", "0"),
        ]
        .iter()
        .filter(|(k, _)| *k != missing)
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
        let line = format!("avc: denied {{ read }} for {}", attrs.join(" "));

        assert!(AuditRecord::parse(&line).is_stale(), "missing {missing}");
    }
}

#[test]
fn permissive_must_be_zero_or_one() {
    for value in ["2", "-1", "yes", "", "1abc"] {
        let line = format!(
            "avc: denied {{ read }} for scontext=u:r:init:s0 tcontext=u:r:init:s0 tclass=file permissive={value}"
        );
        assert!(AuditRecord::parse(&line).is_stale(), "permissive={value}");
    }
}

#[test]
fn attribute_without_equals_is_skipped() {
    let line = "avc: denied { open } for pid=12 garbage scontext=u:r:init:s0 tcontext=u:object_r:proc:s0 tclass=file permissive=0";
    let record = AuditRecord::parse(line);

    assert!(!record.is_stale());
    assert_eq!(record.attributes().get("pid").map(String::as_str), Some("12"));
    assert!(!record.attributes().contains_key("garbage"));
}

#[test]
fn quoted_values_are_trimmed() {
    let line = r#"avc: denied { search } for name="adb keys" scontext=u:r:adbd:s0 tcontext=u:object_r:adb_keys_file:s0 tclass=dir permissive=0"#;
    let record = AuditRecord::parse(line);

    // Whitespace splits the quoted value; the first fragment keeps its quote.
    assert_eq!(record.attributes().get("name").map(String::as_str), Some("\"adb"));
    let line = r#"avc: denied { search } for name="keys" scontext=u:r:adbd:s0 tcontext=u:object_r:adb_keys_file:s0 tclass=dir permissive=0"#;
    let record = AuditRecord::parse(line);
    assert_eq!(record.attributes().get("name").map(String::as_str), Some("keys"));
}

#[test]
fn structural_damage_is_stale() {
    let cases = [
        "no marker here",
        "avc:",
        "avc: denied read } for scontext=a tcontext=b tclass=c permissive=0",
        "avc: denied { read for scontext=a tcontext=b tclass=c permissive=0",
        "avc: denied { } for scontext=a tcontext=b tclass=c permissive=0",
        "avc: denied { read } scontext=a tcontext=b tclass=c permissive=0",
        "avc: denied { read } for",
    ];
    for line in cases {
        assert!(AuditRecord::parse(line).is_stale(), "line: {line}");
    }
}

#[test]
fn key_ignores_operations_and_attributes() {
    let a = AuditRecord::parse("avc: denied { read } for ino=1 scontext=u:r:a:s0 tcontext=u:r:b:s0 tclass=file permissive=0");
    let b = AuditRecord::parse("avc: denied { write } for ino=2 scontext=u:r:a:s0 tcontext=u:r:b:s0 tclass=file permissive=1");
    assert_eq!(a.key(), b.key());
}
