//! Tests for merging and rendering of AVC records.

use bootlogger::audit::{merge_records, render_policy, render_record, AuditRecord, SecurityContext};

fn denial(subject: &str, object: &str, class: &str, ops: &[&str]) -> AuditRecord {
    AuditRecord::new(
        false,
        SecurityContext::new(subject),
        SecurityContext::new(object),
        class,
        ops.iter().copied(),
    )
}

fn line(ops: &str, scontext: &str) -> String {
    format!(
        "avc: denied {{ {ops} }} for comm=\"x\" scontext={scontext} tcontext=u:object_r:proc:s0 tclass=file permissive=0"
    )
}

#[test]
fn single_operation_renders_bare() {
    let record = denial("untrusted_app", "system_server", "file", &["read"]);
    assert_eq!(
        render_record(&record).as_deref(),
        Some("allow untrusted_app system_server:file read;")
    );
}

#[test]
fn multiple_operations_render_braced() {
    let record = denial("untrusted_app", "system_server", "file", &["write", "read"]);
    let rule = render_record(&record).expect("renders");

    assert!(rule.starts_with("allow untrusted_app system_server:file { "));
    assert!(rule.ends_with(" };"));
    let inner = rule
        .trim_start_matches("allow untrusted_app system_server:file {")
        .trim_end_matches("};");
    let mut ops: Vec<&str> = inner.split_whitespace().collect();
    ops.sort_unstable();
    assert_eq!(ops, ["read", "write"]);
}

#[test]
fn merge_unions_operations_of_equal_keys() {
    let mut records = vec![
        denial("vold", "block_device", "dir", &["read"]),
        denial("vold", "block_device", "dir", &["write"]),
    ];

    let absorbed = merge_records(&mut records);

    assert_eq!(absorbed, 1);
    assert!(!records[0].is_stale());
    assert!(records[1].is_stale());
    let ops: Vec<&str> = records[0].operations().iter().map(String::as_str).collect();
    assert_eq!(ops, ["read", "write"]);
}

#[test]
fn merge_keeps_different_keys_apart() {
    let mut records = vec![
        denial("vold", "block_device", "dir", &["read"]),
        denial("vold", "block_device", "file", &["read"]),
        denial("init", "block_device", "dir", &["read"]),
        AuditRecord::new(
            true,
            SecurityContext::new("vold"),
            SecurityContext::new("block_device"),
            "dir",
            ["read"],
        ),
    ];

    assert_eq!(merge_records(&mut records), 0);
    assert!(records.iter().all(|r| !r.is_stale()));
}

#[test]
fn merge_is_idempotent() {
    let mut records = vec![
        denial("a", "b", "file", &["read"]),
        denial("a", "b", "file", &["open"]),
        denial("a", "b", "file", &["getattr"]),
        denial("c", "d", "dir", &["search"]),
    ];

    assert_eq!(merge_records(&mut records), 2);
    let snapshot = records.clone();
    assert_eq!(merge_records(&mut records), 0);
    assert_eq!(records, snapshot);
}

#[test]
fn stale_records_are_never_merge_targets() {
    let mut records = vec![
        AuditRecord::parse("avc: denied { read } for scontext=u:r:a:s0"),
        AuditRecord::parse(&line("write", "u:r:a:s0")),
    ];
    assert!(records[0].is_stale());

    assert_eq!(merge_records(&mut records), 0);
    assert!(!records[1].is_stale());
}

#[test]
fn sys_admin_suppresses_the_whole_rule() {
    // Suppression applies when sys_admin appears anywhere in the set,
    // not only when it is the sole operation.
    let alone = denial("init", "kernel", "capability", &["sys_admin"]);
    let mixed = denial("init", "kernel", "capability", &["sys_admin", "chown"]);
    let clean = denial("init", "kernel", "capability", &["chown"]);

    assert_eq!(render_record(&alone), None);
    assert_eq!(render_record(&mixed), None);
    assert_eq!(
        render_record(&clean).as_deref(),
        Some("allow init kernel:capability chown;")
    );
}

#[test]
fn sys_admin_merged_in_suppresses_survivor() {
    let mut records = vec![
        denial("init", "kernel", "capability", &["chown"]),
        denial("init", "kernel", "capability", &["sys_admin"]),
    ];
    merge_records(&mut records);
    assert!(render_policy(&records).is_empty());
}

#[test]
fn stale_and_empty_records_render_nothing() {
    let stale = AuditRecord::parse("avc: audited { read } for x=y");
    let empty = denial("a", "b", "file", &[]);
    assert_eq!(render_record(&stale), None);
    assert_eq!(render_record(&empty), None);
}

#[test]
fn policy_is_sorted_and_deduplicated() {
    // Records that render to identical text collapse into one rule.
    let records = vec![
        denial("zygote", "proc", "file", &["read"]),
        denial("u:r:app:s0", "proc", "file", &["read"]),
        denial("u:r:app:s0:c1", "proc", "file", &["read"]),
    ];

    let rules: Vec<String> = render_policy(&records).into_iter().collect();

    assert_eq!(
        rules,
        [
            "allow app proc:file read;".to_owned(),
            "allow zygote proc:file read;".to_owned(),
        ]
    );
}

#[test]
fn empty_input_renders_empty_policy() {
    let mut records: Vec<AuditRecord> = Vec::new();
    assert_eq!(merge_records(&mut records), 0);
    assert!(render_policy(&records).is_empty());
}

#[test]
fn parsed_lines_merge_end_to_end() {
    let mut records: Vec<AuditRecord> = [
        line("read", "u:r:vendor_init:s0"),
        line("open", "u:r:vendor_init:s0"),
        line("read", "u:r:vendor_init:s0"),
    ]
    .iter()
    .map(|l| AuditRecord::parse(l))
    .collect();

    merge_records(&mut records);
    let rules: Vec<String> = render_policy(&records).into_iter().collect();

    assert_eq!(rules, ["allow vendor_init proc:file { open read };".to_owned()]);
}
