//! Merging of equivalent AVC records and rendering of `allow` statements.
//!
//! Merging is a full pairwise pass, O(n²) in the number of records. A boot
//! produces at most a few hundred denials, so the quadratic pass is kept for
//! its simplicity over an index keyed by [`AuditRecord::key`].

use std::collections::BTreeSet;
use std::fmt::Write as _;

use tracing::debug;

use super::record::AuditRecord;

/// Operation whose presence suppresses the whole rule.
pub const SUPPRESSED_OPERATION: &str = "sys_admin";

/// Merge records that share an identity key.
///
/// For every ordered pair `(i, j)` of live records with equal keys, `j`'s
/// operations are folded into `i` and `j` is marked stale. Stale records are
/// skipped both as source and target, so running the pass again on its own
/// output changes nothing. Returns the number of records absorbed.
pub fn merge_records(records: &mut [AuditRecord]) -> usize {
    let mut absorbed: usize = 0;
    let len = records.len();

    for i in 0..len {
        for j in 0..len {
            if i == j {
                continue;
            }
            let Some((target, source)) = pair_mut(records, i, j) else {
                continue;
            };
            if target.is_stale() || source.is_stale() || target.key() != source.key() {
                continue;
            }
            target.absorb(source);
            absorbed = absorbed.saturating_add(1);
        }
    }

    debug!(records = len, absorbed, "audit records merged");
    absorbed
}

/// Borrow two distinct elements mutably.
fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> Option<(&mut T, &mut T)> {
    if i < j {
        let (head, tail) = items.split_at_mut(j);
        Some((head.get_mut(i)?, tail.first_mut()?))
    } else if j < i {
        let (head, tail) = items.split_at_mut(i);
        let source = head.get_mut(j)?;
        Some((tail.first_mut()?, source))
    } else {
        None
    }
}

/// Render one record as `allow <subject> <object>:<class> <ops>;`.
///
/// Returns `None` for stale records, records without operations, and any
/// record whose operations include [`SUPPRESSED_OPERATION`].
pub fn render_record(record: &AuditRecord) -> Option<String> {
    let ops = record.operations();
    if record.is_stale() || ops.is_empty() || ops.contains(SUPPRESSED_OPERATION) {
        return None;
    }

    let mut rule = format!(
        "allow {} {}:{} ",
        record.subject(),
        record.object(),
        record.class()
    );
    if ops.len() == 1 {
        rule.extend(ops.iter().map(String::as_str));
    } else {
        rule.push_str("{ ");
        for op in ops {
            let _ = write!(rule, "{op} ");
        }
        rule.push('}');
    }
    rule.push(';');
    Some(rule)
}

/// Render all surviving records into a sorted, duplicate-free rule set.
pub fn render_policy(records: &[AuditRecord]) -> BTreeSet<String> {
    records.iter().filter_map(render_record).collect()
}
