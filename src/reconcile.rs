use std::collections::HashMap;

use log::warn;

use crate::schema::{ExcludedClaim, ExtractedClaim};
use crate::store::ReportPosition;
use crate::taxonomy::Taxonomy;

/// Result of validating one extraction run against the taxonomy snapshot:
/// the accepted positions plus every claim that was filtered out, with its
/// rationale.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub accepted: Vec<ReportPosition>,
    pub excluded: Vec<ExcludedClaim>,
}

/// Validate raw model claims against the taxonomy snapshot. Pure and fully
/// deterministic: the model's output is untrusted input, so every invariant
/// is enforced here regardless of what the model promised.
///
/// - A code not present in the taxonomy is excluded as "unknown code".
/// - When several claims target the same code, the one with a non-null
///   current value wins; on a further tie, the first in model-output order.
///   Losers are excluded as "duplicate code, superseded".
///
/// The accepted set holds at most one position per code, each code present
/// in the snapshot, in first-claim order.
pub fn reconcile(claims: Vec<ExtractedClaim>, taxonomy: &Taxonomy) -> Reconciliation {
    let mut accepted: Vec<ReportPosition> = Vec::new();
    let mut excluded: Vec<ExcludedClaim> = Vec::new();
    let mut slot_by_code: HashMap<String, usize> = HashMap::new();

    for claim in claims {
        if !taxonomy.contains(&claim.code) {
            warn!("Model claimed unknown code '{}', excluding", claim.code);
            excluded.push(ExcludedClaim::new(claim.code, "unknown code"));
            continue;
        }

        match slot_by_code.get(&claim.code) {
            None => {
                slot_by_code.insert(claim.code.clone(), accepted.len());
                accepted.push(ReportPosition {
                    code: claim.code,
                    current: claim.current,
                    previous: claim.previous,
                });
            }
            Some(&slot) => {
                let incumbent = &mut accepted[slot];
                if incumbent.current.is_none() && claim.current.is_some() {
                    let superseded = std::mem::replace(
                        incumbent,
                        ReportPosition {
                            code: claim.code,
                            current: claim.current,
                            previous: claim.previous,
                        },
                    );
                    excluded.push(ExcludedClaim::new(
                        superseded.code,
                        "duplicate code, superseded",
                    ));
                } else {
                    excluded.push(ExcludedClaim::new(claim.code, "duplicate code, superseded"));
                }
            }
        }
    }

    Reconciliation { accepted, excluded }
}
