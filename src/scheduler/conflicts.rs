use super::{Conflict, ConflictKind};
use crate::clock;
use crate::model::{Shift, ShiftId, ShiftStatus};

/// Premier créneau actif de `held` qui chevauche `candidate`.
pub(crate) fn first_conflict<'a>(candidate: &Shift, held: &'a [Shift]) -> Option<&'a Shift> {
    let (start, end) = candidate.window();
    held.iter().find(|other| {
        if other.id == candidate.id || !other.status.is_active() {
            return false;
        }
        let (o_start, o_end) = other.window();
        clock::overlaps(start, end, o_start, o_end)
    })
}

pub(crate) fn conflicting_ids(candidate: &Shift, held: &[Shift]) -> Vec<ShiftId> {
    let (start, end) = candidate.window();
    held.iter()
        .filter(|other| other.id != candidate.id && other.status.is_active())
        .filter(|other| {
            let (o_start, o_end) = other.window();
            clock::overlaps(start, end, o_start, o_end)
        })
        .map(|other| other.id.clone())
        .collect()
}

/// Audit d'un ensemble de créneaux : chevauchements par livreur et statuts incohérents.
pub(super) fn detect_conflicts(shifts: &[Shift]) -> Vec<Conflict> {
    let mut out = Vec::new();

    for shift in shifts {
        let mismatch = match shift.status {
            ShiftStatus::Open => shift.driver_id.is_some(),
            status if status.is_active() => shift.driver_id.is_none(),
            _ => false,
        };
        if mismatch {
            out.push(Conflict {
                driver: shift.driver_id.clone(),
                shift_a: shift.id.clone(),
                shift_b: None,
                kind: ConflictKind::StatusMismatch,
            });
        }
    }

    let mut held: Vec<&Shift> = shifts
        .iter()
        .filter(|s| s.driver_id.is_some() && s.status.is_active())
        .collect();
    held.sort_by_key(|s| (s.driver_id.clone(), s.starts_at()));

    for (idx, a) in held.iter().enumerate() {
        for b in held.iter().skip(idx + 1) {
            if a.driver_id != b.driver_id {
                break;
            }
            let (a_start, a_end) = a.window();
            let (b_start, b_end) = b.window();
            if clock::overlaps(a_start, a_end, b_start, b_end) {
                out.push(Conflict {
                    driver: a.driver_id.clone(),
                    shift_a: a.id.clone(),
                    shift_b: Some(b.id.clone()),
                    kind: ConflictKind::Overlap,
                });
            }
        }
    }

    out
}
