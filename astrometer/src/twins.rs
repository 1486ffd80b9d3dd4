//! Twin linkage between markers.
//!
//! Twins move, zoom and resize together. The relation is kept symmetric and
//! irreflexive: every mutation collects the affected group and rewrites each
//! member's twin list to "all other members" in one pass.

use std::collections::BTreeSet;

use crate::marker::{Marker, MarkerId};

fn find(markers: &[Marker], id: MarkerId) -> Option<&Marker> {
    markers.iter().find(|m| m.id() == id)
}

/// Every member of `id`'s group, including `id` itself.
pub fn group_of(markers: &[Marker], id: MarkerId) -> Vec<MarkerId> {
    match find(markers, id) {
        Some(m) => {
            let mut group: BTreeSet<MarkerId> = m.twins().iter().copied().collect();
            group.insert(id);
            group.into_iter().collect()
        }
        None => Vec::new(),
    }
}

/// Rewrite the twin list of every member so each lists all the others.
fn rebuild(markers: &mut [Marker], group: &BTreeSet<MarkerId>) {
    for m in markers.iter_mut().filter(|m| group.contains(&m.id())) {
        let me = m.id();
        m.set_twins(group.iter().copied().filter(|&t| t != me).collect());
    }
}

/// Link `id` with `others`.
///
/// The resulting group is the union of `id`'s group with the groups of every
/// listed marker. Unknown ids and self references are skipped. Returns
/// `false` when `id` itself is unknown.
pub fn is_twin_of(markers: &mut [Marker], id: MarkerId, others: &[MarkerId]) -> bool {
    if find(markers, id).is_none() {
        log::debug!("is_twin_of: unknown {id}");
        return false;
    }
    let mut group: BTreeSet<MarkerId> = group_of(markers, id).into_iter().collect();
    for &other in others {
        if other == id {
            continue;
        }
        if find(markers, other).is_none() {
            log::debug!("is_twin_of: skipping unknown {other}");
            continue;
        }
        group.extend(group_of(markers, other));
    }
    rebuild(markers, &group);
    true
}

/// Remove `other` from `id`'s group.
///
/// The remaining members are relinked and `other` ends with no twins.
/// Returns `false` when the two are not twins.
pub fn remove_twin(markers: &mut [Marker], id: MarkerId, other: MarkerId) -> bool {
    let mut group: BTreeSet<MarkerId> = group_of(markers, id).into_iter().collect();
    if other == id || !group.remove(&other) {
        log::debug!("remove_twin: {other} is not a twin of {id}");
        return false;
    }
    rebuild(markers, &group);
    if let Some(m) = markers.iter_mut().find(|m| m.id() == other) {
        m.set_twins(Vec::new());
    }
    true
}

/// Detach `id` from whatever group it belongs to.
pub fn dissolve(markers: &mut [Marker], id: MarkerId) {
    let mut group: BTreeSet<MarkerId> = group_of(markers, id).into_iter().collect();
    group.remove(&id);
    rebuild(markers, &group);
    if let Some(m) = markers.iter_mut().find(|m| m.id() == id) {
        m.set_twins(Vec::new());
    }
}

/// Whether the twin relation over `markers` is symmetric and irreflexive.
pub fn is_consistent(markers: &[Marker]) -> bool {
    markers.iter().all(|m| {
        m.twins().iter().all(|&t| {
            t != m.id() && find(markers, t).is_some_and(|other| other.twins().contains(&m.id()))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Point;
    use crate::marker::{MarkerRole, DEFAULT_MAX_RADIUS};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn markers(n: u64) -> Vec<Marker> {
        (0..n)
            .map(|i| {
                Marker::new(
                    MarkerId(i),
                    MarkerRole::Calibrator(i as u32 + 1),
                    Point::new(10.0 * i as f64, 10.0),
                    5.0,
                    DEFAULT_MAX_RADIUS,
                )
            })
            .collect()
    }

    #[test]
    fn test_pair_is_symmetric() {
        let mut ms = markers(2);
        assert!(is_twin_of(&mut ms, MarkerId(0), &[MarkerId(1)]));
        assert_eq!(ms[0].twins(), &[MarkerId(1)]);
        assert_eq!(ms[1].twins(), &[MarkerId(0)]);
        assert!(is_consistent(&ms));
    }

    #[test]
    fn test_self_reference_excluded() {
        let mut ms = markers(3);
        is_twin_of(&mut ms, MarkerId(0), &[MarkerId(0), MarkerId(1), MarkerId(1)]);
        assert_eq!(ms[0].twins(), &[MarkerId(1)]);
        assert!(is_consistent(&ms));
    }

    #[test]
    fn test_rebuild_covers_whole_group() {
        let mut ms = markers(4);
        is_twin_of(&mut ms, MarkerId(0), &[MarkerId(1), MarkerId(2)]);
        is_twin_of(&mut ms, MarkerId(2), &[MarkerId(3)]);
        for m in &ms {
            assert_eq!(m.twins().len(), 3);
        }
        assert!(is_consistent(&ms));
    }

    #[test]
    fn test_groups_merge() {
        let mut ms = markers(4);
        is_twin_of(&mut ms, MarkerId(0), &[MarkerId(1)]);
        is_twin_of(&mut ms, MarkerId(2), &[MarkerId(3)]);
        is_twin_of(&mut ms, MarkerId(0), &[MarkerId(3)]);
        assert_eq!(group_of(&ms, MarkerId(1)).len(), 4);
        assert!(is_consistent(&ms));
    }

    #[test]
    fn test_remove_twin() {
        let mut ms = markers(3);
        is_twin_of(&mut ms, MarkerId(0), &[MarkerId(1), MarkerId(2)]);
        assert!(remove_twin(&mut ms, MarkerId(0), MarkerId(1)));
        assert_eq!(ms[0].twins(), &[MarkerId(2)]);
        assert_eq!(ms[2].twins(), &[MarkerId(0)]);
        assert!(ms[1].twins().is_empty());
        assert!(is_consistent(&ms));

        assert!(!remove_twin(&mut ms, MarkerId(0), MarkerId(1)));
        assert!(!remove_twin(&mut ms, MarkerId(0), MarkerId(0)));
    }

    #[test]
    fn test_dissolve() {
        let mut ms = markers(3);
        is_twin_of(&mut ms, MarkerId(1), &[MarkerId(0), MarkerId(2)]);
        dissolve(&mut ms, MarkerId(1));
        assert!(ms[1].twins().is_empty());
        assert_eq!(ms[0].twins(), &[MarkerId(2)]);
        assert!(is_consistent(&ms));
    }

    #[test]
    fn test_unknown_ids() {
        let mut ms = markers(2);
        assert!(!is_twin_of(&mut ms, MarkerId(9), &[MarkerId(0)]));
        assert!(is_twin_of(&mut ms, MarkerId(0), &[MarkerId(9)]));
        assert!(ms[0].twins().is_empty());
    }

    #[test]
    fn test_random_mutations_stay_consistent() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut ms = markers(8);
        for _ in 0..300 {
            let a = MarkerId(rng.random_range(0..8));
            let b = MarkerId(rng.random_range(0..8));
            match rng.random_range(0..3) {
                0 => {
                    is_twin_of(&mut ms, a, &[b]);
                }
                1 => {
                    remove_twin(&mut ms, a, b);
                }
                _ => dissolve(&mut ms, a),
            }
            assert!(is_consistent(&ms));
        }
    }
}
