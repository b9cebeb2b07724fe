//! Snapshot comparison.

use cmisync_model::UserDataMap;

/// Returns true if every dotted element has the same value on both sides.
///
/// Keys without a dot are bookkeeping and ignored. A SCO missing on one side
/// only matters if the other side has dotted elements for it.
pub fn snapshot_equals(snapshot: &UserDataMap, remote: &UserDataMap) -> bool {
    contains_all(remote, snapshot) && contains_all(snapshot, remote)
}

fn contains_all(source: &UserDataMap, target: &UserDataMap) -> bool {
    source.iter().all(|(sco_id, sco)| {
        let other = target.get(sco_id);
        sco.dotted()
            .all(|(element, value)| other.and_then(|o| o.userdata.get(element)) == Some(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmisync_model::ScoUserData;

    fn data(values: &[(u64, &str, &str)]) -> UserDataMap {
        let mut map = UserDataMap::new();
        for &(sco_id, element, value) in values {
            map.entry(sco_id)
                .or_insert_with(|| ScoUserData::new(sco_id))
                .userdata
                .insert(element.into(), value.into());
        }
        map
    }

    #[test]
    fn equal_when_dotted_values_match() {
        let a = data(&[(1, "cmi.core.lesson_status", "incomplete"), (1, "status", "incomplete")]);
        let b = data(&[(1, "cmi.core.lesson_status", "incomplete"), (1, "status", "completed")]);
        assert!(snapshot_equals(&a, &b));
    }

    #[test]
    fn any_differing_value_breaks_equality() {
        let a = data(&[(1, "cmi.core.lesson_status", "incomplete")]);
        let b = data(&[(1, "cmi.core.lesson_status", "completed")]);
        assert!(!snapshot_equals(&a, &b));
    }

    #[test]
    fn equality_is_symmetric() {
        let small = data(&[(1, "cmi.core.lesson_status", "incomplete")]);
        let large = data(&[
            (1, "cmi.core.lesson_status", "incomplete"),
            (1, "cmi.core.score.raw", "50"),
        ]);
        assert!(!snapshot_equals(&small, &large));
        assert!(!snapshot_equals(&large, &small));

        let other_sco = data(&[(1, "cmi.core.lesson_status", "incomplete"), (2, "cmi.core.exit", "")]);
        assert!(!snapshot_equals(&small, &other_sco));
    }

    #[test]
    fn scos_without_dotted_values_are_ignored() {
        let a = data(&[(1, "cmi.core.lesson_status", "incomplete")]);
        let mut b = a.clone();
        b.insert(7, ScoUserData::new(7).with_value("status", ""));
        assert!(snapshot_equals(&a, &b));
    }
}
