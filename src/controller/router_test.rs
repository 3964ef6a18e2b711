//! Tests for the ScalingGroup event router
//!
//! These tests verify:
//! - Admission predicates for ScalingGroup, Group and Clique events
//! - Fan-out cardinality from Groups and Cliques
//! - Ownership rejection with zero or several owners
//! - Objects of an unexpected kind route nowhere

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::controller::managed::{ManagementConfig, LABEL_SCALING_GROUP_KEY};
    use crate::controller::router::*;
    use crate::controller::test_fixtures::*;
    use crate::crd::{Clique, ScalingGroup};

    fn router() -> EventRouter {
        EventRouter::new(ManagementConfig::default())
    }

    fn unlabelled<T: kube::Resource>(mut obj: T) -> T {
        obj.meta_mut().labels = Some(BTreeMap::new());
        obj
    }

    fn with_owners<T: kube::Resource>(mut obj: T, owners: Vec<(&str, &str)>) -> T {
        obj.meta_mut().owner_references = Some(
            owners
                .into_iter()
                .map(|(kind, name)| owner(kind, name))
                .collect(),
        );
        obj
    }

    // ScalingGroup (own kind)

    #[test]
    fn test_own_create_requires_managed() {
        let router = router();
        let sg = scaling_group("inference-0-workers");

        assert!(router.admit_own(&RoutedEvent::Create(&sg)));
        assert!(!router.admit_own(&RoutedEvent::Create(&unlabelled(sg))));
    }

    #[test]
    fn test_own_update_judged_on_old_object() {
        let router = router();
        let managed = scaling_group("inference-0-workers");
        let unmanaged = unlabelled(managed.clone());

        assert!(router.admit_own(&RoutedEvent::Update {
            old: &managed,
            new: &unmanaged
        }));
        assert!(!router.admit_own(&RoutedEvent::Update {
            old: &unmanaged,
            new: &managed
        }));
    }

    #[test]
    fn test_own_delete_and_generic_rejected() {
        let router = router();
        let sg = scaling_group("inference-0-workers");

        assert!(!router.admit_own(&RoutedEvent::Delete(&sg)));
        assert!(!router.admit_own(&RoutedEvent::Generic(&sg)));
    }

    #[test]
    fn test_own_routes_to_itself() {
        let sg = scaling_group("inference-0-workers");
        let keys = router().route(WatchRole::Own, &RoutedEvent::Create(&sg));
        assert_eq!(
            keys,
            vec![ReconcileKey::scaling_group(NAMESPACE, "inference-0-workers")]
        );
    }

    #[test]
    fn test_own_rejects_wrong_owner_count() {
        let router = router();
        let none = with_owners(scaling_group("sg"), vec![]);
        let two = with_owners(
            scaling_group("sg"),
            vec![("Group", "a"), ("Group", "b")],
        );
        let wrong_kind = with_owners(scaling_group("sg"), vec![("Clique", "c")]);

        for sg in [none, two, wrong_kind] {
            assert!(!router.admit_own(&RoutedEvent::Create(&sg)));
            assert!(!router.admit_own(&RoutedEvent::Update { old: &sg, new: &sg }));
        }
    }

    // Group (parent kind)

    #[test]
    fn test_parent_only_managed_updates() {
        let router = router();
        let group = group(1, &["workers"]);

        assert!(!router.admit_parent(&RoutedEvent::Create(&group)));
        assert!(!router.admit_parent(&RoutedEvent::Delete(&group)));
        assert!(!router.admit_parent(&RoutedEvent::Generic(&group)));
        assert!(router.admit_parent(&RoutedEvent::Update {
            old: &group,
            new: &group
        }));

        let foreign = unlabelled(group.clone());
        assert!(!router.admit_parent(&RoutedEvent::Update {
            old: &foreign,
            new: &group
        }));
    }

    #[test]
    fn test_group_fan_out_cardinality() {
        let group = group(3, &["prefill", "decode"]);
        let keys = router().route(
            WatchRole::Parent,
            &RoutedEvent::Update {
                old: &group,
                new: &group,
            },
        );

        assert_eq!(keys.len(), 6);
        let distinct: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(distinct.len(), 6);
        assert!(keys.iter().all(|k| k.namespace == NAMESPACE
            && k.kind == ResourceKind::ScalingGroup));
        assert_eq!(keys[0].name, "inference-0-prefill");
        assert_eq!(keys[5].name, "inference-2-decode");
    }

    #[test]
    fn test_group_without_templates_routes_nowhere() {
        let group = group(3, &[]);
        assert!(router().map_group(&group).is_empty());
    }

    #[test]
    fn test_group_with_zero_replicas_routes_nowhere() {
        let group = group(0, &["workers"]);
        assert!(router().map_group(&group).is_empty());
    }

    #[test]
    fn test_fan_out_covers_old_and_new_group_state() {
        let old = group(1, &["workers"]);
        let new = group(2, &["workers"]);

        let keys = router().route(WatchRole::Parent, &RoutedEvent::Update { old: &old, new: &new });

        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_group_scale_down_reaches_removed_replicas() {
        let old = group(3, &["workers"]);
        let new = group(2, &["workers"]);

        let keys = router().route(WatchRole::Parent, &RoutedEvent::Update { old: &old, new: &new });

        let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "inference-0-workers",
                "inference-1-workers",
                "inference-2-workers"
            ]
        );
    }

    // Clique (child kind)

    #[test]
    fn test_child_create_rejected() {
        let clique = member_clique("c", "sg-a", 2);
        assert!(!router().admit_child(&RoutedEvent::Create(&clique)));
    }

    #[test]
    fn test_child_ready_change_routes_to_scaling_group() {
        let old = member_clique("c", "sg-a", 2);
        let new = member_clique("c", "sg-a", 3);

        let keys = router().route(WatchRole::Child, &RoutedEvent::Update { old: &old, new: &new });

        assert_eq!(keys, vec![ReconcileKey::scaling_group(NAMESPACE, "sg-a")]);
    }

    #[test]
    fn test_child_moved_between_scaling_groups_routes_to_both() {
        let old = member_clique("c", "sg-a", 2);
        let new = member_clique("c", "sg-b", 3);

        let keys = router().route(WatchRole::Child, &RoutedEvent::Update { old: &old, new: &new });

        assert_eq!(
            keys,
            vec![
                ReconcileKey::scaling_group(NAMESPACE, "sg-b"),
                ReconcileKey::scaling_group(NAMESPACE, "sg-a"),
            ]
        );
    }

    #[test]
    fn test_child_unchanged_ready_routes_nowhere() {
        let old = member_clique("c", "sg-a", 2);
        let mut new = member_clique("c", "sg-a", 2);
        if let Some(status) = new.status.as_mut() {
            status.schedule_gated_replicas = 1;
        }

        let keys = router().route(WatchRole::Child, &RoutedEvent::Update { old: &old, new: &new });

        assert!(keys.is_empty());
    }

    #[test]
    fn test_child_unmanaged_delete_routes_nowhere() {
        let clique = unlabelled(member_clique("c", "sg-a", 2));
        assert!(router()
            .route(WatchRole::Child, &RoutedEvent::Delete(&clique))
            .is_empty());
    }

    #[test]
    fn test_child_managed_delete_routes() {
        let clique = member_clique("c", "sg-a", 2);
        assert_eq!(
            router().route(WatchRole::Child, &RoutedEvent::Delete(&clique)),
            vec![ReconcileKey::scaling_group(NAMESPACE, "sg-a")]
        );
    }

    #[test]
    fn test_child_owned_by_group_rejected() {
        let old = with_owners(member_clique("c", "sg-a", 2), vec![("Group", GROUP)]);
        let new = with_owners(member_clique("c", "sg-a", 3), vec![("Group", GROUP)]);

        assert!(!router().admit_child(&RoutedEvent::Update { old: &old, new: &new }));
        assert!(!router().admit_child(&RoutedEvent::Delete(&old)));
    }

    #[test]
    fn test_child_rejects_wrong_owner_count() {
        let router = router();
        let new = member_clique("c", "sg-a", 3);
        let none = with_owners(member_clique("c", "sg-a", 2), vec![]);
        let two = with_owners(
            member_clique("c", "sg-a", 2),
            vec![("ScalingGroup", "sg-a"), ("ScalingGroup", "sg-b")],
        );

        for old in [none, two] {
            assert!(!router.admit_child(&RoutedEvent::Update { old: &old, new: &new }));
            assert!(!router.admit_child(&RoutedEvent::Delete(&old)));
        }
    }

    #[test]
    fn test_clique_without_membership_label_routes_nowhere() {
        let mut clique = member_clique("c", "sg-a", 2);
        if let Some(labels) = clique.metadata.labels.as_mut() {
            labels.remove(LABEL_SCALING_GROUP_KEY);
        }
        assert!(router().map_clique(&clique).is_empty());

        if let Some(labels) = clique.metadata.labels.as_mut() {
            labels.insert(LABEL_SCALING_GROUP_KEY.to_string(), String::new());
        }
        assert!(router().map_clique(&clique).is_empty());
    }

    // Unexpected kinds

    #[test]
    fn test_unexpected_kinds_route_nowhere() {
        let router = router();
        let sg: ScalingGroup = scaling_group("sg-a");
        let clique: Clique = member_clique("c", "sg-a", 2);
        let group = group(2, &["workers"]);

        assert!(router.map_group(&sg).is_empty());
        assert!(router.map_clique(&group).is_empty());
        assert!(router.map(WatchRole::Own, &clique).is_empty());
        assert!(!router.admit_child(&RoutedEvent::Update { old: &sg, new: &sg }));
        assert!(!router.admit_parent(&RoutedEvent::Update {
            old: &clique,
            new: &clique
        }));
        assert!(!ready_replicas_changed(&clique, &sg));
    }
}
