// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the presence cache

#[cfg(test)]
mod tests {
    use crate::labels::{ANNOTATION_ROLL_REQUESTED, LABEL_CONFIG_PENDING_RESTART};
    use crate::presence::*;
    use crate::test_support::{cluster_resource, domain_resource, server_pod, PodPhase};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[test]
    fn test_domain_or_insert_returns_shared_entry() {
        let cache = PresenceCache::new();
        let first = cache.domain_or_insert("apps", "sample");
        let second = cache.domain_or_insert("apps", "sample");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.domains("apps").len(), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache = PresenceCache::new();
        cache.domain_or_insert("apps", "sample");
        cache.domain_or_insert("batch", "sample");
        assert_eq!(cache.domains("apps").len(), 1);
        assert_eq!(cache.domains("batch").len(), 1);
        assert!(cache.domain("other", "sample").is_none());
        assert_eq!(
            cache.namespaces(),
            vec!["apps".to_string(), "batch".to_string()]
        );
    }

    #[test]
    fn test_register_replaces_and_unregister_removes() {
        let cache = PresenceCache::new();
        let original = cache.domain_or_insert("apps", "sample");
        let replacement = Arc::new(DomainPresenceInfo::with_domain(domain_resource(
            "apps", "sample", 1,
        )));
        cache.register_domain(Arc::clone(&replacement));

        let cached = cache.domain("apps", "sample").unwrap();
        assert!(Arc::ptr_eq(&cached, &replacement));
        assert!(!Arc::ptr_eq(&cached, &original));

        let removed = cache.unregister_domain("apps", "sample").unwrap();
        assert!(Arc::ptr_eq(&removed, &replacement));
        assert!(cache.domain("apps", "sample").is_none());
    }

    #[test]
    fn test_cluster_registration() {
        let cache = PresenceCache::new();
        let info = Arc::new(ClusterPresenceInfo::new(cluster_resource("apps", "c1", "c", 2)));
        cache.register_cluster(info);

        let cached = cache.cluster("apps", "c1").unwrap();
        assert_eq!(cached.cluster_name(), "c");
        assert_eq!(cached.generation(), Some(1));
        assert_eq!(cache.clusters("apps").len(), 1);

        cache.unregister_cluster("apps", "c1");
        assert!(cache.cluster("apps", "c1").is_none());
    }

    #[test]
    fn test_expected_running_servers_include_admin() {
        let info = DomainPresenceInfo::new("apps", "sample");
        assert!(info.expected_running_servers().is_empty());

        info.set_server_startup_info(
            Some("admin-server".to_string()),
            vec![ServerStartupInfo {
                server_name: "c-ms-1".to_string(),
                cluster_name: Some("c".to_string()),
                desired_state: "RUNNING".to_string(),
            }],
        );
        let expected: BTreeSet<String> = ["admin-server", "c-ms-1"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(info.expected_running_servers(), expected);

        info.clear_server_startup_info();
        assert!(info.server_startup_info().is_none());
    }

    #[test]
    fn test_pod_derived_server_sets() {
        let info = DomainPresenceInfo::new("apps", "sample");

        let mut pending = server_pod("apps", "sample", "ms-1", PodPhase::Running, true);
        pending
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(LABEL_CONFIG_PENDING_RESTART.to_string(), "true".to_string());
        info.set_server_pod("ms-1", pending);

        info.set_server_pod("ms-2", server_pod("apps", "sample", "ms-2", PodPhase::Failed, false));

        let mut roll = server_pod("apps", "sample", "ms-3", PodPhase::Running, true);
        roll.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(ANNOTATION_ROLL_REQUESTED.to_string(), "1".to_string());
        info.set_server_pod("ms-3", roll);

        assert_eq!(info.pending_restart_servers(), BTreeSet::from(["ms-1".to_string()]));
        assert_eq!(info.failed_servers(), BTreeSet::from(["ms-2".to_string()]));
        assert_eq!(info.servers_to_roll(), BTreeSet::from(["ms-3".to_string()]));

        info.mark_for_roll("ms-1");
        assert_eq!(info.servers_to_roll().len(), 2);
        info.clear_roll("ms-1");
        assert_eq!(info.servers_to_roll().len(), 1);

        assert!(info.delete_server_pod("ms-2").is_some());
        assert!(info.delete_server_pod("ms-2").is_none());
        assert_eq!(info.server_names().len(), 2);
    }

    #[test]
    fn test_generation_tracking() {
        let info = DomainPresenceInfo::with_domain(domain_resource("apps", "sample", 4));
        assert_eq!(info.domain_generation(), Some(4));
        assert_eq!(info.last_processed_generation(), None);

        info.mark_generation_processed();
        assert_eq!(info.last_processed_generation(), Some(4));

        info.set_domain(None);
        assert_eq!(info.domain_generation(), None);
        assert_eq!(info.domain_name(), "sample");
    }
}
