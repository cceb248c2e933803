// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::crd::*;
    use kube::api::ObjectMeta;

    fn domain(name: &str, uid: Option<&str>) -> Domain {
        Domain {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: DomainSpec {
                domain_uid: uid.map(str::to_string),
                clusters: vec![ClusterReference {
                    name: "sample-cluster-1".to_string(),
                }],
                ..DomainSpec::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_domain_uid_defaults_to_name() {
        assert_eq!(domain("sample", None).domain_uid(), "sample");
        assert_eq!(domain("sample", Some("uid-1")).domain_uid(), "uid-1");
    }

    #[test]
    fn test_references_cluster() {
        let d = domain("sample", None);
        assert!(d.references_cluster("sample-cluster-1"));
        assert!(!d.references_cluster("other"));
        assert_eq!(d.cluster_names(), vec!["sample-cluster-1".to_string()]);
    }

    #[test]
    fn test_condition_equality_ignores_transition_time() {
        let a = DomainCondition {
            r#type: DomainConditionType::Available,
            status: ConditionStatus::True,
            reason: None,
            message: None,
            severity: None,
            last_transition_time: Some("2025-01-01T00:00:00Z".to_string()),
        };
        let mut b = a.clone();
        b.last_transition_time = Some("2025-06-01T00:00:00Z".to_string());
        assert_eq!(a, b);

        b.status = ConditionStatus::False;
        assert_ne!(a, b);
    }

    #[test]
    fn test_commit_update_only_requires_enabled_online_update() {
        let mut spec = DomainSpec::default();
        assert!(!spec.commit_update_only());

        spec.configuration = Some(DomainConfiguration {
            model: Some(ModelConfiguration {
                online_update: Some(OnlineUpdate {
                    enabled: true,
                    on_non_dynamic_changes: None,
                }),
            }),
        });
        assert!(spec.commit_update_only());

        spec.configuration = Some(DomainConfiguration {
            model: Some(ModelConfiguration {
                online_update: Some(OnlineUpdate {
                    enabled: true,
                    on_non_dynamic_changes: Some(OnNonDynamicChanges::CommitUpdateAndRoll),
                }),
            }),
        });
        assert!(!spec.commit_update_only());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = DomainStatus {
            introspect_job_failure_count: 2,
            observed_generation: Some(3),
            conditions: vec![DomainCondition {
                r#type: DomainConditionType::Failed,
                status: ConditionStatus::True,
                reason: Some(DomainFailureReason::ReplicasTooHigh),
                message: Some("too many".to_string()),
                severity: None,
                last_transition_time: None,
            }],
            ..DomainStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["introspectJobFailureCount"], 2);
        assert_eq!(json["observedGeneration"], 3);
        assert_eq!(json["conditions"][0]["type"], "Failed");
        assert_eq!(json["conditions"][0]["status"], "True");
        assert_eq!(json["conditions"][0]["reason"], "ReplicasTooHigh");
    }

    #[test]
    fn test_status_deserializes_with_missing_fields() {
        let status: DomainStatus = serde_json::from_str(r#"{"conditions":[]}"#).unwrap();
        assert_eq!(status, DomainStatus::default());
    }
}
