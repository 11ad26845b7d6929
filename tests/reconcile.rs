//! End-to-end reconciliation against the in-memory cloud

use std::sync::Arc;
use std::time::Duration;

use lbwire::cloud::{
    CloudCall, CloudError, CloudResourceClient, InMemoryCloud, Protocol, RuleSource,
    SecurityGroupRule, CODE_GROUP_NOT_FOUND,
};
use lbwire::reconcile::{
    ContainerBinding, DriftOutcome, HealthCheckPolicy, LoadBalancerSpec, ReconcileError,
    Reconciler, ResourceKind, RetryPolicy, TargetGroupSpec,
};

// ============================================================================
// Fixtures
// ============================================================================

fn lb_spec() -> LoadBalancerSpec {
    LoadBalancerSpec {
        name: "svc-lb".to_string(),
        vpc_id: "vpc-1".to_string(),
        security_group_name: "svc-sg".to_string(),
        cluster_name: "prod".to_string(),
        http_port: 80,
        https_port: 0,
        certificate_arn: None,
    }
}

fn tg_spec() -> TargetGroupSpec {
    TargetGroupSpec::new(
        "svc-tg",
        HealthCheckPolicy {
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
            status_codes: "200".to_string(),
            healthy_threshold: 2,
            unhealthy_threshold: 3,
        },
    )
}

fn container() -> ContainerBinding {
    ContainerBinding {
        container_name: "web".to_string(),
        container_port: 8080,
    }
}

fn account() -> Arc<InMemoryCloud> {
    Arc::new(
        InMemoryCloud::new()
            .with_subnets("vpc-1", &["subnet-a", "subnet-b"])
            .with_security_group("sg-instances", "lbwire_prod_instances", "vpc-1"),
    )
}

fn operations(calls: &[CloudCall]) -> Vec<&'static str> {
    calls.iter().map(|c| c.operation()).collect()
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_empty_account_end_to_end() {
    let cloud = account();
    let reconciler = Reconciler::new(cloud.clone());

    let binding = reconciler
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    let state = cloud.snapshot().await;
    assert_eq!(state.target_groups.len(), 1);
    assert_eq!(binding.target_group_arn, state.target_groups[0].arn);
    assert_eq!(binding.container_name, "web");
    assert_eq!(binding.container_port, 8080);

    assert_eq!(state.load_balancers.len(), 1);
    let lb = &state.load_balancers[0];
    assert!(lb.internet_facing);
    assert_eq!(lb.subnet_ids, vec!["subnet-a", "subnet-b"]);

    assert_eq!(state.listeners.len(), 1);
    let listener = &state.listeners[0];
    assert_eq!(listener.port, 80);
    assert_eq!(listener.protocol, Protocol::Http);
    assert_eq!(
        listener.default_actions[0].target_group_arn.as_deref(),
        Some(binding.target_group_arn.as_str())
    );
}

#[tokio::test]
async fn test_bootstrap_call_order() {
    let cloud = account();
    Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    let journal = cloud.journal().await;
    assert_eq!(
        operations(&journal),
        vec![
            "create_target_group",
            "create_tags",
            "create_security_group",
            "create_security_group_tags",
            "add_inbound_rule",
            "add_inbound_rule",
            "create_load_balancer",
            "create_tags",
            "create_listener",
        ]
    );

    let sg_id = match &journal[2..4] {
        [CloudCall::CreateSecurityGroup { name }, CloudCall::TagSecurityGroup { group_id }] => {
            assert_eq!(name, "svc-sg");
            group_id.clone()
        }
        other => panic!("unexpected calls: {:?}", other),
    };
    match &journal[6] {
        CloudCall::CreateLoadBalancer {
            security_group_ids, ..
        } => assert_eq!(security_group_ids, &vec![sg_id.clone()]),
        other => panic!("unexpected call: {:?}", other),
    }

    // the load balancer group is open on the listener port and allowed into the instances
    let lb_group = cloud.security_group_record(&sg_id).await.unwrap();
    assert_eq!(
        lb_group.inbound_rules,
        vec![SecurityGroupRule::tcp_port(
            80,
            RuleSource::Cidr("0.0.0.0/0".to_string())
        )]
    );
    let instances = cloud.security_group_record("sg-instances").await.unwrap();
    assert_eq!(
        instances.inbound_rules,
        vec![SecurityGroupRule::tcp_range(
            0,
            65535,
            RuleSource::SecurityGroup(sg_id)
        )]
    );
}

#[tokio::test]
async fn test_new_resources_are_tagged() {
    let cloud = account();
    let binding = Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    let tg_tags = cloud.tags_for(&binding.target_group_arn).await;
    assert_eq!(tg_tags.get("Name").map(String::as_str), Some("svc-tg"));

    let lb_arn = cloud.snapshot().await.load_balancers[0].arn.clone();
    let lb_tags = cloud.tags_for(&lb_arn).await;
    assert_eq!(lb_tags.get("Name").map(String::as_str), Some("svc-lb"));
    assert_eq!(lb_tags.get("managed-by").map(String::as_str), Some("lbwire"));
}

#[tokio::test]
async fn test_https_listener_needs_certificate_and_port() {
    let cloud = account();
    let mut spec = lb_spec();
    spec.https_port = 443;
    spec.certificate_arn = Some("arn:cert".to_string());

    Reconciler::new(cloud.clone())
        .reconcile(&spec, &tg_spec(), &container())
        .await
        .unwrap();

    let listeners: Vec<(u16, Protocol, Option<String>)> = cloud
        .snapshot()
        .await
        .listeners
        .into_iter()
        .map(|l| (l.port, l.protocol, l.certificate_arn))
        .collect();
    assert_eq!(
        listeners,
        vec![
            (80, Protocol::Http, None),
            (443, Protocol::Https, Some("arn:cert".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_https_only() {
    let cloud = account();
    let mut spec = lb_spec();
    spec.http_port = 0;
    spec.https_port = 8443;
    spec.certificate_arn = Some("arn:cert".to_string());

    Reconciler::new(cloud.clone())
        .reconcile(&spec, &tg_spec(), &container())
        .await
        .unwrap();

    let state = cloud.snapshot().await;
    assert_eq!(state.listeners.len(), 1);
    assert_eq!(state.listeners[0].port, 8443);
    assert_eq!(state.listeners[0].protocol, Protocol::Https);
}

#[tokio::test]
async fn test_missing_instance_group_means_cluster_not_initialized() {
    let cloud = Arc::new(InMemoryCloud::new().with_subnets("vpc-1", &["subnet-a"]));

    let err = Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();

    match err {
        ReconcileError::ClusterNotInitialized { security_group } => {
            assert_eq!(security_group, "lbwire_prod_instances")
        }
        other => panic!("unexpected error: {}", other),
    }
    let state = cloud.snapshot().await;
    assert!(state.load_balancers.is_empty());
    assert!(state.security_groups.is_empty());
}

#[tokio::test]
async fn test_rerun_after_cluster_init_wires_instances() {
    let cloud = Arc::new(InMemoryCloud::new().with_subnets("vpc-1", &["subnet-a"]));
    let err = Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ClusterNotInitialized { .. }));

    // the cluster comes up between runs
    let initialized = Arc::new(
        InMemoryCloud::from_state(cloud.snapshot().await).with_security_group(
            "sg-instances",
            "lbwire_prod_instances",
            "vpc-1",
        ),
    );
    Reconciler::new(initialized.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    let state = initialized.snapshot().await;
    let lb_group = state
        .security_groups
        .iter()
        .find(|r| r.group.name == "svc-sg")
        .unwrap();
    let instances = initialized.security_group_record("sg-instances").await.unwrap();
    assert_eq!(
        instances.inbound_rules,
        vec![SecurityGroupRule::tcp_range(
            0,
            65535,
            RuleSource::SecurityGroup(lb_group.group.id.clone())
        )]
    );
}

#[tokio::test]
async fn test_vpc_without_subnets_fails_before_load_balancer() {
    let cloud = Arc::new(
        InMemoryCloud::new().with_security_group("sg-instances", "lbwire_prod_instances", "vpc-1"),
    );

    let err = Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Api {
            kind: ResourceKind::LoadBalancer,
            ..
        }
    ));
    assert!(!operations(&cloud.journal().await).contains(&"create_load_balancer"));
}

// ============================================================================
// Idempotence and existing topologies
// ============================================================================

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let cloud = account();
    let reconciler = Reconciler::new(cloud.clone());

    let first = reconciler
        .converge(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();
    let before = cloud.snapshot().await;
    cloud.clear_journal().await;

    let second = reconciler
        .converge(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    assert_eq!(second.binding, first.binding);
    assert_eq!(second.health_check, DriftOutcome::InSync);
    assert!(cloud.journal().await.is_empty());
    assert_eq!(cloud.snapshot().await, before);
}

#[tokio::test]
async fn test_both_exist_without_listener_is_a_conflict() {
    let cloud = account();
    let tg = cloud
        .create_target_group(
            "svc-tg",
            80,
            Protocol::Http,
            "vpc-1",
            &tg_spec().health_check.to_health_check(),
        )
        .await
        .unwrap();
    cloud
        .create_load_balancer("svc-lb", true, &[], &["subnet-a".to_string()])
        .await
        .unwrap();
    cloud.clear_journal().await;

    let err = Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(
        err.to_string(),
        "load balancer [svc-lb] does not have a listener to target group [svc-tg]"
    );
    assert!(cloud.journal().await.is_empty());
    assert_eq!(cloud.snapshot().await.target_groups[0].arn, tg.arn);
}

#[tokio::test]
async fn test_existing_load_balancer_gains_target_group_and_listeners() {
    let cloud = account();
    cloud
        .create_load_balancer("svc-lb", true, &[], &["subnet-a".to_string()])
        .await
        .unwrap();
    cloud.clear_journal().await;

    let mut spec = lb_spec();
    spec.http_port = 8000;
    let binding = Reconciler::new(cloud.clone())
        .reconcile(&spec, &tg_spec(), &container())
        .await
        .unwrap();

    let journal = cloud.journal().await;
    assert_eq!(
        operations(&journal),
        vec!["create_target_group", "create_tags", "create_listener"]
    );
    match &journal[2] {
        CloudCall::CreateListener(listener) => {
            assert_eq!(listener.port, 8000);
            assert_eq!(listener.target_group_arn, binding.target_group_arn);
        }
        other => panic!("unexpected call: {:?}", other),
    }
}

#[tokio::test]
async fn test_existing_security_group_is_reused() {
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_subnets("vpc-1", &["subnet-a"])
            .with_security_group("sg-instances", "lbwire_prod_instances", "vpc-1")
            .with_security_group("sg-shared", "svc-sg", "vpc-1"),
    );

    Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    let ops = operations(&cloud.journal().await);
    assert!(!ops.contains(&"create_security_group"));
    assert!(!ops.contains(&"add_inbound_rule"));
    assert_eq!(
        cloud.snapshot().await.load_balancers[0].security_group_ids,
        vec!["sg-shared"]
    );
}

// ============================================================================
// Partial failures
// ============================================================================

#[tokio::test]
async fn test_rerun_after_load_balancer_failure_completes() {
    let cloud = account();
    let reconciler = Reconciler::new(cloud.clone());

    cloud
        .fail_operation(
            "create_load_balancer",
            CloudError::Transport("connection reset".to_string()),
        )
        .await;
    let err = reconciler
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to create load balancer [svc-lb]: transport error: connection reset"
    );

    cloud.clear_failures().await;
    cloud.clear_journal().await;
    let binding = reconciler
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    // target group and security group from the failed run are picked up again
    assert_eq!(
        operations(&cloud.journal().await),
        vec!["create_load_balancer", "create_tags", "create_listener"]
    );
    let state = cloud.snapshot().await;
    assert_eq!(state.target_groups.len(), 1);
    assert_eq!(binding.target_group_arn, state.target_groups[0].arn);
}

#[tokio::test]
async fn test_listener_failure_leaves_a_conflict() {
    let cloud = account();
    let reconciler = Reconciler::new(cloud.clone());

    cloud
        .fail_operation(
            "create_listener",
            CloudError::service("TooManyListeners", "listener quota reached"),
        )
        .await;
    let err = reconciler
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Api {
            kind: ResourceKind::Listener,
            ..
        }
    ));

    cloud.clear_failures().await;
    let err = reconciler
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

// ============================================================================
// Security group tag retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_tag_visibility_lag_is_retried() {
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_subnets("vpc-1", &["subnet-a"])
            .with_security_group("sg-instances", "lbwire_prod_instances", "vpc-1")
            .with_tag_visibility_lag(3),
    );

    Reconciler::new(cloud.clone())
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();

    assert_eq!(cloud.snapshot().await.listeners.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tag_retry_gives_up_after_max_duration() {
    let cloud = account();
    cloud
        .fail_operation(
            "create_security_group_tags",
            CloudError::service(CODE_GROUP_NOT_FOUND, "the security group does not exist"),
        )
        .await;
    let reconciler = Reconciler::with_retry(
        cloud.clone(),
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5)),
    );

    let started = tokio::time::Instant::now();
    let err = reconciler
        .reconcile(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(7));
    match err {
        ReconcileError::Api {
            kind: ResourceKind::SecurityGroup,
            operation,
            source,
            ..
        } => {
            assert_eq!(operation, "tag");
            assert!(source.has_code(CODE_GROUP_NOT_FOUND));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(cloud.snapshot().await.load_balancers.is_empty());
}

// ============================================================================
// Health check drift
// ============================================================================

#[tokio::test]
async fn test_drift_is_corrected_with_one_update() {
    let cloud = account();
    let reconciler = Reconciler::new(cloud.clone());
    let report = reconciler
        .converge(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();
    let arn = report.binding.target_group_arn;

    let mut live = tg_spec().health_check.to_health_check();
    live.path = "/old".to_string();
    live.matcher = None;
    cloud.set_health_check(&arn, live).await;
    cloud.clear_journal().await;

    let outcome = reconciler.check_drift(&arn, &tg_spec()).await.unwrap();
    assert_eq!(outcome, DriftOutcome::Updated);

    let journal = cloud.journal().await;
    assert_eq!(journal.len(), 1);
    match &journal[0] {
        CloudCall::UpdateHealthCheck { health_check, .. } => {
            assert_eq!(health_check, &tg_spec().health_check.to_health_check());
        }
        other => panic!("unexpected call: {:?}", other),
    }

    let outcome = reconciler.check_drift(&arn, &tg_spec()).await.unwrap();
    assert_eq!(outcome, DriftOutcome::InSync);
}

#[tokio::test]
async fn test_drift_on_missing_target_group() {
    let cloud = account();
    let reconciler = Reconciler::new(cloud.clone());
    let report = reconciler
        .converge(&lb_spec(), &tg_spec(), &container())
        .await
        .unwrap();
    cloud
        .remove_target_group(&report.binding.target_group_arn)
        .await;

    let err = reconciler
        .check_drift(&report.binding.target_group_arn, &tg_spec())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
