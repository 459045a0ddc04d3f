use std::sync::Arc;
use std::time::Duration;

use jitbroker_core::AppError;
use jitbroker_domain::{
    NewAccessRequest, RequestId, RequestStatus, TierConfig, TierPolicy, VaultPathRequest,
    VaultPathRules,
};

use crate::backend_registry::BackendRegistry;
use crate::broker_ports::CredentialBackend;
use crate::deferred_tasks::DeferredTasks;
use crate::dynamic_policy_backend::DynamicPolicyBackend;
use crate::rate_limit_service::{RateLimitRule, RateLimitService};
use crate::request_store::RequestStore;
use crate::static_backend::StaticBackend;
use crate::test_support::{FakeBackend, FakeSecretStore, RecordingNotifier};

use super::{ApprovalDecision, ApprovalService, CallbackOutcome};

const TIMEOUT: Duration = Duration::from_secs(60);
const SLOW_MINT: Duration = Duration::from_secs(5);

struct Harness {
    service: ApprovalService,
    secrets: Arc<FakeSecretStore>,
    notifier: Arc<RecordingNotifier>,
    failing: Arc<FakeBackend>,
    slow: Arc<FakeBackend>,
    slow_failing: Arc<FakeBackend>,
}

struct HarnessOptions {
    capacity: usize,
    max_requests: usize,
    notifier: RecordingNotifier,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_requests: 50,
            notifier: RecordingNotifier::default(),
        }
    }
}

fn harness() -> Harness {
    harness_with(HarnessOptions::default())
}

fn harness_with(options: HarnessOptions) -> Harness {
    let secrets = Arc::new(FakeSecretStore::default());
    let notifier = Arc::new(options.notifier);
    let failing = Arc::new(FakeBackend::failing("grafana"));
    let slow = Arc::new(FakeBackend::succeeding("docker").with_delay(SLOW_MINT));
    let slow_failing = Arc::new(FakeBackend::failing("portainer").with_delay(SLOW_MINT));
    let tasks = DeferredTasks::new();
    let rules = VaultPathRules::new("allowed/data/", 10).unwrap_or_default();

    let fallback: Arc<dyn CredentialBackend> =
        Arc::new(StaticBackend::new(secrets.clone(), secrets.clone()));
    let dynamic_vault = DynamicPolicyBackend::new(
        secrets.clone(),
        secrets.clone(),
        secrets.clone(),
        rules.clone(),
        tasks.clone(),
    );
    let registry = BackendRegistry::new(fallback)
        .with_dynamic("vault", Arc::new(dynamic_vault))
        .with_dynamic("grafana", failing.clone())
        .with_dynamic("docker", slow.clone())
        .with_dynamic("portainer", slow_failing.clone());

    let rule = RateLimitRule::new(options.max_requests, Duration::from_secs(900)).unwrap_or_default();
    let service = ApprovalService::new(
        RequestStore::new(options.capacity),
        RateLimitService::new(rule),
        registry,
        notifier.clone(),
        tasks,
    )
    .with_vault_rules(rules)
    .with_allowed_requesters(["prometheus", "claude"])
    .with_request_timeout(TIMEOUT);

    Harness {
        service,
        secrets,
        notifier,
        failing,
        slow,
        slow_failing,
    }
}

fn input(resource: &str, tier: u32) -> NewAccessRequest {
    NewAccessRequest::new("prometheus", resource, tier, "disk alert on nas")
        .unwrap_or_else(|_| unreachable!())
}

async fn submit(harness: &Harness, input: NewAccessRequest) -> RequestId {
    harness
        .service
        .submit(input)
        .await
        .map(|request| request.id().clone())
        .unwrap_or_else(|_| unreachable!())
}

async fn status(harness: &Harness, id: &RequestId) -> RequestStatus {
    harness
        .service
        .poll_status(id)
        .await
        .map(|view| view.status)
        .unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn auto_approved_credential_is_delivered_once() {
    let harness = harness();
    let request = harness.service.submit(input("sonarr", 1)).await;
    assert!(request.is_ok());
    let request = request.unwrap_or_else(|_| unreachable!());
    assert_eq!(request.status(), RequestStatus::Approved);

    let first = harness.service.poll_status(request.id()).await;
    let first = first.unwrap_or_else(|_| unreachable!());
    assert_eq!(first.status, RequestStatus::Approved);
    let credential = first.credential.unwrap_or_else(|| unreachable!());
    assert_eq!(credential.token(), "s.static-sonarr");
    assert_eq!(credential.lease_ttl(), Duration::from_secs(15 * 60));

    let second = harness
        .service
        .poll_status(request.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(second.status, RequestStatus::Claimed);
    assert!(second.credential.is_none());
    assert!(harness.notifier.events().await.is_empty());
}

#[tokio::test]
async fn default_scope_is_applied_when_none_requested() {
    let harness = harness();
    let request = harness
        .service
        .submit(input("sonarr", 2))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(request.scopes(), ["api".to_owned()]);

    let request = harness
        .service
        .submit(input("sonarr", 2).with_scopes(vec!["read_api".to_owned()]))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(request.scopes(), ["read_api".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let harness = harness();
    let id = submit(&harness, input("sonarr", 2)).await;
    assert_eq!(status(&harness, &id).await, RequestStatus::Pending);
    assert_eq!(harness.notifier.events().await, vec![format!("sent:{id}")]);

    tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;

    let view = harness
        .service
        .poll_status(&id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(view.status, RequestStatus::Timeout);
    assert!(view.credential.is_none());
    assert_eq!(
        harness.notifier.events().await,
        vec![format!("sent:{id}"), format!("timed_out:{id}")]
    );
}

#[tokio::test(start_paused = true)]
async fn approval_before_deadline_wins_over_timeout() {
    let harness = harness();
    let id = submit(&harness, input("sonarr", 2)).await;

    let outcome = harness
        .service
        .handle_callback(ApprovalDecision::Approve, &id)
        .await;
    assert_eq!(outcome, CallbackOutcome::Approved);

    tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;

    let view = harness
        .service
        .poll_status(&id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(view.status, RequestStatus::Approved);
    assert!(view.credential.is_some());
    assert_eq!(
        harness.notifier.events().await,
        vec![format!("sent:{id}"), format!("approved:{id}")]
    );
}

#[tokio::test]
async fn duplicate_and_late_callbacks_are_ignored() {
    let harness = harness();
    let id = submit(&harness, input("sonarr", 2)).await;

    assert_eq!(
        harness.service.handle_callback(ApprovalDecision::Deny, &id).await,
        CallbackOutcome::Denied
    );
    assert_eq!(
        harness
            .service
            .handle_callback(ApprovalDecision::Approve, &id)
            .await,
        CallbackOutcome::Ignored
    );
    assert_eq!(
        harness.service.handle_callback(ApprovalDecision::Deny, &id).await,
        CallbackOutcome::Ignored
    );
    assert_eq!(status(&harness, &id).await, RequestStatus::Denied);
    assert!(harness.secrets.minted_resources().await.is_empty());

    let unknown = RequestId::new("req-000000000000").unwrap_or_else(|_| unreachable!());
    assert_eq!(
        harness
            .service
            .handle_callback(ApprovalDecision::Approve, &unknown)
            .await,
        CallbackOutcome::Ignored
    );
}

#[tokio::test]
async fn tier_three_static_request_is_delivered_after_approval() {
    let harness = harness();
    let id = submit(&harness, input("paperless", 3)).await;

    let outcome = harness
        .service
        .handle_callback(ApprovalDecision::Approve, &id)
        .await;
    assert_eq!(outcome, CallbackOutcome::Approved);

    let view = harness
        .service
        .poll_status(&id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(view.status, RequestStatus::Approved);
    assert!(view.credential.is_some());
    assert_eq!(
        harness.secrets.minted_resources().await,
        vec![("paperless".to_owned(), 3)]
    );
    assert_eq!(status(&harness, &id).await, RequestStatus::Claimed);
}

#[tokio::test(start_paused = true)]
async fn concurrent_approvals_mint_once() {
    let harness = harness();
    let id = submit(&harness, input("docker", 2)).await;

    let (first, second) = tokio::join!(
        harness.service.handle_callback(ApprovalDecision::Approve, &id),
        harness.service.handle_callback(ApprovalDecision::Approve, &id),
    );

    let mut outcomes = [first, second];
    outcomes.sort_by_key(|outcome| *outcome == CallbackOutcome::Approved);
    assert_eq!(outcomes, [CallbackOutcome::Ignored, CallbackOutcome::Approved]);
    assert_eq!(harness.slow.mint_count(), 1);
    assert_eq!(
        harness.notifier.events().await,
        vec![format!("sent:{id}"), format!("approved:{id}")]
    );
}

#[tokio::test(start_paused = true)]
async fn deny_during_approval_mint_is_ignored() {
    let harness = harness();
    let id = submit(&harness, input("docker", 2)).await;

    let (approve, deny) = tokio::join!(
        harness.service.handle_callback(ApprovalDecision::Approve, &id),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            harness.service.handle_callback(ApprovalDecision::Deny, &id).await
        },
    );

    assert_eq!(approve, CallbackOutcome::Approved);
    assert_eq!(deny, CallbackOutcome::Ignored);
    assert_eq!(status(&harness, &id).await, RequestStatus::Approved);
}

#[tokio::test(start_paused = true)]
async fn approval_in_flight_at_deadline_delivers_credential() {
    let harness = harness();
    let id = submit(&harness, input("docker", 2)).await;
    tokio::time::sleep(TIMEOUT - Duration::from_secs(2)).await;

    let outcome = harness
        .service
        .handle_callback(ApprovalDecision::Approve, &id)
        .await;
    assert_eq!(outcome, CallbackOutcome::Approved);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let view = harness
        .service
        .poll_status(&id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(view.status, RequestStatus::Approved);
    assert!(view.credential.is_some());
    assert_eq!(harness.slow.mint_count(), 1);
    assert_eq!(
        harness.notifier.events().await,
        vec![format!("sent:{id}"), format!("approved:{id}")]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_mint_applies_timeout_that_fired_meanwhile() {
    let harness = harness();
    let id = submit(&harness, input("portainer", 2)).await;
    tokio::time::sleep(TIMEOUT - Duration::from_secs(2)).await;

    let outcome = harness
        .service
        .handle_callback(ApprovalDecision::Approve, &id)
        .await;

    assert_eq!(outcome, CallbackOutcome::MintFailed);
    assert_eq!(harness.slow_failing.mint_count(), 1);
    assert_eq!(status(&harness, &id).await, RequestStatus::Timeout);
    assert_eq!(
        harness.notifier.events().await,
        vec![
            format!("sent:{id}"),
            format!("error:{id}"),
            format!("timed_out:{id}")
        ]
    );
}

#[tokio::test]
async fn dynamic_mint_failure_does_not_fall_back_to_static() {
    let harness = harness();
    let id = submit(&harness, input("grafana", 2)).await;

    let outcome = harness
        .service
        .handle_callback(ApprovalDecision::Approve, &id)
        .await;

    assert_eq!(outcome, CallbackOutcome::MintFailed);
    assert_eq!(harness.failing.mint_count(), 1);
    assert!(harness.secrets.minted_resources().await.is_empty());
    assert_eq!(status(&harness, &id).await, RequestStatus::Pending);
    assert_eq!(
        harness.notifier.events().await,
        vec![format!("sent:{id}"), format!("error:{id}")]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_auto_approval_stays_pending_until_timeout() {
    let harness = harness();
    let request = harness
        .service
        .submit(input("grafana", 1))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(request.status(), RequestStatus::Pending);

    tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(status(&harness, request.id()).await, RequestStatus::Timeout);
    assert!(harness.notifier.events().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn notifier_failure_still_arms_timeout() {
    let harness = harness_with(HarnessOptions {
        notifier: RecordingNotifier::failing_send(),
        ..HarnessOptions::default()
    });
    let id = submit(&harness, input("sonarr", 3)).await;

    tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(status(&harness, &id).await, RequestStatus::Timeout);
}

#[tokio::test]
async fn vault_request_mints_scoped_token_on_approval() {
    let harness = harness();
    let id = submit(
        &harness,
        input("vault", 2).with_vault_paths(vec![VaultPathRequest::new(
            "allowed/data/x",
            &["read"],
        )]),
    )
    .await;

    let outcome = harness
        .service
        .handle_callback(ApprovalDecision::Approve, &id)
        .await;
    assert_eq!(outcome, CallbackOutcome::Approved);

    let policy_name = format!("jit-vault-{id}");
    assert!(harness.secrets.policy(&policy_name).await.is_some());

    let credential = harness
        .service
        .poll_status(&id)
        .await
        .ok()
        .and_then(|view| view.credential)
        .unwrap_or_else(|| unreachable!());
    assert_eq!(
        credential.metadata().get("policy_name"),
        Some(&policy_name)
    );
}

#[tokio::test]
async fn injected_tier_policy_replaces_standard_table() {
    let harness = harness();
    let service = harness.service.clone().with_tier_policy(
        TierPolicy::new()
            .with_tier(7, TierConfig::new(Duration::from_secs(120), true, "lab"))
            .with_minimum_tier("sonarr", 7),
    );

    let rejected = service.submit(input("sonarr", 1)).await;
    assert!(matches!(rejected, Err(AppError::Validation(_))));

    let request = service
        .submit(input("sonarr", 7))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(request.status(), RequestStatus::Approved);
    assert_eq!(
        harness.secrets.minted_resources().await,
        vec![("sonarr".to_owned(), 7)]
    );
}

#[tokio::test]
async fn rejected_submissions_create_nothing() {
    let harness = harness();

    let outside = input("vault", 2).with_vault_paths(vec![VaultPathRequest::new(
        "homelab/data/x",
        &["read"],
    )]);
    assert!(matches!(
        harness.service.submit(outside).await,
        Err(AppError::Validation(_))
    ));

    let missing_paths = input("vault", 2);
    assert!(matches!(
        harness.service.submit(missing_paths).await,
        Err(AppError::Validation(_))
    ));

    assert!(matches!(
        harness.service.submit(input("sonarr", 9)).await,
        Err(AppError::Validation(message)) if message == "unknown tier: 9"
    ));
    assert!(matches!(
        harness.service.submit(input("gitlab", 1)).await,
        Err(AppError::Validation(_))
    ));

    let intruder = NewAccessRequest::new("intruder", "sonarr", 1, "let me in")
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        harness.service.submit(intruder).await,
        Err(AppError::Forbidden(_))
    ));

    let health = harness.service.health().await;
    assert_eq!(health.requests_in_store, 0);
    assert_eq!(harness.secrets.policy_count().await, 0);
    assert!(harness.notifier.events().await.is_empty());
}

#[tokio::test]
async fn rate_limit_rejects_before_store_mutation() {
    let harness = harness_with(HarnessOptions {
        max_requests: 1,
        ..HarnessOptions::default()
    });
    submit(&harness, input("sonarr", 2)).await;

    let result = harness.service.submit(input("sonarr", 2)).await;
    assert!(matches!(result, Err(AppError::RateLimited { .. })));
    assert_eq!(harness.service.health().await.requests_in_store, 1);

    let other_resource = harness.service.submit(input("radarr", 2)).await;
    assert!(other_resource.is_ok());
}

#[tokio::test]
async fn store_capacity_surfaces_capacity_error() {
    let harness = harness_with(HarnessOptions {
        capacity: 1,
        ..HarnessOptions::default()
    });
    submit(&harness, input("sonarr", 2)).await;

    let result = harness.service.submit(input("radarr", 2)).await;
    assert!(matches!(result, Err(AppError::CapacityExceeded(_))));
}

#[tokio::test]
async fn unknown_status_is_not_found() {
    let harness = harness();
    let unknown = RequestId::new("req-000000000000").unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        harness.service.poll_status(&unknown).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn health_reports_secret_store_and_pending_counts() {
    let harness = harness();
    submit(&harness, input("sonarr", 2)).await;

    let healthy = harness.service.health().await;
    assert!(healthy.is_healthy());
    assert_eq!(healthy.pending_requests, 1);

    harness.secrets.set_healthy(false).await;
    let degraded = harness.service.health().await;
    assert!(!degraded.is_healthy());
    assert_eq!(degraded.requests_in_store, 1);
}

#[tokio::test]
async fn maintenance_keeps_pending_requests() {
    let harness = harness();
    let pending = submit(&harness, input("sonarr", 2)).await;
    let denied = submit(&harness, input("radarr", 2)).await;
    harness
        .service
        .handle_callback(ApprovalDecision::Deny, &denied)
        .await;

    let removed = harness.service.run_maintenance(Duration::ZERO).await;
    assert!(matches!(removed, Ok(1)));
    assert_eq!(
        harness
            .service
            .pending_requests()
            .await
            .iter()
            .map(|request| request.id().clone())
            .collect::<Vec<_>>(),
        vec![pending]
    );
}

#[test]
fn approval_decision_parses_callback_actions() {
    assert_eq!("approve".parse::<ApprovalDecision>().ok(), Some(ApprovalDecision::Approve));
    assert_eq!("deny".parse::<ApprovalDecision>().ok(), Some(ApprovalDecision::Deny));
    assert!("maybe".parse::<ApprovalDecision>().is_err());
}
