//! Tests for the lifecycle controller against the in-memory runtime.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tidepool_utils::SANDBOX_LABEL_KEY;

use crate::{
    clock::ManualClock,
    identity::SandboxRecord,
    management::{AddressingMode, Lifecycle, LifecycleSettings},
    models::SandboxRequest,
    ports::PortPool,
    runtime::{memory::MemoryRuntime, RuntimeError},
    CompensationStep, TidepoolError,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const T0: i64 = 1_700_000_000;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_create_publishes_allocated_port() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);

    let info = lifecycle.create(&request(1, "web")).await?;
    assert_eq!(info.name, "tidepool_1_web_1");
    assert_eq!(info.port, 10000);
    assert_eq!(info.hostname, None);
    assert_eq!(info.deadline, at(T0 + 60));
    assert_eq!(lifecycle.used_ports().await, vec![10000]);

    let spec = runtime.spec_of("tidepool_1_web_1").unwrap();
    assert_eq!(spec.hostname, "tidepool_1_web_1");
    assert_eq!(spec.image, "nginx:alpine");
    assert_eq!(spec.container_port, Some(80));
    assert_eq!(spec.host_port, Some(10000));
    assert_eq!(spec.network_mode, "bridge");
    assert!(spec.auto_remove);

    let record = SandboxRecord::decode(&spec.labels[SANDBOX_LABEL_KEY])?;
    assert_eq!(record, SandboxRecord::new(1, "web", Duration::from_secs(60)));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_deadline_uses_truncated_creation_time() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.set_created(DateTime::from_timestamp(T0, 750_000_000).unwrap());

    let info = lifecycle
        .create(&SandboxRequest {
            lifetime: Some(Duration::from_secs(90)),
            ..request(1, "web")
        })
        .await?;
    assert_eq!(info.deadline, at(T0 + 90));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_accepts_token_owner() -> anyhow::Result<()> {
    let (_, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);

    let info = lifecycle
        .create(&SandboxRequest {
            token: "42:hunter2".into(),
            ..request(0, "web")
        })
        .await?;
    assert_eq!(info.name, "tidepool_42_web_1");

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_duplicate_releases_port() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    lifecycle.create(&request(1, "web")).await?;

    let err = lifecycle.create(&request(1, "web")).await.unwrap_err();
    assert!(matches!(
        err,
        TidepoolError::Runtime(RuntimeError::Conflict(_))
    ));
    assert_eq!(lifecycle.used_ports().await, vec![10000]);
    assert_eq!(runtime.names(), vec!["tidepool_1_web_1"]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_rolls_back_when_start_fails() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.fail_start("tidepool_1_web_1");

    let err = lifecycle.create(&request(1, "web")).await.unwrap_err();
    let failure = match err {
        TidepoolError::CreateFailed(failure) => failure,
        other => panic!("expected a create failure, got {}", other),
    };

    assert_eq!(failure.sandbox, "tidepool_1_web_1");
    assert!(matches!(failure.cause, RuntimeError::Other(_)));
    assert!(matches!(failure.compensation.removal, CompensationStep::Succeeded));
    assert_eq!(failure.compensation.released_port, Some(10000));

    assert!(!runtime.contains("tidepool_1_web_1"));
    assert!(lifecycle.used_ports().await.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_keeps_root_cause_when_rollback_fails() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.fail_start("tidepool_1_web_1");
    runtime.fail_remove("tidepool_1_web_1");

    let err = lifecycle.create(&request(1, "web")).await.unwrap_err();
    let failure = match err {
        TidepoolError::CreateFailed(failure) => failure,
        other => panic!("expected a create failure, got {}", other),
    };

    assert!(failure.cause.to_string().contains("cannot start"));
    assert!(matches!(
        failure.compensation.removal,
        CompensationStep::Failed(RuntimeError::Other(_))
    ));

    // The container leaked, but its port is no longer accounted as used.
    assert!(runtime.contains("tidepool_1_web_1"));
    assert!(lifecycle.used_ports().await.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_failure_releases_port() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.fail_create("tidepool_1_web_1");

    let err = lifecycle.create(&request(1, "web")).await.unwrap_err();
    assert!(matches!(err, TidepoolError::Runtime(RuntimeError::Other(_))));
    assert!(lifecycle.used_ports().await.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_fails_when_ports_are_exhausted() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10001);
    lifecycle.create(&request(1, "a")).await?;
    lifecycle.create(&request(1, "b")).await?;

    let err = lifecycle.create(&request(1, "c")).await.unwrap_err();
    assert!(matches!(err, TidepoolError::PortsExhausted { .. }));
    assert_eq!(runtime.names().len(), 2);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_rejects_invalid_requests() {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);

    let invalid = [
        SandboxRequest {
            image: String::new(),
            ..request(1, "web")
        },
        SandboxRequest {
            port: 0,
            ..request(1, "web")
        },
        request(1, "../web"),
        request(0, "web"),
        SandboxRequest {
            token: "2:secret".into(),
            ..request(1, "web")
        },
    ];

    for request in invalid {
        assert!(
            lifecycle.create(&request).await.is_err(),
            "{:?} should be rejected",
            request
        );
    }

    assert!(runtime.names().is_empty());
    assert!(lifecycle.used_ports().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_remove_releases_port() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    lifecycle.create(&request(1, "web")).await?;
    lifecycle.create(&request(1, "api")).await?;

    lifecycle.remove(&SandboxRequest::new(1, "web")).await?;
    assert!(!runtime.contains("tidepool_1_web_1"));
    assert_eq!(lifecycle.used_ports().await, vec![10001]);

    let err = lifecycle
        .remove(&SandboxRequest::new(1, "web"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_list_filters_and_skips_undecodable_labels() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    lifecycle.create(&request(1, "a")).await?;
    lifecycle.create(&request(1, "b")).await?;
    lifecycle.create(&request(2, "a")).await?;
    runtime.insert("tidepool_9_junk_1", garbage_label(), None, at(T0));

    assert_eq!(lifecycle.list(&SandboxRequest::default()).await?.len(), 3);

    let by_owner = lifecycle.list(&SandboxRequest::new(1, "")).await?;
    assert_eq!(
        names(&by_owner),
        vec!["tidepool_1_a_1", "tidepool_1_b_1"]
    );

    let by_app = lifecycle.list(&SandboxRequest::new(0, "a")).await?;
    assert_eq!(names(&by_app), vec!["tidepool_1_a_1", "tidepool_2_a_1"]);

    let by_port = lifecycle
        .list(&SandboxRequest {
            port: 10001,
            ..Default::default()
        })
        .await?;
    assert_eq!(names(&by_port), vec!["tidepool_1_b_1"]);

    let by_token = lifecycle
        .list(&SandboxRequest {
            token: "2:secret".into(),
            ..Default::default()
        })
        .await?;
    assert_eq!(names(&by_token), vec!["tidepool_2_a_1"]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_purge_aggregates_partial_failures() -> anyhow::Result<()> {
    let (runtime, clock, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    for app in ["a", "b", "c"] {
        lifecycle.create(&short_lived(1, app, 10)).await?;
    }
    lifecycle.create(&short_lived(1, "d", 3600)).await?;
    runtime.fail_remove("tidepool_1_b_1");

    clock.set(at(T0 + 30));
    let report = lifecycle.purge().await?;

    assert_eq!(
        names(&report.selected),
        vec!["tidepool_1_a_1", "tidepool_1_b_1", "tidepool_1_c_1"]
    );

    let errors = report.errors.expect("one removal should have failed");
    assert_eq!(errors.len(), 1);
    assert!(!errors.is_empty());
    let failure = errors.iter().next().unwrap();
    assert_eq!(failure.sandbox.name, "tidepool_1_b_1");
    assert!(errors.to_string().starts_with("remove tidepool_1_b_1: "));

    assert_eq!(runtime.names(), vec!["tidepool_1_b_1", "tidepool_1_d_1"]);
    assert_eq!(lifecycle.used_ports().await, vec![10001, 10003]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_purge_treats_undecodable_labels_as_expired() -> anyhow::Result<()> {
    let (runtime, clock, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.insert("tidepool_9_junk_1", garbage_label(), Some(10007), at(T0));
    lifecycle.resync().await?;
    assert_eq!(lifecycle.used_ports().await, vec![10007]);

    // Selected within the very second the container was created
    clock.set(at(T0));
    let report = lifecycle.purge().await?;

    assert_eq!(names(&report.selected), vec!["tidepool_9_junk_1"]);
    assert!(report.errors.is_none());
    assert!(runtime.names().is_empty());
    assert!(lifecycle.used_ports().await.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_purge_keeps_sandboxes_until_deadline_passes() -> anyhow::Result<()> {
    let (runtime, clock, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    lifecycle.create(&short_lived(1, "web", 10)).await?;

    clock.set(at(T0 + 10));
    let report = lifecycle.purge().await?;
    assert!(report.selected.is_empty());
    assert!(report.errors.is_none());

    clock.advance(Duration::from_secs(1));
    let report = lifecycle.purge().await?;
    assert_eq!(report.selected.len(), 1);
    assert!(runtime.names().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scans_fail_when_runtime_is_unreachable() {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.fail_list(true);

    assert!(lifecycle.list(&SandboxRequest::default()).await.is_err());
    assert!(lifecycle.purge().await.is_err());
    assert!(lifecycle.resync().await.is_err());
}

#[test_log::test(tokio::test)]
async fn test_resync_rebuilds_used_ports() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    let label = HashMap::from([(
        SANDBOX_LABEL_KEY.to_string(),
        SandboxRecord::new(1, "a", Duration::from_secs(60)).encode()?,
    )]);
    runtime.insert("tidepool_1_a_1", label.clone(), Some(10003), at(T0));
    runtime.insert("tidepool_1_b_1", label.clone(), Some(10005), at(T0));
    runtime.insert("tidepool_1_c_1", label, Some(20000), at(T0));

    assert_eq!(lifecycle.resync().await?, 3);
    assert_eq!(lifecycle.used_ports().await, vec![10003, 10005]);

    let info = lifecycle.create(&request(2, "web")).await?;
    assert_eq!(info.port, 10000);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_hostname_mode_routes_sandboxes() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Hostname, 10000, 10009);
    let routes = lifecycle.routes();

    let info = lifecycle
        .create(&SandboxRequest {
            hostname: Some(" Demo ".into()),
            port: 0,
            ..request(1, "web")
        })
        .await?;
    assert_eq!(info.port, 0);
    assert_eq!(info.hostname.as_deref(), Some("demo"));
    assert_eq!(
        routes.resolve("demo").await,
        Some(SocketAddr::from(([172, 17, 0, 2], 80)))
    );

    let spec = runtime.spec_of("tidepool_1_web_1").unwrap();
    assert_eq!(spec.host_port, None);
    assert_eq!(spec.container_port, Some(80));
    assert!(lifecycle.used_ports().await.is_empty());

    let err = lifecycle
        .create(&SandboxRequest {
            hostname: Some("demo".into()),
            ..request(2, "web")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TidepoolError::HostnameTaken { .. }));

    let default = lifecycle.create(&request(2, "web")).await?;
    assert_eq!(default.hostname.as_deref(), Some("tidepool-2-web"));
    assert_eq!(
        routes.resolve("tidepool-2-web").await,
        Some(SocketAddr::from(([172, 17, 0, 3], 80)))
    );

    lifecycle.remove(&SandboxRequest::new(1, "web")).await?;
    assert!(routes.resolve("demo").await.is_none());
    assert_eq!(routes.len().await, 1);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_hostname_mode_resync_restores_routes() -> anyhow::Result<()> {
    let (runtime, clock, lifecycle) = setup(AddressingMode::Hostname, 10000, 10009);
    lifecycle
        .create(&SandboxRequest {
            hostname: Some("demo".into()),
            port: 8080,
            ..request(1, "web")
        })
        .await?;

    let restarted = Lifecycle::new(
        runtime.clone(),
        PortPool::new(10000, 10009)?,
        LifecycleSettings::new("tidepool", AddressingMode::Hostname),
    )
    .with_clock(clock);
    assert!(restarted.routes().is_empty().await);

    restarted.resync().await?;
    assert_eq!(
        restarted.routes().resolve("demo").await,
        Some(SocketAddr::from(([172, 17, 0, 2], 8080)))
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_hostname_claim_is_released_when_start_fails() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Hostname, 10000, 10009);
    runtime.fail_start("tidepool_1_web_1");

    let demo = |user| SandboxRequest {
        hostname: Some("demo".into()),
        ..request(user, "web")
    };

    let err = lifecycle.create(&demo(1)).await.unwrap_err();
    assert!(matches!(err, TidepoolError::CreateFailed(_)));

    let info = lifecycle.create(&demo(2)).await?;
    assert_eq!(info.hostname.as_deref(), Some("demo"));
    assert_eq!(
        lifecycle.routes().get("demo").await.map(|route| route.sandbox),
        Some("tidepool_2_web_1".to_string())
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_concurrent_creates_cannot_share_hostname() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Hostname, 10000, 10009);
    runtime.delay_start(Duration::from_millis(100));

    let demo = |user| SandboxRequest {
        hostname: Some("demo".into()),
        ..request(user, "web")
    };
    let (one, two) = (demo(1), demo(2));
    let (first, second) = tokio::join!(lifecycle.create(&one), lifecycle.create(&two));

    let (winner, loser) = match (first, second) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        (first, second) => panic!("expected exactly one create to win: {first:?} {second:?}"),
    };
    assert!(matches!(
        loser,
        TidepoolError::HostnameTaken { ref sandbox, .. } if *sandbox == winner.name
    ));
    assert_eq!(
        lifecycle.routes().get("demo").await.map(|route| route.sandbox),
        Some(winner.name.clone())
    );
    assert_eq!(runtime.names(), vec![winner.name]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_remove_unroutes_vanished_sandbox() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Hostname, 10000, 10009);
    let demo = |user| SandboxRequest {
        hostname: Some("demo".into()),
        ..request(user, "web")
    };
    lifecycle.create(&demo(1)).await?;

    // The container exited and the daemon removed it
    assert!(runtime.vanish("tidepool_1_web_1"));

    let err = lifecycle
        .remove(&SandboxRequest::new(1, "web"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(lifecycle.routes().resolve("demo").await.is_none());

    let info = lifecycle.create(&demo(2)).await?;
    assert_eq!(info.hostname.as_deref(), Some("demo"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_abandoned_create_still_rolls_back() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10000);
    runtime.delay_start(Duration::from_millis(100));
    runtime.fail_start("tidepool_1_web_1");

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), lifecycle.create(&request(1, "web"))).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(runtime.names().is_empty());
    assert!(lifecycle.used_ports().await.is_empty());

    let info = lifecycle.create(&request(1, "api")).await?;
    assert_eq!(info.port, 10000);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_abandoned_create_still_completes() -> anyhow::Result<()> {
    let (runtime, _, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    runtime.delay_start(Duration::from_millis(100));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), lifecycle.create(&request(1, "web"))).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let listed = lifecycle.list(&SandboxRequest::new(1, "")).await?;
    assert_eq!(names(&listed), vec!["tidepool_1_web_1"]);
    assert_eq!(listed[0].port, 10000);
    assert_eq!(lifecycle.used_ports().await, vec![10000]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_abandoned_purge_still_reclaims_ports() -> anyhow::Result<()> {
    let (runtime, clock, lifecycle) = setup(AddressingMode::Port, 10000, 10009);
    lifecycle.create(&short_lived(1, "a", 10)).await?;
    lifecycle.create(&short_lived(1, "b", 10)).await?;
    runtime.delay_remove(Duration::from_millis(100));

    clock.set(at(T0 + 30));
    let abandoned = tokio::time::timeout(Duration::from_millis(10), lifecycle.purge()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(runtime.names().is_empty());
    assert!(lifecycle.used_ports().await.is_empty());

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn setup(
    addressing: AddressingMode,
    lower: u16,
    upper: u16,
) -> (Arc<MemoryRuntime>, Arc<ManualClock>, Lifecycle) {
    let runtime = Arc::new(MemoryRuntime::new(at(T0)));
    let clock = Arc::new(ManualClock::new(at(T0)));
    let lifecycle = Lifecycle::new(
        runtime.clone(),
        PortPool::new(lower, upper).unwrap(),
        LifecycleSettings::new("tidepool", addressing),
    )
    .with_clock(clock.clone());

    (runtime, clock, lifecycle)
}

fn request(user: u64, app: &str) -> SandboxRequest {
    SandboxRequest {
        image: "nginx:alpine".into(),
        port: 80,
        ..SandboxRequest::new(user, app)
    }
}

fn short_lived(user: u64, app: &str, secs: u64) -> SandboxRequest {
    SandboxRequest {
        lifetime: Some(Duration::from_secs(secs)),
        ..request(user, app)
    }
}

fn garbage_label() -> HashMap<String, String> {
    HashMap::from([(SANDBOX_LABEL_KEY.to_string(), "{not json".to_string())])
}

fn names(sandboxes: &[crate::models::SandboxInfo]) -> Vec<&str> {
    sandboxes.iter().map(|info| info.name.as_str()).collect()
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}
