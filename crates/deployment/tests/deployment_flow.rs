//! End-to-end tests driving job documents through the pipeline and into a
//! live kernel.

use std::sync::Arc;
use std::time::Duration;

use conifer_bootable::BootableRegistry;
use conifer_bootable_mock::{CallLog, MockBootable};
use conifer_deployment::{DeploymentPipeline, PassthroughResolver, PipelineState};
use conifer_kernel::{Kernel, KernelOptions, ServiceState};
use serde_json::{Value, json};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn kernel_with(names: &[&str], log: &CallLog) -> Kernel {
    let mut registry = BootableRegistry::new();
    for name in names {
        registry.register(Arc::new(MockBootable::new(*name, log)));
    }
    Kernel::new(registry, KernelOptions::default())
}

fn pipeline(kernel: &Kernel) -> DeploymentPipeline {
    DeploymentPipeline::new(kernel.clone(), Arc::new(PassthroughResolver))
}

fn chain_document() -> Value {
    json!({
        "deploymentId": "deploy-1",
        "timestamp": 1_756_000_000_000_u64,
        "packages": [
            {
                "packageName": "x",
                "versionConstraint": "1.0",
                "dependentPackages": [{ "packageName": "y" }]
            },
            {
                "packageName": "y",
                "versionConstraint": "1.0",
                "dependentPackages": [{ "packageName": "z" }]
            },
            { "packageName": "z", "versionConstraint": "1.0" }
        ],
        "targetPackages": ["x"]
    })
}

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|entry| entry == name)
        .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
}

#[tokio::test]
async fn chain_document_merges_and_starts_in_dependency_order() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&["x", "y", "z"], &log);

    let packet = pipeline(&kernel).submit_deployment(Some(chain_document())).await;

    assert_eq!(*packet.state(), PipelineState::Complete);
    assert_eq!(packet.deployment_id(), Some("deploy-1"));
    assert!(!packet.has_job_document());
    assert_eq!(packet.proposed_packages(), ["x".to_string()]);
    assert_eq!(packet.packages().len(), 3);
    assert_eq!(
        packet.packages()["y"].resolved_version.as_deref(),
        Some("1.0")
    );

    let order = kernel.ordered_dependencies().await.unwrap();
    assert_eq!(order.len(), 3);
    assert!(position(&order, "z") < position(&order, "y"));
    assert!(position(&order, "y") < position(&order, "x"));

    kernel.startup_all().await.unwrap();
    for name in ["x", "y", "z"] {
        wait_for_state(&kernel, name, ServiceState::Running).await;
    }
    assert_eq!(log.calls_of("start"), ["z", "y", "x"]);
}

#[tokio::test]
async fn absent_job_document_is_rejected() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&[], &log);

    let packet = pipeline(&kernel).submit_deployment(None).await;

    assert_eq!(
        packet.failure(),
        Some("job document cannot be empty"),
        "unexpected state {:?}",
        packet.state()
    );
}

#[tokio::test]
async fn malformed_job_document_is_rejected_and_retained() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&[], &log);

    let packet = pipeline(&kernel)
        .submit_deployment(Some(json!({ "timestamp": "not-a-number" })))
        .await;

    assert!(matches!(packet.state(), PipelineState::Failed(_)));
    assert!(packet.failure().unwrap().contains("unable to parse"));
    // The raw document stays on the rejected packet for inspection.
    assert!(packet.has_job_document());
    assert!(packet.packages().is_empty());
}

#[tokio::test]
async fn cyclic_document_is_rejected_without_touching_the_graph() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&["x", "y"], &log);

    let document = json!({
        "deploymentId": "deploy-cycle",
        "timestamp": 1_756_000_000_000_u64,
        "packages": [
            {
                "packageName": "x",
                "dependentPackages": [{ "packageName": "y" }]
            },
            {
                "packageName": "y",
                "dependentPackages": [{ "packageName": "x" }]
            }
        ],
        "targetPackages": ["x"]
    });
    let packet = pipeline(&kernel).submit_deployment(Some(document)).await;

    assert!(matches!(packet.state(), PipelineState::Failed(_)));
    assert!(packet.failure().unwrap().contains("cycle"));
    // Atomic merge: the rejected batch leaves nothing behind.
    assert!(kernel.ordered_dependencies().await.unwrap().is_empty());
    assert!(kernel.current_state("x").await.is_err());
}

#[tokio::test]
async fn package_without_implementation_fails_the_merge() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&["x"], &log);

    let document = json!({
        "deploymentId": "deploy-2",
        "timestamp": 1_756_000_000_000_u64,
        "packages": [
            {
                "packageName": "x",
                "dependentPackages": [{ "packageName": "y" }]
            },
            { "packageName": "y" }
        ],
        "targetPackages": ["x"]
    });
    let packet = pipeline(&kernel).submit_deployment(Some(document)).await;

    assert!(matches!(packet.state(), PipelineState::Failed(_)));
    assert!(packet.failure().unwrap().contains("y"));
    assert!(kernel.ordered_dependencies().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_target_merges_nothing() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&["x"], &log);

    let document = json!({
        "deploymentId": "deploy-3",
        "timestamp": 1_756_000_000_000_u64,
        "packages": [{ "packageName": "x" }],
        "targetPackages": ["ghost"]
    });
    let packet = pipeline(&kernel).submit_deployment(Some(document)).await;

    // The document itself is valid; the target filter leaves the proposed
    // set empty and the merge has nothing to register.
    assert_eq!(*packet.state(), PipelineState::Complete);
    assert!(packet.proposed_packages().is_empty());
    assert!(kernel.ordered_dependencies().await.unwrap().is_empty());
}

#[tokio::test]
async fn resubmitting_a_deployment_keeps_running_services_running() {
    init_tracing();
    let log = CallLog::new();
    let kernel = kernel_with(&["x", "y", "z"], &log);
    let pipeline = pipeline(&kernel);

    let first = pipeline.submit_deployment(Some(chain_document())).await;
    assert_eq!(*first.state(), PipelineState::Complete);
    kernel.startup_all().await.unwrap();
    for name in ["x", "y", "z"] {
        wait_for_state(&kernel, name, ServiceState::Running).await;
    }

    let second = pipeline.submit_deployment(Some(chain_document())).await;
    assert_eq!(*second.state(), PipelineState::Complete);
    // Re-registration updates edges without restarting anything.
    for name in ["x", "y", "z"] {
        assert_eq!(
            kernel.current_state(name).await.unwrap(),
            ServiceState::Running
        );
        assert_eq!(log.count(name, "start"), 1);
    }
}

async fn wait_for_state(kernel: &Kernel, name: &str, state: ServiceState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if kernel.current_state(name).await.unwrap() == state {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{name} never reached {state}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
