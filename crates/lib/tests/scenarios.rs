//! End-to-end scenarios against the fake engine.

use std::sync::Arc;

use myco_lib::builders::{BuildContext, BuildError, backend};
use myco_lib::cache::VolumeRegistry;
use myco_lib::ci::{CiConfig, CiError, CiTask, run_ci};
use myco_lib::config::MycoConfig;
use myco_lib::engine::FakeEngine;
use myco_lib::matrix::{PublishOptions, publish_backend};
use myco_lib::ops::{Operation, OperationOutput, Orchestrator, OpsError};
use myco_lib::pipeline::SecretRef;
use myco_lib::platform::Platform;
use myco_lib::source::{ProjectionError, SourceTree};
use myco_lib::util::testutil::{monorepo, monorepo_without, write_file};
use tokio_util::sync::CancellationToken;

fn credential() -> SecretRef {
  SecretRef::Env("DOCKERHUB_TOKEN".to_string())
}

mod cache_keys {
  use super::*;

  #[test]
  fn app_only_change_keeps_backend_key() {
    let temp = monorepo();
    let volumes = VolumeRegistry::new();

    let tree = SourceTree::new(temp.path()).unwrap();
    let before = backend::build(&BuildContext::new(&tree, &volumes)).unwrap();

    write_file(temp.path(), "app/src/main.tsx", "export const theme = 'dark'\n");
    write_file(temp.path(), "app/src/settings.tsx", "export {}\n");

    let tree = SourceTree::new(temp.path()).unwrap();
    let after = backend::build(&BuildContext::new(&tree, &volumes)).unwrap();

    assert_eq!(before, after);
    assert_eq!(before.cache_key().unwrap(), after.cache_key().unwrap());
  }

  #[tokio::test]
  async fn engine_sees_the_same_key_across_runs() {
    let temp = monorepo();
    let engine = Arc::new(FakeEngine::new());

    let first = Orchestrator::new(
      engine.clone(),
      SourceTree::new(temp.path()).unwrap(),
      MycoConfig::default(),
    );
    first.run(Operation::BuildBackend).await.unwrap();

    write_file(temp.path(), "app/package.json", "{\"name\":\"app\",\"version\":\"2\"}\n");

    let second = Orchestrator::new(
      engine.clone(),
      SourceTree::new(temp.path()).unwrap(),
      MycoConfig::default(),
    );
    second.run(Operation::BuildBackend).await.unwrap();

    let keys: Vec<_> = engine.evaluations().into_iter().map(|e| e.cache_key).collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
  }
}

mod peripheral {
  use super::*;

  #[tokio::test]
  async fn missing_protocol_crate_fails_before_execution() {
    let temp = monorepo_without("edge-protocol");
    let engine = Arc::new(FakeEngine::new());
    let orchestrator = Orchestrator::new(
      engine.clone(),
      SourceTree::new(temp.path()).unwrap(),
      MycoConfig::default(),
    );

    let err = orchestrator
      .run(Operation::BuildPeripheral {
        platform: Platform::LinuxArm64,
      })
      .await
      .unwrap_err();

    assert!(matches!(
      err,
      OpsError::Build(BuildError::Projection(ProjectionError::MissingPath { .. }))
    ));
    assert_eq!(engine.total_calls(), 0);
  }
}

mod publish {
  use super::*;

  #[tokio::test]
  async fn assembly_runs_once_for_any_platform_count() {
    let matrices: [&[Platform]; 3] = [
      &[Platform::LinuxAmd64],
      &[Platform::LinuxArm64],
      &[Platform::LinuxAmd64, Platform::LinuxArm64],
    ];

    for platforms in matrices {
      let temp = monorepo();
      let tree = SourceTree::new(temp.path()).unwrap();
      let volumes = VolumeRegistry::new();
      let engine = Arc::new(FakeEngine::new());
      let options = PublishOptions::new(credential()).with_platforms(platforms.to_vec());

      publish_backend(engine.clone(), &BuildContext::new(&tree, &volumes), &options)
        .await
        .unwrap();

      assert_eq!(engine.calls("backend-assembly"), 1, "platforms: {platforms:?}");
      assert_eq!(engine.calls_with_prefix("native-image-"), platforms.len());
      assert_eq!(engine.publishes()[0].images.len(), platforms.len());
    }
  }

  #[tokio::test]
  async fn duplicate_platforms_are_rejected_before_assembly() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new());
    let options = PublishOptions::new(credential()).with_platforms(vec![
      Platform::LinuxArm64,
      Platform::LinuxAmd64,
      Platform::LinuxArm64,
    ]);

    let result = publish_backend(engine.clone(), &BuildContext::new(&tree, &volumes), &options).await;

    assert!(result.is_err());
    assert_eq!(engine.total_calls(), 0);
  }

  #[tokio::test]
  async fn every_publish_call_assembles_exactly_once() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let ctx = BuildContext::new(&tree, &volumes);
    let engine = Arc::new(FakeEngine::new());

    for n in 1..=3 {
      publish_backend(engine.clone(), &ctx, &PublishOptions::new(credential()))
        .await
        .unwrap();
      assert_eq!(engine.calls("backend-assembly"), n);
      assert_eq!(engine.calls_with_prefix("native-image-"), 2 * n);
    }
  }

  #[tokio::test]
  async fn tag_v2_with_two_platforms() {
    let temp = monorepo();
    let engine = Arc::new(FakeEngine::new());
    let orchestrator = Orchestrator::new(
      engine.clone(),
      SourceTree::new(temp.path()).unwrap(),
      MycoConfig::default(),
    );

    let output = orchestrator
      .run(Operation::PublishBackend {
        credential: credential(),
        tag: Some("v2".to_string()),
        platforms: Some(vec![Platform::LinuxAmd64, Platform::LinuxArm64]),
      })
      .await
      .unwrap();

    assert_eq!(engine.calls("backend-assembly"), 1);
    assert_eq!(engine.calls("native-image-amd64"), 1);
    assert_eq!(engine.calls("native-image-arm64"), 1);

    let publishes = engine.publishes();
    assert_eq!(publishes.len(), 1);
    assert_eq!(publishes[0].address, "mycelium/mycelium-backend:v2");
    assert_eq!(publishes[0].images.len(), 2);

    let OperationOutput::Published(receipt) = output else {
      panic!("expected a publish receipt");
    };
    assert_eq!(receipt.address, "mycelium/mycelium-backend:v2");
    assert_eq!(
      receipt.images.iter().map(|i| i.platform).collect::<Vec<_>>(),
      vec![Platform::LinuxAmd64, Platform::LinuxArm64]
    );
  }

  #[tokio::test]
  async fn tag_defaults_to_latest() {
    let temp = monorepo();
    let engine = Arc::new(FakeEngine::new());
    let orchestrator = Orchestrator::new(
      engine.clone(),
      SourceTree::new(temp.path()).unwrap(),
      MycoConfig::default(),
    );

    orchestrator
      .run(Operation::PublishBackend {
        credential: credential(),
        tag: None,
        platforms: None,
      })
      .await
      .unwrap();

    assert_eq!(engine.publishes()[0].address, "mycelium/mycelium-backend:latest");
  }
}

mod ci {
  use super::*;

  #[tokio::test]
  async fn failing_test_central_still_runs_everything_else() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().failing("test-central"));

    let err = run_ci(
      engine.clone(),
      &BuildContext::new(&tree, &volumes),
      &CiConfig::default(),
      CancellationToken::new(),
    )
    .await
    .unwrap_err();

    let CiError::AggregateFailure { failures, succeeded, .. } = err else {
      panic!("expected an aggregate failure");
    };
    assert_eq!(
      failures.iter().map(|f| f.task).collect::<Vec<_>>(),
      vec![CiTask::TestCentral]
    );
    assert_eq!(
      succeeded,
      vec![
        CiTask::BuildPeripheral,
        CiTask::BuildBackend,
        CiTask::TestBackend,
        CiTask::BuildApp
      ]
    );
    assert_eq!(engine.total_calls(), 5);
  }

  #[tokio::test]
  async fn several_failures_are_all_named() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().failing("test-central").failing("build-app"));

    let err = run_ci(
      engine.clone(),
      &BuildContext::new(&tree, &volumes),
      &CiConfig::default(),
      CancellationToken::new(),
    )
    .await
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("test-central"), "{message}");
    assert!(message.contains("build-app"), "{message}");
  }

  #[tokio::test]
  async fn ci_arch_selects_firmware_platform() {
    let temp = monorepo();
    let engine = Arc::new(FakeEngine::new());
    let orchestrator = Orchestrator::new(
      engine.clone(),
      SourceTree::new(temp.path()).unwrap(),
      MycoConfig::default(),
    );

    orchestrator
      .run(Operation::Ci {
        platform: Some(Platform::LinuxArm64),
        timeout: None,
      })
      .await
      .unwrap();

    let firmware = engine
      .evaluations()
      .into_iter()
      .find(|e| e.pipeline == "build-peripheral")
      .unwrap();
    assert_eq!(firmware.description.platform(), Some(Platform::LinuxArm64));
  }
}
