//! End-to-end orchestration tests over real HTTP.
//!
//! Each test starts an in-process mock provider and drives it through
//! the reqwest-backed transport.

mod mock_provider;

use std::time::Duration;

use mirror_orchestrator::{
    Channel, Config, EffectRequest, ErrorKind, ImageAsset, MakeupCategory, MirrorError,
    Orchestrator, PollingConfig, ResultEvent,
};
use serde_json::json;

use mock_provider::{jpeg_bytes, Behavior, MockProvider, TEST_KEY};

fn config_for(provider: &MockProvider, max_attempts: u32) -> Config {
    Config {
        api_base_url: provider.base_url.clone(),
        api_key: Some(TEST_KEY.to_string()),
        request_timeout_secs: 5,
        polling: PollingConfig {
            max_attempts,
            interval_ms: 10,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn image(len: usize) -> ImageAsset {
    ImageAsset::from_bytes(jpeg_bytes(len), None).expect("jpeg asset")
}

#[tokio::test]
async fn test_analyze_end_to_end() {
    let provider = MockProvider::start(Behavior {
        running_polls: 2,
        ..Default::default()
    })
    .await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 10)).unwrap();

    let result = orchestrator.analyze(image(256)).await.unwrap();

    assert_eq!(result.texture, 68);
    assert_eq!(result.pore, 74);
    assert_eq!(result.wrinkle, 83);
    assert_eq!(result.blemish, 91);
    assert_eq!(result.skin_age, 29);
    assert_eq!(result.overall, 80);
    assert_eq!(provider.total_polls(), 3);

    let uploads = provider.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads.values().next().unwrap(), &jpeg_bytes(256));

    let creates = provider.creates();
    assert_eq!(creates.len(), 1);
    let (domain, body) = &creates[0];
    assert_eq!(domain, "skin-analysis");
    assert_eq!(body["src_file_id"], "file-1");
    assert_eq!(body["dst_actions"], json!(["wrinkle", "pore", "texture", "acne"]));

    assert!(provider
        .auth_headers()
        .iter()
        .all(|h| h == &format!("Bearer {TEST_KEY}")));

    assert_eq!(
        orchestrator.broadcaster().latest(Channel::Analysis),
        Some(ResultEvent::Analysis(result))
    );
}

#[tokio::test]
async fn test_batch_effects_single_task() {
    let provider = MockProvider::start(Behavior::default()).await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 10)).unwrap();

    let effects = vec![
        EffectRequest::new(MakeupCategory::Foundation, "#e0b899", 0.6),
        EffectRequest::new(MakeupCategory::Lipstick, "#b03a48", 0.9),
        EffectRequest::new(MakeupCategory::parse("glitter"), "#ffffff", 0.2),
    ];
    let result = orchestrator
        .apply_effect_batch(image(128), effects)
        .await
        .unwrap();

    let creates = provider.creates();
    assert_eq!(creates.len(), 1);
    let (domain, body) = &creates[0];
    assert_eq!(domain, "makeup-vto");
    assert_eq!(body["effects"].as_array().unwrap().len(), 3);
    assert_eq!(body["version"], "1.0");

    let categories: Vec<_> = result
        .applied_effects
        .iter()
        .map(|e| e.category.clone())
        .collect();
    assert_eq!(categories, ["foundation", "lipstick", "glitter"]);
    assert!(result.result_asset_url.starts_with(&provider.base_url));
}

#[tokio::test]
async fn test_sequential_effects_chain_without_reupload() {
    let provider = MockProvider::start(Behavior {
        running_polls: 0,
        ..Default::default()
    })
    .await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 10)).unwrap();
    let mut updates = orchestrator.broadcaster().subscribe(Channel::EffectApplied);

    let effects = vec![
        EffectRequest::new(MakeupCategory::Eyeshadow, "#6c5ce7", 0.5),
        EffectRequest::new(MakeupCategory::Eyeliner, "#111111", 0.8),
    ];
    let result = orchestrator
        .apply_effects_sequential(image(64), effects)
        .await
        .unwrap();

    assert_eq!(provider.uploads().len(), 1);
    let creates = provider.creates();
    assert_eq!(creates.len(), 2);
    assert!(creates[0].1.get("src_file_id").is_some());
    assert!(creates[1].1["src_file_url"]
        .as_str()
        .unwrap()
        .ends_with(".jpg"));
    assert_eq!(result.applied_effects.len(), 2);

    let latest = tokio::time::timeout(Duration::from_secs(1), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest, ResultEvent::EffectApplied(result));
}

#[tokio::test]
async fn test_terminal_error_stops_after_one_poll() {
    let provider = MockProvider::start(Behavior {
        running_polls: 0,
        fail_message: Some("error_face_not_detected".to_string()),
        ..Default::default()
    })
    .await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 10)).unwrap();

    let err = orchestrator.analyze(image(64)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TerminalServer);
    assert_eq!(provider.total_polls(), 1);
    assert!(orchestrator.broadcaster().latest(Channel::Analysis).is_none());
}

#[tokio::test]
async fn test_effect_terminal_error_stops_after_one_poll() {
    let provider = MockProvider::start(Behavior {
        running_polls: 0,
        fail_message: Some("error_src_face_out_of_bound".to_string()),
        ..Default::default()
    })
    .await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 10)).unwrap();

    let effects = vec![
        EffectRequest::new(MakeupCategory::Lipstick, "#b03a48", 0.9),
        EffectRequest::new(MakeupCategory::Blush, "#f5a3a3", 0.4),
    ];
    let err = orchestrator
        .apply_effect_batch(image(64), effects)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TerminalServer);
    assert_eq!(provider.creates().len(), 1);
    assert_eq!(provider.total_polls(), 1);
    assert!(orchestrator
        .broadcaster()
        .latest(Channel::EffectApplied)
        .is_none());
}

#[tokio::test]
async fn test_poll_budget_exhausted() {
    let provider = MockProvider::start(Behavior {
        never_finish: true,
        ..Default::default()
    })
    .await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 4)).unwrap();

    let err = orchestrator.analyze(image(64)).await.unwrap_err();
    match err {
        MirrorError::PollTimeout { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected poll timeout, got {other}"),
    }
    assert_eq!(provider.total_polls(), 4);
}

#[tokio::test]
async fn test_rejected_credential_is_terminal() {
    let provider = MockProvider::start(Behavior::default()).await;
    let config = Config {
        api_key: Some("wrong-key".to_string()),
        ..config_for(&provider, 10)
    };
    let orchestrator = Orchestrator::from_config(config).unwrap();

    let err = orchestrator.analyze(image(64)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TerminalServer);
    assert_eq!(provider.auth_headers().len(), 1);
}

#[tokio::test]
async fn test_unreachable_provider_is_upload_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config {
        api_base_url: format!("http://127.0.0.1:{port}"),
        api_key: Some(TEST_KEY.to_string()),
        request_timeout_secs: 2,
        polling: PollingConfig {
            interval_ms: 10,
            request_retries: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = Orchestrator::from_config(config).unwrap();

    let err = orchestrator.analyze(image(64)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upload);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_concurrent_analyses_are_independent() {
    let provider = MockProvider::start(Behavior {
        running_polls: 3,
        ..Default::default()
    })
    .await;
    let orchestrator = Orchestrator::from_config(config_for(&provider, 10)).unwrap();

    let a = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.analyze(image(100)).await }
    });
    let b = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.analyze(image(200)).await }
    });

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.overall, 80);
    assert_eq!(b.overall, 80);

    let creates = provider.creates();
    assert_eq!(creates.len(), 2);
    assert_ne!(creates[0].1["src_file_id"], creates[1].1["src_file_id"]);
    assert_eq!(provider.total_polls(), 8);

    let uploads = provider.uploads();
    let mut sizes: Vec<_> = uploads.values().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, [100, 200]);
}
