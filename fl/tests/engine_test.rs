//! End-to-end tests for the feature loop
//!
//! These drive the public engine API with a scripted agent against a
//! temporary working tree.

use std::fs;
use std::sync::Arc;

use featureloop::agent::mock::{ScriptedAgent, ScriptedUser};
use featureloop::config::Config;
use featureloop::domain::{FeatureList, Phase};
use featureloop::r#loop::{LoopEngine, LoopOutcome};
use featureloop::state::ResumeStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FEATURES: &str = r#"{
  "features": [
    {"id": "storage", "description": "Persist items", "priority": "high"},
    {"id": "api", "description": "Expose items", "priority": "high", "depends_on": ["storage"]},
    {"id": "docs", "description": "Document the api", "priority": "low"}
  ]
}"#;

fn setup() -> (TempDir, Config) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("features.json"), FEATURES).unwrap();
    let mut config = Config::default();
    config.paths.work_dir = temp.path().to_path_buf();
    (temp, config)
}

fn plan(text: &str) -> String {
    format!(r#"{{"action": "done", "message": "{}"}}"#, text)
}

const APPROVE: &str = r#"{"action": "done", "state": {"valid": true, "feedback": "looks good"}}"#;

// =============================================================================
// Full runs
// =============================================================================

#[tokio::test]
async fn test_features_complete_in_dependency_and_priority_order() {
    let (temp, config) = setup();

    let write = r#"Writing the module now.

```json
{"action": "parallel", "action_params": {"actions": [
  {"type": "write_file", "params": {"path": "src/storage.rs", "content": "pub struct Store;"}},
  {"type": "run_command", "params": {"command": "echo built"}}
]}}
```"#;
    let done = r#"{"action": "done", "message": "committed"}"#;

    let mut script: Vec<String> = vec![
        plan("store items in a map"),
        APPROVE.to_string(),
        write.to_string(),
        done.to_string(),
    ];
    for name in ["api", "docs"] {
        script.push(plan(&format!("build {}", name)));
        script.push(APPROVE.to_string());
        script.push(done.to_string());
    }

    let agent = Arc::new(ScriptedAgent::new(script));
    let engine = LoopEngine::new(config, agent.clone(), Arc::new(ScriptedUser::default())).unwrap();

    let outcome = engine.run(CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, LoopOutcome::Completed);
    assert_eq!(agent.call_count(), 10);

    let prompts = agent.prompts();
    assert!(prompts[0].contains("# Feature: storage (high)"));
    // The executing iteration after the batch sees both results
    assert!(prompts[3].contains("Results of 2 action(s): 2 succeeded, 0 failed"));
    assert!(prompts[4].contains("# Feature: api (high)"));
    assert!(prompts[7].contains("# Feature: docs (low)"));

    assert_eq!(
        fs::read_to_string(temp.path().join("src/storage.rs")).unwrap(),
        "pub struct Store;"
    );
    let features = FeatureList::load(&temp.path().join("features.json")).unwrap();
    assert!(features.all_passing());
    assert!(!ResumeStore::new(temp.path().join(".featureloop")).exists());
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let (temp, mut config) = setup();
    config.looping.max_iterations = 2;

    // First run: plan then approval, stopped by the iteration budget
    let first = Arc::new(ScriptedAgent::new([plan("store items"), APPROVE.to_string()]));
    let engine = LoopEngine::new(config.clone(), first.clone(), Arc::new(ScriptedUser::default())).unwrap();
    let outcome = engine.run(CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, LoopOutcome::IterationsExhausted { iterations: 2 });

    let state = engine.store().read().unwrap().unwrap();
    assert_eq!(state.phase, Some(Phase::Executing));
    assert_eq!(state.iteration, 3);
    assert_eq!(state.current_feature.as_deref(), Some("storage"));

    // Second run picks up in Executing with the approved plan
    config.looping.max_iterations = 3;
    let second = Arc::new(ScriptedAgent::new([r#"{"action": "done"}"#]));
    let engine = LoopEngine::new(config, second.clone(), Arc::new(ScriptedUser::default())).unwrap();
    let outcome = engine.run(CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, LoopOutcome::IterationsExhausted { iterations: 3 });
    let prompt = &second.prompts()[0];
    assert!(prompt.contains("Phase: EXECUTING"));
    assert!(prompt.contains("iteration 3 of 3"));
    assert!(prompt.contains("store items"));

    let features = FeatureList::load(&temp.path().join("features.json")).unwrap();
    assert!(features.get("storage").unwrap().passes);
}

#[tokio::test]
async fn test_fresh_ignores_resume_state() {
    let (_temp, mut config) = setup();
    config.looping.max_iterations = 1;

    let first = Arc::new(ScriptedAgent::new([plan("store items")]));
    let engine = LoopEngine::new(config.clone(), first, Arc::new(ScriptedUser::default())).unwrap();
    engine.run(CancellationToken::new()).await.unwrap();

    let second = Arc::new(ScriptedAgent::new([plan("store items again")]));
    let engine = LoopEngine::new(config, second.clone(), Arc::new(ScriptedUser::default()))
        .unwrap()
        .fresh(true);
    engine.run(CancellationToken::new()).await.unwrap();

    let prompt = &second.prompts()[0];
    assert!(prompt.contains("iteration 1 of 1"));
    assert!(prompt.contains("Phase: PLANNING"));
}

#[tokio::test]
async fn test_tagged_files_only_reach_first_iteration() {
    let (temp, mut config) = setup();
    config.looping.max_iterations = 2;
    fs::write(temp.path().join("NOTES.md"), "use the blue database").unwrap();

    let agent = Arc::new(ScriptedAgent::new([plan("one"), APPROVE.to_string()]));
    let engine = LoopEngine::new(config, agent.clone(), Arc::new(ScriptedUser::default()))
        .unwrap()
        .with_tagged(vec!["NOTES.md".into()]);
    engine.run(CancellationToken::new()).await.unwrap();

    let prompts = agent.prompts();
    assert!(prompts[0].contains("use the blue database"));
    assert!(!prompts[1].contains("use the blue database"));
}

#[tokio::test]
async fn test_large_spec_is_fetched_on_demand() {
    let (_temp, mut config) = setup();
    config.context.spec_inline_max_bytes = 64;
    config.looping.max_iterations = 1;

    let agent = Arc::new(ScriptedAgent::new([plan("one")]));
    let engine = LoopEngine::new(config, agent.clone(), Arc::new(ScriptedUser::default())).unwrap();
    engine.run(CancellationToken::new()).await.unwrap();

    let prompt = &agent.prompts()[0];
    assert!(prompt.contains("too large to include here"));
    assert!(!prompt.contains(r#""depends_on": ["storage"]"#));
}
