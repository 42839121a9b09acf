//! End-to-end turn handling through the public session API

mod common;

use common::{ambiguous, manager, not_ambiguous, short_lived_manager, FlakyStore, ScriptedProvider};
use serde_json::json;
use session_memory::context::models::{ClarificationState, Message, Role};
use session_memory::llm::{CompletionError, TaskKind};
use session_memory::storage::SessionStore;
use session_memory::{ContextError, TurnOutcome};
use std::time::Duration;

#[tokio::test]
async fn strong_chip_query_asks_for_clarification_without_reply() {
    let provider = ScriptedProvider::new();
    provider.push(
        TaskKind::QueryUnderstanding,
        ambiguous(&["What is your budget?", "What will you use it for?"]),
    );
    let manager = manager(3000, provider.clone(), FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    let report = manager
        .submit(&id, "I want a computer with a strong chip")
        .await
        .unwrap();

    let TurnOutcome::Clarification { questions, .. } = &report.outcome else {
        panic!("expected clarifying questions, got {:?}", report.outcome);
    };
    assert!((1..=3).contains(&questions.len()));
    assert!(provider.calls(TaskKind::ResponseGeneration).is_empty());

    let state = manager.snapshot(&id).await.unwrap();
    assert_eq!(state.clarification_state(), ClarificationState::AwaitingClarification);
    assert!(state.messages().iter().all(|m| m.role == Role::User));
}

#[tokio::test]
async fn clarification_round_trip_never_asks_twice() {
    let provider = ScriptedProvider::new();
    provider.push(TaskKind::QueryUnderstanding, ambiguous(&["What is your budget?"]));
    // The backend still finds the merged query ambiguous; it must not matter
    provider.push(TaskKind::QueryUnderstanding, ambiguous(&["Which brand?"]));
    provider.push(TaskKind::ResponseGeneration, json!("A Ryzen 9 desktop fits that budget."));
    let manager = manager(3000, provider.clone(), FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    manager.submit(&id, "I want a computer with a strong chip").await.unwrap();
    let report = manager.submit(&id, "1500 USD, mostly for gaming").await.unwrap();

    assert_eq!(
        report.outcome,
        TurnOutcome::Reply {
            text: "A Ryzen 9 desktop fits that budget.".to_string()
        }
    );

    let state = manager.snapshot(&id).await.unwrap();
    assert!(!state.awaiting_clarification);
    assert!(state.pending_clarifying_questions.is_empty());
    assert!(state.pending_original_query.is_none());

    let response_payload = &provider.calls(TaskKind::ResponseGeneration)[0];
    let query = response_payload["query"].as_str().unwrap();
    assert!(query.contains("I want a computer with a strong chip"));
    assert!(query.contains("1500 USD, mostly for gaming"));
}

#[tokio::test]
async fn new_question_while_awaiting_is_taken_as_the_answer() {
    let provider = ScriptedProvider::new();
    provider.push(TaskKind::QueryUnderstanding, ambiguous(&["What is your budget?"]));
    provider.push(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.push(TaskKind::ResponseGeneration, json!("Here is the weather and a laptop pick."));
    let manager = manager(3000, provider.clone(), FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    manager.submit(&id, "I want a computer with a strong chip").await.unwrap();
    let report = manager.submit(&id, "What's the weather tomorrow?").await.unwrap();

    assert_eq!(report.outcome.kind(), "reply");
    let second_analysis = &provider.calls(TaskKind::QueryUnderstanding)[1];
    let combined = second_analysis["query"].as_str().unwrap();
    assert!(combined.starts_with("Original question: I want a computer with a strong chip"));
    assert!(combined.ends_with("Clarification/feedback: What's the weather tomorrow?"));
}

#[tokio::test]
async fn malformed_understanding_falls_back_to_a_reply() {
    let provider = ScriptedProvider::new();
    provider.push(TaskKind::QueryUnderstanding, json!({"is_ambiguous": "maybe"}));
    provider.push_error(
        TaskKind::QueryUnderstanding,
        CompletionError::Malformed("no JSON object found in response".to_string()),
    );
    provider.set_default(TaskKind::ResponseGeneration, json!("Answer."));
    let manager = manager(3000, provider.clone(), FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    for query in ["Compare them", "And the cheaper one?"] {
        let report = manager.submit(&id, query).await.unwrap();
        assert_eq!(report.outcome.kind(), "reply");
    }

    let payloads = provider.calls(TaskKind::ResponseGeneration);
    assert_eq!(payloads[0]["query"], "Compare them");
    assert_eq!(payloads[1]["query"], "And the cheaper one?");
}

#[tokio::test]
async fn unavailable_capability_fails_the_turn_only() {
    let provider = ScriptedProvider::new();
    provider.push(TaskKind::QueryUnderstanding, ambiguous(&["What is your budget?"]));
    provider.push(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.push_error(
        TaskKind::ResponseGeneration,
        CompletionError::Unavailable("connection refused".to_string()),
    );
    provider.push(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.push(TaskKind::ResponseGeneration, json!("Got it."));
    let manager = manager(3000, provider.clone(), FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    manager.submit(&id, "I want a computer with a strong chip").await.unwrap();
    let before = manager.snapshot(&id).await.unwrap();

    let failed = manager.submit(&id, "Around 1000 USD").await;
    assert!(matches!(failed, Err(ContextError::CapabilityUnavailable(_))));
    assert_eq!(manager.snapshot(&id).await.unwrap(), before);

    let retried = manager.submit(&id, "Around 1000 USD").await.unwrap();
    assert_eq!(retried.outcome.kind(), "reply");
    assert!(!manager.snapshot(&id).await.unwrap().awaiting_clarification);
}

#[tokio::test]
async fn persistence_failure_is_a_warning_and_flush_retries() {
    let provider = ScriptedProvider::new();
    provider.set_default(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.set_default(TaskKind::ResponseGeneration, json!("Noted."));
    let store = FlakyStore::new();
    let manager = manager(3000, provider.clone(), store.clone());

    let id = manager.create_session().await.unwrap();
    store.set_failing(true);

    let report = manager.submit(&id, "My budget is 1200 USD").await.unwrap();
    assert!(!report.persisted);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("disk full"));
    assert_eq!(manager.snapshot(&id).await.unwrap().len(), 2);
    assert_eq!(store.load(&id).await.unwrap().unwrap().len(), 0);

    assert!(matches!(manager.flush(&id).await, Err(ContextError::Persistence(_))));
    // Ending a session with unsaved changes keeps it live
    assert!(manager.end_session(&id).await.is_err());

    store.set_failing(false);
    manager.flush(&id).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().unwrap().len(), 2);
    assert_eq!(provider.calls(TaskKind::ResponseGeneration).len(), 1);
}

#[tokio::test]
async fn unsaved_turns_survive_idle_eviction() {
    let provider = ScriptedProvider::new();
    provider.set_default(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.set_default(TaskKind::ResponseGeneration, json!("Noted."));
    let store = FlakyStore::new();
    let manager = short_lived_manager(provider, store.clone());

    let id = manager.create_session().await.unwrap();
    store.set_failing(true);
    let report = manager.submit(&id, "My budget is 1200 USD").await.unwrap();
    assert!(!report.persisted);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    store.set_failing(false);

    assert_eq!(manager.snapshot(&id).await.unwrap().len(), 2);
    manager.flush(&id).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().unwrap().len(), 2);

    // Once saved, the session is evictable again and reloads intact
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(manager.snapshot(&id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn accented_english_query_keeps_english_questions() {
    let provider = ScriptedProvider::new();
    provider.push(
        TaskKind::QueryUnderstanding,
        ambiguous(&["What is your budget?", "Which café size?"]),
    );
    let manager = manager(3000, provider, FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    let report = manager
        .submit(&id, "I want a strong laptop for my café")
        .await
        .unwrap();

    let TurnOutcome::Clarification { questions, prompt } = &report.outcome else {
        panic!("expected clarifying questions, got {:?}", report.outcome);
    };
    assert_eq!(questions, &["What is your budget?", "Which café size?"]);
    assert!(prompt.starts_with("To better understand what you need"));
    assert!(prompt.contains("2. Which café size?"));
    assert!(!prompt.contains("Để hiểu"));
}

#[tokio::test]
async fn ended_session_is_reloaded_from_the_store() {
    let provider = ScriptedProvider::new();
    provider.set_default(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.set_default(TaskKind::ResponseGeneration, json!("Sure."));
    let store = FlakyStore::new();
    let manager = manager(3000, provider, store);

    let id = manager.create_session().await.unwrap();
    manager.submit(&id, "Remember that I like ThinkPads").await.unwrap();
    manager.end_session(&id).await.unwrap();

    let report = manager.submit(&id, "What do I like?").await.unwrap();
    assert_eq!(report.outcome.kind(), "reply");
    assert_eq!(manager.snapshot(&id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn history_is_append_only_across_turns() {
    let provider = ScriptedProvider::new();
    provider.push(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.push(TaskKind::QueryUnderstanding, ambiguous(&["Which size?"]));
    provider.push(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.push(TaskKind::QueryUnderstanding, json!("garbage"));
    provider.push_error(
        TaskKind::ResponseGeneration,
        CompletionError::Unavailable("timeout".to_string()),
    );
    provider.set_default(TaskKind::QueryUnderstanding, not_ambiguous());
    provider.set_default(TaskKind::ResponseGeneration, json!("x".repeat(120)));
    provider.set_default(TaskKind::Summarization, json!({"key_facts": ["shopping for a laptop"]}));
    let manager = manager(120, provider, FlakyStore::new());

    let id = manager.create_session().await.unwrap();
    let mut previous: Vec<Message> = Vec::new();
    for turn in 0..12 {
        let _ = manager.submit(&id, &format!("turn {} about laptops and screens", turn)).await;

        let state = manager.snapshot(&id).await.unwrap();
        assert!(state.len() >= previous.len());
        assert_eq!(&state.messages()[..previous.len()], previous.as_slice());
        previous = state.messages().to_vec();
    }

    let state = manager.snapshot(&id).await.unwrap();
    assert!(state.current_summary.is_some());
    assert!(state.len() > 12);
}
