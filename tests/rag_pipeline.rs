mod common;

use cognit_assistant::document::FileKind;
use cognit_assistant::llm::chat::{ChatRole, FALLBACK_RESPONSE};
use cognit_assistant::llm::rag::{PipelineError, NO_CONTEXT_SENTINEL};
use common::{Reply, TestApp};

const HANDBOOK: &str = "Vacation policy: every employee receives twenty two vacation days per year.\n\n\
Expense policy: travel expenses must be submitted within thirty days with receipts.";

async fn upload_handbook(app: &TestApp, session: &cognit_assistant::auth::AuthenticatedSession) {
    let mut state = session.session.lock().await;
    app.services
        .ingestor
        .ingest(&mut state, "handbook.txt", HANDBOOK.as_bytes().to_vec(), FileKind::Txt)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_answer_uses_own_documents() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    upload_handbook(&app, &alice).await;

    app.rag_chat.push(Reply::Answer("You get 22 vacation days.".to_string()));
    let answer = {
        let mut state = alice.session.lock().await;
        app.services.rag.ask(&mut state, "How many vacation days do I get?").await.unwrap()
    };

    assert_eq!(answer.answer, "You get 22 vacation days.");
    assert!(!answer.fallback);
    assert!(!answer.chunks.is_empty());
    assert!(answer.chunks.iter().all(|c| c.source == "handbook.txt"));

    let requests = app.rag_chat.requests();
    let request = &requests[0];
    assert_eq!(request.model, "mistral-large-latest");
    assert_eq!(request.messages[0].role, ChatRole::System);
    let prompt = &request.messages.last().unwrap().content;
    assert!(prompt.contains("Chunk 1 (Source: handbook.txt):"));
    assert!(prompt.contains("vacation days"));
    assert!(prompt.ends_with("Question: How many vacation days do I get?"));

    let state = alice.session.lock().await;
    assert_eq!(state.history().len(), 2);
    assert_eq!(state.history()[0].content, "How many vacation days do I get?");
    assert_eq!(state.history()[1].content, "You get 22 vacation days.");
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    upload_handbook(&app, &alice).await;

    let answer = {
        let mut state = bob.session.lock().await;
        app.services.rag.ask(&mut state, "How many vacation days do I get?").await.unwrap()
    };

    assert!(answer.chunks.is_empty());
    let requests = app.rag_chat.requests();
    let prompt = &requests[0].messages.last().unwrap().content;
    assert!(prompt.contains(NO_CONTEXT_SENTINEL));
    assert!(!prompt.contains("handbook.txt"));

    let bob_docs = {
        let state = bob.session.lock().await;
        app.services.ingestor.list_documents(state.namespace()).await.unwrap()
    };
    assert!(bob_docs.is_empty());
}

#[tokio::test]
async fn test_failed_turn_leaves_history_unchanged() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    {
        let mut state = alice.session.lock().await;
        app.services.rag.ask(&mut state, "first question").await.unwrap();
    }

    app.rag_chat.push(Reply::Fail);
    let mut state = alice.session.lock().await;
    let err = app.services.rag.ask(&mut state, "second question").await.unwrap_err();

    assert!(matches!(err, PipelineError::Chat(_)));
    assert_eq!(state.history().len(), 2);
    assert_eq!(state.history()[0].content, "first question");
}

#[tokio::test]
async fn test_rate_limits_end_in_fallback_turn() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    for _ in 0..3 {
        app.rag_chat.push(Reply::RateLimit);
    }

    let mut state = alice.session.lock().await;
    let answer = app.services.rag.ask(&mut state, "anyone there?").await.unwrap();

    assert!(answer.fallback);
    assert_eq!(answer.answer, FALLBACK_RESPONSE);
    assert_eq!(app.rag_chat.calls(), 3);
    assert_eq!(state.history().len(), 2);
    assert_eq!(state.history()[1].content, FALLBACK_RESPONSE);
}

#[tokio::test]
async fn test_only_recent_history_is_sent() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let mut state = alice.session.lock().await;
    for i in 0..6 {
        app.services.rag.ask(&mut state, &format!("question {}", i)).await.unwrap();
    }

    let last = app.rag_chat.requests().pop().unwrap();
    // system + 8 history messages + the new prompt
    assert_eq!(last.messages.len(), 10);
    assert_eq!(last.messages[1].content, "question 1");
    assert_eq!(state.history().len(), 12);
}
