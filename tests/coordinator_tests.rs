use agora::agent::AgentDescriptor;
use agora::bootstrap::Session;
use agora::client_wrapper::{ClientError, ClientWrapper, Message, Role};
use agora::coordinator::{GroupCoordinator, StopReason};
use agora::error::ChatError;
use agora::event::{CoordinatorEvent, EventHandler};
use agora::llm_adapter::LlmAdapter;
use agora::relay::relay;
use agora::selector::{AutoSelector, RoundRobinSelector};
use agora::transcript::TranscriptEntry;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replies from a fixed script (cycling) and records every request it sees.
struct MockClient {
    replies: Vec<String>,
    fail_on_call: Option<usize>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockClient {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            fail_on_call: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn send_message(
        &self,
        messages: &[Message],
        _temperature: Option<f32>,
    ) -> Result<Message, ClientError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            calls.len()
        };
        if self.fail_on_call == Some(call) {
            return Err("backend exploded".into());
        }
        let reply = &self.replies[(call - 1) % self.replies.len()];
        Ok(Message::new(Role::Assistant, reply.as_str()))
    }
}

fn session(agents: Vec<AgentDescriptor>, max_round: usize) -> Session {
    Session::new(
        agents,
        AgentDescriptor::user_proxy("User"),
        Vec::new(),
        Some("hi".to_string()),
        max_round,
    )
}

fn coordinator(client: Arc<MockClient>, session: Session) -> GroupCoordinator {
    GroupCoordinator::new(
        session,
        LlmAdapter::new(client, 0.0),
        Box::new(RoundRobinSelector::new()),
    )
}

fn speakers(entries: &[TranscriptEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.speaker_name.as_str()).collect()
}

#[tokio::test]
async fn test_round_robin_cycles_agents_until_max_round() {
    let client = Arc::new(MockClient::new(&["one", "two", "three"]));
    let agents = vec![
        AgentDescriptor::assistant("A", "You are A"),
        AgentDescriptor::assistant("B", "You are B"),
    ];
    let mut coordinator = coordinator(client.clone(), session(agents, 3));

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.rounds, 3);
    assert_eq!(outcome.stop_reason, StopReason::MaxRound);
    let entries = coordinator.transcript().entries();
    assert_eq!(speakers(entries), vec!["User", "A", "B", "A"]);
    assert_eq!(entries[0].role, Role::User);
    assert_eq!(entries[3].content, "three");

    let prompts: Vec<String> = client
        .calls()
        .iter()
        .map(|messages| messages[0].content.to_string())
        .collect();
    assert_eq!(prompts, vec!["You are A", "You are B", "You are A"]);
}

#[tokio::test]
async fn test_round_loop_never_exceeds_max_round() {
    for max_round in 0..5 {
        let client = Arc::new(MockClient::new(&["reply"]));
        let agents = vec![
            AgentDescriptor::assistant("A", "You are A"),
            AgentDescriptor::assistant("B", "You are B"),
            AgentDescriptor::assistant("C", "You are C"),
        ];
        let mut coordinator = coordinator(client.clone(), session(agents, max_round));
        let outcome = coordinator.run().await.unwrap();

        assert_eq!(outcome.rounds, max_round);
        assert_eq!(client.calls().len(), max_round);
    }
}

#[tokio::test]
async fn test_exhausted_reply_budgets_stop_the_loop() {
    let client = Arc::new(MockClient::new(&["reply"]));
    let agents = vec![
        AgentDescriptor::assistant("A", "You are A").with_max_auto_replies(1),
        AgentDescriptor::assistant("B", "You are B").with_max_auto_replies(2),
        AgentDescriptor::assistant("Muted", "You are muted").with_max_auto_replies(0),
    ];
    let mut coordinator = coordinator(client, session(agents, 10));

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::RepliesExhausted);
    assert_eq!(outcome.rounds, 3);
    assert_eq!(
        speakers(coordinator.transcript().entries()),
        vec!["User", "A", "B", "B"]
    );
}

#[tokio::test]
async fn test_termination_keyword_ends_the_chat() {
    let client = Arc::new(MockClient::new(&["still working", "All done. TERMINATE\n"]));
    let agents = vec![
        AgentDescriptor::assistant("A", "You are A"),
        AgentDescriptor::assistant("B", "You are B"),
    ];
    let mut coordinator = coordinator(client, session(agents, 10))
        .with_termination_keyword(Some("TERMINATE".to_string()));

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::TerminationRequested);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(coordinator.transcript().len(), 3);
}

#[tokio::test]
async fn test_upstream_failure_aborts_the_round_loop() {
    let client = Arc::new(MockClient::new(&["fine"]).failing_on(2));
    let agents = vec![
        AgentDescriptor::assistant("A", "You are A"),
        AgentDescriptor::assistant("B", "You are B"),
    ];
    let mut coordinator = coordinator(client.clone(), session(agents, 5));

    let err = coordinator.run().await.unwrap_err();

    assert!(matches!(err, ChatError::Upstream(ref m) if m.contains("backend exploded")));
    assert_eq!(client.calls().len(), 2, "no retry by default");
    assert_eq!(speakers(coordinator.transcript().entries()), vec!["User", "A"]);
}

#[tokio::test]
async fn test_context_is_the_full_transcript_with_speaker_names() {
    let client = Arc::new(MockClient::new(&["first", "second"]));
    let seed = vec![TranscriptEntry::assistant("B", "from last time")];
    let session = Session::new(
        vec![
            AgentDescriptor::assistant("A", "You are A"),
            AgentDescriptor::assistant("B", "You are B"),
        ],
        AgentDescriptor::user_proxy("User"),
        seed,
        Some("hi".to_string()),
        2,
    );
    let mut coordinator = coordinator(client.clone(), session);
    coordinator.run().await.unwrap();

    let calls = client.calls();
    let second = &calls[1];
    assert_eq!(second.len(), 4);
    assert_eq!(second[0].role, Role::System);
    assert_eq!(&*second[0].content, "You are B");
    assert_eq!(&*second[1].content, "from last time");
    assert_eq!(second[2].role, Role::User);
    assert_eq!(second[2].name.as_deref(), Some("User"));
    assert_eq!(second[3].role, Role::Assistant);
    assert_eq!(second[3].name.as_deref(), Some("A"));
    assert_eq!(&*second[3].content, "first");
}

#[tokio::test]
async fn test_auto_selector_follows_the_manager() {
    let agent_client = Arc::new(MockClient::new(&["critique"]));
    let manager_client = Arc::new(MockClient::new(&["Critic"]));
    let agents = vec![
        AgentDescriptor::assistant("Planner", "You plan.").with_description("Plans the work"),
        AgentDescriptor::assistant("Critic", "You critique.").with_description("Finds flaws"),
    ];
    let selector = AutoSelector::new(LlmAdapter::new(manager_client.clone(), 0.0), 0.0);
    let mut coordinator = GroupCoordinator::new(
        session(agents, 1),
        LlmAdapter::new(agent_client, 0.0),
        Box::new(selector),
    );

    coordinator.run().await.unwrap();

    assert_eq!(
        speakers(coordinator.transcript().entries()),
        vec!["User", "Critic"]
    );
    let manager_calls = manager_client.calls();
    assert_eq!(manager_calls.len(), 1);
    assert!(manager_calls[0][0].content.contains("Critic: Finds flaws"));
}

#[tokio::test]
async fn test_auto_selector_falls_back_to_round_robin() {
    let agent_client = Arc::new(MockClient::new(&["plan"]));
    let manager_client = Arc::new(MockClient::new(&["I cannot decide"]));
    let agents = vec![
        AgentDescriptor::assistant("Planner", "You plan."),
        AgentDescriptor::assistant("Critic", "You critique."),
    ];
    let selector = AutoSelector::new(LlmAdapter::new(manager_client, 0.0), 0.0);
    let mut coordinator = GroupCoordinator::new(
        session(agents, 2),
        LlmAdapter::new(agent_client, 0.0),
        Box::new(selector),
    );

    coordinator.run().await.unwrap();

    assert_eq!(
        speakers(coordinator.transcript().entries()),
        vec!["User", "Planner", "Critic"]
    );
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<CoordinatorEvent>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_coordinator_event(&self, event: &CoordinatorEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn test_events_bracket_the_run() {
    let client = Arc::new(MockClient::new(&["reply"]));
    let handler = Arc::new(RecordingHandler::default());
    let agents = vec![AgentDescriptor::assistant("A", "You are A")];
    let mut coordinator =
        coordinator(client, session(agents, 2)).with_event_handler(handler.clone());

    coordinator.run().await.unwrap();

    let events = handler.events.lock().unwrap();
    assert!(matches!(events.first(), Some(CoordinatorEvent::RunStarted { max_round: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(CoordinatorEvent::RunCompleted {
            rounds: 2,
            stop_reason: StopReason::MaxRound,
            ..
        })
    ));
    let turns = events
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::TurnCompleted { .. }))
        .count();
    assert_eq!(turns, 2);
}

#[tokio::test]
async fn test_cancelled_coordinator_takes_no_turns() {
    let client = Arc::new(MockClient::new(&["reply"]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let agents = vec![AgentDescriptor::assistant("A", "You are A")];
    let mut coordinator = coordinator(client.clone(), session(agents, 5)).with_cancellation(cancel);

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    assert_eq!(outcome.rounds, 0);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_turn_lost_to_cancellation_is_not_reported_as_completed() {
    let client = Arc::new(MockClient::new(&["reply"]));
    let handler = Arc::new(RecordingHandler::default());
    let cancel = CancellationToken::new();
    let (tx, _rx) = relay(1);

    let agents = vec![AgentDescriptor::assistant("A", "You are A")];
    let mut coordinator = coordinator(client, session(agents, 5))
        .with_cancellation(cancel.clone())
        .with_event_handler(handler.clone());
    coordinator.attach_relay(tx.with_cancellation(cancel.clone()));

    // The opening message fills the relay; the first reply waits for room.
    let run = tokio::spawn(async move {
        let outcome = coordinator.run().await;
        (coordinator, outcome)
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let (coordinator, outcome) = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("coordinator should stop once cancelled")
        .unwrap();
    let outcome = outcome.unwrap();
    assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(speakers(coordinator.transcript().entries()), vec!["User", "A"]);

    let events = handler.events.lock().unwrap();
    assert!(!events
        .iter()
        .any(|e| matches!(e, CoordinatorEvent::TurnCompleted { .. })));
    assert!(matches!(
        events.last(),
        Some(CoordinatorEvent::RunCompleted {
            rounds: 1,
            stop_reason: StopReason::Cancelled,
            ..
        })
    ));
}
