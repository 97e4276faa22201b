//! Runtime tests with real capture, playback and timer tasks on a paused clock.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use voxturn::audio::ScriptedMicrophone;
use voxturn::config::Config;
use voxturn::conversation::Sender;
use voxturn::coordinator::{Signal, TurnState, UserAction};
use voxturn::error::DeviceError;
use voxturn::playback::SilentOutput;
use voxturn::presenter::CollectorPresenter;
use voxturn::runtime::{RuntimeParts, TurnRuntime};
use voxturn::transport::{InboundEvent, OutboundCommand, RecordingTransport};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.detector.required_silence_frames = 3;
    config.detector.inactivity_frames = 5;
    config
}

fn parts(
    transport: &RecordingTransport,
    microphone: &ScriptedMicrophone,
    presenter: &CollectorPresenter,
) -> RuntimeParts {
    RuntimeParts {
        transport: Box::new(transport.clone()),
        microphone: Arc::new(microphone.clone()),
        output: Arc::new(SilentOutput::new(1000)),
        presenter: Box::new(presenter.clone()),
    }
}

fn audio_sends(sent: &[OutboundCommand]) -> usize {
    sent.iter()
        .filter(|c| matches!(c, OutboundCommand::AudioData { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_spoken_turn_plays_reply_and_listens_again() {
    let transport = RecordingTransport::new();
    let microphone = ScriptedMicrophone::silent()
        .with_levels(vec![40, 40, 0, 0, 0])
        .with_chunk(vec![7]);
    let presenter = CollectorPresenter::new();
    let runtime = TurnRuntime::new(&fast_config(), parts(&transport, &microphone, &presenter));
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let sent = transport.sent();
    assert_eq!(sent.first(), Some(&OutboundCommand::StartListening));
    assert!(sent.contains(&OutboundCommand::StopListening));
    assert_eq!(audio_sends(&sent), 1);

    handle.post(Signal::Inbound(InboundEvent::ResponseChunk {
        text: json!("Salut"),
        audio: Some(STANDARD.encode([1u8, 2, 3])),
    }));
    handle.post(Signal::Inbound(InboundEvent::ResponseComplete {
        cancelled: false,
        last_user_message: None,
    }));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(handle.shutdown());
    let coordinator = task.await.unwrap();

    let states = presenter.snapshot().states;
    assert!(states.contains(&(TurnState::Listening, TurnState::AwaitingResponse)));
    assert!(states.contains(&(TurnState::AwaitingResponse, TurnState::Speaking)));
    assert!(states.contains(&(TurnState::Speaking, TurnState::Listening)));

    let reply = coordinator
        .conversation()
        .messages()
        .iter()
        .find(|m| m.sender == Sender::Assistant)
        .cloned()
        .unwrap();
    assert_eq!(reply.text, "Salut");
    assert!(!reply.interrupted);

    // The scripted microphone speaks again in the second session
    assert_eq!(audio_sends(&transport.sent()), 2);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(microphone.acquired_count(), 2);
    assert_eq!(microphone.released_count(), microphone.acquired_count());
}

#[tokio::test(start_paused = true)]
async fn test_user_interrupt_cuts_long_reply() {
    let mut config = fast_config();
    config.listening.auto_listen = false;
    let transport = RecordingTransport::new();
    let microphone = ScriptedMicrophone::silent();
    let presenter = CollectorPresenter::new();
    let runtime = TurnRuntime::new(&config, parts(&transport, &microphone, &presenter));
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    // Three seconds of audio at 1000 bytes per second
    handle.post(Signal::Inbound(InboundEvent::ResponseChunk {
        text: json!("Une très longue histoire"),
        audio: Some(STANDARD.encode(vec![0u8; 3000])),
    }));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.user(UserAction::Interrupt));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(handle.shutdown());
    let coordinator = task.await.unwrap();

    let sent = transport.sent();
    assert!(sent.contains(&OutboundCommand::CancelResponse));
    assert!(sent.contains(&OutboundCommand::CancelSpeech));

    let states = presenter.snapshot().states;
    assert!(states.contains(&(TurnState::Speaking, TurnState::Interrupted)));
    assert!(states.contains(&(TurnState::Interrupted, TurnState::Listening)));
    // Nobody speaks into the silent microphone, so the session is abandoned
    assert_eq!(coordinator.state(), TurnState::Idle);
    assert!(coordinator.flags().manual_stop);

    let partial = coordinator.conversation().last().cloned().unwrap();
    assert_eq!(partial.sender, Sender::Assistant);
    assert!(partial.interrupted);
    assert!(presenter.statuses().contains(&"Response interrupted".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_reports_remedy() {
    let transport = RecordingTransport::new();
    let microphone = ScriptedMicrophone::silent().with_failure(DeviceError::Denied);
    let presenter = CollectorPresenter::new();
    let runtime = TurnRuntime::new(&fast_config(), parts(&transport, &microphone, &presenter));
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.shutdown());
    let coordinator = task.await.unwrap();

    assert_eq!(coordinator.state(), TurnState::Idle);
    assert!(coordinator.flags().manual_stop);
    assert!(transport.sent().is_empty());
    assert!(presenter.statuses().contains(&DeviceError::Denied.remedy()));
    assert_eq!(microphone.acquired_count(), 0);
}
