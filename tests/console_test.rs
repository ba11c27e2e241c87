// tests/console_test.rs
use tempfile::TempDir;
use ytdlbot::console::{parse_line, ConsoleInput, ConsoleTransport};
use ytdlbot::progress::ProgressSink;
use ytdlbot::router::AUDIO_CALLBACK;
use ytdlbot::transport::{ArtifactKind, ChatKind, ChatTransport, Inbound};

#[test]
fn test_parse_message_line() {
    assert_eq!(
        parse_line("42 https://example.com/v", 1),
        Some(ConsoleInput::Message {
            user_id: 42,
            text: "https://example.com/v".to_string(),
        })
    );
    assert_eq!(
        parse_line("  7   /vip abc ", 1),
        Some(ConsoleInput::Message {
            user_id: 7,
            text: "/vip abc".to_string(),
        })
    );
}

#[test]
fn test_parse_audio_line() {
    assert_eq!(
        parse_line("42 !audio 12", 3),
        Some(ConsoleInput::Audio {
            callback_id: "cb3".to_string(),
            user_id: 42,
            message_id: 12,
        })
    );
    assert_eq!(parse_line("42 !audio nope", 3), None);
}

#[test]
fn test_parse_invalid_lines() {
    assert_eq!(parse_line("", 1), None);
    assert_eq!(parse_line("hello world", 1), None);
    assert_eq!(parse_line("42", 1), None);
}

#[tokio::test]
async fn test_events_from_reader() {
    let outbox = TempDir::new().unwrap();
    let input: &[u8] = b"garbage\n5 https://example.com/v\n\n5 !audio 99\n";
    let transport = ConsoleTransport::from_reader(input, outbox.path().to_path_buf());

    match transport.next_event().await {
        Some(Inbound::Message {
            chat_id,
            chat_kind,
            user_id,
            text,
        }) => {
            assert_eq!(chat_id, 5);
            assert_eq!(chat_kind, ChatKind::Private);
            assert_eq!(user_id, 5);
            assert_eq!(text, "https://example.com/v");
        }
        other => panic!("unexpected {:?}", other),
    }

    match transport.next_event().await {
        Some(Inbound::Callback {
            data, message, file_name, ..
        }) => {
            assert_eq!(data, AUDIO_CALLBACK);
            assert_eq!(message.message_id, 99);
            // nothing was delivered as message 99
            assert_eq!(file_name, None);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(transport.next_event().await.is_none());
}

#[tokio::test]
async fn test_artifact_round_trips_through_outbox() {
    let outbox = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let source = work.path().join("clip.mp4");
    std::fs::write(&source, vec![1u8; 300_000]).unwrap();

    let transport = ConsoleTransport::from_reader(&b""[..], outbox.path().join("out"));
    let (sink, mut rx) = ProgressSink::channel();
    let message = transport
        .send_artifact(5, &source, "caption", ArtifactKind::Video, sink)
        .await
        .unwrap();

    // progress ends at the full size
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert_eq!(last.unwrap().percentage(), 100);

    // the delivered copy outlives the source
    std::fs::remove_file(&source).unwrap();
    let fetched = work.path().join("fetched.mp4");
    transport.download_media(&message, &fetched).await.unwrap();
    assert_eq!(std::fs::metadata(&fetched).unwrap().len(), 300_000);
}

#[tokio::test]
async fn test_download_unknown_media_fails() {
    let outbox = TempDir::new().unwrap();
    let transport = ConsoleTransport::from_reader(&b""[..], outbox.path().to_path_buf());
    let message = transport.send_status(5, "hello").await.unwrap();
    let err = transport
        .download_media(&message, &outbox.path().join("x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No media attached"));
}
