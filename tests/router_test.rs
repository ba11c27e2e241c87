// tests/router_test.rs
mod common;

use common::{group_message, private_message};
use ytdlbot::router::{command_name, Route, Router, AUDIO_CALLBACK};
use ytdlbot::transport::{Inbound, MessageRef};

#[test]
fn test_command_name() {
    assert_eq!(command_name("/start"), Some("start".to_string()));
    assert_eq!(command_name("/YTDL@some_bot https://x.y"), Some("ytdl".to_string()));
    assert_eq!(command_name("  /vip token"), Some("vip".to_string()));
    assert_eq!(command_name("https://x.y"), None);
    assert_eq!(command_name("/"), None);
}

#[test]
fn test_known_commands() {
    let router = Router::new();
    let cases = [
        ("/start", Route::Start),
        ("/help", Route::Help),
        ("/ping", Route::Ping),
        ("/about", Route::About),
        ("/terms", Route::Terms),
        ("/vip", Route::Vip),
        ("/ytdl https://x.y", Route::Download),
    ];
    for (text, route) in cases {
        assert_eq!(router.route(&private_message(1, text)), Some(route), "{}", text);
        assert_eq!(router.route(&group_message(-5, 1, text)), Some(route), "{}", text);
    }
}

#[test]
fn test_plain_text_in_private_is_download() {
    let router = Router::new();
    assert_eq!(router.route(&private_message(1, "https://x.y")), Some(Route::Download));
    assert_eq!(router.route(&private_message(1, "hello")), Some(Route::Download));
    assert_eq!(router.route(&private_message(1, "/unknown")), Some(Route::Download));
}

#[test]
fn test_group_ignores_non_commands() {
    let router = Router::new();
    assert_eq!(router.route(&group_message(-5, 1, "https://x.y")), None);
    assert_eq!(router.route(&group_message(-5, 1, "/unknown")), None);
}

#[test]
fn test_callbacks() {
    let router = Router::new();
    let callback = |data: &str| Inbound::Callback {
        callback_id: "cb".to_string(),
        user_id: 1,
        data: data.to_string(),
        message: MessageRef {
            chat_id: 1,
            message_id: 10,
        },
        file_name: Some("a.mp4".to_string()),
    };
    assert_eq!(router.route(&callback(AUDIO_CALLBACK)), Some(Route::Audio));
    assert_eq!(router.route(&callback("something-else")), None);
}
