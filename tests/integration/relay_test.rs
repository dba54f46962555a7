// tests/integration/relay_test.rs

//! Integration tests for relaying chat and signaling payloads

use super::test_helpers::{TestContext, parse_frame};
use voodo_relay::config::SignalingConfig;
use voodo_relay::core::protocol::InboundEvent;
use voodo_relay::core::state::{ConnectionId, Modality, SlotState};

fn text_pair(ctx: &mut TestContext) -> (ConnectionId, ConnectionId) {
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.dispatch(&x, InboundEvent::FindTextChat);
    ctx.dispatch(&y, InboundEvent::FindTextChat);
    ctx.drain(&x);
    ctx.drain(&y);
    (x, y)
}

fn video_pair(ctx: &mut TestContext) -> (ConnectionId, ConnectionId) {
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.dispatch(&x, InboundEvent::FindPartner);
    ctx.dispatch(&y, InboundEvent::FindPartner);
    ctx.drain(&x);
    ctx.drain(&y);
    (x, y)
}

#[test]
fn test_message_is_relayed_byte_for_byte() {
    let mut ctx = TestContext::new();
    let (x, y) = text_pair(&mut ctx);

    let message = r#"{"text":"héllo \"there\"","sentAt":1.50e3,"meta":{ "k" : [true,null] }}"#;
    ctx.send_frame(&x, &format!(r#"{{"event":"sendMessage","data":{message}}}"#));

    assert_eq!(
        ctx.drain_frames(&y),
        vec![format!(r#"{{"event":"receiveMessage","data":{message}}}"#)]
    );
    assert!(ctx.drain(&x).is_empty(), "the sender gets no echo");
}

#[test]
fn test_scalar_messages_are_relayed() {
    let mut ctx = TestContext::new();
    let (x, y) = text_pair(&mut ctx);

    ctx.send_frame(&y, r#"{"event":"sendMessage","data":"plain text"}"#);
    assert_eq!(
        ctx.drain_frames(&x),
        vec![r#"{"event":"receiveMessage","data":"plain text"}"#.to_string()]
    );
}

#[test]
fn test_typing_reaches_partner_only() {
    let mut ctx = TestContext::new();
    let (x, y) = text_pair(&mut ctx);
    let bystander = ctx.connect("bystander");
    ctx.drain(&x);
    ctx.drain(&y);
    ctx.drain(&bystander);

    ctx.send_frame(&x, r#"{"event":"typing"}"#);
    assert_eq!(ctx.drain_frames(&y), vec![r#"{"event":"typing"}"#.to_string()]);
    assert!(ctx.drain(&bystander).is_empty());
}

#[test]
fn test_unpaired_relay_is_silently_dropped() {
    let mut ctx = TestContext::new();
    let lonely = ctx.connect("lonely");
    let other = ctx.connect("other");
    ctx.drain(&lonely);
    ctx.drain(&other);

    ctx.send_frame(&lonely, r#"{"event":"sendMessage","data":{"text":"anyone?"}}"#);
    ctx.send_frame(&lonely, r#"{"event":"typing"}"#);

    assert!(ctx.drain(&lonely).is_empty());
    assert!(ctx.drain(&other).is_empty());
}

#[test]
fn test_text_messages_do_not_cross_into_video_pairs() {
    let mut ctx = TestContext::new();
    let (x, y) = video_pair(&mut ctx);

    ctx.send_frame(&x, r#"{"event":"sendMessage","data":"hi"}"#);
    assert!(ctx.drain(&y).is_empty());
}

#[test]
fn test_call_and_answer_carry_signals_verbatim() {
    let mut ctx = TestContext::new();
    let (x, y) = video_pair(&mut ctx);

    let offer = r#"{"type":"offer","sdp":"v=0\r\no=- 46117 2 IN IP4 127.0.0.1"}"#;
    ctx.send_frame(
        &x,
        &format!(
            r#"{{"event":"callUser","data":{{"userToCall":"y","signalData":{offer},"from":"x","name":"Sam"}}}}"#
        ),
    );
    assert_eq!(
        ctx.drain_frames(&y),
        vec![format!(
            r#"{{"event":"callUser","data":{{"from":"x","signal":{offer},"name":"Sam"}}}}"#
        )]
    );

    let answer = r#"{"type":"answer","sdp":"v=0"}"#;
    ctx.send_frame(
        &y,
        &format!(r#"{{"event":"answerCall","data":{{"to":"x","signal":{answer}}}}}"#),
    );
    assert_eq!(
        ctx.drain_frames(&x),
        vec![format!(r#"{{"event":"callAccepted","data":{answer}}}"#)]
    );
}

#[test]
fn test_call_without_name_uses_display_name() {
    let mut ctx = TestContext::with_signaling(SignalingConfig {
        caller_display_name: "Stranger".to_string(),
        ..SignalingConfig::default()
    });
    let (x, y) = video_pair(&mut ctx);

    ctx.send_frame(&x, r#"{"event":"callUser","data":{"userToCall":"y","signalData":{}}}"#);
    let frames = ctx.drain_frames(&y);
    assert_eq!(frames.len(), 1);
    let call = parse_frame(&frames[0]);
    assert_eq!(call["data"]["name"], "Stranger");
    assert!(call["data"]["from"].is_null());
}

#[test]
fn test_signals_route_by_named_target() {
    let mut ctx = TestContext::new();
    let (x, _y) = video_pair(&mut ctx);
    let stranger = ctx.connect("stranger");
    ctx.drain(&stranger);

    ctx.send_frame(&x, r#"{"event":"answerCall","data":{"to":"stranger","signal":1}}"#);
    assert_eq!(
        ctx.drain_frames(&stranger),
        vec![r#"{"event":"callAccepted","data":1}"#.to_string()]
    );
}

#[test]
fn test_partner_routing_enforcement_blocks_strangers() {
    let mut ctx = TestContext::with_signaling(SignalingConfig {
        enforce_partner_routing: true,
        ..SignalingConfig::default()
    });
    let (x, y) = video_pair(&mut ctx);
    let stranger = ctx.connect("stranger");
    ctx.drain(&stranger);

    ctx.send_frame(&x, r#"{"event":"answerCall","data":{"to":"stranger","signal":1}}"#);
    assert!(ctx.drain(&stranger).is_empty());

    ctx.send_frame(&x, r#"{"event":"answerCall","data":{"to":"y","signal":1}}"#);
    assert_eq!(ctx.drain_names(&y), vec!["callAccepted"]);
}

#[test]
fn test_signal_to_unknown_target_is_dropped() {
    let mut ctx = TestContext::new();
    let (x, y) = video_pair(&mut ctx);

    ctx.send_frame(&x, r#"{"event":"callUser","data":{"userToCall":"nobody","signalData":{}}}"#);
    assert!(ctx.drain(&x).is_empty());
    assert!(ctx.drain(&y).is_empty());
}

#[test]
fn test_malformed_frames_change_nothing() {
    let mut ctx = TestContext::new();
    let (x, y) = text_pair(&mut ctx);

    for frame in [
        "not json",
        r#"{"data":{}}"#,
        r#"{"event":"shout","data":"hey"}"#,
        r#"{"event":"sendMessage"}"#,
        r#"{"event":"callUser","data":{"signalData":{}}}"#,
        r#"{"event":"answerCall","data":"x"}"#,
    ] {
        ctx.send_frame(&x, frame);
    }

    assert!(ctx.drain(&x).is_empty());
    assert!(ctx.drain(&y).is_empty());
    assert_eq!(ctx.partner(&x, Modality::Text), Some(y.clone()));
    ctx.assert_consistent();
}

#[test]
fn test_end_call_dissolves_video_pair() {
    let mut ctx = TestContext::new();
    let (x, y) = video_pair(&mut ctx);

    ctx.send_frame(&x, r#"{"event":"endCall"}"#);
    assert_eq!(ctx.drain_frames(&y), vec![r#"{"event":"callEnded"}"#.to_string()]);
    assert!(ctx.drain(&x).is_empty());
    assert_eq!(ctx.state_of(&x, Modality::Video), SlotState::Idle);
    assert_eq!(ctx.state_of(&y, Modality::Video), SlotState::Idle);

    // A second endCall has nothing left to end.
    ctx.send_frame(&y, r#"{"event":"endCall"}"#);
    assert!(ctx.drain(&x).is_empty());
    ctx.assert_consistent();
}

#[test]
fn test_end_call_leaves_text_pair_alone() {
    let mut ctx = TestContext::new();
    let (x, y) = text_pair(&mut ctx);

    ctx.send_frame(&x, r#"{"event":"endCall"}"#);
    assert!(ctx.drain(&y).is_empty());
    assert_eq!(ctx.partner(&x, Modality::Text), Some(y));
}

#[test]
fn test_end_call_can_be_configured_as_no_op() {
    let mut ctx = TestContext::with_signaling(SignalingConfig {
        end_call_dissolves_pair: false,
        ..SignalingConfig::default()
    });
    let (x, y) = video_pair(&mut ctx);

    ctx.send_frame(&x, r#"{"event":"endCall"}"#);
    assert!(ctx.drain(&y).is_empty());
    assert_eq!(ctx.partner(&x, Modality::Video), Some(y));
}
