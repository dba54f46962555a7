// tests/integration/disconnect_test.rs

//! Integration tests for disconnect cleanup

use super::test_helpers::TestContext;
use voodo_relay::core::protocol::{InboundEvent, OutboundEvent};
use voodo_relay::core::state::{Modality, SlotState};

#[test]
fn test_disconnect_notifies_text_partner() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.dispatch(&x, InboundEvent::FindTextChat);
    ctx.dispatch(&y, InboundEvent::FindTextChat);
    ctx.drain(&y);

    ctx.disconnect(&x);

    let to_y = ctx.drain(&y);
    assert!(matches!(
        to_y.as_slice(),
        [OutboundEvent::ChatDisconnected, OutboundEvent::UpdateUserCount(1)]
    ));
    assert_eq!(ctx.state_of(&y, Modality::Text), SlotState::Idle);
    assert!(!ctx.state.dispatcher.is_registered(&x));
    ctx.assert_consistent();
}

#[test]
fn test_disconnect_notifies_video_partner() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.dispatch(&x, InboundEvent::FindPartner);
    ctx.dispatch(&y, InboundEvent::FindPartner);
    ctx.drain(&x);

    ctx.disconnect(&y);
    assert_eq!(ctx.drain_direct(&x).iter().map(|e| e.name()).collect::<Vec<_>>(), vec!["callEnded"]);
    assert_eq!(ctx.state.presence().active_video_pairs, 0);
}

#[test]
fn test_disconnect_releases_both_modalities() {
    let mut ctx = TestContext::new();
    let a = ctx.connect("a");
    let b = ctx.connect("b");
    let c = ctx.connect("c");
    ctx.dispatch(&a, InboundEvent::FindPartner);
    ctx.dispatch(&b, InboundEvent::FindPartner);
    ctx.dispatch(&a, InboundEvent::FindTextChat);
    ctx.dispatch(&c, InboundEvent::FindTextChat);
    ctx.drain(&b);
    ctx.drain(&c);

    ctx.disconnect(&a);

    assert_eq!(ctx.drain_direct(&b).iter().map(|e| e.name()).collect::<Vec<_>>(), vec!["callEnded"]);
    assert_eq!(
        ctx.drain_direct(&c).iter().map(|e| e.name()).collect::<Vec<_>>(),
        vec!["chatDisconnected"]
    );
    assert_eq!(ctx.state_of(&b, Modality::Video), SlotState::Idle);
    assert_eq!(ctx.state_of(&c, Modality::Text), SlotState::Idle);
    ctx.assert_consistent();
}

#[test]
fn test_disconnect_while_waiting_leaves_the_pool() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    ctx.dispatch(&x, InboundEvent::FindPartner);
    assert_eq!(ctx.state.presence().waiting_video, 1);

    ctx.disconnect(&x);
    assert_eq!(ctx.state.presence().waiting_video, 0);

    // A later requester must not be matched with the departed connection.
    let y = ctx.connect("y");
    ctx.dispatch(&y, InboundEvent::FindPartner);
    assert_eq!(ctx.state_of(&y, Modality::Video), SlotState::Waiting);
    ctx.assert_consistent();
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.dispatch(&x, InboundEvent::FindTextChat);
    ctx.dispatch(&y, InboundEvent::FindTextChat);
    ctx.drain(&y);

    ctx.disconnect(&x);
    ctx.disconnect(&x);

    assert_eq!(ctx.state.dispatcher.stats().online(), 1);
    let to_y = ctx.drain(&y);
    assert_eq!(to_y.len(), 2, "one notice and one count update, not two of each");
    ctx.assert_consistent();
}

#[test]
fn test_events_after_disconnect_are_ignored() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.disconnect(&x);
    ctx.drain(&y);

    ctx.send_frame(&x, r#"{"event":"findTextChat"}"#);
    ctx.dispatch(&y, InboundEvent::FindTextChat);

    assert!(ctx.drain(&y).is_empty());
    assert_eq!(ctx.state_of(&y, Modality::Text), SlotState::Waiting);
    assert_eq!(ctx.state.presence().registered, 1);
}

#[test]
fn test_online_count_follows_connects_and_disconnects() {
    let mut ctx = TestContext::new();
    let ids: Vec<_> = (0..5).map(|i| ctx.connect(&format!("c{i}"))).collect();
    assert_eq!(ctx.state.dispatcher.stats().online(), 5);

    for id in &ids[..3] {
        ctx.disconnect(id);
    }
    assert_eq!(ctx.state.dispatcher.stats().online(), 2);
    let counts: Vec<usize> = ctx
        .drain(&ids[4])
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::UpdateUserCount(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![5, 4, 3, 2]);
}
