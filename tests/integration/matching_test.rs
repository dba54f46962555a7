// tests/integration/matching_test.rs

//! Integration tests for matchmaking in both modalities

use super::test_helpers::{TestContext, parse_frame};
use voodo_relay::core::protocol::{InboundEvent, OutboundEvent, WireValue};
use voodo_relay::core::state::{Modality, SlotState};

#[test]
fn test_connect_announces_id_and_online_count() {
    let mut ctx = TestContext::new();
    let a = ctx.connect("a");
    let frames = ctx.drain_frames(&a);
    assert_eq!(
        frames,
        vec![
            r#"{"event":"connected","data":{"id":"a"}}"#.to_string(),
            r#"{"event":"updateUserCount","data":1}"#.to_string(),
        ]
    );

    let b = ctx.connect("b");
    assert_eq!(ctx.drain_frames(&a), vec![r#"{"event":"updateUserCount","data":2}"#.to_string()]);
    assert_eq!(ctx.drain_names(&b), vec!["connected", "updateUserCount"]);
    assert_eq!(ctx.state_of(&b, Modality::Video), SlotState::Idle);
    assert_eq!(ctx.state_of(&b, Modality::Text), SlotState::Idle);
}

#[test]
fn test_text_match_in_either_order() {
    for reversed in [false, true] {
        let mut ctx = TestContext::new();
        let x = ctx.connect("x");
        let y = ctx.connect("y");
        ctx.drain(&x);
        ctx.drain(&y);

        let (first, second) = if reversed { (&y, &x) } else { (&x, &y) };
        ctx.dispatch(first, InboundEvent::FindTextChat);
        assert!(ctx.drain(first).is_empty(), "a lone requester hears nothing");
        ctx.dispatch(second, InboundEvent::FindTextChat);

        assert_eq!(ctx.partner(&x, Modality::Text), Some(y.clone()));
        assert_eq!(ctx.partner(&y, Modality::Text), Some(x.clone()));
        assert_eq!(ctx.drain_names(&x), vec!["chatConnected"]);
        assert_eq!(ctx.drain_names(&y), vec!["chatConnected"]);
        ctx.assert_consistent();
    }
}

#[test]
fn test_video_match_tells_both_sides() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.drain(&x);
    ctx.drain(&y);

    ctx.dispatch(&x, InboundEvent::FindPartner);
    ctx.dispatch(&y, InboundEvent::FindPartner);

    let to_y = ctx.drain_frames(&y);
    assert_eq!(to_y.len(), 1);
    let call = parse_frame(&to_y[0]);
    assert_eq!(call["event"], "callUser");
    assert_eq!(call["data"]["from"], "x");
    assert!(call["data"]["signal"].is_null());
    assert_eq!(call["data"]["name"], "Anonymous");

    let to_x = ctx.drain_frames(&x);
    assert_eq!(to_x, vec![r#"{"event":"partnerFound","data":{"partnerId":"y"}}"#.to_string()]);
    assert_eq!(ctx.partner(&x, Modality::Video), Some(y));
}

#[test]
fn test_three_video_requests_leave_one_waiting() {
    let mut ctx = TestContext::new();
    let ids: Vec<_> = ["x", "y", "z"].iter().map(|n| ctx.connect(n)).collect();
    for id in &ids {
        ctx.dispatch(id, InboundEvent::FindPartner);
    }

    let paired = ids
        .iter()
        .filter(|id| ctx.partner(id, Modality::Video).is_some())
        .count();
    let waiting = ids
        .iter()
        .filter(|id| ctx.state_of(id, Modality::Video) == SlotState::Waiting)
        .count();
    assert_eq!(paired, 2);
    assert_eq!(waiting, 1);

    let snapshot = ctx.state.presence();
    assert_eq!(snapshot.active_video_pairs, 1);
    assert_eq!(snapshot.waiting_video, 1);
    ctx.assert_consistent();
}

#[test]
fn test_rematch_releases_old_partner_without_requeueing() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.dispatch(&x, InboundEvent::FindTextChat);
    ctx.dispatch(&y, InboundEvent::FindTextChat);
    ctx.drain(&x);
    ctx.drain(&y);

    ctx.dispatch(&x, InboundEvent::FindTextChat);
    assert_eq!(ctx.drain_names(&y), vec!["chatDisconnected"]);
    assert!(ctx.drain(&x).is_empty());
    assert_eq!(ctx.state_of(&y, Modality::Text), SlotState::Idle);
    assert_eq!(ctx.state_of(&x, Modality::Text), SlotState::Waiting);

    // A newcomer is paired with the re-requester, not with the released partner.
    let z = ctx.connect("z");
    ctx.dispatch(&z, InboundEvent::FindTextChat);
    assert_eq!(ctx.partner(&z, Modality::Text), Some(x.clone()));
    assert_eq!(ctx.state_of(&y, Modality::Text), SlotState::Idle);
    ctx.assert_consistent();
}

#[test]
fn test_repeated_request_while_waiting_is_idempotent() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    ctx.dispatch(&x, InboundEvent::FindPartner);
    ctx.dispatch(&x, InboundEvent::FindPartner);

    assert_eq!(ctx.state.presence().waiting_video, 1);
    assert_eq!(ctx.state_of(&x, Modality::Video), SlotState::Waiting);
    ctx.assert_consistent();
}

#[test]
fn test_switching_modality_moves_between_pools() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    ctx.dispatch(&x, InboundEvent::FindPartner);
    ctx.dispatch(&x, InboundEvent::FindTextChat);

    let snapshot = ctx.state.presence();
    assert_eq!(snapshot.waiting_video, 0);
    assert_eq!(snapshot.waiting_text, 1);
    assert_eq!(ctx.state_of(&x, Modality::Video), SlotState::Idle);
    ctx.assert_consistent();
}

#[test]
fn test_video_and_text_pairs_coexist() {
    let mut ctx = TestContext::new();
    let a = ctx.connect("a");
    let b = ctx.connect("b");
    let c = ctx.connect("c");

    ctx.dispatch(&a, InboundEvent::FindPartner);
    ctx.dispatch(&b, InboundEvent::FindPartner);
    ctx.dispatch(&a, InboundEvent::FindTextChat);
    ctx.dispatch(&c, InboundEvent::FindTextChat);

    assert_eq!(ctx.partner(&a, Modality::Video), Some(b.clone()));
    assert_eq!(ctx.partner(&a, Modality::Text), Some(c.clone()));
    assert_eq!(ctx.partner(&b, Modality::Text), None);
    ctx.assert_consistent();
}

#[test]
fn test_match_names_match_the_wire() {
    let mut ctx = TestContext::new();
    let x = ctx.connect("x");
    let y = ctx.connect("y");
    ctx.drain(&x);
    ctx.drain(&y);

    ctx.send_frame(&x, r#"{"event":"findPartner"}"#);
    ctx.send_frame(&y, r#"{"event":"findPartner","data":null}"#);

    let to_y = ctx.drain(&y);
    assert!(matches!(
        to_y.as_slice(),
        [OutboundEvent::CallUser { from: WireValue::Text(from), .. }] if from == "x"
    ));
    assert_eq!(ctx.drain_names(&x), vec!["partnerFound"]);
}
