// tests/property/invariants_test.rs

//! Property-based tests for registry consistency
//! Random operation sequences must never leave a one-sided pair, a stale pool
//! entry or a wrong online count behind.

use crate::test_helpers::TestContext;
use proptest::prelude::*;
use std::collections::BTreeSet;
use voodo_relay::core::protocol::InboundEvent;
use voodo_relay::core::state::{ConnectionId, Modality, SlotState};

const POPULATION: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Connect(usize),
    Disconnect(usize),
    FindPartner(usize),
    FindTextChat(usize),
    EndCall(usize),
    Frame(usize, &'static str),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..POPULATION;
    prop_oneof![
        2 => who.clone().prop_map(Op::Connect),
        1 => who.clone().prop_map(Op::Disconnect),
        3 => who.clone().prop_map(Op::FindPartner),
        3 => who.clone().prop_map(Op::FindTextChat),
        1 => who.clone().prop_map(Op::EndCall),
        2 => (
            who,
            prop::sample::select(vec![
                r#"{"event":"sendMessage","data":"hi"}"#,
                r#"{"event":"typing"}"#,
                r#"{"event":"answerCall","data":{"to":"c0","signal":{}}}"#,
                r#"{"event":"callUser","data":{"userToCall":"c1","signalData":{}}}"#,
                "garbage",
            ])
        )
            .prop_map(|(i, frame)| Op::Frame(i, frame)),
    ]
}

fn id(i: usize) -> ConnectionId {
    ConnectionId::new(format!("c{i}"))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_registry_stays_consistent(ops in prop::collection::vec(op_strategy(), 1..=80)) {
        let mut ctx = TestContext::new();
        let mut live: BTreeSet<usize> = BTreeSet::new();

        for op in &ops {
            match *op {
                Op::Connect(i) => {
                    if live.insert(i) {
                        ctx.connect(&format!("c{i}"));
                    } else {
                        // A duplicate id is refused without touching state.
                        let before = ctx.state.presence();
                        prop_assert!(ctx.state.dispatcher.connect(&id(i)).is_err());
                        prop_assert_eq!(ctx.state.presence(), before);
                    }
                }
                Op::Disconnect(i) => {
                    live.remove(&i);
                    ctx.disconnect(&id(i));
                }
                Op::FindPartner(i) => ctx.dispatch(&id(i), InboundEvent::FindPartner),
                Op::FindTextChat(i) => ctx.dispatch(&id(i), InboundEvent::FindTextChat),
                Op::EndCall(i) => ctx.dispatch(&id(i), InboundEvent::EndCall),
                Op::Frame(i, frame) => ctx.send_frame(&id(i), frame),
            }

            prop_assert!(ctx.state.dispatcher.verify().is_ok(), "after {:?}", op);
            prop_assert_eq!(ctx.state.dispatcher.stats().online(), live.len());

            let snapshot = ctx.state.presence();
            prop_assert_eq!(snapshot.registered, live.len());
            // Anyone left waiting would have been paired with the next requester.
            prop_assert!(snapshot.waiting_video <= 1);
            prop_assert!(snapshot.waiting_text <= 1);

            for i in 0..POPULATION {
                prop_assert_eq!(ctx.state.dispatcher.is_registered(&id(i)), live.contains(&i));
            }
        }
    }

    #[test]
    fn test_pairs_are_mutual(ops in prop::collection::vec(op_strategy(), 1..=60)) {
        let mut ctx = TestContext::new();
        for i in 0..POPULATION {
            ctx.connect(&format!("c{i}"));
        }

        for op in &ops {
            match *op {
                // Keep the population stable so every id stays inspectable.
                Op::Connect(_) | Op::Disconnect(_) => continue,
                Op::FindPartner(i) => ctx.dispatch(&id(i), InboundEvent::FindPartner),
                Op::FindTextChat(i) => ctx.dispatch(&id(i), InboundEvent::FindTextChat),
                Op::EndCall(i) => ctx.dispatch(&id(i), InboundEvent::EndCall),
                Op::Frame(i, frame) => ctx.send_frame(&id(i), frame),
            }

            for modality in [Modality::Video, Modality::Text] {
                for i in 0..POPULATION {
                    if let SlotState::Paired(partner) = ctx.state_of(&id(i), modality) {
                        prop_assert_ne!(&partner, &id(i));
                        prop_assert_eq!(
                            ctx.state_of(&partner, modality),
                            SlotState::Paired(id(i))
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_unregistered_senders_change_nothing(
        frames in prop::collection::vec(
            prop::sample::select(vec![
                r#"{"event":"findPartner"}"#,
                r#"{"event":"findTextChat"}"#,
                r#"{"event":"endCall"}"#,
                r#"{"event":"sendMessage","data":{"text":"x"}}"#,
                r#"{"event":"answerCall","data":{"to":"c0","signal":1}}"#,
            ]),
            1..=20
        )
    ) {
        let mut ctx = TestContext::new();
        let a = ctx.connect("c0");
        ctx.dispatch(&a, InboundEvent::FindPartner);
        ctx.drain(&a);
        let before = ctx.state.presence();

        let ghost = ConnectionId::from("ghost");
        for frame in &frames {
            ctx.send_frame(&ghost, frame);
        }

        prop_assert_eq!(ctx.state.presence(), before);
        prop_assert!(ctx.drain(&a).is_empty());
        prop_assert!(!ctx.state.dispatcher.is_registered(&ghost));
    }
}
