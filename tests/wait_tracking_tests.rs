// Copyright 2025 Cowboy AI, LLC.

//! Completion semantics of stage and chain waits

use cim_sourcing::wait::{StageTarget, WaitSignalBuilder};
use cim_sourcing::{
    CommandStage, ErrorInfo, FunctionInfo, NamedAggregate, WaitError, WaitSignal, WaitStrategy,
    WaitStrategyRegistry, WaitingForChain, WaitingForStage,
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn signal(wait_command_id: &str, command_id: &str, stage: CommandStage) -> WaitSignalBuilder {
    WaitSignal::builder(
        command_id,
        NamedAggregate::new("sales", "order").aggregate_id(command_id),
        stage,
    )
    .wait_command_id(wait_command_id)
}

#[tokio::test]
async fn test_processed_ignores_saga_handled_in_either_order() {
    let saga = signal("cmd", "cmd", CommandStage::SagaHandled)
        .function(FunctionInfo::new("sales", "fulfilment", "on_placed"))
        .build();
    let processed = signal("cmd", "cmd", CommandStage::Processed).build();

    for order in [[&saga, &processed], [&processed, &saga]] {
        let waiting = WaitingForStage::processed("cmd");
        for s in order {
            waiting.next(s.clone());
        }
        let done = waiting.wait().await.unwrap();
        assert_eq!(done.stage, CommandStage::Processed);
    }
}

#[tokio::test]
async fn test_failed_processed_is_terminal() {
    let waiting = WaitingForStage::processed("cmd");
    waiting.next(
        signal("cmd", "cmd", CommandStage::Processed)
            .error(&ErrorInfo::of("IllegalAccessDeletedAggregate", "deleted"))
            .build(),
    );
    waiting.next(signal("cmd", "cmd", CommandStage::Processed).build());

    let error = waiting.wait().await.unwrap_err();
    let WaitError::Failed(failed) = &error else {
        panic!("expected a failed signal");
    };
    assert_eq!(failed.error_code, "IllegalAccessDeletedAggregate");
    assert_eq!(waiting.sink().signals().len(), 1);
}

#[tokio::test]
async fn test_duplicate_terminal_signal_has_no_effect() {
    let registry = WaitStrategyRegistry::new();
    let waiting = Arc::new(WaitingForStage::processed("cmd"));
    registry.register(waiting.clone());
    let processed = signal("cmd", "cmd", CommandStage::Processed).build();

    assert!(registry.notify(processed.clone()));
    let first = waiting.wait().await.unwrap();
    registry.notify(processed.clone());
    waiting.next(processed);

    assert_eq!(waiting.wait().await.unwrap(), first);
    assert_eq!(waiting.sink().signals().len(), 1);
}

#[tokio::test]
async fn test_progress_stream_replays_and_ends() {
    let waiting = WaitingForStage::projected("cmd", FunctionInfo::any());
    waiting.next(signal("cmd", "cmd", CommandStage::Sent).build());
    let progress = waiting.waiting();
    waiting.next(signal("cmd", "cmd", CommandStage::Processed).build());
    waiting.next(
        signal("cmd", "cmd", CommandStage::Projected)
            .function(FunctionInfo::new("sales", "order_view", "on_placed"))
            .is_last_projection(true)
            .build(),
    );

    let stages: Vec<CommandStage> = progress.map(|s| s.stage).collect().await;
    assert_eq!(
        stages,
        vec![CommandStage::Sent, CommandStage::Processed, CommandStage::Projected]
    );
}

fn chain_signals() -> Vec<WaitSignal> {
    vec![
        signal("root", "root", CommandStage::SagaHandled)
            .function(FunctionInfo::new("sales", "fulfilment", "on_placed"))
            .commands(vec!["a".to_string(), "b".to_string()])
            .build(),
        signal("root", "a", CommandStage::Processed).build(),
        signal("root", "b", CommandStage::Processed).build(),
    ]
}

fn chain() -> WaitingForChain {
    WaitingForChain::new(
        "root",
        FunctionInfo::processor("sales", "fulfilment"),
        StageTarget::new(CommandStage::Processed, FunctionInfo::any()),
    )
}

proptest! {
    #[test]
    fn prop_chain_converges_under_any_delivery_order(
        order in Just(vec![0usize, 1, 2]).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let signals = chain_signals();
        let waiting = chain();
        for (step, index) in order.iter().enumerate() {
            prop_assert!(!waiting.completed(), "completed before step {}", step);
            waiting.next(signals[*index].clone());
        }
        let done = runtime.block_on(waiting.wait()).unwrap();
        prop_assert_eq!(done.command_id, "root");
        prop_assert_eq!(waiting.tail_count(), 2);
    }

    #[test]
    fn prop_chain_tail_failure_wins_under_any_delivery_order(
        order in Just(vec![0usize, 1, 2]).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut signals = chain_signals();
        signals[2] = signal("root", "b", CommandStage::Processed)
            .error(&ErrorInfo::of("OutOfStock", "sku-1"))
            .build();
        let waiting = chain();
        for index in &order {
            waiting.next(signals[*index].clone());
        }
        let error = runtime.block_on(waiting.wait()).unwrap_err();
        prop_assert_eq!(error.signal().map(|s| s.command_id.clone()), Some("b".to_string()));
    }
}

#[tokio::test]
async fn test_chain_waits_for_every_declared_tail() {
    let waiting = chain();
    let signals = chain_signals();
    waiting.next(signals[0].clone());
    waiting.next(signals[1].clone());
    assert!(!waiting.completed());
    waiting.next(signal("root", "c", CommandStage::Processed).build());
    assert!(!waiting.completed());
    waiting.next(signals[2].clone());
    assert!(waiting.completed());
}
