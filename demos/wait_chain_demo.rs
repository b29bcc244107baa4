// Copyright 2025 Cowboy AI, LLC.

//! Wait chain demo
//!
//! This demo wires a single in-process node and shows:
//! - Sending a command and waiting for it to be processed
//! - Waiting for a saga and every command the saga spawned
//! - Following the progress stream of a wait
//! - A rejected downstream command failing the whole chain

use anyhow::{bail, Context, Result};
use cim_sourcing::config::SourcingConfig;
use cim_sourcing::infrastructure::InMemorySnapshotRepository;
use cim_sourcing::pipeline::SagaFunction;
use cim_sourcing::wait::{LocalCommandWaitNotifier, StageTarget, WaitSignalEmitter};
use cim_sourcing::{
    CommandBody, CommandGateway, CommandHandlers, CommandMessage, CommandProcessor, CommandStage,
    DomainError, DomainEvent, DomainEventBody, DomainEventDispatcher, DomainEventStream,
    FunctionInfo, InMemoryCommandBus, InMemoryDomainEventBus, InMemoryEventStore, NamedAggregate,
    SourcedState, SourcingRegistry, StateAggregateRepository, WaitStrategy, WaitStrategyRegistry,
    WaitingForChain,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// Orders aggregate
#[derive(Debug, Default, Serialize, Deserialize)]
struct Order {
    lines: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlaceOrder {
    lines: Vec<String>,
}

impl CommandBody for PlaceOrder {
    const NAME: &'static str = "place_order";
    const IS_CREATE: bool = true;
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    lines: Vec<String>,
}

impl DomainEventBody for OrderPlaced {
    const NAME: &'static str = "order_placed";
}

impl SourcedState for Order {
    fn named_aggregate() -> NamedAggregate {
        NamedAggregate::new("sales", "order")
    }

    fn sourcing_registry() -> SourcingRegistry<Self> {
        SourcingRegistry::new().on(|state: &mut Order, event: OrderPlaced| state.lines = event.lines)
    }
}

// Stock aggregate, one per SKU
#[derive(Debug, Default, Serialize, Deserialize)]
struct Stock {
    reservations: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReserveStock {
    sku: String,
}

impl CommandBody for ReserveStock {
    const NAME: &'static str = "reserve_stock";
    const ALLOW_CREATE: bool = true;
}

#[derive(Debug, Serialize, Deserialize)]
struct StockReserved {
    sku: String,
}

impl DomainEventBody for StockReserved {
    const NAME: &'static str = "stock_reserved";
}

impl SourcedState for Stock {
    fn named_aggregate() -> NamedAggregate {
        NamedAggregate::new("warehouse", "stock")
    }

    fn sourcing_registry() -> SourcingRegistry<Self> {
        SourcingRegistry::new().on(|state: &mut Stock, _: StockReserved| state.reservations += 1)
    }
}

fn start_node(config: &SourcingConfig) -> CommandGateway {
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotRepository::new());
    let registry = WaitStrategyRegistry::new();
    let emitter = WaitSignalEmitter::new(Arc::new(LocalCommandWaitNotifier::new(registry.clone())));
    let commands = InMemoryCommandBus::new();
    let events = InMemoryDomainEventBus::new();

    let orders = CommandProcessor::new(
        StateAggregateRepository::new(store.clone(), snapshots.clone()),
        CommandHandlers::<Order>::new().on(|_: &Order, command: PlaceOrder| {
            Ok(vec![DomainEvent::of(&OrderPlaced {
                lines: command.lines,
            })?])
        }),
        Arc::new(events.clone()),
        emitter.clone(),
    )
    .configure(config);
    Arc::new(orders).spawn(commands.subscribe(Order::named_aggregate()));

    let stock = CommandProcessor::new(
        StateAggregateRepository::new(store, snapshots),
        CommandHandlers::<Stock>::new().on(|_: &Stock, command: ReserveStock| {
            if command.sku.starts_with("retired") {
                return Err(DomainError::rule(format!("{} is retired", command.sku)));
            }
            Ok(vec![DomainEvent::of(&StockReserved { sku: command.sku })?])
        }),
        Arc::new(events.clone()),
        emitter.clone(),
    )
    .configure(config);
    Arc::new(stock).spawn(commands.subscribe(Stock::named_aggregate()));

    let dispatcher = DomainEventDispatcher::new(Arc::new(commands.clone()), emitter.clone()).saga(
        SagaFunction::on(
            FunctionInfo::new("sales", "fulfilment", "on_order_placed"),
            |event: OrderPlaced, _: &DomainEventStream| {
                event
                    .lines
                    .into_iter()
                    .map(|sku| {
                        CommandMessage::of(
                            Stock::named_aggregate().aggregate_id(sku.clone()),
                            &ReserveStock { sku },
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()
            },
        ),
    );
    Arc::new(dispatcher).spawn(events.subscribe());

    CommandGateway::new(Arc::new(commands), registry, emitter, config.wait.clone())
}

fn place(lines: &[&str]) -> Result<CommandMessage> {
    Ok(CommandMessage::of(
        Order::named_aggregate().generate_aggregate_id(),
        &PlaceOrder {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        },
    )?)
}

fn fulfilment_chain(command: &CommandMessage) -> Arc<WaitingForChain> {
    Arc::new(WaitingForChain::new(
        command.id.clone(),
        FunctionInfo::processor("sales", "fulfilment"),
        StageTarget::new(CommandStage::Processed, FunctionInfo::any()),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Wait Chain Demo ===\n");

    let config = SourcingConfig::from_json(r#"{ "wait": { "default_timeout_ms": 5000 } }"#)?;
    let gateway = start_node(&config);

    // 1. Wait for processing only
    println!("1. Waiting for PROCESSED...");
    let processed = gateway
        .send_and_wait_for_processed(place(&["sku-1"])?)
        .await
        .context("order was not processed")?;
    println!(
        "   Processed {} at version {:?}\n",
        processed.aggregate_id, processed.aggregate_version
    );

    // 2. Wait for the saga and every reservation it spawned
    println!("2. Waiting for the fulfilment chain...");
    let command = place(&["sku-1", "sku-2", "sku-3"])?;
    let chain = fulfilment_chain(&command);
    let mut progress = chain.waiting();
    let printer = tokio::spawn(async move {
        while let Some(signal) = progress.next().await {
            println!(
                "   - {} reached {} ({})",
                signal.command_id, signal.stage, signal.function
            );
        }
    });
    let done = gateway
        .send_and_wait(command, chain.clone(), None)
        .await
        .context("fulfilment chain did not complete")?;
    printer.await?;
    println!(
        "   Saga spawned {} reservations, all processed\n",
        done.commands.len()
    );

    // 3. A rejected reservation fails the chain
    println!("3. Waiting for a chain with a retired SKU...");
    let command = place(&["sku-4", "retired-9"])?;
    let chain = fulfilment_chain(&command);
    match gateway
        .send_and_wait(command, chain, Some(Duration::from_secs(2)))
        .await
    {
        Ok(_) => bail!("a retired SKU must fail the chain"),
        Err(error) => println!("   Chain failed as expected: {error}\n"),
    }

    println!("=== Demo Complete ===");
    Ok(())
}
