// Copyright 2025 Cowboy AI, LLC.

//! Fan-out of appended streams to projections, event handlers and sagas
//!
//! Every processor that runs for a stream emits its stage signal through the
//! wait request carried by the stream header. Sagas may answer with
//! downstream commands; those are dispatched with the propagated wait before
//! the saga's own signal is emitted, and their ids are listed in it.

use super::bus::DomainEventReceiver;
use crate::command::{CommandBus, CommandMessage};
use crate::errors::{DomainError, ErrorInfoCapable};
use crate::events::{DomainEvent, DomainEventBody, DomainEventStream};
use crate::wait::{
    CommandStage, FunctionInfo, Materialized, UpstreamKind, WaitSignal, WaitSignalBuilder,
    WaitSignalEmitter,
};
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A projection or event handler function
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Identity reported in the stage signal
    fn function(&self) -> FunctionInfo;

    /// Whether the processor reacts to `event`
    fn supports(&self, event: &DomainEvent) -> bool;

    /// Handle one event of `stream`
    async fn handle(&self, event: &DomainEvent, stream: &DomainEventStream)
        -> Result<(), DomainError>;
}

/// A saga function reacting to events with downstream commands
#[async_trait]
pub trait Saga: Send + Sync {
    /// Identity reported in the `SAGA_HANDLED` signal
    fn function(&self) -> FunctionInfo;

    /// Whether the saga reacts to `event`
    fn supports(&self, event: &DomainEvent) -> bool;

    /// Commands to dispatch in reaction to one event of `stream`
    async fn handle(
        &self,
        event: &DomainEvent,
        stream: &DomainEventStream,
    ) -> Result<Vec<CommandMessage>, DomainError>;
}

/// [`EventProcessor`] over a closure taking the typed body of `E`
pub struct EventFunction<E, F> {
    function: FunctionInfo,
    handler: F,
    _event: PhantomData<fn(E)>,
}

impl<E, F> EventFunction<E, F>
where
    E: DomainEventBody,
    F: Fn(E, &DomainEventStream) -> Result<(), DomainError> + Send + Sync,
{
    /// Handle events of type `E` with `handler`
    pub fn on(function: FunctionInfo, handler: F) -> Self {
        Self {
            function,
            handler,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F> EventProcessor for EventFunction<E, F>
where
    E: DomainEventBody,
    F: Fn(E, &DomainEventStream) -> Result<(), DomainError> + Send + Sync,
{
    fn function(&self) -> FunctionInfo {
        self.function.clone()
    }

    fn supports(&self, event: &DomainEvent) -> bool {
        event.is::<E>()
    }

    async fn handle(
        &self,
        event: &DomainEvent,
        stream: &DomainEventStream,
    ) -> Result<(), DomainError> {
        (self.handler)(event.body_as::<E>()?, stream)
    }
}

/// [`Saga`] over a closure taking the typed body of `E`
pub struct SagaFunction<E, F> {
    function: FunctionInfo,
    handler: F,
    _event: PhantomData<fn(E)>,
}

impl<E, F> SagaFunction<E, F>
where
    E: DomainEventBody,
    F: Fn(E, &DomainEventStream) -> Result<Vec<CommandMessage>, DomainError> + Send + Sync,
{
    /// React to events of type `E` with `handler`
    pub fn on(function: FunctionInfo, handler: F) -> Self {
        Self {
            function,
            handler,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F> Saga for SagaFunction<E, F>
where
    E: DomainEventBody,
    F: Fn(E, &DomainEventStream) -> Result<Vec<CommandMessage>, DomainError> + Send + Sync,
{
    fn function(&self) -> FunctionInfo {
        self.function.clone()
    }

    fn supports(&self, event: &DomainEvent) -> bool {
        event.is::<E>()
    }

    async fn handle(
        &self,
        event: &DomainEvent,
        stream: &DomainEventStream,
    ) -> Result<Vec<CommandMessage>, DomainError> {
        (self.handler)(event.body_as::<E>()?, stream)
    }
}

/// Runs the registered processors for every published stream
pub struct DomainEventDispatcher {
    projections: Vec<Arc<dyn EventProcessor>>,
    event_handlers: Vec<Arc<dyn EventProcessor>>,
    sagas: Vec<Arc<dyn Saga>>,
    command_bus: Arc<dyn CommandBus>,
    emitter: WaitSignalEmitter,
}

impl fmt::Debug for DomainEventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<T: ?Sized>(
            items: &[Arc<T>],
            function: impl Fn(&T) -> FunctionInfo,
        ) -> Vec<String> {
            items
                .iter()
                .map(|item| function(item.as_ref()).to_string())
                .collect()
        }
        f.debug_struct("DomainEventDispatcher")
            .field("projections", &names(&self.projections, |p| p.function()))
            .field("event_handlers", &names(&self.event_handlers, |h| h.function()))
            .field("sagas", &names(&self.sagas, |s| s.function()))
            .finish()
    }
}

impl DomainEventDispatcher {
    /// Create a dispatcher sending saga commands to `command_bus`
    pub fn new(command_bus: Arc<dyn CommandBus>, emitter: WaitSignalEmitter) -> Self {
        Self {
            projections: Vec::new(),
            event_handlers: Vec::new(),
            sagas: Vec::new(),
            command_bus,
            emitter,
        }
    }

    /// Register a projection; projections run in registration order
    pub fn projection(mut self, projection: impl EventProcessor + 'static) -> Self {
        self.projections.push(Arc::new(projection));
        self
    }

    /// Register an event handler
    pub fn event_handler(mut self, handler: impl EventProcessor + 'static) -> Self {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Register a saga
    pub fn saga(mut self, saga: impl Saga + 'static) -> Self {
        self.sagas.push(Arc::new(saga));
        self
    }

    /// Run every processor for `stream`
    pub async fn dispatch(&self, stream: &DomainEventStream) {
        debug!(
            aggregate_id = %stream.aggregate_id,
            version = stream.version,
            events = stream.size(),
            "Dispatching event stream"
        );
        futures::join!(
            self.project(stream),
            self.handle_events(stream),
            self.run_sagas(stream)
        );
    }

    /// Dispatch every stream received on `receiver`, in arrival order
    pub fn spawn(self: Arc<Self>, mut receiver: DomainEventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(stream) = receiver.recv().await {
                self.dispatch(&stream).await;
            }
            debug!("Event stream subscription closed");
        })
    }

    /// Projections run per event in stream order. The signal of the last run
    /// relevant to the awaited function is marked as the last projection.
    async fn project(&self, stream: &DomainEventStream) {
        let awaited = match Materialized::extract(&stream.header).map(|w| w.materialized) {
            Some(Materialized::Stage(target)) if target.stage == CommandStage::Projected => {
                target.function
            }
            _ => FunctionInfo::any(),
        };
        let runs: Vec<(&DomainEvent, &Arc<dyn EventProcessor>)> = stream
            .iter()
            .flat_map(|event| {
                self.projections
                    .iter()
                    .filter(move |projection| projection.supports(event))
                    .map(move |projection| (event, projection))
            })
            .collect();
        let last = runs
            .iter()
            .rposition(|(_, projection)| awaited.matches(&projection.function()));

        for (index, (event, projection)) in runs.into_iter().enumerate() {
            let function = projection.function();
            let result = projection.handle(event, stream).await;
            let signal = signal(stream, CommandStage::Projected, function, result.as_ref().err())
                .is_last_projection(Some(index) == last);
            self.emitter.emit(&stream.header, signal).await;
        }
    }

    async fn handle_events(&self, stream: &DomainEventStream) {
        for event in stream.iter() {
            for handler in self.event_handlers.iter().filter(|h| h.supports(event)) {
                let result = handler.handle(event, stream).await;
                let signal = signal(
                    stream,
                    CommandStage::EventHandled,
                    handler.function(),
                    result.as_ref().err(),
                );
                self.emitter.emit(&stream.header, signal).await;
            }
        }
    }

    /// Each saga reports once per stream, listing every command it dispatched
    async fn run_sagas(&self, stream: &DomainEventStream) {
        let wait = Materialized::extract(&stream.header);
        for saga in &self.sagas {
            let events: Vec<&DomainEvent> =
                stream.iter().filter(|event| saga.supports(event)).collect();
            if events.is_empty() {
                continue;
            }

            let mut dispatched = Vec::new();
            let mut failure = None;
            'events: for event in events {
                let commands = match saga.handle(event, stream).await {
                    Ok(commands) => commands,
                    Err(e) => {
                        failure = Some(e.to_error_info());
                        break;
                    }
                };
                for mut command in commands {
                    if let Some(wait) = &wait {
                        wait.propagate_to(command.header_mut(), UpstreamKind::DomainEvent);
                    }
                    let command_id = command.id.clone();
                    if let Err(e) = self.command_bus.send(command).await {
                        warn!(
                            saga = %saga.function(),
                            command_id = %command_id,
                            error = %e,
                            "Saga command could not be dispatched"
                        );
                        failure = Some(e.to_error_info());
                        break 'events;
                    }
                    dispatched.push(command_id);
                }
            }

            let mut signal = WaitSignal::builder(
                stream.command_id.clone(),
                stream.aggregate_id.clone(),
                CommandStage::SagaHandled,
            )
            .function(saga.function())
            .aggregate_version(stream.version)
            .commands(dispatched);
            if let Some(failure) = &failure {
                signal = signal.error(failure);
            }
            self.emitter.emit(&stream.header, signal).await;
        }
    }
}

fn signal(
    stream: &DomainEventStream,
    stage: CommandStage,
    function: FunctionInfo,
    error: Option<&DomainError>,
) -> WaitSignalBuilder {
    let signal = WaitSignal::builder(stream.command_id.clone(), stream.aggregate_id.clone(), stage)
        .function(function)
        .aggregate_version(stream.version);
    match error {
        Some(e) => {
            warn!(
                aggregate_id = %stream.aggregate_id,
                stage = %stage,
                error = %e,
                "Event processor failed"
            );
            signal.error(&e.to_error_info())
        }
        None => signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandBody, InMemoryCommandBus};
    use crate::identifiers::{AggregateId, NamedAggregate};
    use crate::wait::{
        ChainTarget, LocalCommandWaitNotifier, StageTarget, WaitStrategy, WaitStrategyRegistry,
        WaitingForStage,
    };
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Placed {
        total: i64,
    }

    impl DomainEventBody for Placed {
        const NAME: &'static str = "placed";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Reserve {
        quantity: i64,
    }

    impl CommandBody for Reserve {
        const NAME: &'static str = "reserve";
    }

    fn order_id() -> AggregateId {
        NamedAggregate::new("sales", "order").aggregate_id("o-1")
    }

    fn placed_stream(events: usize, wait: Materialized, wait_command_id: &str) -> DomainEventStream {
        let mut builder =
            DomainEventStream::builder(order_id(), 1).command(wait_command_id, wait_command_id);
        for total in 0..events {
            builder = builder.event(&Placed { total: total as i64 }).unwrap();
        }
        wait.propagate(builder.header_mut(), "local", wait_command_id);
        builder.build()
    }

    fn projection(name: &str, runs: Arc<AtomicUsize>) -> impl EventProcessor {
        EventFunction::on(
            FunctionInfo::new("sales", "order_view", name),
            move |_: Placed, _: &DomainEventStream| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
    }

    fn setup() -> (WaitStrategyRegistry, WaitSignalEmitter, InMemoryCommandBus) {
        let registry = WaitStrategyRegistry::new();
        let emitter =
            WaitSignalEmitter::new(Arc::new(LocalCommandWaitNotifier::new(registry.clone())));
        (registry, emitter, InMemoryCommandBus::new())
    }

    #[tokio::test]
    async fn test_projected_completes_after_last_projection_of_last_event() {
        let (registry, emitter, bus) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let dispatcher = DomainEventDispatcher::new(Arc::new(bus), emitter)
            .projection(projection("summary", runs.clone()))
            .projection(projection("totals", runs.clone()));

        let waiting = Arc::new(WaitingForStage::projected("cmd-1", FunctionInfo::any()));
        registry.register(waiting.clone());
        let stream = placed_stream(
            2,
            Materialized::Stage(waiting.target().clone()),
            "cmd-1",
        );
        dispatcher.dispatch(&stream).await;

        assert_eq!(runs.load(Ordering::SeqCst), 4);
        let signal = waiting.wait().await.unwrap();
        assert!(signal.is_last_projection);
        assert_eq!(signal.function.name, "totals");
        assert_eq!(waiting.sink().signals().len(), 4);
    }

    #[tokio::test]
    async fn test_projected_with_function_filter() {
        let (registry, emitter, bus) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let dispatcher = DomainEventDispatcher::new(Arc::new(bus), emitter)
            .projection(projection("summary", runs.clone()))
            .projection(projection("totals", runs.clone()));

        let waiting = Arc::new(WaitingForStage::projected(
            "cmd-1",
            FunctionInfo::new("sales", "order_view", "summary"),
        ));
        registry.register(waiting.clone());
        let stream = placed_stream(
            1,
            Materialized::Stage(waiting.target().clone()),
            "cmd-1",
        );
        dispatcher.dispatch(&stream).await;

        let signal = waiting.wait().await.unwrap();
        assert_eq!(signal.function.name, "summary");
        assert!(signal.is_last_projection);
    }

    #[tokio::test]
    async fn test_event_handler_error_fails_wait() {
        let (registry, emitter, bus) = setup();
        let dispatcher = DomainEventDispatcher::new(Arc::new(bus), emitter).event_handler(
            EventFunction::on(
                FunctionInfo::new("sales", "notifier", "on_placed"),
                |_: Placed, _: &DomainEventStream| Err(DomainError::InternalError("mail down".into())),
            ),
        );

        let waiting = Arc::new(WaitingForStage::event_handled("cmd-1", FunctionInfo::any()));
        registry.register(waiting.clone());
        let stream = placed_stream(1, Materialized::Stage(waiting.target().clone()), "cmd-1");
        dispatcher.dispatch(&stream).await;

        let error = waiting.wait().await.unwrap_err();
        assert!(error.to_string().contains("mail down"));
    }

    #[tokio::test]
    async fn test_saga_commands_carry_tail_wait_and_are_listed() {
        let (registry, emitter, bus) = setup();
        let inventory = NamedAggregate::new("stock", "inventory");
        let mut commands = bus.subscribe(inventory.clone());
        let dispatcher = DomainEventDispatcher::new(Arc::new(bus), emitter).saga(SagaFunction::on(
            FunctionInfo::new("sales", "fulfilment", "on_placed"),
            move |event: Placed, _: &DomainEventStream| {
                Ok(vec![CommandMessage::of(
                    inventory.aggregate_id("sku-1"),
                    &Reserve {
                        quantity: event.total,
                    },
                )?])
            },
        ));

        let waiting = Arc::new(WaitingForStage::saga_handled("cmd-1", FunctionInfo::any()));
        registry.register(waiting.clone());
        let chain = Materialized::Chain(ChainTarget::new(
            FunctionInfo::any(),
            StageTarget::new(CommandStage::Processed, FunctionInfo::any()),
        ));
        let stream = placed_stream(2, chain, "cmd-1");
        dispatcher.dispatch(&stream).await;

        let first = commands.recv().await.unwrap();
        let second = commands.recv().await.unwrap();
        let wait = Materialized::extract(&first.header).unwrap();
        assert_eq!(wait.wait_command_id, "cmd-1");
        assert_eq!(
            wait.materialized,
            Materialized::Stage(StageTarget::new(CommandStage::Processed, FunctionInfo::any()))
        );

        let signal = waiting.wait().await.unwrap();
        assert_eq!(signal.commands, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_stage_wait_does_not_follow_saga_commands() {
        let (_, emitter, bus) = setup();
        let inventory = NamedAggregate::new("stock", "inventory");
        let mut commands = bus.subscribe(inventory.clone());
        let dispatcher = DomainEventDispatcher::new(Arc::new(bus), emitter).saga(SagaFunction::on(
            FunctionInfo::new("sales", "fulfilment", "on_placed"),
            move |_: Placed, _: &DomainEventStream| {
                Ok(vec![CommandMessage::of(
                    inventory.aggregate_id("sku-1"),
                    &Reserve { quantity: 1 },
                )?])
            },
        ));

        let stream = placed_stream(
            1,
            Materialized::Stage(StageTarget::new(CommandStage::Processed, FunctionInfo::any())),
            "cmd-1",
        );
        dispatcher.dispatch(&stream).await;
        let command = commands.recv().await.unwrap();
        assert!(Materialized::extract(&command.header).is_none());
    }
}
