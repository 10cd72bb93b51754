//! Self-contained example: a bounded counter driven through the full
//! command -> event pipeline, with an executor-backed subscriber printing
//! each published event.
//!
//! Run with: `cargo run --example counter`

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fanout_es::{
    Aggregate, ApplyError, BoxError, CommandWrapper, Event, EventRecord, Executor,
    ExecutorOptions, Handle, HandleScoped, Handler, Manager, ScopedExecutor, ScopedHandler,
    State, Subscriber,
};

// ---------------------------------------------------------------------------
// Counter state and events
// ---------------------------------------------------------------------------

/// A counter bounded to `0..=10`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CounterState {
    total: i64,
    version: u64,
}

/// Event payload: the counter's total was set to `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TotalSet {
    value: i64,
}

impl State for CounterState {
    fn version(&self) -> u64 {
        self.version
    }

    fn fold(&self, event: &dyn EventRecord) -> Result<Self, ApplyError> {
        match event.payload_as::<TotalSet>() {
            Some(set) => Ok(Self {
                total: set.value,
                version: event.sequence_number(),
            }),
            None => Err(ApplyError::UnhandledVariant {
                payload_type: event.payload_type(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands and domain operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Increment;

#[derive(Debug, Clone)]
struct Decrement;

#[derive(Debug, thiserror::Error)]
enum CounterViolation {
    #[error("total too high")]
    TooHigh,
    #[error("total too low")]
    TooLow,
}

trait CounterOps {
    fn increment(&self) -> Result<(), CounterViolation>;
    fn decrement(&self) -> Result<(), CounterViolation>;
}

impl CounterOps for Aggregate<CounterState> {
    fn increment(&self) -> Result<(), CounterViolation> {
        if self.state().total >= 10 {
            return Err(CounterViolation::TooHigh);
        }
        self.stage(TotalSet {
            value: self.state().total + 1,
        });
        Ok(())
    }

    fn decrement(&self) -> Result<(), CounterViolation> {
        if self.state().total <= 0 {
            return Err(CounterViolation::TooLow);
        }
        self.stage(TotalSet {
            value: self.state().total - 1,
        });
        Ok(())
    }
}

struct IncrementHandler;

#[async_trait]
impl HandleScoped<CommandWrapper<Increment>, Aggregate<CounterState>> for IncrementHandler {
    async fn handle(
        &self,
        _wrapper: Arc<CommandWrapper<Increment>>,
        aggregate: Arc<Aggregate<CounterState>>,
    ) -> Result<(), BoxError> {
        aggregate.increment()?;
        Ok(())
    }
}

struct DecrementHandler;

#[async_trait]
impl HandleScoped<CommandWrapper<Decrement>, Aggregate<CounterState>> for DecrementHandler {
    async fn handle(
        &self,
        _wrapper: Arc<CommandWrapper<Decrement>>,
        aggregate: Arc<Aggregate<CounterState>>,
    ) -> Result<(), BoxError> {
        aggregate.decrement()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event handlers (projection + audit log)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AuditLog {
    lines: Mutex<Vec<String>>,
}

struct PrintTotalHandler;

#[async_trait]
impl Handle<Event<TotalSet>> for PrintTotalHandler {
    async fn handle(&self, event: Arc<Event<TotalSet>>) -> Result<(), BoxError> {
        println!(
            "  event #{} by `{}`: total set to {}",
            event.sequence_number, event.user_id, event.data.value
        );
        Ok(())
    }
}

struct AuditTotalHandler {
    log: Arc<AuditLog>,
}

#[async_trait]
impl Handle<Event<TotalSet>> for AuditTotalHandler {
    async fn handle(&self, event: Arc<Event<TotalSet>>) -> Result<(), BoxError> {
        self.log
            .lines
            .lock()
            .unwrap()
            .push(format!("total={} seq={}", event.data.value, event.sequence_number));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Composition root
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Explicit registration call site: the handler lists an application
    // supplies at startup.
    let commands = ScopedExecutor::new(
        [
            ScopedHandler::from_handle(IncrementHandler),
            ScopedHandler::from_handle(DecrementHandler),
        ],
        ExecutorOptions::default(),
    );

    let audit = Arc::new(AuditLog::default());
    let events = Executor::new(
        [
            Handler::from_handle(PrintTotalHandler),
            Handler::from_handle(AuditTotalHandler {
                log: Arc::clone(&audit),
            }),
        ],
        ExecutorOptions::default(),
    );

    let manager = Manager::new(commands);
    let subscriber = Arc::new(Subscriber::new(events));
    let subscription = manager.stream().subscribe(subscriber.clone());

    // Rehydrate from a prior history, then run a few commands.
    manager
        .load_state([Event::record(TotalSet { value: 5 }, "initial", 1)])
        .await?;
    println!("loaded state: total = {}", manager.state().await.total);

    manager.execute(Increment, "alex").await?;
    manager.execute(Increment, "brook").await?;
    manager.execute(Decrement, "casey").await?;

    let state = manager.state().await;
    println!(
        "final state: total = {}, version = {}",
        state.total, state.version
    );
    println!("committed events: {}", manager.events().len());
    println!("subscriber saw {} events", subscriber.events().len());
    println!("audit log: {:?}", audit.lines.lock().unwrap());

    // A domain violation aborts the cycle without touching state.
    for _ in 0..5 {
        let _ = manager.execute(Increment, "alex").await;
    }
    match manager.execute(Increment, "alex").await {
        Err(err) => println!("rejected as expected: {err}"),
        Ok(_) => println!("unexpected success"),
    }

    subscription.unsubscribe();
    Ok(())
}
