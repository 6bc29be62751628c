use super::*;
use crate::{async_trait, error::AddChildError, BehaviorNode, Context, NodeBase, NodeStatus};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::Instant;
use NodeStatus::{Failure, Running, Success};

#[derive(Default)]
struct Counters {
    executes: AtomicUsize,
    aborts: AtomicUsize,
    resets: AtomicUsize,
    finishes: AtomicUsize,
}

impl Counters {
    fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

type Log = Arc<Mutex<Vec<&'static str>>>;

/// Plays back a list of statuses, repeating the last one, and records every
/// call.
struct Scripted {
    base: NodeBase,
    label: &'static str,
    script: Vec<NodeStatus>,
    log: Log,
    counters: Arc<Counters>,
}

impl Scripted {
    fn new(label: &'static str, script: &[NodeStatus], log: &Log) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let node = Self {
            base: NodeBase::new(label),
            label,
            script: script.to_vec(),
            log: log.clone(),
            counters: counters.clone(),
        };
        (node, counters)
    }

    fn boxed(label: &'static str, script: &[NodeStatus], log: &Log) -> Box<dyn BehaviorNode> {
        Box::new(Self::new(label, script, log).0)
    }
}

#[async_trait]
impl BehaviorNode for Scripted {
    crate::node_base!();

    async fn execute(&self) -> NodeStatus {
        let call = self.counters.executes.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.label);
        self.script[call.min(self.script.len() - 1)]
    }

    async fn abort(&self) {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
    }

    async fn reset(&self) {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sleeps before succeeding. Abort is only counted, the sleep runs on.
struct Slow {
    base: NodeBase,
    delay: Duration,
    counters: Arc<Counters>,
}

#[async_trait]
impl BehaviorNode for Slow {
    crate::node_base!();

    async fn execute(&self) -> NodeStatus {
        self.counters.executes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.counters.finishes.fetch_add(1, Ordering::SeqCst);
        NodeStatus::Success
    }

    async fn abort(&self) {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

fn log() -> Log {
    Arc::default()
}

fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_sequence() {
    let log = log();
    let mut tree = SequenceNode::default();
    tree.add_child(Scripted::boxed("a", &[Success], &log)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Success], &log)).unwrap();

    assert_eq!(tree.execute().await, Success);
    assert_eq!(entries(&log), ["a", "b"]);
}

#[tokio::test]
async fn test_sequence_stops_at_failure() {
    let log = log();
    let mut tree = SequenceNode::default();
    tree.add_child(Scripted::boxed("a", &[Success], &log)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Failure], &log)).unwrap();
    tree.add_child(Scripted::boxed("c", &[Success], &log)).unwrap();

    assert_eq!(tree.execute().await, Failure);
    assert_eq!(entries(&log), ["a", "b"]);
    assert_eq!(tree.cursor(), 0);
}

#[tokio::test]
async fn test_sequence_resumes_running_child() {
    let log = log();
    let mut tree = SequenceNode::default();
    tree.add_child(Scripted::boxed("a", &[Success], &log)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Running, Success], &log))
        .unwrap();
    tree.add_child(Scripted::boxed("c", &[Success], &log)).unwrap();

    assert_eq!(tree.execute().await, Running);
    assert_eq!(entries(&log), ["a", "b"]);
    assert_eq!(tree.cursor(), 1);

    // The first child is not invoked again
    assert_eq!(tree.execute().await, Success);
    assert_eq!(entries(&log), ["a", "b", "b", "c"]);
    assert_eq!(tree.cursor(), 0);
}

#[tokio::test]
async fn test_empty_composites() {
    assert_eq!(SequenceNode::default().execute().await, Success);
    assert_eq!(SelectorNode::default().execute().await, Failure);
}

#[tokio::test]
async fn test_sequence_reset_and_abort() {
    let log = log();
    let (running, counters) = Scripted::new("a", &[Success], &log);
    let mut tree = SequenceNode::default();
    tree.add_child(Box::new(running)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Running], &log)).unwrap();

    assert_eq!(tree.execute().await, Running);
    assert_eq!(tree.cursor(), 1);

    tree.abort().await;
    assert_eq!(counters.aborts(), 1);
    assert_eq!(tree.cursor(), 1);

    tree.reset().await;
    assert_eq!(counters.resets(), 1);
    assert_eq!(tree.cursor(), 0);
}

#[tokio::test]
async fn test_selector() {
    let log = log();
    let mut tree = SelectorNode::default();
    tree.add_child(Scripted::boxed("a", &[Failure], &log)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Success], &log)).unwrap();
    tree.add_child(Scripted::boxed("c", &[Success], &log)).unwrap();

    assert_eq!(tree.execute().await, Success);
    assert_eq!(entries(&log), ["a", "b"]);
    assert_eq!(tree.cursor(), 0);

    let log2 = Arc::default();
    let mut tree = SelectorNode::default();
    tree.add_child(Scripted::boxed("a", &[Failure], &log2)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Failure], &log2)).unwrap();

    assert_eq!(tree.execute().await, Failure);
    assert_eq!(entries(&log2), ["a", "b"]);
}

#[tokio::test]
async fn test_selector_resumes_running_child() {
    let log = log();
    let mut tree = SelectorNode::default();
    tree.add_child(Scripted::boxed("a", &[Failure], &log)).unwrap();
    tree.add_child(Scripted::boxed("b", &[Running, Failure], &log))
        .unwrap();
    tree.add_child(Scripted::boxed("c", &[Success], &log)).unwrap();

    assert_eq!(tree.execute().await, Running);
    assert_eq!(tree.cursor(), 1);
    assert_eq!(tree.execute().await, Success);
    assert_eq!(entries(&log), ["a", "b", "b", "c"]);
    assert_eq!(tree.cursor(), 0);
}

async fn parallel(success: i32, failure: i32, script: &[NodeStatus]) -> NodeStatus {
    let log = log();
    let mut tree = ParallelNode::new(success, failure);
    for status in script {
        tree.add_child(Scripted::boxed("p", &[*status], &log)).unwrap();
    }
    tree.execute().await
}

#[tokio::test]
async fn test_parallel_thresholds() {
    assert_eq!(parallel(2, 2, &[Success, Success, Failure]).await, Success);
    assert_eq!(parallel(2, 1, &[Success, Failure, Running]).await, Failure);
    assert_eq!(parallel(2, 2, &[Success, Failure, Running]).await, Running);
    // Success is checked first
    assert_eq!(parallel(1, 1, &[Failure, Success]).await, Success);
    assert_eq!(parallel(1, 1, &[]).await, Running);
}

#[tokio::test]
async fn test_parallel_reticks_every_child() {
    let log = log();
    let (done, counters) = Scripted::new("done", &[Success], &log);
    let mut tree = ParallelNode::new(2, 1);
    tree.add_child(Box::new(done)).unwrap();
    let busy = Scripted::boxed("busy", &[Running], &log);
    tree.add_child(busy).unwrap();

    assert_eq!(tree.execute().await, Running);
    assert_eq!(tree.execute().await, Running);
    assert_eq!(counters.executes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_runs_children_concurrently() {
    let counters = Arc::new(Counters::default());
    let mut tree = ParallelNode::new(2, 1);
    for name in ["Left", "Right"] {
        tree.add_child(Box::new(Slow {
            base: NodeBase::new(name),
            delay: Duration::from_millis(100),
            counters: counters.clone(),
        }))
        .unwrap();
    }

    let start = Instant::now();
    assert_eq!(tree.execute().await, Success);
    assert_eq!(start.elapsed(), Duration::from_millis(100));
    assert_eq!(counters.finishes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exponential_backoff() {
    let log = log();
    let (child, counters) = Scripted::new("flaky", &[Failure], &log);
    let mut retry = RetryNode::new(3, 100, true);
    retry.add_child(Box::new(child)).unwrap();

    let start = Instant::now();
    assert_eq!(retry.execute().await, Failure);
    assert_eq!(counters.executes(), 3);
    // 100ms after the first attempt, 200ms after the second, none after the last
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_retry_fixed_backoff_until_success() {
    let log = log();
    let (child, counters) = Scripted::new("flaky", &[Failure, Failure, Success], &log);
    let mut retry = RetryNode::new(5, 100, false);
    retry.add_child(Box::new(child)).unwrap();

    let start = Instant::now();
    assert_eq!(retry.execute().await, Success);
    assert_eq!(counters.executes(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test]
async fn test_retry_edge_cases() {
    let log = log();
    let (child, counters) = Scripted::new("never", &[Success], &log);
    let mut retry = RetryNode::new(0, 100, true);
    retry.add_child(Box::new(child)).unwrap();
    assert_eq!(retry.execute().await, Failure);
    assert_eq!(counters.executes(), 0);

    let mut retry = RetryNode::default();
    let busy = Scripted::boxed("busy", &[Running], &log);
    retry.add_child(busy).unwrap();
    assert_eq!(retry.execute().await, Running);
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success() {
    let log = log();
    let (child, counters) = Scripted::new("flaky", &[Failure, Running, Success], &log);
    let mut retry = RetryUntilSuccessNode::new(3, 10);
    retry.add_child(Box::new(child)).unwrap();

    assert_eq!(retry.execute().await, Running);
    assert_eq!(retry.current_attempt(), 2);

    assert_eq!(retry.execute().await, Success);
    assert_eq!(counters.executes(), 3);
    assert_eq!(retry.current_attempt(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success_gives_up() {
    let log = log();
    let (child, counters) = Scripted::new("broken", &[Failure], &log);
    let mut retry = RetryUntilSuccessNode::new(2, 10);
    retry.add_child(Box::new(child)).unwrap();

    assert_eq!(retry.execute().await, Failure);
    assert_eq!(counters.executes(), 2);
    assert_eq!(retry.current_attempt(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_aborts_slow_child_once() {
    let counters = Arc::new(Counters::default());
    let mut timeout = TimeoutNode::new(50);
    timeout
        .add_child(Box::new(Slow {
            base: NodeBase::new("Slow"),
            delay: Duration::from_secs(10),
            counters: counters.clone(),
        }))
        .unwrap();

    let start = Instant::now();
    assert_eq!(timeout.execute().await, Failure);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
    assert_eq!(counters.executes(), 1);
    assert_eq!(counters.aborts(), 1);
    assert_eq!(counters.finishes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_child_running() {
    let counters = Arc::new(Counters::default());
    let mut timeout = TimeoutNode::new(50);
    timeout
        .add_child(Box::new(Slow {
            base: NodeBase::new("Slow"),
            delay: Duration::from_millis(200),
            counters: counters.clone(),
        }))
        .unwrap();

    assert_eq!(timeout.execute().await, Failure);
    assert_eq!(counters.finishes(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(counters.finishes(), 1);
    assert_eq!(counters.aborts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_passes_fast_child_through() {
    let counters = Arc::new(Counters::default());
    let mut timeout = TimeoutNode::new(500);
    timeout
        .add_child(Box::new(Slow {
            base: NodeBase::new("Slow"),
            delay: Duration::from_millis(20),
            counters: counters.clone(),
        }))
        .unwrap();

    assert_eq!(timeout.execute().await, Success);
    assert_eq!(counters.aborts(), 0);
}

#[tokio::test]
async fn test_repeat_counts_successes() {
    let log = log();
    let (child, counters) = Scripted::new("work", &[Success], &log);
    let mut repeat = RepeatNode::new(3, true);
    repeat.add_child(Box::new(child)).unwrap();

    assert_eq!(repeat.execute().await, Running);
    assert_eq!(repeat.execute().await, Running);
    assert_eq!(repeat.current_iteration(), 2);
    assert_eq!(repeat.execute().await, Success);
    assert_eq!(repeat.current_iteration(), 0);
    assert_eq!(counters.executes(), 3);
    assert_eq!(counters.resets(), 3);
}

#[tokio::test]
async fn test_repeat_failure_policy() {
    let log = log();
    let mut repeat = RepeatNode::new(5, true);
    repeat
        .add_child(Scripted::boxed("work", &[Success, Failure], &log))
        .unwrap();
    assert_eq!(repeat.execute().await, Running);
    assert_eq!(repeat.execute().await, Failure);
    assert_eq!(repeat.current_iteration(), 0);

    let mut repeat = RepeatNode::new(2, false);
    repeat
        .add_child(Scripted::boxed("work", &[Failure], &log))
        .unwrap();
    assert_eq!(repeat.execute().await, Running);
    assert_eq!(repeat.execute().await, Success);
}

#[tokio::test]
async fn test_repeat_forever_and_zero() {
    let log = log();
    let mut repeat = RepeatNode::default();
    repeat
        .add_child(Scripted::boxed("work", &[Success], &log))
        .unwrap();
    for _ in 0..5 {
        assert_eq!(repeat.execute().await, Running);
    }

    let (child, counters) = Scripted::new("work", &[Success], &log);
    let mut repeat = RepeatNode::new(0, true);
    repeat.add_child(Box::new(child)).unwrap();
    assert_eq!(repeat.execute().await, Success);
    assert_eq!(counters.executes(), 0);
}

#[tokio::test]
async fn test_inverter() {
    let log = log();
    for (input, output) in [(Success, Failure), (Failure, Success), (Running, Running)] {
        let mut inverter = InverterNode::default();
        inverter
            .add_child(Scripted::boxed("x", &[input], &log))
            .unwrap();
        assert_eq!(inverter.execute().await, output);
    }
}

#[tokio::test]
async fn test_succeeder() {
    let log = log();
    for (input, output) in [(Success, Success), (Failure, Success), (Running, Running)] {
        let mut succeeder = SucceederNode::default();
        succeeder
            .add_child(Scripted::boxed("x", &[input], &log))
            .unwrap();
        assert_eq!(succeeder.execute().await, output);
    }
}

#[tokio::test]
async fn test_decorator_child_slot() {
    assert_eq!(InverterNode::default().execute().await, Failure);
    assert_eq!(TimeoutNode::default().execute().await, Failure);
    assert_eq!(RetryNode::default().execute().await, Failure);

    let log = log();
    let mut inverter = InverterNode::default();
    inverter.add_child(Scripted::boxed("x", &[Success], &log)).unwrap();
    assert_eq!(
        inverter.add_child(Scripted::boxed("y", &[Success], &log)),
        Err(AddChildError::TooManyNodes)
    );
}

#[tokio::test(start_paused = true)]
async fn test_wait() {
    let wait = WaitNode::new(100);

    assert_eq!(wait.execute().await, Running);
    tokio::time::advance(Duration::from_millis(50)).await;
    assert_eq!(wait.execute().await, Running);
    tokio::time::advance(Duration::from_millis(60)).await;
    assert_eq!(wait.execute().await, Success);

    // Starts over after completing
    assert_eq!(wait.execute().await, Running);
    wait.reset().await;
    assert_eq!(wait.execute().await, Running);
}

#[tokio::test]
async fn test_set_blackboard_value() {
    let ctx = Arc::new(Context::default());
    ctx.set("Base", "42".to_owned());

    let mut node = SetBlackboardValueNode::new("Answer", "{Base}", "int");
    node.initialize(ctx.clone());
    assert_eq!(node.execute().await, Success);
    assert_eq!(ctx.get::<i32>("Answer"), Some(42));

    let mut node = SetBlackboardValueNode::new("Flag", "TRUE", "bool");
    node.initialize(ctx.clone());
    assert_eq!(node.execute().await, Success);
    assert_eq!(ctx.get::<bool>("Flag"), Some(true));

    let mut node = SetBlackboardValueNode::new("Answer", "forty-two", "int");
    node.initialize(ctx.clone());
    assert_eq!(node.execute().await, Failure);
    assert_eq!(ctx.get::<i32>("Answer"), Some(42));

    let mut node = SetBlackboardValueNode::new("", "x", "string");
    node.initialize(ctx.clone());
    assert_eq!(node.execute().await, Failure);
}

#[tokio::test]
async fn test_initialize_reaches_grandchildren() {
    let ctx = Arc::new(Context::default());

    let mut inverter = InverterNode::default();
    inverter
        .add_child(Box::new(SetBlackboardValueNode::new(
            "Deep", "value", "string",
        )))
        .unwrap();
    let mut tree = SequenceNode::default();
    tree.add_child(Box::new(inverter)).unwrap();
    tree.initialize(ctx.clone());

    assert_eq!(tree.execute().await, Failure);
    assert_eq!(ctx.get::<String>("Deep").as_deref(), Some("value"));
}

#[tokio::test]
async fn test_leaves() {
    assert_eq!(AlwaysSuccessNode::default().execute().await, Success);
    assert_eq!(ForceFailureNode::default().execute().await, Failure);
    assert_eq!(AlwaysSuccessNode::default().name(), "AlwaysSuccess");
}
