use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::Notify;

use testloader::context::{ContextFactory, ContextFuture, ExecutionContext, RunListener};
use testloader::events::OutputStream;
use testloader::project::Project;
use testloader::types::{TestNode, TestResult};

/// What the next `load` returns.
#[derive(Debug, Clone)]
pub enum LoadBehaviour {
    Tree(TestNode),
    Fail(String),
}

/// What the next `run` does.
#[derive(Debug, Clone)]
pub enum RunBehaviour {
    /// Report every case as passed.
    Pass,
    /// Report one line of stdout, then pass.
    Output(String),
    /// Report every case as failed with this message.
    FailCases(String),
    /// Return an error from the run itself.
    Error(String),
    /// Block until [`FakeContextFactory::release_run`], then pass.
    Gated,
}

struct Shared {
    loads: Mutex<VecDeque<LoadBehaviour>>,
    fallback_tree: Mutex<Option<TestNode>>,
    runs: Mutex<VecDeque<RunBehaviour>>,
    default_run: Mutex<RunBehaviour>,
    fail_unload: AtomicBool,
    calls: Mutex<Vec<String>>,
    created: AtomicUsize,
    unloaded: AtomicUsize,
    cancelled_runs: AtomicUsize,
    gate: Notify,
    run_started: Notify,
}

impl Shared {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_load(&self) -> LoadBehaviour {
        if let Some(next) = self.loads.lock().unwrap().pop_front() {
            return next;
        }
        match self.fallback_tree.lock().unwrap().clone() {
            Some(tree) => LoadBehaviour::Tree(tree),
            None => LoadBehaviour::Fail("no tree scripted".to_string()),
        }
    }

    fn next_run(&self) -> RunBehaviour {
        if let Some(next) = self.runs.lock().unwrap().pop_front() {
            return next;
        }
        self.default_run.lock().unwrap().clone()
    }
}

/// Scripted execution contexts.
///
/// Every context created by one factory shares the script and the call log.
#[derive(Clone)]
pub struct FakeContextFactory {
    shared: Arc<Shared>,
}

impl FakeContextFactory {
    /// Contexts load `tree` unless a load was queued with [`push_load`].
    ///
    /// [`push_load`]: FakeContextFactory::push_load
    pub fn new(tree: TestNode) -> Self {
        Self {
            shared: Arc::new(Shared {
                loads: Mutex::new(VecDeque::new()),
                fallback_tree: Mutex::new(Some(tree)),
                runs: Mutex::new(VecDeque::new()),
                default_run: Mutex::new(RunBehaviour::Pass),
                fail_unload: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
                created: AtomicUsize::new(0),
                unloaded: AtomicUsize::new(0),
                cancelled_runs: AtomicUsize::new(0),
                gate: Notify::new(),
                run_started: Notify::new(),
            }),
        }
    }

    pub fn push_load(&self, behaviour: LoadBehaviour) {
        self.shared.loads.lock().unwrap().push_back(behaviour);
    }

    /// Replace the tree returned once the queued loads are used up.
    pub fn set_tree(&self, tree: TestNode) {
        *self.shared.fallback_tree.lock().unwrap() = Some(tree);
    }

    pub fn push_run(&self, behaviour: RunBehaviour) {
        self.shared.runs.lock().unwrap().push_back(behaviour);
    }

    pub fn set_default_run(&self, behaviour: RunBehaviour) {
        *self.shared.default_run.lock().unwrap() = behaviour;
    }

    pub fn fail_unloads(&self, fail: bool) {
        self.shared.fail_unload.store(fail, Ordering::SeqCst);
    }

    /// Let one gated run complete.
    pub fn release_run(&self) {
        self.shared.gate.notify_one();
    }

    /// Wait until a run has begun executing inside a context.
    pub async fn wait_run_started(&self) {
        self.shared.run_started.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn unloaded(&self) -> usize {
        self.shared.unloaded.load(Ordering::SeqCst)
    }

    /// Runs whose future was dropped before finishing.
    pub fn cancelled_runs(&self) -> usize {
        self.shared.cancelled_runs.load(Ordering::SeqCst)
    }
}

impl ContextFactory for FakeContextFactory {
    fn create(&self) -> anyhow::Result<Arc<dyn ExecutionContext>> {
        let id = self.shared.created.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.record(format!("create:{id}"));
        Ok(Arc::new(FakeContext {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeContext {
    id: usize,
    shared: Arc<Shared>,
}

/// Counts a run as cancelled if its future is dropped while armed.
struct CancelGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.cancelled_runs.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ExecutionContext for FakeContext {
    fn load<'a>(&'a self, project: &'a Project) -> ContextFuture<'a, TestNode> {
        Box::pin(async move {
            self.shared
                .record(format!("load:{}:{}", self.id, project.path().display()));
            match self.shared.next_load() {
                LoadBehaviour::Tree(tree) => Ok(tree),
                LoadBehaviour::Fail(msg) => Err(anyhow!(msg)),
            }
        })
    }

    fn run<'a>(
        &'a self,
        node: &'a TestNode,
        listener: Arc<dyn RunListener>,
    ) -> ContextFuture<'a, TestResult> {
        Box::pin(async move {
            self.shared
                .record(format!("run:{}:{}", self.id, node.full_name));
            let behaviour = self.shared.next_run();
            let mut guard = CancelGuard {
                shared: &self.shared,
                armed: true,
            };
            self.shared.run_started.notify_one();

            let result = match behaviour {
                RunBehaviour::Pass => Ok(report(node, listener.as_ref(), None)),
                RunBehaviour::Output(text) => {
                    listener.output(OutputStream::Stdout, &text);
                    Ok(report(node, listener.as_ref(), None))
                }
                RunBehaviour::FailCases(msg) => Ok(report(node, listener.as_ref(), Some(&msg))),
                RunBehaviour::Error(msg) => Err(anyhow!(msg)),
                RunBehaviour::Gated => {
                    self.shared.gate.notified().await;
                    Ok(report(node, listener.as_ref(), None))
                }
            };

            guard.armed = false;
            result
        })
    }

    fn unload(&self) -> ContextFuture<'_, ()> {
        Box::pin(async move {
            self.shared.record(format!("unload:{}", self.id));
            if self.shared.fail_unload.load(Ordering::SeqCst) {
                return Err(anyhow!("context {} refused to unload", self.id));
            }
            self.shared.unloaded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn report(node: &TestNode, listener: &dyn RunListener, failure: Option<&str>) -> TestResult {
    if node.is_suite() {
        listener.suite_started(node);
        let children = node
            .children
            .iter()
            .map(|child| report(child, listener, failure))
            .collect();
        let result = TestResult::suite(node.full_name.clone(), children);
        listener.suite_finished(&result);
        return result;
    }

    listener.test_started(node);
    let result = if node.ignored {
        TestResult::ignored(node.full_name.clone())
    } else {
        match failure {
            Some(msg) => TestResult::failed(node.full_name.clone(), msg),
            None => TestResult::passed(node.full_name.clone()),
        }
    };
    listener.test_finished(&result);
    result
}
