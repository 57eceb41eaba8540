//! Фоновые задачи с прогрессом и кооперативной отменой.
//!
//! Каждая задача идёт в своём именованном потоке; [`Scheduler::submit`]
//! сразу возвращает [`TaskHandle`]. Состояния:
//! `Pending -> Running -> {Completed, Failed, Cancelled}`, из конечного
//! состояния выхода нет.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Последний прогресс задачи. `percent` равен `None`, пока неопределён.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub percent: Option<u8>,
    pub message: String,
}

#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(LedgerError),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed(_) => TaskState::Completed,
            Self::Failed(_) => TaskState::Failed,
            Self::Cancelled => TaskState::Cancelled,
        }
    }

    /// `Cancelled` превращается в [`LedgerError::Cancelled`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Completed(v) => Ok(v),
            Self::Failed(e) => Err(e),
            Self::Cancelled => Err(LedgerError::Cancelled),
        }
    }
}

#[derive(Debug, Default)]
struct CancelNode {
    flag: AtomicBool,
    parent: Option<Arc<CancelNode>>,
}

/// Флаг отмены, общий для задачи и её помощников. Дочерний токен отменён,
/// если отменён он сам или любой предок; отмена дочернего родителя не трогает.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelNode>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self(Arc::new(CancelNode {
            flag: AtomicBool::new(false),
            parent: Some(Arc::clone(&self.0)),
        }))
    }

    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.0);
        while let Some(n) = node {
            if n.flag.load(Ordering::Acquire) {
                return true;
            }
            node = n.parent.as_ref();
        }
        false
    }

    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LedgerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Колбэки прогресса и завершения. Вызываются в потоке воркера.
pub trait TaskObserver: Send + Sync {
    fn on_started(&self, _id: TaskId, _description: &str) {}
    fn on_progress(&self, _id: TaskId, _progress: &Progress) {}
    fn on_finished(&self, _id: TaskId, _state: TaskState) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub description: String,
    pub state: TaskState,
}

struct Status {
    state: TaskState,
    progress: Progress,
}

/// Часть задачи без типа результата; общая для воркера, хэндла и реестра.
struct Monitor {
    id: TaskId,
    description: String,
    cancel: CancelToken,
    status: Mutex<Status>,
    changed: Condvar,
    /// Хэндл отпущен до завершения задачи.
    detached: AtomicBool,
}

impl Monitor {
    fn state(&self) -> TaskState {
        self.status.lock().state
    }

    fn set_state(&self, state: TaskState) {
        let mut status = self.status.lock();
        if status.state.is_terminal() {
            return;
        }
        status.state = state;
        self.changed.notify_all();
    }

    fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            description: self.description.clone(),
            state: self.state(),
        }
    }
}

type Registry = Arc<Mutex<IndexMap<TaskId, Arc<Monitor>>>>;

/// Передаётся в функцию задачи.
pub struct TaskContext {
    monitor: Arc<Monitor>,
    observer: Option<Arc<dyn TaskObserver>>,
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.monitor.id
    }

    /// Сообщить прогресс; `percent` зажимается в 0..=100.
    pub fn report(&self, percent: f64, message: impl Into<String>) {
        let percent = if percent.is_nan() {
            0
        } else {
            percent.clamp(0.0, 100.0).round() as u8
        };
        self.publish(Progress {
            percent: Some(percent),
            message: message.into(),
        });
    }

    pub fn report_indeterminate(&self, message: impl Into<String>) {
        self.publish(Progress {
            percent: None,
            message: message.into(),
        });
    }

    fn publish(&self, progress: Progress) {
        self.monitor.status.lock().progress = progress.clone();
        if let Some(obs) = &self.observer {
            obs.on_progress(self.monitor.id, &progress);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.monitor.cancel.is_cancelled()
    }

    /// `Err(LedgerError::Cancelled)`, если запрошена отмена.
    pub fn checkpoint(&self) -> Result<()> {
        self.monitor.cancel.checkpoint()
    }

    /// Токен для вспомогательных потоков задачи.
    pub fn cancel_token(&self) -> CancelToken {
        self.monitor.cancel.clone()
    }
}

pub struct TaskHandle<T> {
    monitor: Arc<Monitor>,
    outcome: Arc<Mutex<Option<TaskOutcome<T>>>>,
    registry: Registry,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.monitor.id
    }

    pub fn description(&self) -> &str {
        &self.monitor.description
    }

    pub fn state(&self) -> TaskState {
        self.monitor.state()
    }

    pub fn progress(&self) -> Progress {
        self.monitor.status.lock().progress.clone()
    }

    /// Запросить отмену. Задача увидит её на ближайшей контрольной точке.
    pub fn cancel(&self) {
        debug!(task = self.monitor.id, "cancel requested");
        self.monitor.cancel.cancel();
    }

    /// Ждать конечного состояния задачи.
    pub fn wait(self) -> TaskOutcome<T> {
        {
            let mut status = self.monitor.status.lock();
            while !status.state.is_terminal() {
                self.monitor.changed.wait(&mut status);
            }
        }
        self.take_outcome()
    }

    /// Ждать не дольше `timeout`; возвращает конечное состояние, если оно наступило.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskState> {
        let deadline = Instant::now() + timeout;
        let mut status = self.monitor.status.lock();
        while !status.state.is_terminal() {
            if self
                .monitor
                .changed
                .wait_until(&mut status, deadline)
                .timed_out()
            {
                break;
            }
        }
        status.state.is_terminal().then_some(status.state)
    }

    /// Результат, если задача завершена; иначе хэндл обратно.
    pub fn try_outcome(self) -> std::result::Result<TaskOutcome<T>, Self> {
        if self.state().is_terminal() {
            Ok(self.take_outcome())
        } else {
            Err(self)
        }
    }

    fn take_outcome(&self) -> TaskOutcome<T> {
        // записан до публикации конечного состояния
        self.outcome.lock().take().unwrap_or(TaskOutcome::Cancelled)
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if self.monitor.state().is_terminal() {
            registry.shift_remove(&self.monitor.id);
        } else {
            self.monitor.detached.store(true, Ordering::Release);
        }
    }
}

#[derive(Clone, Default)]
pub struct Scheduler {
    next_id: Arc<AtomicU64>,
    registry: Registry,
    observer: Option<Arc<dyn TaskObserver>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Задачи, чей результат ещё не забрали, в порядке запуска.
    pub fn active(&self) -> Vec<TaskInfo> {
        self.registry.lock().values().map(|m| m.info()).collect()
    }

    pub fn submit<T, F>(&self, description: impl Into<String>, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> Result<T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let monitor = Arc::new(Monitor {
            id,
            description: description.into(),
            cancel: CancelToken::new(),
            status: Mutex::new(Status {
                state: TaskState::Pending,
                progress: Progress::default(),
            }),
            changed: Condvar::new(),
            detached: AtomicBool::new(false),
        });
        let outcome = Arc::new(Mutex::new(None));
        self.registry.lock().insert(id, Arc::clone(&monitor));

        let worker = Worker {
            ctx: TaskContext {
                monitor: Arc::clone(&monitor),
                observer: self.observer.clone(),
            },
            outcome: Arc::clone(&outcome),
            registry: Arc::clone(&self.registry),
        };
        let spawned = std::thread::Builder::new()
            .name(format!("ledgerio-task-{id}"))
            .spawn(move || worker.run(work));
        if let Err(e) = spawned {
            warn!(task = id, error = %e, "failed to spawn worker thread");
            fail_unspawned(&monitor, self.observer.as_deref(), &outcome, e);
        }

        TaskHandle {
            monitor,
            outcome,
            registry: Arc::clone(&self.registry),
        }
    }
}

struct Worker<T> {
    ctx: TaskContext,
    outcome: Arc<Mutex<Option<TaskOutcome<T>>>>,
    registry: Registry,
}

impl<T> Worker<T> {
    fn run<F>(self, work: F)
    where
        F: FnOnce(&TaskContext) -> Result<T>,
    {
        let monitor = &self.ctx.monitor;
        monitor.set_state(TaskState::Running);
        if let Some(obs) = &self.ctx.observer {
            obs.on_started(monitor.id, &monitor.description);
        }

        // отмена, пришедшая в Pending, срабатывает до начала работы
        let result = match self.ctx.checkpoint() {
            Ok(()) => panic::catch_unwind(AssertUnwindSafe(|| work(&self.ctx)))
                .unwrap_or_else(|payload| Err(LedgerError::WorkerPanicked(panic_message(payload)))),
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(v) => TaskOutcome::Completed(v),
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Failed(e),
        };
        let state = outcome.state();
        debug!(task = monitor.id, ?state, "task finished");

        *self.outcome.lock() = Some(outcome);
        // ожидающие просыпаются только после колбэка завершения
        if let Some(obs) = &self.ctx.observer {
            obs.on_finished(monitor.id, state);
        }
        monitor.set_state(state);

        let mut registry = self.registry.lock();
        if monitor.detached.load(Ordering::Acquire) {
            registry.shift_remove(&monitor.id);
        }
    }
}

/// Задача без запущенного потока всё равно проходит через `Running`.
fn fail_unspawned<T>(
    monitor: &Monitor,
    observer: Option<&dyn TaskObserver>,
    outcome: &Mutex<Option<TaskOutcome<T>>>,
    error: std::io::Error,
) {
    monitor.set_state(TaskState::Running);
    if let Some(obs) = observer {
        obs.on_started(monitor.id, &monitor.description);
    }
    *outcome.lock() = Some(TaskOutcome::Failed(LedgerError::Io(error)));
    if let Some(obs) = observer {
        obs.on_finished(monitor.id, TaskState::Failed);
    }
    monitor.set_state(TaskState::Failed);
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn completed_task_returns_value() {
        let scheduler = Scheduler::new();
        let handle = scheduler.submit("answer", |ctx| {
            ctx.report(50.0, "half way");
            Ok(42)
        });
        let id = handle.id();
        assert!(matches!(handle.wait(), TaskOutcome::Completed(42)));
        assert!(scheduler.active().iter().all(|t| t.id != id));
    }

    #[test]
    fn runs_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let handle = Scheduler::new().submit("where", |_| Ok(std::thread::current().id()));
        let worker = handle.wait().into_result().unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn failure_carries_the_error() {
        let handle: TaskHandle<()> = Scheduler::new().submit("fails", |_| {
            Err(LedgerError::CapabilityUnavailable("nothing"))
        });
        match handle.wait() {
            TaskOutcome::Failed(LedgerError::CapabilityUnavailable(what)) => assert_eq!(what, "nothing"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn cancel_during_run_ends_cancelled() {
        let (started_tx, started_rx) = mpsc::channel();
        let handle: TaskHandle<u64> = Scheduler::new().submit("spin", move |ctx| {
            started_tx.send(()).ok();
            loop {
                ctx.checkpoint()?;
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        started_rx.recv().unwrap();
        assert_eq!(handle.state(), TaskState::Running);
        handle.cancel();
        assert!(matches!(handle.wait(), TaskOutcome::Cancelled));
    }

    #[test]
    fn cancel_while_pending_still_passes_through_running() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl TaskObserver for Recorder {
            fn on_started(&self, _: TaskId, _: &str) {
                self.0.lock().push("started".into());
            }
            fn on_finished(&self, _: TaskId, state: TaskState) {
                self.0.lock().push(format!("{state:?}"));
            }
        }
        let rec = Arc::new(Recorder::default());
        let scheduler = Scheduler::new().with_observer(rec.clone());
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        // отмена может прийти до или после старта воркера
        let handle: TaskHandle<()> = scheduler.submit("never", move |ctx| {
            gate_rx.recv().ok();
            ctx.checkpoint()
        });
        handle.cancel();
        drop(gate_tx);
        assert!(matches!(handle.wait(), TaskOutcome::Cancelled));
        assert_eq!(*rec.0.lock(), ["started", "Cancelled"]);
    }

    #[test]
    fn unspawned_task_is_started_then_failed() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl TaskObserver for Recorder {
            fn on_started(&self, _: TaskId, _: &str) {
                self.0.lock().push("started".into());
            }
            fn on_finished(&self, _: TaskId, state: TaskState) {
                self.0.lock().push(format!("{state:?}"));
            }
        }
        let monitor = Arc::new(Monitor {
            id: 9,
            description: "no thread".into(),
            cancel: CancelToken::new(),
            status: Mutex::new(Status {
                state: TaskState::Pending,
                progress: Progress::default(),
            }),
            changed: Condvar::new(),
            detached: AtomicBool::new(false),
        });
        let outcome: Arc<Mutex<Option<TaskOutcome<()>>>> = Arc::new(Mutex::new(None));
        let rec = Recorder::default();
        let error = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
        fail_unspawned(&monitor, Some(&rec as &dyn TaskObserver), &outcome, error);

        assert_eq!(*rec.0.lock(), ["started", "Failed"]);
        let handle = TaskHandle {
            monitor,
            outcome,
            registry: Registry::default(),
        };
        assert_eq!(handle.state(), TaskState::Failed);
        assert!(matches!(handle.wait(), TaskOutcome::Failed(LedgerError::Io(_))));
    }

    #[test]
    fn panics_become_failures() {
        let handle: TaskHandle<()> = Scheduler::new().submit("boom", |_| panic!("kaboom"));
        match handle.wait() {
            TaskOutcome::Failed(LedgerError::WorkerPanicked(msg)) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn progress_is_clamped() {
        let (tx, rx) = mpsc::channel();
        let handle = Scheduler::new().submit("clamp", move |ctx| {
            ctx.report(250.0, "over");
            rx.recv().ok();
            Ok(())
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.progress().percent.is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.progress().percent, Some(100));
        tx.send(()).unwrap();
        assert_eq!(handle.wait_timeout(Duration::from_secs(5)), Some(TaskState::Completed));
    }

    #[test]
    fn try_outcome_returns_handle_while_running() {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = Scheduler::new().submit("blocked", move |_| {
            rx.recv().ok();
            Ok(7)
        });
        let handle = handle.try_outcome().err().expect("still running");
        tx.send(()).unwrap();
        assert!(matches!(handle.wait(), TaskOutcome::Completed(7)));
    }

    #[test]
    fn child_token_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn registry_lists_running_tasks() {
        let scheduler = Scheduler::new();
        let (tx, rx) = mpsc::channel::<()>();
        let handle = scheduler.submit("listed", move |_| {
            rx.recv().ok();
            Ok(())
        });
        let active = scheduler.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].description, "listed");
        tx.send(()).unwrap();
        handle.wait();
        assert!(scheduler.active().is_empty());
    }
}
