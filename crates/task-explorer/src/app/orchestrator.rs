//! Build orchestration: submit single targets, track them, cancel them all.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::app::solution::SolutionModel;
use crate::domain::model::{BuildOutcome, BuildRequest, RunState};
use crate::infra::engine::BuildEngine;

/// Written when a property dump finds nothing.
pub const NO_PROPERTIES: &str = "no properties";

/// An outstanding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: u64,
    pub project: PathBuf,
    pub target: String,
    pub state: RunState,
    pub submitted_at: OffsetDateTime,
}

/// Submits targets to the build engine. Any number of runs may be outstanding.
pub struct BuildOrchestrator {
    solution: SolutionModel,
    engine: Arc<dyn BuildEngine>,
    runs: DashMap<u64, RunRecord>,
    next_id: AtomicU64,
    busy: watch::Sender<usize>,
    /// Replaced on every `cancel_all`; runs hold the one current when they were registered.
    generation: Mutex<CancellationToken>,
}

impl BuildOrchestrator {
    pub fn new(solution: SolutionModel, engine: Arc<dyn BuildEngine>) -> Self {
        let (busy, _) = watch::channel(0);
        Self {
            solution,
            engine,
            runs: DashMap::new(),
            next_id: AtomicU64::new(1),
            busy,
            generation: Mutex::new(CancellationToken::new()),
        }
    }

    /// Build `target` of `project` with the solution's current global properties.
    ///
    /// Returns `None` without doing anything when no solution is open.
    /// Failures and cancellation are reported through the outcome, never retried.
    pub async fn run(&self, project: &Path, target: &str) -> Option<BuildOutcome> {
        if !self.solution.is_open() {
            tracing::debug!(project = %project.display(), target, "no solution open, run ignored");
            return None;
        }

        self.solution.show_output();
        let request = BuildRequest {
            project_path: project.to_path_buf(),
            target: target.to_owned(),
            global_properties: self.solution.global_properties(),
        };

        let cancelled = self.generation.lock().clone();
        let run = self.track(project, target);
        let stamp = run
            .submitted_at()
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        self.solution.write_output_line(&format!(
            "[{stamp}] Build started: {target} ({})",
            project.display()
        ));
        tracing::info!(id = run.id, project = %project.display(), target, "build submitted");

        run.set_state(RunState::Executing);
        let outcome = tokio::select! {
            biased;
            outcome = self.engine.submit(request, self.solution.output()) => outcome,
            _ = cancelled.cancelled() => BuildOutcome::Cancelled,
        };
        drop(run);

        self.solution.write_output_line(&format!(
            "Build {outcome}: {target} ({})",
            project.display()
        ));
        tracing::info!(project = %project.display(), target, %outcome, "build finished");
        Some(outcome)
    }

    /// Request cancellation of every outstanding run. Returns immediately.
    pub fn cancel_all(&self) {
        self.solution.show_output();
        tracing::info!(outstanding = self.runs.len(), "cancelling all builds");
        let previous = std::mem::replace(&mut *self.generation.lock(), CancellationToken::new());
        previous.cancel();
        self.engine.cancel_all();
    }

    /// Write the project's evaluated properties, sorted by name, to the output channel.
    pub fn dump_all_properties(&self, project: &Path) {
        self.solution.show_output();
        let properties = self.solution.all_properties(project);
        if properties.is_empty() {
            self.solution.write_output_line(NO_PROPERTIES);
            return;
        }
        for (name, value) in &properties {
            self.solution.write_output_line(&format!("{name} = {value}"));
        }
    }

    /// Snapshot of outstanding runs, oldest first.
    pub fn outstanding(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.runs.iter().map(|entry| entry.value().clone()).collect();
        runs.sort_by_key(|run| run.id);
        runs
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow() > 0
    }

    /// Number of outstanding runs; drives a progress indicator.
    pub fn busy(&self) -> watch::Receiver<usize> {
        self.busy.subscribe()
    }

    fn track(&self, project: &Path, target: &str) -> RunGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.runs.insert(
            id,
            RunRecord {
                id,
                project: project.to_path_buf(),
                target: target.to_owned(),
                state: RunState::Submitted,
                submitted_at: OffsetDateTime::now_utc(),
            },
        );
        self.busy.send_modify(|count| *count += 1);
        RunGuard {
            orchestrator: self,
            id,
        }
    }
}

/// Removes the run record when the run ends, including when its future is dropped.
struct RunGuard<'a> {
    orchestrator: &'a BuildOrchestrator,
    id: u64,
}

impl RunGuard<'_> {
    fn set_state(&self, state: RunState) {
        if let Some(mut record) = self.orchestrator.runs.get_mut(&self.id) {
            record.state = state;
        }
    }

    fn submitted_at(&self) -> OffsetDateTime {
        self.orchestrator
            .runs
            .get(&self.id)
            .map(|record| record.submitted_at)
            .unwrap_or_else(OffsetDateTime::now_utc)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.runs.remove(&self.id);
        self.orchestrator
            .busy
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::infra::config::Config;
    use crate::infra::output::{MemoryOutput, OutputSink};
    use crate::infra::solution::SolutionHost;
    use crate::infra::workspace::FsSolutionHost;

    /// `Quick` succeeds, `Broken` fails, anything else waits for cancellation.
    /// `Gated` only picks up its cancellation token once `gate` is released.
    struct ScriptedEngine {
        generation: Mutex<CancellationToken>,
        requests: Mutex<Vec<BuildRequest>>,
        gate: Notify,
    }

    impl ScriptedEngine {
        fn new() -> Self {
            Self {
                generation: Mutex::new(CancellationToken::new()),
                requests: Mutex::new(Vec::new()),
                gate: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl BuildEngine for ScriptedEngine {
        async fn submit(&self, request: BuildRequest, log: Arc<dyn OutputSink>) -> BuildOutcome {
            if request.target == "Gated" {
                self.gate.notified().await;
            }
            let token = self.generation.lock().clone();
            let target = request.target.clone();
            self.requests.lock().push(request);
            log.write_line(&format!("engine: {target}"));
            match target.as_str() {
                "Quick" => BuildOutcome::Succeeded,
                "Broken" => BuildOutcome::Failed {
                    reason: "exit code 1".into(),
                },
                _ => {
                    token.cancelled().await;
                    BuildOutcome::Cancelled
                }
            }
        }

        fn cancel_all(&self) {
            let previous =
                std::mem::replace(&mut *self.generation.lock(), CancellationToken::new());
            previous.cancel();
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        project: PathBuf,
        host: Arc<FsSolutionHost>,
        output: Arc<MemoryOutput>,
        engine: Arc<ScriptedEngine>,
        orchestrator: Arc<BuildOrchestrator>,
    }

    fn fixture(project_xml: &str) -> Result<Fixture> {
        let temp = tempfile::tempdir()?;
        let project = temp.path().join("App.csproj");
        fs::write(&project, project_xml)?;

        let host = Arc::new(FsSolutionHost::new(Config::default())?);
        host.open(temp.path())?;
        let project = host.project_files().remove(0);
        let output = Arc::new(MemoryOutput::new());
        let engine = Arc::new(ScriptedEngine::new());
        let solution = SolutionModel::new(host.clone(), output.clone());
        let orchestrator = Arc::new(BuildOrchestrator::new(solution, engine.clone()));
        Ok(Fixture {
            _temp: temp,
            project,
            host,
            output,
            engine,
            orchestrator,
        })
    }

    #[tokio::test]
    async fn run_submits_request_with_global_properties() -> Result<()> {
        let fx = fixture("<Project><Target Name=\"Quick\" /></Project>")?;

        let outcome = fx.orchestrator.run(&fx.project, "Quick").await;
        assert_eq!(outcome, Some(BuildOutcome::Succeeded));

        let requests = fx.engine.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, "Quick");
        assert_eq!(
            requests[0].global_properties.get("Configuration").map(String::as_str),
            Some("Debug")
        );

        let lines = fx.output.lines();
        assert!(lines[0].contains("Build started: Quick"));
        assert_eq!(lines[1], "engine: Quick");
        assert!(lines[2].starts_with("Build succeeded: Quick"));
        assert!(fx.output.show_requests() > 0);
        assert!(!fx.orchestrator.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn failed_build_is_terminal() -> Result<()> {
        let fx = fixture("<Project />")?;
        let outcome = fx.orchestrator.run(&fx.project, "Broken").await;
        assert_eq!(
            outcome,
            Some(BuildOutcome::Failed {
                reason: "exit code 1".into()
            })
        );
        assert_eq!(fx.engine.requests.lock().len(), 1);
        assert!(fx.output.lines().iter().any(|l| l.starts_with("Build failed")));
        Ok(())
    }

    #[tokio::test]
    async fn run_is_a_no_op_without_solution() -> Result<()> {
        let fx = fixture("<Project />")?;
        fx.host.close();

        assert_eq!(fx.orchestrator.run(&fx.project, "Quick").await, None);
        assert!(fx.engine.requests.lock().is_empty());
        assert!(fx.output.lines().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_all_cancels_every_executing_run() -> Result<()> {
        let fx = fixture("<Project />")?;

        let finished = fx.orchestrator.run(&fx.project, "Quick").await;
        assert_eq!(finished, Some(BuildOutcome::Succeeded));

        let mut busy = fx.orchestrator.busy();
        let spawn_run = |target: &'static str| {
            let orchestrator = fx.orchestrator.clone();
            let project = fx.project.clone();
            tokio::spawn(async move { orchestrator.run(&project, target).await })
        };
        let first = spawn_run("Wait");
        let second = spawn_run("WaitLonger");

        busy.wait_for(|count| *count == 2).await?;
        // Both runs are inside the engine once they have logged.
        while fx.output.lines().iter().filter(|l| l.starts_with("engine: Wait")).count() < 2 {
            tokio::task::yield_now().await;
        }
        let states: Vec<_> = fx.orchestrator.outstanding().iter().map(|r| r.state).collect();
        assert_eq!(states, vec![RunState::Executing, RunState::Executing]);

        fx.orchestrator.cancel_all();
        assert_eq!(first.await?, Some(BuildOutcome::Cancelled));
        assert_eq!(second.await?, Some(BuildOutcome::Cancelled));
        assert_eq!(finished, Some(BuildOutcome::Succeeded));
        assert!(fx.orchestrator.outstanding().is_empty());

        // Later runs get a fresh cancellation generation.
        assert_eq!(
            fx.orchestrator.run(&fx.project, "Quick").await,
            Some(BuildOutcome::Succeeded)
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_all_reaches_run_not_yet_picked_up_by_engine() -> Result<()> {
        let fx = fixture("<Project />")?;
        let mut busy = fx.orchestrator.busy();
        let pending = {
            let orchestrator = fx.orchestrator.clone();
            let project = fx.project.clone();
            tokio::spawn(async move { orchestrator.run(&project, "Gated").await })
        };
        busy.wait_for(|count| *count == 1).await?;

        fx.orchestrator.cancel_all();
        fx.engine.gate.notify_one();
        assert_eq!(pending.await?, Some(BuildOutcome::Cancelled));
        assert!(!fx.orchestrator.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn dropping_a_run_releases_its_record() -> Result<()> {
        let fx = fixture("<Project />")?;
        let run = fx.orchestrator.run(&fx.project, "Wait");
        let result = tokio::time::timeout(std::time::Duration::from_millis(20), run).await;
        assert!(result.is_err());
        assert!(fx.orchestrator.outstanding().is_empty());
        assert!(!fx.orchestrator.is_busy());
        Ok(())
    }

    #[test]
    fn dump_writes_sorted_properties() -> Result<()> {
        let fx = fixture(
            r#"<Project><PropertyGroup><Zeta>z</Zeta><Alpha>a</Alpha></PropertyGroup></Project>"#,
        )?;
        fx.orchestrator.dump_all_properties(&fx.project);

        let lines = fx.output.lines();
        let alpha = lines.iter().position(|l| l == "Alpha = a").expect("Alpha line");
        let zeta = lines.iter().position(|l| l == "Zeta = z").expect("Zeta line");
        assert!(alpha < zeta);
        assert!(lines.contains(&"Configuration = Debug".to_string()));
        Ok(())
    }

    #[test]
    fn dump_reports_no_properties_once() -> Result<()> {
        let fx = fixture("<Project />")?;
        let unreadable = fx.project.with_file_name("Missing.csproj");
        fx.orchestrator.dump_all_properties(&unreadable);
        assert_eq!(fx.output.lines(), vec![NO_PROPERTIES.to_string()]);
        Ok(())
    }
}
