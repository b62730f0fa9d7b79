//! The owner of tree and navigation state.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::app::navigation;
use crate::app::orchestrator::BuildOrchestrator;
use crate::app::settings::{NavigationSettings, SettingsStore};
use crate::app::solution::SolutionModel;
use crate::app::tree::{TaskTree, TaskTreeBuilder};
use crate::domain::model::{BuildOutcome, SolutionEvent};
use crate::infra::engine::BuildEngine;

/// Drives tree rebuilds from solution events and user actions, and keeps the
/// expanded-node set and filter text in sync with the settings store.
///
/// All tree mutation happens through `&mut self`; evaluation and builds run on
/// worker contexts and only hand results back.
pub struct TaskExplorer {
    solution: SolutionModel,
    builder: TaskTreeBuilder,
    orchestrator: Arc<BuildOrchestrator>,
    settings: SettingsStore,
    events: Option<broadcast::Receiver<SolutionEvent>>,
    tree: Option<TaskTree>,
    filter: String,
    expanded: BTreeSet<String>,
    /// Decoded from the last load or save; reconciled against each new tree.
    saved_expanded: BTreeSet<String>,
}

impl TaskExplorer {
    pub fn new(
        solution: SolutionModel,
        engine: Arc<dyn BuildEngine>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            builder: TaskTreeBuilder::new(solution.clone()),
            orchestrator: Arc::new(BuildOrchestrator::new(solution.clone(), engine)),
            solution,
            settings,
            events: None,
            tree: None,
            filter: String::new(),
            expanded: BTreeSet::new(),
            saved_expanded: BTreeSet::new(),
        }
    }

    /// Restore navigation settings, start listening for solution events, and
    /// build the tree if a solution is already open.
    pub async fn activate(&mut self) -> Result<()> {
        let saved = match self.settings.load() {
            Ok(saved) => saved.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable navigation settings");
                NavigationSettings::default()
            }
        };
        self.filter = saved.filter;
        self.saved_expanded = navigation::decode(&saved.expanded_targets);
        self.events = Some(self.solution.subscribe());
        tracing::debug!(
            filter = %self.filter,
            expanded = self.saved_expanded.len(),
            "task explorer activated"
        );
        self.rebuild().await
    }

    /// Persist navigation state and stop listening for events.
    pub fn deactivate(&mut self) -> Result<()> {
        self.save()?;
        self.events = None;
        Ok(())
    }

    /// Rebuild the tree with the current filter. A no-op when no solution is open.
    pub async fn rebuild(&mut self) -> Result<()> {
        let Some(tree) = self.builder.build_tree(&self.filter).await? else {
            return Ok(());
        };

        self.expanded = if self.saved_expanded.is_empty() && !self.filter.is_empty() {
            tree.keys().collect()
        } else {
            navigation::reconcile(&self.saved_expanded, &tree)
        };
        self.tree = Some(tree);
        Ok(())
    }

    /// Save the current navigation state, then rebuild.
    pub async fn refresh(&mut self) -> Result<()> {
        self.save()?;
        self.rebuild().await
    }

    /// Change the filter text and refresh.
    pub async fn set_filter(&mut self, filter: impl Into<String>) -> Result<()> {
        self.filter = filter.into();
        self.refresh().await
    }

    pub async fn handle_event(&mut self, event: SolutionEvent) -> Result<()> {
        match event {
            SolutionEvent::Opened => self.rebuild().await,
            SolutionEvent::Closed => {
                self.tree = None;
                self.expanded.clear();
                Ok(())
            }
        }
    }

    /// Apply every solution event received since the last call. Returns how many were handled.
    pub async fn process_pending_events(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            let Some(events) = self.events.as_mut() else {
                return Ok(handled);
            };
            let event = match events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "solution events lagged, resyncing");
                    if self.solution.is_open() {
                        SolutionEvent::Opened
                    } else {
                        SolutionEvent::Closed
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(handled),
            };
            self.handle_event(event).await?;
            handled += 1;
        }
    }

    /// Mark a file node expanded or collapsed. Returns `false` if the file is not in the tree.
    pub fn set_expanded(&mut self, key: &str, expanded: bool) -> bool {
        let present = self.tree.as_ref().is_some_and(|tree| tree.contains(key));
        if !present {
            return false;
        }
        if expanded {
            self.expanded.insert(key.to_owned());
        } else {
            self.expanded.remove(key);
        }
        true
    }

    pub fn is_expanded(&self, key: &str) -> bool {
        self.expanded.contains(key)
    }

    /// Write the filter and expanded nodes to the settings store.
    ///
    /// Without a tree the previously saved expansions are kept as they are.
    pub fn save(&mut self) -> Result<()> {
        let expanded_targets = if self.tree.is_some() {
            navigation::encode(&self.expanded)
        } else {
            navigation::encode(&self.saved_expanded)
        };
        self.saved_expanded = navigation::decode(&expanded_targets);
        self.settings.save(&NavigationSettings {
            filter: self.filter.clone(),
            expanded_targets,
        })
    }

    pub async fn run_target(&self, project: &Path, target: &str) -> Option<BuildOutcome> {
        self.orchestrator.run(project, target).await
    }

    pub fn abort_all(&self) {
        self.orchestrator.cancel_all();
    }

    pub fn dump_properties(&self, project: &Path) {
        self.orchestrator.dump_all_properties(project);
    }

    pub fn tree(&self) -> Option<&TaskTree> {
        self.tree.as_ref()
    }

    pub fn expanded(&self) -> &BTreeSet<String> {
        &self.expanded
    }
}
