//! End-to-end install of a component set.
//!
//! The coordinator owns the session lifecycle: it loads or creates the
//! checkpoint, captures the snapshot before anything destructive happens,
//! orders the components, and drives each selected component's
//! instructions through the [`InstructionExecutor`]. Every transition is
//! checkpointed before the next one starts.
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use anyhow::Result;

use crate::checkpoint::{CheckpointManager, SessionStart};
use crate::context::InstallContext;
use crate::dialog::DialogPort;
use crate::error::InstallerError;
use crate::instructions::{ExitCode, InstructionExecutor};
use crate::logging::ComponentOutcome;
use crate::model::component::selected_ids;
use crate::model::{Action, Component, ComponentOption, InstallState, Instruction};
use crate::resolver;
use crate::snapshot::SnapshotManager;

/// Discrete transitions published while installing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// A component moved to a new state.
    ComponentStateChanged {
        /// Component id.
        id: String,
        /// The new state.
        state: InstallState,
    },
    /// One top-level instruction finished.
    InstructionFinished {
        /// Owning component id.
        component: String,
        /// Instruction id.
        instruction: String,
        /// How it ended.
        code: ExitCode,
    },
    /// A new pre-install snapshot was written.
    SnapshotCreated {
        /// Backup archive location.
        path: PathBuf,
    },
    /// The run finished without a session-fatal error.
    SessionCompleted {
        /// Final tallies.
        summary: InstallSummary,
    },
}

/// What happened to each component during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    /// Resolved install order.
    pub order: Vec<String>,
    /// Whether the order came from the cycle fallback.
    pub has_cycle: bool,
    /// Whether an existing session was resumed.
    pub resumed: bool,
    /// Installed in this run.
    pub installed: Vec<String>,
    /// Completed by an earlier run of the same session.
    pub already_installed: Vec<String>,
    /// Not selected.
    pub skipped: Vec<String>,
    /// An instruction failed.
    pub failed: Vec<String>,
    /// A dependency failed or was not installed.
    pub blocked: Vec<String>,
}

impl InstallSummary {
    /// No component failed or was blocked.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Drives a full install for one destination.
pub struct InstallCoordinator {
    executor: InstructionExecutor,
    dialog: Arc<dyn DialogPort>,
    events: Option<Sender<InstallEvent>>,
    checkpoint: CheckpointManager,
    snapshot: SnapshotManager,
}

impl std::fmt::Debug for InstallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallCoordinator")
            .field("executor", &self.executor)
            .field("dialog", &"<dyn DialogPort>")
            .field("events", &self.events.is_some())
            .field("checkpoint", &self.checkpoint)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl InstallCoordinator {
    /// Create a coordinator for `ctx.config.destination_path`.
    ///
    /// Dry runs keep the session in memory and never snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor's thread pool cannot be built.
    pub fn new(ctx: InstallContext, dialog: Arc<dyn DialogPort>) -> Result<Self> {
        let checkpoint = if ctx.is_dry_run() {
            CheckpointManager::ephemeral()
        } else {
            CheckpointManager::new()
        };
        let snapshot = SnapshotManager::new(&ctx.config.destination_path);
        Ok(Self {
            executor: InstructionExecutor::new(ctx)?,
            dialog,
            events: None,
            checkpoint,
            snapshot,
        })
    }

    /// Publish [`InstallEvent`]s on `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: Sender<InstallEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// The session record for this run.
    #[must_use]
    pub const fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    fn ctx(&self) -> &InstallContext {
        self.executor.context()
    }

    fn emit(&self, event: InstallEvent) {
        if let Some(sender) = &self.events
            && sender.send(event).is_err()
        {
            tracing::debug!("install event receiver dropped");
        }
    }

    /// Persist and publish `component`'s current state.
    fn sync_state(&self, component: &Component) -> Result<(), InstallerError> {
        self.checkpoint.update_component_state(component)?;
        self.emit(InstallEvent::ComponentStateChanged {
            id: component.id.clone(),
            state: component.state(),
        });
        Ok(())
    }

    /// Install every selected component of `components` in dependency
    /// order.
    ///
    /// Instruction failures do not abort the run: the failing component is
    /// marked `Failed`, its dependents `Blocked`, and independent
    /// components continue. The session file is removed only when nothing
    /// failed or was blocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination is missing, the session cannot
    /// be persisted, the snapshot cannot be captured, or the run is
    /// cancelled.
    pub fn install(&self, components: &mut [Component]) -> Result<InstallSummary, InstallerError> {
        let ctx = self.ctx().clone();
        let destination = ctx.config.destination_path.clone();
        if !ctx.fs.dir_exists(&destination) {
            return Err(InstallerError::MissingDestination(destination));
        }
        if ctx.cancel.is_cancelled() {
            return Err(InstallerError::Cancelled);
        }

        ctx.log.stage("Preparing session");
        let start = self.checkpoint.initialize(components, &destination)?;
        for component in components.iter_mut() {
            if component.reset_for_retry().is_some() {
                ctx.log
                    .info(&format!("retrying {} from the start", component.name));
                self.sync_state(component)?;
            }
        }

        if ctx.is_dry_run() {
            ctx.log.dry_run(&format!(
                "would snapshot {} to {}",
                destination.display(),
                self.snapshot.backup_path().display()
            ));
        } else if self.snapshot.ensure_snapshot(&destination, &ctx.cancel)? {
            ctx.log.info(&format!(
                "snapshot saved to {}",
                self.snapshot.backup_path().display()
            ));
            self.emit(InstallEvent::SnapshotCreated {
                path: self.snapshot.backup_path().to_path_buf(),
            });
        }

        let resolution = resolver::resolve(components);
        self.checkpoint.set_component_order(&resolution.order)?;
        if resolution.has_cycle {
            self.dialog.inform(
                "Some components must install before each other in a loop; \
                 they will be installed in the order they are listed.",
            );
        }

        let selected = selected_ids(components);
        let selected_names: Vec<String> = components
            .iter()
            .filter(|c| c.is_selected)
            .map(|c| c.name.clone())
            .collect();
        let positions: HashMap<String, usize> = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut summary = InstallSummary {
            order: resolution.order.clone(),
            has_cycle: resolution.has_cycle,
            resumed: start == SessionStart::Resumed,
            ..InstallSummary::default()
        };

        for id in &resolution.order {
            if ctx.cancel.is_cancelled() {
                ctx.log.warn("install cancelled; progress has been saved");
                return Err(InstallerError::Cancelled);
            }
            let Some(&pos) = positions.get(id) else {
                continue;
            };
            let unmet = Self::unmet_dependency(components, pos);
            let Some(component) = components.get_mut(pos) else {
                continue;
            };

            if !component.is_selected {
                ctx.log
                    .record_component(&component.name, ComponentOutcome::Skipped, Some("not selected"));
                summary.skipped.push(id.clone());
                continue;
            }
            match component.state() {
                InstallState::Completed => {
                    ctx.log.record_component(
                        &component.name,
                        ComponentOutcome::AlreadyInstalled,
                        None,
                    );
                    summary.already_installed.push(id.clone());
                    continue;
                }
                InstallState::Blocked => {
                    ctx.log.record_component(
                        &component.name,
                        ComponentOutcome::Blocked,
                        Some("a dependency failed"),
                    );
                    summary.blocked.push(id.clone());
                    continue;
                }
                _ => {}
            }
            if let Some(dep) = unmet {
                component.block();
                self.sync_state(component)?;
                let reason = format!("dependency '{dep}' is not installed");
                ctx.log.warn(&format!("skipping {}: {reason}", component.name));
                ctx.log
                    .record_component(&component.name, ComponentOutcome::Blocked, Some(&reason));
                summary.blocked.push(id.clone());
                continue;
            }

            ctx.log.stage(&format!("Installing {}", component.name));
            let code = self.install_component(component, &selected, &selected_names)?;
            if code.is_success() {
                let outcome = if ctx.is_dry_run() {
                    ComponentOutcome::DryRun
                } else {
                    ComponentOutcome::Installed
                };
                ctx.log.record_component(&component.name, outcome, None);
                summary.installed.push(id.clone());
                continue;
            }

            ctx.log.record_component(
                &component.name,
                ComponentOutcome::Failed,
                Some(&code.to_string()),
            );
            summary.failed.push(id.clone());
            for blocked_id in resolver::mark_blocked_descendants(components, id) {
                if let Some(blocked) = positions.get(&blocked_id).and_then(|&i| components.get(i)) {
                    ctx.log
                        .debug(&format!("blocking {} after failure of {id}", blocked.name));
                    self.sync_state(blocked)?;
                }
            }
        }

        if summary.is_success() {
            self.checkpoint.delete_session()?;
            ctx.log.info("all selected components installed");
        } else {
            ctx.log.warn(&format!(
                "{} failed, {} blocked; rerun to resume",
                summary.failed.len(),
                summary.blocked.len()
            ));
            self.dialog.inform(&format!(
                "{} component(s) were not installed. Run install again to resume; \
                 completed work will not be repeated.",
                summary.failed.len() + summary.blocked.len()
            ));
        }
        self.emit(InstallEvent::SessionCompleted {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// First dependency of `components[pos]` that has not completed.
    fn unmet_dependency(components: &[Component], pos: usize) -> Option<String> {
        let component = components.get(pos)?;
        component
            .dependencies
            .iter()
            .find(|dep| {
                components
                    .iter()
                    .find(|c| &c.id == *dep)
                    .is_some_and(|c| c.state() != InstallState::Completed)
            })
            .cloned()
    }

    /// Run the pending instructions of one component and settle its state.
    ///
    /// Returns the first failing [`ExitCode`], or `Success`. A cancelled
    /// instruction leaves the component `InProgress` and aborts the run.
    fn install_component(
        &self,
        component: &mut Component,
        selected: &HashSet<String>,
        selected_names: &[String],
    ) -> Result<ExitCode, InstallerError> {
        let log = Arc::clone(&self.ctx().log);
        component.begin();
        self.sync_state(component)?;
        let entry = self.checkpoint.component_entry(&component.id)?;

        let mut result = ExitCode::Success;
        for (index, instruction) in component.instructions.iter().enumerate() {
            if entry.instruction_done(index) {
                log.debug(&format!("{} already done, skipping", instruction.id));
                continue;
            }
            let code = if instruction.is_applicable(selected) {
                self.run_instruction(component, instruction, selected, selected_names)
            } else {
                log.debug(&format!(
                    "{} does not apply to the current selection",
                    instruction.id
                ));
                ExitCode::Success
            };

            if code == ExitCode::Cancelled {
                return Err(InstallerError::Cancelled);
            }
            let state = if code.is_success() {
                InstallState::Completed
            } else {
                InstallState::Failed
            };
            self.checkpoint
                .record_instruction(&component.id, index, state)?;
            self.emit(InstallEvent::InstructionFinished {
                component: component.id.clone(),
                instruction: instruction.id.clone(),
                code,
            });
            if !code.is_success() {
                result = code;
                break;
            }
        }

        if result.is_success() {
            component.complete();
        } else {
            component.fail();
        }
        self.sync_state(component)?;
        Ok(result)
    }

    /// Execute one instruction, expanding `Choose` into the instructions of
    /// the chosen options.
    fn run_instruction(
        &self,
        component: &Component,
        instruction: &Instruction,
        selected: &HashSet<String>,
        selected_names: &[String],
    ) -> ExitCode {
        let Action::Choose { options } = &instruction.action else {
            return self.executor.execute(instruction, selected_names);
        };

        let chosen = self.choose_options(component, options);
        if chosen.is_empty() {
            self.ctx()
                .log
                .info(&format!("{}: no option chosen", instruction.id));
            return ExitCode::Success;
        }

        for option in chosen {
            self.ctx()
                .log
                .info(&format!("applying option {}", option.name));
            let mut scope = selected.clone();
            scope.insert(option.id.clone());
            for inner in option.instructions.iter().filter(|i| i.is_applicable(&scope)) {
                let code = self.executor.execute(inner, selected_names);
                if !code.is_success() {
                    return code;
                }
            }
        }
        ExitCode::Success
    }

    /// Selected options among `option_ids`, or the dialog's pick when none
    /// is selected and there is a real choice to make.
    fn choose_options<'c>(
        &self,
        component: &'c Component,
        option_ids: &[String],
    ) -> Vec<&'c ComponentOption> {
        let listed: Vec<&ComponentOption> = option_ids
            .iter()
            .filter_map(|id| {
                let option = component.option(id);
                if option.is_none() {
                    self.ctx()
                        .log
                        .warn(&format!("{}: unknown option '{id}'", component.id));
                }
                option
            })
            .collect();
        let selected: Vec<&ComponentOption> =
            listed.iter().copied().filter(|o| o.is_selected).collect();
        if !selected.is_empty() || listed.len() < 2 {
            return selected;
        }

        let names: Vec<String> = listed.iter().map(|o| o.name.clone()).collect();
        let prompt = format!("Choose an option for {}", component.name);
        self.dialog
            .choose(&prompt, &names)
            .and_then(|name| listed.iter().copied().find(|o| o.name == name))
            .into_iter()
            .collect()
    }
}
