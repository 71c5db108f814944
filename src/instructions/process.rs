use super::paths::substitute;
use super::{ExitCode, InstructionExecutor};

impl InstructionExecutor {
    /// Run every resolved source with the templated arguments, stopping at
    /// the first failure.
    pub(super) fn run_programs(&self, sources: &[String], arguments: &str) -> ExitCode {
        let programs = match self.resolve_sources(sources, true) {
            Ok(programs) => programs,
            Err(code) => return code,
        };
        let args: Vec<String> = substitute(arguments, &self.ctx.config)
            .split_whitespace()
            .map(String::from)
            .collect();

        for program in &programs {
            if self.ctx.cancel.is_cancelled() {
                return ExitCode::Cancelled;
            }
            self.ctx
                .log
                .info(&format!("running {} {}", program.display(), args.join(" ")));
            let result = match self.fs().execute_process(
                program,
                &args,
                program.parent(),
                self.ctx.config.process_timeout(),
            ) {
                Ok(result) => result,
                Err(e) => {
                    self.ctx.log.error(&format!("{e:#}"));
                    return ExitCode::ChildProcessError;
                }
            };
            if !result.success {
                let reason = if result.timed_out {
                    "timed out".to_string()
                } else {
                    format!("exited with code {}", result.exit_code())
                };
                self.ctx
                    .log
                    .error(&format!("{} {reason}", program.display()));
                return ExitCode::ChildProcessError;
            }
        }
        ExitCode::Success
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;

    use super::super::tests::{Fixture, run};
    use super::*;
    use crate::exec::{ExecResult, Executor};
    use crate::model::Action;

    /// Fails any program whose file name starts with `fail`.
    #[derive(Debug, Default)]
    struct ScriptedExecutor {
        ran: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    impl Executor for ScriptedExecutor {
        fn run_unchecked(
            &self,
            program: &Path,
            args: &[String],
            _cwd: Option<&Path>,
            _timeout: Option<Duration>,
        ) -> Result<ExecResult> {
            self.ran
                .lock()
                .unwrap()
                .push((program.to_path_buf(), args.to_vec()));
            let fail = program
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("fail"));
            Ok(ExecResult {
                success: !fail,
                code: Some(i32::from(fail)),
                ..ExecResult::default()
            })
        }

        fn which(&self, _: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn arguments_are_templated_and_split() {
        let fx = Fixture::new();
        fx.write(&fx.mods().join("setup.sh"), "");
        let exec = Arc::new(ScriptedExecutor::default());

        let code = run(
            &fx.executor_with(exec.clone()),
            Action::Execute {
                sources: vec!["<<modDirectory>>/setup.sh".to_string()],
                arguments: "--game <<kotorDirectory>>  --quiet".to_string(),
            },
        );

        assert_eq!(code, ExitCode::Success);
        let ran = exec.ran.lock().unwrap();
        assert_eq!(
            ran[0].1,
            vec![
                "--game".to_string(),
                fx.game().display().to_string(),
                "--quiet".to_string()
            ]
        );
    }

    #[test]
    fn failure_halts_remaining_programs() {
        let fx = Fixture::new();
        fx.write(&fx.mods().join("fail.sh"), "");
        fx.write(&fx.mods().join("later.sh"), "");
        let exec = Arc::new(ScriptedExecutor::default());

        let code = run(
            &fx.executor_with(exec.clone()),
            Action::Execute {
                sources: vec![
                    "<<modDirectory>>/fail.sh".to_string(),
                    "<<modDirectory>>/later.sh".to_string(),
                ],
                arguments: String::new(),
            },
        );

        assert_eq!(code, ExitCode::ChildProcessError);
        assert_eq!(exec.ran.lock().unwrap().len(), 1);
    }
}
