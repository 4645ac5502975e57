use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::scheduler::dialect::Dialect;
use crate::scheduler::{slurm, torque, ActiveJob, Scheduler, SchedulerError};

/// Finished scheduler command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// Run `program`, feeding `stdin` if given, and wait at most `timeout`
///
/// The child is killed if the timeout expires. Runs on a private current-thread
/// runtime, so it must not be called from inside another tokio runtime.
pub fn run(
    program: &str,
    args: &[&str],
    stdin: Option<&str>,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, SchedulerError> {
    let spawn_error = |source| SchedulerError::Spawn {
        program: program.to_string(),
        source,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(spawn_error)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    info!("Running {program} {}", args.join(" "));

    runtime.block_on(async {
        let interaction = async {
            let mut child = command.spawn()?;
            if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(text.as_bytes()).await?;
            }
            let output = child.wait_with_output().await?;
            Ok::<_, std::io::Error>(output)
        };

        let output = tokio::time::timeout(timeout, interaction)
            .await
            .map_err(|_| SchedulerError::Timeout {
                program: program.to_string(),
                seconds: timeout.as_secs(),
            })?
            .map_err(spawn_error)?;

        Ok::<_, SchedulerError>(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    })
}

/// Talks to the real scheduler through its command line tools
pub struct CommandScheduler {
    dialect: Dialect,
    timeout: Duration,
    user_name: String,
}

impl CommandScheduler {
    pub fn new(dialect: Dialect, timeout: Duration, user_name: &str) -> Self {
        CommandScheduler {
            dialect,
            timeout,
            user_name: user_name.to_string(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, SchedulerError> {
        let output = run(program, args, stdin, cwd, self.timeout)?;
        if output.status != 0 {
            return Err(SchedulerError::Failed {
                program: program.to_string(),
                status: output.status,
                output: output.combined(),
            });
        }
        Ok(output)
    }
}

impl Scheduler for CommandScheduler {
    fn query_active(&self, host_scope: &str) -> Result<HashMap<String, ActiveJob>, SchedulerError> {
        match self.dialect {
            Dialect::Slurm => {
                let format = format!("--format={}", slurm::SQUEUE_FORMAT);
                let args = ["--noheader", "--user", self.user_name.as_str(), format.as_str()];
                let output = self.run_checked("squeue", &args, None, None)?;
                slurm::parse_squeue(&output.stdout)
            }
            Dialect::Torque => {
                let output = self.run_checked("qstat", &["-f"], None, None)?;
                let jobs = torque::parse_qstat(&output.stdout, Utc::now().timestamp())?;
                Ok(torque::owned_by(jobs, &self.user_name, host_scope))
            }
        }
    }

    fn submit(&self, script: &str, run_dir: &Path) -> Result<String, SchedulerError> {
        let (program, args): (&str, &[&str]) = match self.dialect {
            Dialect::Slurm => ("sbatch", &["--parsable"][..]),
            Dialect::Torque => ("qsub", &[][..]),
        };
        let output = self.run_checked(program, args, Some(script), Some(run_dir))?;

        // some sites wrap qsub/sbatch and report failures with a zero exit status
        if output.combined().to_lowercase().contains("error") {
            return Err(SchedulerError::Failed {
                program: program.to_string(),
                status: output.status,
                output: output.combined(),
            });
        }

        let job_id = match self.dialect {
            Dialect::Slurm => slurm::parse_sbatch(&output.stdout),
            Dialect::Torque => torque::parse_qsub(&output.stdout),
        };
        job_id.ok_or_else(|| SchedulerError::Parse {
            program: program.to_string(),
            reason: format!("no job id in {:?}", output.stdout),
        })
    }

    fn cancel(&self, job_id: &str) -> Result<i32, SchedulerError> {
        let program = match self.dialect {
            Dialect::Slurm => "scancel",
            Dialect::Torque => "qdel",
        };
        let output = run(program, &[job_id], None, None, self.timeout)?;
        if output.status != 0 {
            warn!("{program} {job_id} exited with {}: {}", output.status, output.combined());
        }
        Ok(output.status)
    }

    fn current_job_id(&self) -> Option<String> {
        let value = env::var(self.dialect.job_id_variable()).ok()?;
        value.split('.').next().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_status() {
        let script = ["-c", "cat; echo oops >&2; exit 3"];
        let output = run("sh", &script, Some("hello"), None, Duration::from_secs(10)).unwrap();
        assert_eq!(output.status, 3);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn slow_commands_time_out() {
        let err = run("sleep", &["5"], None, None, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, SchedulerError::Timeout { .. }));
    }

    #[test]
    fn missing_programs_fail_to_spawn() {
        let err = run("seuranta-no-such-program", &[], None, None, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Spawn { .. }));
    }
}
