use assert_cmd::Command;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Debug)]
pub struct ImvRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
    pub duration: Duration,
}

impl ImvRun {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim())
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {}", self.stdout))
    }

    pub fn stderr_json(&self) -> serde_json::Value {
        serde_json::from_str(self.stderr.trim())
            .unwrap_or_else(|err| panic!("stderr is not JSON ({err}): {}", self.stderr))
    }
}

pub struct ImvWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl ImvWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        Self { temp_dir, root }
    }

    /// `imv init` plus an admin `root` account used as the default actor.
    pub fn initialized() -> Self {
        let workspace = Self::new();
        let init = run_imv(&workspace, ["init"]);
        assert!(init.status.success(), "init failed: {}", init.stderr);
        let admin = run_imv(&workspace, ["user", "add", "root", "--admin"]);
        assert!(admin.status.success(), "user add failed: {}", admin.stderr);
        workspace
    }
}

pub fn run_imv<I, S>(workspace: &ImvWorkspace, args: I) -> ImvRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_imv_with_env(workspace, args, std::iter::empty::<(String, String)>())
}

pub fn run_imv_with_env<I, S, E, K, V>(workspace: &ImvWorkspace, args: I, env_vars: E) -> ImvRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    E: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("imv"));
    cmd.current_dir(&workspace.root);
    cmd.env_remove("IMV_DIR");
    cmd.env_remove("RUST_LOG");
    cmd.env("HOME", &workspace.root);
    cmd.env("IMV_ACTOR", "root");
    cmd.args(args);
    cmd.envs(env_vars);

    let start = Instant::now();
    let output = cmd.output().expect("run imv");
    let duration = start.elapsed();

    ImvRun {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status,
        duration,
    }
}
