//! Restart-required apply orchestration
//!
//! When a planned channel contains the running executable, files cannot be
//! replaced in-process: a platform that locks open files would refuse the
//! overwrite, and replacing our own binary mid-flight is unsafe anyway.
//! Instead a detached helper script terminates the app's processes,
//! extracts the verified archives, commits the staged version state, and
//! relaunches the executable. The helper must outlive this process, so
//! once it is spawned nothing can be reported back synchronously; it logs
//! every step to a side file for postmortem diagnosis, and on extraction
//! failure it still relaunches the old executable rather than leaving the
//! user with no running app.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;
use tracing::info;

use crate::errors::{Result, UpdateError};

/// Everything the detached helper needs to finish an apply
#[derive(Debug, Clone)]
pub struct RestartPlan {
    /// (archive, extraction target) pairs in apply order; empty for a full update
    pub archives: Vec<(PathBuf, PathBuf)>,
    /// Installer to run silently instead of extracting archives
    pub installer: Option<PathBuf>,
    /// Updated version-state file, staged for an atomic rename into place
    pub staged_state: Option<PathBuf>,
    /// Live version-state file
    pub state_path: PathBuf,
    /// Staging directory the helper deletes when finished
    pub staging_dir: PathBuf,
    /// Process names to terminate before touching files (best-effort)
    pub process_names: Vec<String>,
    /// Executable to relaunch, on success and on failure alike
    pub relaunch_exe: PathBuf,
}

/// Capability seam for the kill/extract/relaunch sequence.
///
/// Production uses [`ScriptOrchestrator`]; tests substitute a recording
/// double so apply flows can be exercised without killing anything.
pub trait RestartOrchestrator: Send + Sync {
    /// Launch the detached helper for `plan`. Returns once the helper has
    /// been spawned; the caller is expected to exit shortly after.
    fn schedule_restart_apply(&self, plan: &RestartPlan) -> Result<()>;
}

/// Writes a per-OS helper script to a temp directory and spawns it detached.
#[derive(Debug, Default)]
pub struct ScriptOrchestrator;

impl ScriptOrchestrator {
    pub fn new() -> Self {
        Self
    }

    fn helper_paths() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir();
        let ext = if cfg!(windows) { "cmd" } else { "sh" };
        let script = dir.join(format!("pulsepatch-helper-{}.{}", std::process::id(), ext));
        let log = dir.join("pulsepatch-helper.log");
        (script, log)
    }
}

impl RestartOrchestrator for ScriptOrchestrator {
    fn schedule_restart_apply(&self, plan: &RestartPlan) -> Result<()> {
        let (script_path, log_path) = Self::helper_paths();

        let script = if cfg!(windows) {
            render_cmd_script(plan, &log_path)
        } else {
            render_sh_script(plan, &log_path)
        };

        std::fs::write(&script_path, &script).map_err(|e| {
            UpdateError::Orchestration(format!(
                "could not write helper script {}: {}",
                script_path.display(),
                e
            ))
        })?;

        spawn_detached(&script_path)
            .map_err(|e| UpdateError::Orchestration(format!("could not launch helper: {}", e)))?;

        info!(
            script = %script_path.display(),
            log = %log_path.display(),
            "restart helper scheduled"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn spawn_detached(script: &Path) -> std::io::Result<()> {
    // The spawned child is not waited on; it survives our exit as an orphan.
    Command::new("sh")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

#[cfg(windows)]
fn spawn_detached(script: &Path) -> std::io::Result<()> {
    Command::new("cmd")
        .args(["/C", "start", "", "/MIN"])
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

/// Temp name in the same directory as the live state file, so the final
/// rename never crosses a filesystem boundary.
fn commit_tmp_path(state_path: &Path) -> PathBuf {
    let mut name = state_path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn q(path: &Path) -> String {
    // Paths come from our own staging and config; quote for whitespace only
    format!("'{}'", path.display())
}

/// POSIX shell flavor of the helper.
fn render_sh_script(plan: &RestartPlan, log: &Path) -> String {
    let mut s = String::new();
    s.push_str("#!/bin/sh\n");
    s.push_str("# pulsepatch restart helper: terminate, apply, relaunch.\n");
    s.push_str(&format!("exec >>{} 2>&1\n", q(log)));
    s.push_str(&format!(
        "echo \"=== helper started {} (pid $$) ===\"\n",
        Utc::now().to_rfc3339()
    ));

    for name in &plan.process_names {
        s.push_str(&format!(
            "pkill -x '{name}' 2>/dev/null && echo \"terminated {name}\" || echo \"{name} not running\"\n"
        ));
    }
    // Give the OS a moment to release file handles
    s.push_str("sleep 2\nok=1\n");

    for (archive, target) in &plan.archives {
        s.push_str(&format!("mkdir -p {}\n", q(target)));
        s.push_str(&format!(
            "if tar -xzf {a} -C {t}; then echo \"extracted {a}\"; else echo \"FAILED extracting {a}\"; ok=0; fi\n",
            a = q(archive),
            t = q(target)
        ));
    }

    if let Some(installer) = &plan.installer {
        s.push_str(&format!("chmod +x {} 2>/dev/null\n", q(installer)));
        s.push_str(&format!(
            "if {i}; then echo \"installer finished\"; else echo \"FAILED running installer\"; ok=0; fi\n",
            i = q(installer)
        ));
    }

    if let Some(staged) = &plan.staged_state {
        // Staging usually lives on another filesystem, where a direct mv is
        // copy-then-unlink and a crash can leave the state file half-written.
        // Copy next to the live file first so the final mv is a rename.
        let tmp = commit_tmp_path(&plan.state_path);
        s.push_str("if [ \"$ok\" = \"1\" ]; then\n");
        s.push_str(&format!(
            "  cp -f {} {} && mv -f {} {} && echo \"version state committed\"\n",
            q(staged),
            q(&tmp),
            q(&tmp),
            q(&plan.state_path)
        ));
        s.push_str("else\n  echo \"leaving previous version state in place\"\nfi\n");
    }

    s.push_str(&format!("rm -rf {}\n", q(&plan.staging_dir)));
    s.push_str(&format!(
        "{} >/dev/null 2>&1 &\necho \"relaunched {}\"\n",
        q(&plan.relaunch_exe),
        plan.relaunch_exe.display()
    ));
    s.push_str("echo \"=== helper done ===\"\n");
    s
}

/// cmd.exe flavor of the helper. Windows tar ships with the OS since 10.
fn render_cmd_script(plan: &RestartPlan, log: &Path) -> String {
    let log = log.display();
    let mut s = String::new();
    s.push_str("@echo off\n");
    s.push_str(&format!("echo === helper started %DATE% %TIME% === >> \"{log}\"\n"));

    for name in &plan.process_names {
        s.push_str(&format!(
            "taskkill /IM \"{name}\" /F >> \"{log}\" 2>&1\n"
        ));
    }
    s.push_str("timeout /t 2 /nobreak >nul\nset OK=1\n");

    for (archive, target) in &plan.archives {
        s.push_str(&format!("mkdir \"{}\" 2>nul\n", target.display()));
        s.push_str(&format!(
            "tar -xzf \"{}\" -C \"{}\" >> \"{log}\" 2>&1 || set OK=0\n",
            archive.display(),
            target.display()
        ));
    }

    if let Some(installer) = &plan.installer {
        s.push_str(&format!(
            "\"{}\" /S >> \"{log}\" 2>&1 || set OK=0\n",
            installer.display()
        ));
    }

    if let Some(staged) = &plan.staged_state {
        // Same two-step commit as the sh flavor: land the copy beside the
        // live file, then rename within the directory.
        let tmp = commit_tmp_path(&plan.state_path);
        s.push_str(&format!(
            "if \"%OK%\"==\"1\" copy /Y \"{}\" \"{}\" >> \"{log}\" 2>&1\n",
            staged.display(),
            tmp.display()
        ));
        s.push_str(&format!(
            "if \"%OK%\"==\"1\" move /Y \"{}\" \"{}\" >> \"{log}\" 2>&1\n",
            tmp.display(),
            plan.state_path.display()
        ));
    }

    s.push_str(&format!("rd /S /Q \"{}\" 2>nul\n", plan.staging_dir.display()));
    s.push_str(&format!("start \"\" \"{}\"\n", plan.relaunch_exe.display()));
    s.push_str(&format!("echo === helper done === >> \"{log}\"\n"));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> RestartPlan {
        RestartPlan {
            archives: vec![(
                PathBuf::from("/tmp/staging/electron-1.1.0.tar.gz"),
                PathBuf::from("/opt/app/electron"),
            )],
            installer: None,
            staged_state: Some(PathBuf::from("/tmp/staging/patch-version.json")),
            state_path: PathBuf::from("/opt/app/patch-version.json"),
            staging_dir: PathBuf::from("/tmp/staging"),
            process_names: vec!["app".into(), "app-backend".into()],
            relaunch_exe: PathBuf::from("/opt/app/app"),
        }
    }

    #[test]
    fn test_sh_script_covers_all_steps() {
        let script = render_sh_script(&sample_plan(), Path::new("/tmp/helper.log"));

        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("pkill -x 'app'"));
        assert!(script.contains("pkill -x 'app-backend'"));
        assert!(script.contains("tar -xzf '/tmp/staging/electron-1.1.0.tar.gz' -C '/opt/app/electron'"));
        assert!(script.contains("cp -f '/tmp/staging/patch-version.json' '/opt/app/patch-version.json.tmp'"));
        assert!(script.contains("mv -f '/opt/app/patch-version.json.tmp' '/opt/app/patch-version.json'"));
        assert!(script.contains("rm -rf '/tmp/staging'"));
        // Relaunch happens after cleanup, unconditionally
        assert!(script.rfind("'/opt/app/app'").unwrap() > script.find("rm -rf").unwrap());
    }

    #[test]
    fn test_sh_script_state_commit_is_conditional() {
        let script = render_sh_script(&sample_plan(), Path::new("/tmp/helper.log"));
        let commit = script.find("mv -f").unwrap();
        let guard = script.find("if [ \"$ok\" = \"1\" ]").unwrap();
        assert!(guard < commit);
    }

    #[test]
    fn test_state_commit_renames_within_state_dir() {
        // The mv source must sit beside the live state file, never in the
        // staging dir, so the rename cannot cross a filesystem boundary.
        let script = render_sh_script(&sample_plan(), Path::new("/tmp/helper.log"));
        let mv_part = &script[script.find("mv -f").unwrap()..];
        let mv_args = mv_part.lines().next().unwrap();
        assert!(mv_args.contains("'/opt/app/patch-version.json.tmp' '/opt/app/patch-version.json'"));
        assert!(!mv_args.contains("/tmp/staging"));

        let cmd = render_cmd_script(&sample_plan(), Path::new("C:\\Temp\\helper.log"));
        assert!(cmd.contains("copy /Y \"/tmp/staging/patch-version.json\" \"/opt/app/patch-version.json.tmp\""));
        assert!(cmd.contains("move /Y \"/opt/app/patch-version.json.tmp\" \"/opt/app/patch-version.json\""));
    }

    #[test]
    fn test_sh_script_full_update_runs_installer() {
        let mut plan = sample_plan();
        plan.archives.clear();
        plan.staged_state = None;
        plan.installer = Some(PathBuf::from("/tmp/staging/app-setup.AppImage"));

        let script = render_sh_script(&plan, Path::new("/tmp/helper.log"));
        assert!(script.contains("'/tmp/staging/app-setup.AppImage'"));
        assert!(!script.contains("tar -xzf"));
        assert!(!script.contains("mv -f"));
    }

    #[test]
    fn test_cmd_script_covers_all_steps() {
        let script = render_cmd_script(&sample_plan(), Path::new("C:\\Temp\\helper.log"));
        assert!(script.contains("taskkill /IM \"app\" /F"));
        assert!(script.contains("tar -xzf"));
        assert!(script.contains("move /Y"));
        assert!(script.contains("start \"\""));
    }
}
