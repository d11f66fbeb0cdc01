use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

const PICKER_PROMPT: &str = "Select folder to save profiling results";

/// Opens a directory in the platform file manager. Does not wait for it to exit.
pub fn open_folder(folder: &Path) -> Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        Command::new("explorer")
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    cmd.arg(folder);
    spawn_detached(cmd, &folder.display().to_string())
}

/// Opens a local file with the default browser handler.
pub fn open_file_in_browser(file: &Path) -> Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler").arg(format!(
            "file:///{}",
            file.display().to_string().replace('\\', "/")
        ));
        cmd
    } else {
        let mut cmd = if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        cmd.arg(file);
        cmd
    };
    spawn_detached(cmd, &file.display().to_string())
}

pub fn open_url(url: &str) -> Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler");
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    cmd.arg(url);
    spawn_detached(cmd, url)
}

fn spawn_detached(mut cmd: Command, target: &str) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let child = cmd
        .spawn()
        .with_context(|| format!("failed to open {target}"))?;
    debug!("opened {target} (pid {})", child.id());
    Ok(())
}

fn folder_picker_command() -> TokioCommand {
    if cfg!(target_os = "macos") {
        let mut cmd = TokioCommand::new("osascript");
        cmd.arg("-e").arg(format!(
            "POSIX path of (choose folder with prompt \"{PICKER_PROMPT}\")"
        ));
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = TokioCommand::new("powershell");
        cmd.arg("-WindowStyle").arg("Hidden").arg("-Command").arg(format!(
            "Add-Type -AssemblyName System.Windows.Forms; \
             $d = New-Object System.Windows.Forms.FolderBrowserDialog; \
             $d.Description = '{PICKER_PROMPT}'; \
             if ($d.ShowDialog() -eq 'OK') {{ $d.SelectedPath }}"
        ));
        cmd
    } else {
        let mut cmd = TokioCommand::new("zenity");
        cmd.arg("--file-selection")
            .arg("--directory")
            .arg(format!("--title={PICKER_PROMPT}"));
        cmd
    }
}

/// Shows the native folder dialog. `None` means the user cancelled.
///
/// The dialog process is killed if the returned future is dropped, so aborting the
/// task that awaits it closes the window.
pub async fn choose_folder() -> Result<Option<PathBuf>> {
    let mut cmd = folder_picker_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let output = cmd
        .output()
        .await
        .context("failed to launch folder picker")?;
    if !output.status.success() {
        info!("folder picker closed with {}", output.status);
        return Ok(None);
    }
    Ok(parse_picker_output(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_picker_output(stdout: &str) -> Option<PathBuf> {
    let folder = stdout.trim();
    if folder.is_empty() {
        None
    } else {
        Some(PathBuf::from(folder))
    }
}

#[cfg(test)]
mod tests {
    use super::parse_picker_output;
    use std::path::PathBuf;

    #[test]
    fn picker_output_is_trimmed_and_empty_means_cancel() {
        assert_eq!(
            parse_picker_output("/home/dev/profiles\n"),
            Some(PathBuf::from("/home/dev/profiles"))
        );
        assert_eq!(parse_picker_output("  \n"), None);
    }
}
