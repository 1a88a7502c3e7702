use anyhow::{Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn run(program: &str, args: &[&str]) -> Result<String> {
    let out = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| anyhow!("could not run {program}: {e}"))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(anyhow!("{program} exited with {}: {}", out.status, stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// The OS job table: `launchctl list` on macOS, `crontab -l` elsewhere.
pub fn scheduler_listing() -> Result<String> {
    if cfg!(target_os = "macos") {
        run("launchctl", &["list"])
    } else {
        run("crontab", &["-l"])
    }
}

/// Lines of the job table that mention `label`. Commented-out cron lines
/// don't count.
pub fn scheduled_entries<'a>(listing: &'a str, label: &str) -> Vec<&'a str> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| l.contains(label))
        .collect()
}

/// Closest existing ancestor, so `df` works before the first run creates
/// the cache directory.
pub fn existing_ancestor(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    while !p.exists() {
        match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => p = parent.to_path_buf(),
            _ => return PathBuf::from("."),
        }
    }
    p
}

/// Free KiB on the filesystem holding `path`, from `df -Pk`.
pub fn available_kib(path: &Path) -> Result<u64> {
    let dir = existing_ancestor(path);
    let out = run("df", &["-Pk", &dir.to_string_lossy()])?;
    parse_df_available(&out).ok_or_else(|| anyhow!("unexpected df output: {}", out.trim()))
}

/// POSIX `df -P` columns: filesystem, blocks, used, available, capacity, mount.
pub fn parse_df_available(output: &str) -> Option<u64> {
    output
        .lines()
        .skip(1)
        .find_map(|line| line.split_whitespace().nth(3)?.parse().ok())
}

/// Last `n` non-empty lines of a text file.
pub fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let s = fs::read_to_string(path)?;
    let mut lines: Vec<String> = s
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(n)
        .map(String::from)
        .collect();
    lines.reverse();
    Ok(lines)
}
