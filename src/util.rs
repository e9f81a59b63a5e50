//! Console output helpers and project-root discovery.

use std::path::PathBuf;

use colored::Colorize;

/// Announce a pipeline stage.
pub fn step(msg: &str) {
    println!("\n{} {msg}", "==>".cyan().bold());
}

/// Report a stage outcome.
pub fn ok(msg: &str) {
    println!("    {} {msg}", "✓".green());
}

/// Informational progress line, indented under the current stage.
pub fn info(msg: &str) {
    println!("    {msg}");
}

/// Informational "nothing there" line (no version yet, and the like).
pub fn none(msg: &str) {
    println!("    {} {msg}", "○".dimmed());
}

/// Non-fatal problem worth surfacing.
pub fn warn(msg: &str) {
    eprintln!("    {} {msg}", "warn:".yellow().bold());
}

/// Walk up from the working directory until a `Cargo.toml` marks the project
/// root. Falls back to the working directory itself.
pub fn project_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut dir = cwd.clone();
    loop {
        if dir.join("Cargo.toml").is_file() {
            return dir;
        }
        if !dir.pop() {
            return cwd;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_root_lands_on_a_manifest() {
        // Tests run with the crate as working directory, so the walk must
        // terminate on a directory that actually carries a manifest.
        let root = project_root();
        assert!(root.join("Cargo.toml").is_file());
    }
}
