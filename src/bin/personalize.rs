//! One-shot project personalization
//!
//! Run this once after creating a project from the template to rename the
//! package and fill in the repository placeholders. Prompts for any value
//! not supplied as a flag, asks for confirmation, and supports a dry run
//! that reports intended edits without writing anything.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use walkdir::WalkDir;

const GIT_REPO_URL_TOKEN: &str = "GITREPOURL";
const RUST_VERSION_TOKEN: &str = "RUSTVERSION";
const TEMPLATE_NAME: &str = "visionlab";

/// Directories never touched by the rewrite
const DIRS_TO_IGNORE: [&str; 5] = [".git", "target", "data", "output", "examples"];

/// Files deleted once personalization succeeds, relative to the repo root
const FILES_TO_REMOVE: [&str; 1] = ["src/bin/personalize.rs"];

#[derive(Parser, Debug)]
#[command(name = "personalize")]
#[command(about = "Personalize this template repository for your own project")]
struct Cli {
    /// The name of your crate (e.g. `my-classifier`)
    #[arg(long)]
    package_name: Option<String>,

    /// Git repository URL (e.g. https://github.com/you/my-classifier)
    #[arg(long)]
    git_repo_url: Option<String>,

    /// Rust toolchain version used in CI (e.g. 1.81)
    #[arg(long)]
    rust_version: Option<String>,

    /// Run the script without prompting for a confirmation
    #[arg(short, long, default_value = "false")]
    yes: bool,

    /// Report intended file edits without writing them
    #[arg(long, hide = true, default_value = "false")]
    dry_run: bool,
}

fn prompt(question: &str) -> Result<String> {
    print!("{} ", format!("{}:", question).cyan());
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{} [y/N]", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let package_name = match cli.package_name {
        Some(name) => name,
        None => prompt("Crate name (e.g. 'my-classifier')")?,
    };
    let git_repo_url = match cli.git_repo_url {
        Some(url) => url,
        None => prompt("Git repository URL (e.g. https://github.com/you/my-classifier)")?,
    };
    let rust_version = match cli.rust_version {
        Some(version) => version,
        None => prompt("Rust toolchain version for CI (e.g. 1.81)")?,
    };

    if package_name.is_empty() {
        bail!("Crate name must not be empty");
    }
    // Crate identifiers use underscores; the package name keeps its dashes.
    let package_dir_name = package_name.replace('-', "_");

    println!("Package name set to: {}", package_name.cyan());
    println!("Rust version set to: {}", rust_version.cyan());
    let confirmed = cli.yes || confirm("Is this correct?")?;
    if !confirmed {
        bail!("Aborted, please run the script again");
    }

    let repo_base = std::env::current_dir()?;
    let replacements = [
        (GIT_REPO_URL_TOKEN.to_string(), git_repo_url),
        (RUST_VERSION_TOKEN.to_string(), rust_version),
        (TEMPLATE_NAME.to_string(), package_dir_name.clone()),
    ];

    if cli.dry_run {
        for (old, new) in &replacements {
            println!("Replacing '{}' with '{}'", old, new);
        }
    }

    let gitignore_entries = read_gitignore(&repo_base);
    for path in iter_files(&repo_base, &gitignore_entries) {
        personalize_file(&path, cli.dry_run, &replacements)
            .with_context(|| format!("failed to personalize {:?}", path))?;
    }

    for relative in FILES_TO_REMOVE {
        let path = repo_base.join(relative);
        if !path.is_file() {
            continue;
        }
        if cli.dry_run {
            println!("Removing {:?}", path);
        } else {
            fs::remove_file(&path)?;
        }
    }

    println!(
        "{} You can now build your personalized project with: cargo build --release",
        "Success!".green().bold()
    );

    Ok(())
}

/// Non-comment entries of the root .gitignore
fn read_gitignore(repo_base: &Path) -> Vec<String> {
    fs::read_to_string(repo_base.join(".gitignore"))
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| line.trim_matches('/').to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Walk every file under the repository that personalization may touch.
fn iter_files(repo_base: &Path, gitignore: &[String]) -> Vec<PathBuf> {
    WalkDir::new(repo_base)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir()
                && (DIRS_TO_IGNORE.contains(&name.as_ref())
                    || gitignore.iter().any(|pattern| pattern == name.as_ref()))
            {
                return false;
            }
            true
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

/// Apply replacements to one file, skipping binary content.
fn personalize_file(path: &Path, dry_run: bool, replacements: &[(String, String)]) -> Result<()> {
    let Ok(content) = fs::read_to_string(path) else {
        return Ok(());
    };

    let mut updated = content.clone();
    for (old, new) in replacements {
        updated = updated.replace(old.as_str(), new.as_str());
    }

    if updated != content {
        if dry_run {
            println!("Updating {:?}", path);
        } else {
            fs::write(path, updated)?;
        }
    }

    Ok(())
}
