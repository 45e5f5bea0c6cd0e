//! Dataset acquisition
//!
//! Two download paths feed the data module: a `dvc get` subprocess against a
//! dvc-managed repository, and a plain HTTP download of the gzipped idx files
//! from a public mirror. The dvc path is tried first; any failure falls back
//! to the mirror.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::process::Command;

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::Result;

/// Public mirror hosting the four gzipped MNIST idx files
pub const MNIST_MIRROR: &str = "https://storage.googleapis.com/cvdf-datasets/mnist";

/// Basenames of the raw idx files, without the `.gz` suffix
pub const MNIST_FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// Fetch a dvc-managed dataset with `dvc get`.
///
/// Returns true when the download succeeded. A missing dvc binary or a
/// non-zero exit status are both treated as failure so the caller can fall
/// back to another download path.
pub fn fetch_with_dvc(dest: &Path, repo: &str, dir: &str, rev: Option<&str>) -> bool {
    let mut cmd = Command::new("dvc");
    cmd.arg("get")
        .arg(repo)
        .arg(dir)
        .arg("-o")
        .arg(dest);
    if let Some(rev) = rev {
        cmd.arg("--rev").arg(rev);
    }

    info!(
        "Fetching dataset with command: dvc get {} {} -o {:?}{}",
        repo,
        dir,
        dest,
        rev.map(|r| format!(" --rev {}", r)).unwrap_or_default()
    );

    let output = match cmd.output() {
        Ok(output) => output,
        Err(e) => {
            info!("Fetch from dvc failed: {}", e);
            return false;
        }
    };

    if !output.status.success() {
        info!("Fetch from dvc failed.");
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!("Error message: {}", line);
        }
        return false;
    }

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!("Return message: {}", line);
    }

    log_remote_heads(repo);
    true
}

/// Log the branch heads of the dvc repository, best-effort.
fn log_remote_heads(repo: &str) {
    let output = match Command::new("git")
        .args(["ls-remote", repo, "refs/heads/*"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        _ => return,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        return;
    }

    info!("Hashes of {} are:", repo);
    for line in stdout.lines() {
        match line.split_once('\t') {
            Some((hash, name)) => info!("   {}: {}", name, hash),
            None => info!("   {}", line),
        }
    }
}

/// Download the four MNIST idx files into `dest_dir`, decompressing on the
/// fly. Files that already exist are skipped.
pub fn download_mnist(dest_dir: &Path, base_url: &str) -> Result<()> {
    fs::create_dir_all(dest_dir)?;

    for name in MNIST_FILES {
        let dest = dest_dir.join(name);
        if dest.exists() {
            debug!("{} already present, skipping", name);
            continue;
        }

        let url = format!("{}/{}.gz", base_url.trim_end_matches('/'), name);
        info!("Downloading {}", url);

        let response = reqwest::blocking::get(&url)?.error_for_status()?;
        let compressed = response.bytes()?;

        let mut decoder = GzDecoder::new(compressed.as_ref());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw)?;

        let mut file = File::create(&dest)?;
        file.write_all(&raw)?;

        info!("Wrote {:?} ({} bytes)", dest, raw.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvc_fetch_fails_cleanly_for_bogus_repo() {
        let dir = tempfile::tempdir().unwrap();
        // Either the dvc binary is missing or the repository does not
        // resolve. Both must report failure instead of panicking.
        let ok = fetch_with_dvc(
            &dir.path().join("out"),
            "file:///nonexistent/repo",
            "data/MNIST",
            None,
        );
        assert!(!ok);
    }

    #[test]
    fn test_download_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in MNIST_FILES {
            std::fs::write(dir.path().join(name), b"placeholder").unwrap();
        }

        // The unroutable URL would fail if any request were attempted.
        download_mnist(dir.path(), "http://127.0.0.1:1/mnist").unwrap();
    }
}
