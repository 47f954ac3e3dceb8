//! Stamps `migcheck --version` with the source revision and the target triple.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");
    println!("cargo:rerun-if-env-changed=MIGCHECK_COMMIT");

    // Release tarballs carry no .git, so packagers pass the revision in
    let commit = env::var("MIGCHECK_COMMIT")
        .ok()
        .filter(|c| !c.trim().is_empty())
        .or_else(describe_checkout)
        .unwrap_or_else(|| "unknown".into());
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".into());

    println!("cargo:rustc-env=GIT_COMMIT_HASH={}", commit.trim());
    println!("cargo:rustc-env=TARGET={target}");
}

/// `abc1234`, or `abc1234-dirty` when built from a modified checkout.
fn describe_checkout() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=7", "--exclude=*"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8(out.stdout).ok()
}
