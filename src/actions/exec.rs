// src/actions/exec.rs
use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;

use anyhow::{bail, Context, Result};
use nix::unistd::execvp;

fn to_cstrings(argv: &[OsString]) -> Result<Vec<CString>> {
    argv.iter()
        .map(|a| CString::new(a.as_bytes()).with_context(|| format!("argument {:?} contains a NUL byte", a)))
        .collect()
}

/// Replace the process image with `argv`, looking the program up in `PATH`.
/// Only returns if the replacement failed.
pub fn replace(argv: &[OsString]) -> Result<Infallible> {
    let args = to_cstrings(argv)?;
    let Some(prog) = args.first() else {
        bail!("empty command");
    };
    execvp(prog, &args).with_context(|| format!("execvp {}", argv[0].to_string_lossy()))
}
