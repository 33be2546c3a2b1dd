// src/cli.rs
use std::ffi::OsString;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use log::{debug, error};

use crate::actions::affinity::BindFlags;
use crate::cpuset::CpuSet;
use crate::location::{self, LocationError};
use crate::topology::Topology;

const LOCATION_HELP: &str = "\
<location> may be a space-separated list of cpusets or objects:
  all                     every cpu of the machine
  0x000000ff[,0x...]      hex cpu mask, most significant 32-bit word first
  core:0  pu:2-3          objects by logical index (machine, node, package/socket, core, pu)
  socket:1.core:0         objects nested inside other objects
Prefix a location with ~ to remove it, x to intersect, ^ to xor.";

#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(
    name = "topobind",
    version,
    about = "Bind a process to the cpus of a topology location, then run a command",
    override_usage = "topobind [options] <location>... [-- command ...]",
    after_help = LOCATION_HELP,
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
pub struct Opts {
    /// verbose messages
    #[arg(short = 'v', action = ArgAction::SetTrue)]
    pub verbose: bool,
    /// bind on a single cpu to prevent migration
    #[arg(long)]
    pub single: bool,
    /// require strict binding
    #[arg(long)]
    pub strict: bool,
    /// print this help and exit
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
    /// report version and exit
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,
    #[arg(value_name = "location", value_parser = location_token)]
    pub locations: Vec<String>,
    #[arg(last = true, value_name = "command")]
    pub command: Vec<OsString>,
}

/// Anything starting with `-` before the separator is an option, never a
/// location, even when clap would take it as a value (a lone `-`).
fn location_token(s: &str) -> std::result::Result<String, String> {
    if s.starts_with('-') {
        return Err(format!("unrecognized option '{}'", s));
    }
    Ok(s.to_string())
}

impl Opts {
    pub fn bind_flags(&self) -> BindFlags {
        let mut flags = BindFlags::empty();
        if self.strict {
            flags |= BindFlags::STRICT;
        }
        flags
    }
}

/// Where a run ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exit(u8),
    /// Replace the process image with this argument vector.
    Exec(Vec<OsString>),
}

/// Parse the command line. Help, version and usage errors are printed here
/// and come back as the exit status they call for.
pub fn parse<I, T>(args: I) -> std::result::Result<Opts, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Opts::try_parse_from(args).map_err(|e| {
        let _ = e.print();
        if e.kind() == ErrorKind::ValueValidation {
            eprintln!("\n{}", Opts::command().render_usage());
        }
        e.exit_code().clamp(0, 255) as u8
    })
}

fn bind_locations<T: Topology>(topology: &mut T, opts: &Opts) -> std::result::Result<(), LocationError> {
    if opts.locations.is_empty() {
        return Ok(());
    }
    let mut cpuset = CpuSet::new();
    for loc in &opts.locations {
        location::process_arg(&*topology, loc, &mut cpuset)?;
    }
    debug!("binding on cpu set {} ({} cpus)", cpuset, cpuset.weight());
    if opts.single {
        cpuset.singlify();
    }
    if let Err(e) = topology.set_cpubind(&cpuset, opts.bind_flags()) {
        error!("set_cpubind {} failed ({})", cpuset, e);
    }
    Ok(())
}

/// Resolve and bind the requested locations. The topology from `load` is
/// dropped before this returns, so an `Exec` outcome never holds it.
pub fn run<T, F>(opts: &Opts, load: F) -> Outcome
where
    T: Topology,
    F: FnOnce() -> Result<T>,
{
    let mut topology = match load() {
        Ok(t) => t,
        Err(e) => {
            error!("topology load failed: {:#}", e);
            return Outcome::Exit(1);
        }
    };
    debug!("topology: {}", topology.info());

    let bound = bind_locations(&mut topology, opts);
    drop(topology);

    if let Err(e) = bound {
        error!("invalid location: {}", e);
        return Outcome::Exit(1);
    }
    if opts.command.is_empty() {
        Outcome::Exit(0)
    } else {
        Outcome::Exec(opts.command.clone())
    }
}
