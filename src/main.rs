// src/main.rs
mod actions;
mod cli;
mod config;
mod cpuset;
mod location;
mod logging;
mod topology;

use std::process::ExitCode;

use log::error;

use crate::cli::Outcome;
use crate::config::Config;
use crate::topology::SysTopology;

fn main() -> ExitCode {
    let opts = match cli::parse(std::env::args_os()) {
        Ok(o) => o,
        Err(code) => return ExitCode::from(code),
    };
    let cfg = Config::from_env();
    logging::init(opts.verbose, cfg.log_filter.as_deref());

    match cli::run(&opts, || SysTopology::load(&cfg.sysfs_root)) {
        Outcome::Exit(code) => ExitCode::from(code),
        Outcome::Exec(argv) => match actions::exec::replace(&argv) {
            Ok(never) => match never {},
            Err(e) => {
                if opts.verbose {
                    error!("{:#}", e);
                }
                ExitCode::FAILURE
            }
        },
    }
}
