// src/logging.rs
use std::io::Write;

use log::LevelFilter;

/// Plain `[topobind] message` lines on stderr. `-v` raises the default level
/// from warn to debug; an explicit `filter` (env_logger syntax) wins over both.
pub fn init(verbose: bool, filter: Option<&str>) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Warn });
    if let Some(f) = filter {
        builder.parse_filters(f);
    }
    builder.format(|buf, record| writeln!(buf, "[topobind] {}", record.args()));
    let _ = builder.try_init();
}
