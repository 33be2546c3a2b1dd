// src/actions/affinity.rs
use bitflags::bitflags;
use nix::errno::Errno;
use nix::sched::{sched_getaffinity, sched_setaffinity};
use nix::unistd::Pid;
use thiserror::Error;

use crate::cpuset::CpuSet;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct BindFlags: u32 {
        /// Fail unless the kernel applies exactly the requested set.
        const STRICT = 1 << 0;
    }
}

fn errno_code(e: &Errno) -> i32 {
    *e as i32
}

fn errno_desc(e: &Errno) -> &'static str {
    e.desc()
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error("errno {} {}", errno_code(.0), errno_desc(.0))]
    Os(#[from] Errno),
    #[error("binding not honored, kernel applied {actual}")]
    NotHonored { actual: CpuSet },
}

/// sched_setaffinity on the calling process. With `STRICT`, `cpuset` must lie
/// within `allowed` and the mask read back must match it exactly.
pub fn set_process_affinity(cpuset: &CpuSet, flags: BindFlags, allowed: &CpuSet) -> Result<(), BindError> {
    let strict = flags.contains(BindFlags::STRICT);
    if strict && !cpuset.is_subset_of(allowed) {
        return Err(Errno::EINVAL.into());
    }
    let wanted = cpuset.to_nix()?;
    sched_setaffinity(Pid::from_raw(0), &wanted)?;
    if strict {
        let actual = CpuSet::from_nix(&sched_getaffinity(Pid::from_raw(0))?);
        if actual != *cpuset {
            return Err(BindError::NotHonored { actual });
        }
    }
    Ok(())
}
