// src/location.rs
//! Resolution of location tokens into CPU sets.
//!
//! A token is an optional modifier followed by a body:
//!
//! * modifiers: none (union), `~` (remove), `x` (intersect), `^` (xor)
//! * bodies: `all`/`root`, a hex mask such as `0x0000000f,0xffffffff`, or an
//!   object path such as `socket:1.core:0-1` where each step indexes objects
//!   logically within the previous step's selection.

use std::ops::RangeInclusive;

use log::debug;
use thiserror::Error;

use crate::cpuset::CpuSet;
use crate::topology::{ObjectType, Topology};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("empty location")]
    Empty,
    #[error("unknown object type '{0}'")]
    UnknownType(String),
    #[error("bad {ty} index '{index}'")]
    BadIndex { ty: ObjectType, index: String },
    #[error("{ty} index {index} out of range ({available} available)")]
    OutOfRange { ty: ObjectType, index: usize, available: usize },
    #[error("bad cpu mask '{0}'")]
    BadMask(String),
    #[error("cannot parse location '{0}'")]
    Syntax(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Modifier {
    Union,
    Remove,
    Intersect,
    Xor,
}

fn split_modifier(arg: &str) -> (Modifier, &str) {
    match arg.chars().next() {
        Some('~') => (Modifier::Remove, &arg[1..]),
        Some('x') => (Modifier::Intersect, &arg[1..]),
        Some('^') => (Modifier::Xor, &arg[1..]),
        _ => (Modifier::Union, arg),
    }
}

fn parse_index(ty: ObjectType, s: &str, available: usize) -> Result<RangeInclusive<usize>, LocationError> {
    let bad = || LocationError::BadIndex { ty, index: s.to_string() };
    let range = if s.eq_ignore_ascii_case("all") {
        if available == 0 {
            return Err(LocationError::OutOfRange { ty, index: 0, available });
        }
        0..=available - 1
    } else if let Some((a, b)) = s.split_once('-') {
        let a: usize = a.parse().map_err(|_| bad())?;
        let b: usize = b.parse().map_err(|_| bad())?;
        if a > b {
            return Err(bad());
        }
        a..=b
    } else {
        let i: usize = s.parse().map_err(|_| bad())?;
        i..=i
    };
    if *range.end() >= available {
        return Err(LocationError::OutOfRange { ty, index: *range.end(), available });
    }
    Ok(range)
}

fn resolve_objects<T: Topology + ?Sized>(topo: &T, path: &str) -> Result<CpuSet, LocationError> {
    let mut scope = vec![topo.complete_cpuset().clone()];
    for step in path.split('.') {
        let (ty, index) = step
            .split_once(':')
            .ok_or_else(|| LocationError::Syntax(path.to_string()))?;
        let ty: ObjectType = ty
            .parse()
            .map_err(|_| LocationError::UnknownType(ty.to_string()))?;
        let mut next = Vec::new();
        for parent in &scope {
            let children: Vec<&CpuSet> = topo
                .objects(ty)
                .iter()
                .filter(|o| !o.is_empty() && o.is_subset_of(parent))
                .collect();
            for i in parse_index(ty, index, children.len())? {
                next.push(children[i].clone());
            }
        }
        scope = next;
    }
    let mut out = CpuSet::new();
    for set in &scope {
        out |= set;
    }
    Ok(out)
}

fn resolve_body<T: Topology + ?Sized>(topo: &T, body: &str) -> Result<CpuSet, LocationError> {
    if body.is_empty() {
        return Err(LocationError::Empty);
    }
    if body.eq_ignore_ascii_case("all") || body.eq_ignore_ascii_case("root") {
        return Ok(topo.complete_cpuset().clone());
    }
    if body.starts_with("0x") || body.starts_with("0X") {
        return CpuSet::parse_mask(body).map_err(|_| LocationError::BadMask(body.to_string()));
    }
    if body.contains(':') {
        return resolve_objects(topo, body);
    }
    Err(LocationError::Syntax(body.to_string()))
}

/// Resolve `arg` against `topo` and fold the result into `cpuset`.
pub fn process_arg<T: Topology + ?Sized>(topo: &T, arg: &str, cpuset: &mut CpuSet) -> Result<(), LocationError> {
    let (modifier, body) = split_modifier(arg);
    let resolved = resolve_body(topo, body)?;
    debug!("location {} -> {} ({:?})", arg, resolved, modifier);
    match modifier {
        Modifier::Union => *cpuset |= &resolved,
        Modifier::Remove => cpuset.remove_all(&resolved),
        Modifier::Intersect => *cpuset &= &resolved,
        Modifier::Xor => *cpuset ^= &resolved,
    }
    Ok(())
}
