// src/cpuset.rs
use std::fmt;
use std::ops::{BitAndAssign, BitOrAssign, BitXorAssign};

use anyhow::{bail, Context, Result};

const WORD_BITS: usize = 64;

/// Set of logical CPUs, indexed by OS index.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct CpuSet {
    words: Vec<u64>,
}

impl CpuSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cpus<I: IntoIterator<Item = usize>>(cpus: I) -> Self {
        let mut set = Self::new();
        for cpu in cpus {
            set.set(cpu);
        }
        set
    }

    pub fn zero(&mut self) {
        self.words.clear();
    }

    pub fn set(&mut self, cpu: usize) {
        let w = cpu / WORD_BITS;
        if self.words.len() <= w {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= 1u64 << (cpu % WORD_BITS);
    }

    #[cfg(test)]
    pub fn is_set(&self, cpu: usize) -> bool {
        self.words
            .get(cpu / WORD_BITS)
            .map(|w| w & (1u64 << (cpu % WORD_BITS)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn weight(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<usize> {
        let (i, w) = self.words.iter().enumerate().rev().find(|(_, w)| **w != 0)?;
        Some(i * WORD_BITS + (WORD_BITS - 1 - w.leading_zeros() as usize))
    }

    /// Keep only the lowest CPU of the set.
    pub fn singlify(&mut self) {
        if let Some(cpu) = self.first() {
            self.zero();
            self.set(cpu);
        }
    }

    pub fn is_subset_of(&self, other: &CpuSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Remove every CPU of `other` from this set.
    pub fn remove_all(&mut self, other: &CpuSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
        self.trim();
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS)
                .filter(move |&b| w & (1u64 << b) != 0)
                .map(move |b| i * WORD_BITS + b)
        })
    }

    /// Linux cpulist rendering, e.g. `0-3,8,10-11`.
    pub fn to_list_string(&self) -> String {
        let v: Vec<usize> = self.iter().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < v.len() {
            let start = v[i];
            let mut j = i;
            while j + 1 < v.len() && v[j + 1] == v[j] + 1 {
                j += 1;
            }
            if !out.is_empty() {
                out.push(',');
            }
            if j == i {
                out.push_str(&format!("{}", start));
            } else {
                out.push_str(&format!("{}-{}", start, v[j]));
            }
            i = j + 1;
        }
        out
    }

    /// Parse Linux cpulist format (`0-3,8`). Whitespace around parts is ignored.
    pub fn parse_list(s: &str) -> Result<Self> {
        let mut set = Self::new();
        let s = s.trim();
        if s.is_empty() {
            return Ok(set);
        }
        for part in s.split(',') {
            let part = part.trim();
            if let Some((a, b)) = part.split_once('-') {
                let a: usize = a.trim().parse().with_context(|| format!("cpu id '{}'", a))?;
                let b: usize = b.trim().parse().with_context(|| format!("cpu id '{}'", b))?;
                if a > b {
                    bail!("reversed cpu range '{}'", part);
                }
                for cpu in a..=b {
                    set.set(cpu);
                }
            } else {
                let cpu: usize = part.parse().with_context(|| format!("cpu id '{}'", part))?;
                set.set(cpu);
            }
        }
        Ok(set)
    }

    /// Parse the hex mask format produced by `Display`: 32-bit words, most
    /// significant first, separated by commas, each with an optional `0x`.
    pub fn parse_mask(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(',').collect();
        let mut set = Self::new();
        for (i, part) in parts.iter().rev().enumerate() {
            let digits = part
                .strip_prefix("0x")
                .or_else(|| part.strip_prefix("0X"))
                .unwrap_or(part);
            if digits.is_empty() || digits.len() > 8 {
                bail!("bad mask word '{}'", part);
            }
            let word = u32::from_str_radix(digits, 16)
                .with_context(|| format!("bad mask word '{}'", part))?;
            for b in 0..32 {
                if word & (1u32 << b) != 0 {
                    set.set(i * 32 + b);
                }
            }
        }
        Ok(set)
    }

    pub fn to_nix(&self) -> nix::Result<nix::sched::CpuSet> {
        let mut out = nix::sched::CpuSet::new();
        for cpu in self.iter() {
            out.set(cpu)?;
        }
        Ok(out)
    }

    pub fn from_nix(set: &nix::sched::CpuSet) -> Self {
        Self::from_cpus((0..nix::sched::CpuSet::count()).filter(|&c| set.is_set(c).unwrap_or(false)))
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl BitOrAssign<&CpuSet> for CpuSet {
    fn bitor_assign(&mut self, rhs: &CpuSet) {
        if self.words.len() < rhs.words.len() {
            self.words.resize(rhs.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&rhs.words) {
            *a |= b;
        }
    }
}

impl BitAndAssign<&CpuSet> for CpuSet {
    fn bitand_assign(&mut self, rhs: &CpuSet) {
        self.words.truncate(rhs.words.len());
        for (a, b) in self.words.iter_mut().zip(&rhs.words) {
            *a &= b;
        }
        self.trim();
    }
}

impl BitXorAssign<&CpuSet> for CpuSet {
    fn bitxor_assign(&mut self, rhs: &CpuSet) {
        if self.words.len() < rhs.words.len() {
            self.words.resize(rhs.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&rhs.words) {
            *a ^= b;
        }
        self.trim();
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self.last() {
            Some(last) => last / 32 + 1,
            None => return write!(f, "0x0"),
        };
        for i in (0..n).rev() {
            let word = (self.words[i * 32 / WORD_BITS] >> ((i * 32) % WORD_BITS)) as u32;
            if i + 1 != n {
                write!(f, ",")?;
            }
            write!(f, "0x{:08x}", word)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuSet({})", self.to_list_string())
    }
}
