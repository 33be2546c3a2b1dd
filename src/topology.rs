// src/topology.rs
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use log::debug;

use crate::actions::affinity::{self, BindError, BindFlags};
use crate::cpuset::CpuSet;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Machine,
    Node,
    Package,
    Core,
    Pu,
}

impl FromStr for ObjectType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "machine" => Ok(ObjectType::Machine),
            "node" | "numa" | "numanode" => Ok(ObjectType::Node),
            "package" | "socket" => Ok(ObjectType::Package),
            "core" => Ok(ObjectType::Core),
            "pu" | "proc" => Ok(ObjectType::Pu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::Machine => "machine",
            ObjectType::Node => "node",
            ObjectType::Package => "package",
            ObjectType::Core => "core",
            ObjectType::Pu => "pu",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologyInfo {
    pub nodes: usize,
    pub packages: usize,
    pub cores: usize,
    pub pus: usize,
}

impl fmt::Display for TopologyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node(s), {} package(s), {} core(s), {} pu(s)",
            self.nodes, self.packages, self.cores, self.pus
        )
    }
}

/// A loaded machine topology. Objects of each type are returned in logical
/// index order, each identified by its CPU set.
pub trait Topology {
    fn complete_cpuset(&self) -> &CpuSet;

    fn objects(&self, ty: ObjectType) -> &[CpuSet];

    fn info(&self) -> TopologyInfo {
        TopologyInfo {
            nodes: self.objects(ObjectType::Node).len(),
            packages: self.objects(ObjectType::Package).len(),
            cores: self.objects(ObjectType::Core).len(),
            pus: self.objects(ObjectType::Pu).len(),
        }
    }

    /// Bind the calling process to `cpuset`.
    fn set_cpubind(&mut self, cpuset: &CpuSet, flags: BindFlags) -> std::result::Result<(), BindError>;
}

/// Topology discovered from a sysfs tree.
#[derive(Debug)]
pub struct SysTopology {
    machine: Vec<CpuSet>,
    nodes: Vec<CpuSet>,
    packages: Vec<CpuSet>,
    cores: Vec<CpuSet>,
    pus: Vec<CpuSet>,
}

fn read_id(path: &Path) -> Option<i64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn read_nodes(root: &Path, complete: &CpuSet) -> Result<BTreeMap<u32, CpuSet>> {
    let mut nodes = BTreeMap::new();
    let dir = root.join("devices/system/node");
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(_) => return Ok(nodes),
    };
    for e in entries {
        let e = e.with_context(|| format!("read {}", dir.display()))?;
        let name = e.file_name().into_string().unwrap_or_default();
        let idx = match name.strip_prefix("node").and_then(|n| n.parse::<u32>().ok()) {
            Some(i) => i,
            None => continue,
        };
        let path = e.path().join("cpulist");
        if let Ok(s) = fs::read_to_string(&path) {
            let mut cpus = CpuSet::parse_list(&s).with_context(|| format!("parse {}", path.display()))?;
            cpus &= complete;
            // memory-only or fully offline
            if cpus.is_empty() {
                continue;
            }
            nodes.insert(idx, cpus);
        }
    }
    Ok(nodes)
}

impl SysTopology {
    pub fn load(root: &Path) -> Result<Self> {
        let cpu_dir: PathBuf = root.join("devices/system/cpu");
        let online = cpu_dir.join("online");
        let complete = match fs::read_to_string(&online) {
            Ok(s) => CpuSet::parse_list(&s).with_context(|| format!("parse {}", online.display()))?,
            Err(_) => {
                let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
                debug!("{} unreadable, assuming {} cpus", online.display(), n);
                CpuSet::from_cpus(0..n)
            }
        };

        let mut packages: BTreeMap<i64, CpuSet> = BTreeMap::new();
        let mut cores: BTreeMap<(i64, i64), CpuSet> = BTreeMap::new();
        for cpu in complete.iter() {
            let topo = cpu_dir.join(format!("cpu{}/topology", cpu));
            let pkg = read_id(&topo.join("physical_package_id")).unwrap_or(0);
            let core = read_id(&topo.join("core_id")).unwrap_or(cpu as i64);
            packages.entry(pkg).or_default().set(cpu);
            cores.entry((pkg, core)).or_default().set(cpu);
        }

        let mut nodes: Vec<CpuSet> = read_nodes(root, &complete)?.into_values().collect();
        if nodes.is_empty() {
            nodes.push(complete.clone());
        }

        Ok(Self {
            nodes,
            packages: packages.into_values().collect(),
            cores: cores.into_values().collect(),
            pus: complete.iter().map(|c| CpuSet::from_cpus([c])).collect(),
            machine: vec![complete],
        })
    }
}

impl Topology for SysTopology {
    fn complete_cpuset(&self) -> &CpuSet {
        &self.machine[0]
    }

    fn objects(&self, ty: ObjectType) -> &[CpuSet] {
        match ty {
            ObjectType::Machine => &self.machine,
            ObjectType::Node => &self.nodes,
            ObjectType::Package => &self.packages,
            ObjectType::Core => &self.cores,
            ObjectType::Pu => &self.pus,
        }
    }

    fn set_cpubind(&mut self, cpuset: &CpuSet, flags: BindFlags) -> std::result::Result<(), BindError> {
        affinity::set_process_affinity(cpuset, flags, self.complete_cpuset())
    }
}

impl Drop for SysTopology {
    fn drop(&mut self) {
        debug!("topology released");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a fake sysfs tree: `cpus` lists (cpu, package, core), `nodes`
    /// lists (node, cpulist).
    pub(crate) fn fake_sysfs(name: &str, cpus: &[(usize, i64, i64)], nodes: &[(u32, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("topobind-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let cpu_dir = root.join("devices/system/cpu");
        fs::create_dir_all(&cpu_dir).unwrap();
        let online = CpuSet::from_cpus(cpus.iter().map(|c| c.0));
        fs::write(cpu_dir.join("online"), format!("{}\n", online.to_list_string())).unwrap();
        for &(cpu, pkg, core) in cpus {
            let t = cpu_dir.join(format!("cpu{}/topology", cpu));
            fs::create_dir_all(&t).unwrap();
            fs::write(t.join("physical_package_id"), format!("{}\n", pkg)).unwrap();
            fs::write(t.join("core_id"), format!("{}\n", core)).unwrap();
        }
        for &(node, list) in nodes {
            let n = root.join(format!("devices/system/node/node{}", node));
            fs::create_dir_all(&n).unwrap();
            fs::write(n.join("cpulist"), format!("{}\n", list)).unwrap();
        }
        root
    }

    /// 2 packages x 2 cores x 2 threads, siblings numbered like Linux does
    /// (cpu N and N+4 share a core), one node per package.
    pub(crate) fn two_socket_sysfs(name: &str) -> PathBuf {
        fake_sysfs(
            name,
            &[
                (0, 0, 0), (1, 0, 1), (2, 1, 0), (3, 1, 1),
                (4, 0, 0), (5, 0, 1), (6, 1, 0), (7, 1, 1),
            ],
            &[(0, "0-1,4-5"), (1, "2-3,6-7")],
        )
    }

    #[test]
    fn load_two_socket_machine() {
        let root = two_socket_sysfs("load");
        let topo = SysTopology::load(&root).unwrap();
        assert_eq!(topo.info(), TopologyInfo { nodes: 2, packages: 2, cores: 4, pus: 8 });
        assert_eq!(*topo.complete_cpuset(), CpuSet::from_cpus(0..8));
        assert_eq!(topo.objects(ObjectType::Package)[1], CpuSet::from_cpus([2, 3, 6, 7]));
        assert_eq!(topo.objects(ObjectType::Core)[0], CpuSet::from_cpus([0, 4]));
        assert_eq!(topo.objects(ObjectType::Core)[3], CpuSet::from_cpus([3, 7]));
        assert_eq!(topo.objects(ObjectType::Node)[0], CpuSet::from_cpus([0, 1, 4, 5]));
        assert_eq!(topo.objects(ObjectType::Pu)[5], CpuSet::from_cpus([5]));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn missing_node_dir_yields_single_node() {
        let root = fake_sysfs("nonuma", &[(0, 0, 0), (1, 0, 1)], &[]);
        let topo = SysTopology::load(&root).unwrap();
        assert_eq!(topo.objects(ObjectType::Node), &[CpuSet::from_cpus([0, 1])]);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn offline_cpus_are_excluded_from_nodes() {
        let root = fake_sysfs("offline", &[(0, 0, 0), (1, 0, 1)], &[(0, "0-3")]);
        let topo = SysTopology::load(&root).unwrap();
        assert_eq!(topo.objects(ObjectType::Node)[0], CpuSet::from_cpus([0, 1]));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn nodes_without_online_cpus_are_dropped() {
        let root = fake_sysfs(
            "memnode",
            &[(0, 0, 0), (1, 0, 1)],
            &[(0, "0-1"), (1, ""), (2, "4-5")],
        );
        let topo = SysTopology::load(&root).unwrap();
        assert_eq!(topo.info().nodes, 1);
        assert_eq!(topo.objects(ObjectType::Node), &[CpuSet::from_cpus([0, 1])]);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn empty_root_falls_back_to_available_parallelism() {
        let root = std::env::temp_dir().join(format!("topobind-empty-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        let topo = SysTopology::load(&root).unwrap();
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(topo.info().pus, n);
        assert_eq!(topo.info().packages, 1);
        assert_eq!(topo.info().cores, n);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn object_type_names() {
        assert_eq!("socket".parse::<ObjectType>(), Ok(ObjectType::Package));
        assert_eq!("NUMA".parse::<ObjectType>(), Ok(ObjectType::Node));
        assert_eq!("Proc".parse::<ObjectType>(), Ok(ObjectType::Pu));
        assert!("cache".parse::<ObjectType>().is_err());
        assert_eq!(ObjectType::Core.to_string(), "core");
    }

    #[test]
    fn strict_bind_outside_machine_is_rejected() {
        let root = fake_sysfs("strict", &[(0, 0, 0)], &[]);
        let mut topo = SysTopology::load(&root).unwrap();
        let err = topo
            .set_cpubind(&CpuSet::from_cpus([0, 1]), BindFlags::STRICT)
            .unwrap_err();
        assert!(matches!(err, BindError::Os(nix::errno::Errno::EINVAL)));
        fs::remove_dir_all(root).unwrap();
    }
}
