use std::collections::BTreeMap;
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::utils::error::Error;

/// The sandbox flavors this service knows how to provision.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum SandboxKind {
    Centos,
    Ubuntu,
}

impl SandboxKind {
    /// Stable catalog key, also used as the kind label value and the
    /// container name inside the workload.
    pub fn key(&self) -> &'static str {
        match self {
            SandboxKind::Centos => "centos",
            SandboxKind::Ubuntu => "ubuntu",
        }
    }
}

impl TryFrom<u32> for SandboxKind {
    type Error = Error;

    fn try_from(kind: u32) -> Result<SandboxKind, Error> {
        match kind {
            1 => Ok(SandboxKind::Centos),
            2 => Ok(SandboxKind::Ubuntu),
            other => Err(Error::Validation(format!("unknown sandbox kind {}", other))),
        }
    }
}

/// A port the sandbox container listens on, exposed through the bundle's
/// service.
#[derive(Clone, Debug)]
pub struct BundlePort {
    pub name: String,
    pub port: i32,
}

/// How to build the container for one sandbox kind: image, entry command,
/// whether the container needs to run privileged, and the ports it serves.
#[derive(Clone, Debug)]
pub struct KindSpec {
    pub image: String,
    pub command: Vec<String>,
    pub privileged: bool,
    pub ports: Vec<BundlePort>,
}

/// Mapping from sandbox kind to its container recipe. Kept as an explicit
/// table so a kind is validated against the catalog's domain before any
/// object is built from it.
#[derive(Clone, Debug)]
pub struct Catalog {
    entries: BTreeMap<SandboxKind, KindSpec>,
}

impl Catalog {
    pub fn new(entries: BTreeMap<SandboxKind, KindSpec>) -> Self {
        Catalog { entries }
    }

    pub fn get(&self, kind: SandboxKind) -> Result<&KindSpec, Error> {
        self.entries
            .get(&kind)
            .ok_or_else(|| Error::Validation(format!("sandbox kind {:?} is not in the catalog", kind)))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let ssh = || {
            vec![BundlePort {
                name: "ssh".to_string(),
                port: 22,
            }]
        };

        let mut entries = BTreeMap::new();
        entries.insert(
            SandboxKind::Centos,
            KindSpec {
                image: "centos:7".to_string(),
                command: vec!["/usr/sbin/init".to_string()],
                privileged: true,
                ports: ssh(),
            },
        );
        entries.insert(
            SandboxKind::Ubuntu,
            KindSpec {
                image: "ubuntu:20.04".to_string(),
                command: vec!["/init.sh".to_string()],
                privileged: false,
                ports: ssh(),
            },
        );

        Catalog::new(entries)
    }
}
