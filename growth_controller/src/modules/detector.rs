//! `det` module: detector identity and liveness.

use chrono::Local;
use growth_common::config::GrowthConfig;
use growth_common::module::{Subsystem, Verb};
use growth_common::protocol::{Options, Reply};
use nix::ifaddrs::getifaddrs;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Interfaces searched by `det.ip`, WiFi first.
const IP_INTERFACES: [&str; 2] = ["wlan0", "eth0"];

/// Verbs served by the `det` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetVerb {
    Id,
    Ip,
    Hash,
    Ping,
}

impl Verb for DetVerb {
    const ALL: &'static [Self] = &[
        DetVerb::Id,
        DetVerb::Ip,
        DetVerb::Hash,
        DetVerb::Ping,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DetVerb::Id => "id",
            DetVerb::Ip => "ip",
            DetVerb::Hash => "hash",
            DetVerb::Ping => "ping",
        }
    }
}

/// Resolves the first IPv4 address of a network interface.
pub type InterfaceLookup = fn(&str) -> Option<Ipv4Addr>;

pub struct DetModule {
    config: Arc<GrowthConfig>,
    lookup: InterfaceLookup,
}

impl DetModule {
    pub fn new(config: Arc<GrowthConfig>) -> Self {
        Self::with_lookup(config, interface_ipv4)
    }

    /// Use a custom interface lookup.
    pub fn with_lookup(config: Arc<GrowthConfig>, lookup: InterfaceLookup) -> Self {
        Self { config, lookup }
    }

    fn ip(&self) -> Reply {
        IP_INTERFACES
            .iter()
            .find_map(|name| (self.lookup)(name))
            .map(|ip| Reply::ok().with("ip", ip.to_string()))
            .unwrap_or_else(|| Reply::error("IP address not assigned"))
    }

    fn hash(&self) -> Reply {
        let Some(repository) = self.config.repository() else {
            return Reply::error("GROWTH git repository not configured");
        };
        if !repository.exists() {
            return Reply::error(format!(
                "GROWTH git repository '{}' not found",
                repository.display()
            ));
        }
        match head_commit(repository) {
            Ok(hash) => Reply::ok().with("hash", hash),
            Err(e) => {
                warn!("Could not resolve HEAD of {}: {}", repository.display(), e);
                Reply::error(format!(
                    "Could not resolve HEAD of '{}' ({e})",
                    repository.display()
                ))
            }
        }
    }
}

impl Subsystem for DetModule {
    type Verb = DetVerb;

    fn handle(&mut self, verb: DetVerb, _options: &Options) -> Reply {
        match verb {
            DetVerb::Id => Reply::ok().with("detector_id", self.config.detector_id()),
            DetVerb::Ip => self.ip(),
            DetVerb::Hash => self.hash(),
            DetVerb::Ping => Reply::ok().with("time", Local::now()),
        }
    }
}

/// First IPv4 address assigned to `interface`.
pub fn interface_ipv4(interface: &str) -> Option<Ipv4Addr> {
    let addrs = getifaddrs().ok()?;
    addrs
        .filter(|ifaddr| ifaddr.interface_name == interface)
        .filter_map(|ifaddr| ifaddr.address)
        .find_map(|addr| addr.as_sockaddr_in().map(|sin| sin.ip()))
}

/// Commit hash at HEAD of a git working tree.
///
/// `.git` may be the git directory itself or a `gitdir:` link file, as in
/// linked worktrees and submodules. A symbolic HEAD is followed through
/// loose refs, then `packed-refs`.
pub fn head_commit(repository: &Path) -> io::Result<String> {
    let git_dir = git_dir(repository)?;
    let head = fs::read_to_string(git_dir.join("HEAD"))?;
    let head = head.trim();

    let Some(reference) = head.strip_prefix("ref:").map(str::trim) else {
        return Ok(head.to_string());
    };

    let refs_dir = common_dir(&git_dir);
    for dir in [&git_dir, &refs_dir] {
        match fs::read_to_string(dir.join(reference)) {
            Ok(hash) => return Ok(hash.trim().to_string()),
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            Err(_) => {}
        }
    }

    let packed = fs::read_to_string(refs_dir.join("packed-refs"))?;
    packed
        .lines()
        .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
        .find_map(|line| {
            let (hash, name) = line.split_once(' ')?;
            (name.trim() == reference).then(|| hash.to_string())
        })
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{reference} not found")))
}

fn git_dir(repository: &Path) -> io::Result<PathBuf> {
    let dot_git = repository.join(".git");
    if dot_git.is_dir() {
        return Ok(dot_git);
    }
    let link = fs::read_to_string(&dot_git)?;
    let target = link
        .trim()
        .strip_prefix("gitdir:")
        .map(str::trim)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is neither a directory nor a gitdir link", dot_git.display()),
            )
        })?;
    // Relative links are relative to the working tree.
    Ok(repository.join(target))
}

/// Directory holding the shared refs. Differs from `git_dir` only in a
/// linked worktree, which names it in `commondir`.
fn common_dir(git_dir: &Path) -> PathBuf {
    match fs::read_to_string(git_dir.join("commondir")) {
        Ok(common) => git_dir.join(common.trim()),
        Err(_) => git_dir.to_path_buf(),
    }
}
