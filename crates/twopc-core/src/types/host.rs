use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use fnv::FnvHasher;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Network endpoint of a remote participant.
///
/// Equality and hashing only look at `host` and `port`. The hash is computed
/// on first use and cached.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostInfo {
    host: String,
    port: u16,
    hash: OnceCell<u64>,
}

impl HostInfo {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, hash: OnceCell::new() }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    fn cached_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = FnvHasher::default();
            self.host.hash(&mut hasher);
            self.port.hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl PartialEq for HostInfo {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.host == other.host
    }
}

impl Eq for HostInfo {}

impl Hash for HostInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.cached_hash());
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostInfo").field("host", &self.host).field("port", &self.port).finish()
    }
}

impl FromStr for HostInfo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| anyhow!("expected host:port, got {s:?}"))?;
        if host.is_empty() {
            return Err(anyhow!("empty host in {s:?}"));
        }
        let port = port.parse::<u16>().with_context(|| format!("invalid port in {s:?}"))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for HostInfo {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<HostInfo> for String {
    fn from(info: HostInfo) -> Self {
        info.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;

    fn hash_of(info: &HostInfo) -> u64 {
        let mut hasher = DefaultHasher::new();
        info.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn structural_equality() {
        let a = HostInfo::new("localhost", 8080);
        let b = HostInfo::new("localhost", 8080);
        let c = HostInfo::new(String::from("localhost"), 8080);

        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_eq!(b, c);
        assert_eq!(a, c);

        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&c));
    }

    #[test]
    fn distinct_host_or_port() {
        let a = HostInfo::new("localhost", 8080);
        assert_ne!(a, HostInfo::new("localhost", 8081));
        assert_ne!(a, HostInfo::new("127.0.0.1", 8080));
    }

    #[test]
    fn cached_hash_is_stable() {
        let a = HostInfo::new("localhost", 8080);
        let first = hash_of(&a);
        let b = a.clone();
        assert_eq!(first, hash_of(&a));
        assert_eq!(first, hash_of(&b));
    }

    #[test]
    fn map_key() {
        let mut replies = HashMap::new();
        replies.insert(HostInfo::new("localhost", 8080), false);
        replies.insert(HostInfo::new("localhost", 8081), false);
        replies.insert(HostInfo::new("localhost", 8080), true);

        assert_eq!(replies.len(), 2);
        assert_eq!(replies.get(&HostInfo::new("localhost", 8080)), Some(&true));
    }

    #[test]
    fn parse() {
        let info: HostInfo = "localhost:8080".parse().unwrap();
        assert_eq!(info.host(), "localhost");
        assert_eq!(info.port(), 8080);
        assert_eq!(info.to_string(), "localhost:8080");

        assert!("localhost".parse::<HostInfo>().is_err());
        assert!(":8080".parse::<HostInfo>().is_err());
        assert!("localhost:99999".parse::<HostInfo>().is_err());
    }
}
