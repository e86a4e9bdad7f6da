use crate::util::{Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

/// Contents of a cluster file: `description:id@addr[,addr...]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionString {
    description: String,
    id: String,
    coordinators: Vec<SocketAddr>,
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ConnectionString {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coordinators(&self) -> &[SocketAddr] {
        &self.coordinators
    }

    /// Reads the connection string from a cluster file. Blank lines and
    /// lines starting with `#` are ignored.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| Error::NoClusterFileFound(path.display().to_string()))?;
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));
        let line = lines.next().ok_or_else(|| {
            Error::ConnectionStringInvalid(format!("{} is empty", path.display()))
        })?;
        if lines.next().is_some() {
            return Err(Error::ConnectionStringInvalid(format!(
                "{} holds more than one connection string",
                path.display()
            )));
        }
        line.parse()
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| Error::ConnectionStringInvalid(format!("'{}': {}", s, why));
        let (name, addrs) = s
            .trim()
            .split_once('@')
            .ok_or_else(|| invalid("missing '@'"))?;
        let (description, id) = name
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' between description and id"))?;
        if !is_token(description) || !is_token(id) {
            return Err(invalid("description and id must be alphanumeric"));
        }
        let coordinators = addrs
            .split(',')
            .map(|a| a.trim().parse::<SocketAddr>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            description: description.to_owned(),
            id: id.to_owned(),
            coordinators,
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@", self.description, self.id)?;
        for (i, addr) in self.coordinators.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", addr)?;
        }
        Ok(())
    }
}
