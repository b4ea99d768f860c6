//! Attribute string parsing (spec §4.6): the `key=value&key=value` gateway
//! descriptor applications pass to [`crate::registry::get`].

use crate::engine::DEFAULT_IDLE_TIMEOUT_MS;
use crate::status::PlcError;

/// Parsed, validated connection attributes for one PLC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribs {
    pub gateway: String,
    pub path: String,
    pub idle_timeout_ms: u32,
}

impl Attribs {
    /// Parse an attribute string of the form `gateway=10.0.0.1:44818&path=1,0`.
    /// `path` defaults to `"NO_PATH"` and `idle_timeout_ms` defaults to
    /// [`DEFAULT_IDLE_TIMEOUT_MS`] when absent.
    pub fn parse(attrs: &str) -> Result<Self, PlcError> {
        let mut gateway = None;
        let mut path = String::from("NO_PATH");
        let mut idle_timeout_ms = DEFAULT_IDLE_TIMEOUT_MS;

        for pair in attrs.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "gateway" => gateway = Some(value.to_string()),
                "path" => path = value.to_string(),
                "idle_timeout_ms" => {
                    let parsed: u32 = value
                        .parse()
                        .map_err(|_| PlcError::InvalidIdleTimeout(u32::MAX))?;
                    idle_timeout_ms = parsed;
                }
                _ => {}
            }
        }

        let gateway = gateway.ok_or(PlcError::MissingGateway)?;
        if !(0..=5000).contains(&idle_timeout_ms) {
            return Err(PlcError::InvalidIdleTimeout(idle_timeout_ms));
        }

        Ok(Attribs {
            gateway,
            path,
            idle_timeout_ms,
        })
    }

    /// The registry key a PLC is deduplicated on: dialect name plus the
    /// normalized `gateway:path` pair (spec.md §4.6 — "two `get` calls with
    /// the same effective attributes share one PLC instance").
    pub fn registry_key(&self, dialect: &str) -> String {
        format!("{dialect}|{}|{}", self.gateway, self.path)
    }

    /// Split `gateway` into `(host, port)`, falling back to `default_port`
    /// when no `:port` suffix is present.
    pub fn host_port(&self, default_port: u16) -> Result<(String, u16), PlcError> {
        match self.gateway.rsplit_once(':') {
            Some((host, port_str)) => {
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| PlcError::BadGateway(self.gateway.clone()))?;
                Ok((host.to_string(), port))
            }
            None => Ok((self.gateway.clone(), default_port)),
        }
    }
}
