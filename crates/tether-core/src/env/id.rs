//! Stable textual identity for execution environments.
//!
//! The id is the key used in persisted state, so it must never change for a
//! given environment.

use super::ExecutionEnvironment;

const LOCAL_ID: &str = "local";
const REMOTE_SCHEME: &str = "ssh://";

/// Characters escaped inside id components, with their escapes. `%` comes
/// first so escaping never double-escapes.
const ESCAPES: [(char, &str); 4] = [('%', "%25"), (',', "%2C"), ('|', "%7C"), ('@', "%40")];

/// Converts environments to and from opaque, stable ids.
pub trait EnvironmentIdCodec: Send + Sync {
    fn to_unique_id(&self, env: &ExecutionEnvironment) -> String;

    /// Returns `None` for ids this codec did not produce.
    fn from_unique_id(&self, id: &str) -> Option<ExecutionEnvironment>;
}

/// Default codec: `local` for the local machine, `ssh://user@host:port` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct UriIdCodec;

impl EnvironmentIdCodec for UriIdCodec {
    fn to_unique_id(&self, env: &ExecutionEnvironment) -> String {
        if env.is_local() {
            LOCAL_ID.to_string()
        } else {
            format!(
                "{REMOTE_SCHEME}{}@{}:{}",
                escape_component(env.user()),
                escape_component(env.host()),
                env.port()
            )
        }
    }

    fn from_unique_id(&self, id: &str) -> Option<ExecutionEnvironment> {
        if id == LOCAL_ID {
            return Some(ExecutionEnvironment::local());
        }
        let rest = id.strip_prefix(REMOTE_SCHEME)?;
        let (user, address) = rest.split_once('@')?;
        // Ids always carry an explicit port.
        let (host, port) = address.rsplit_once(':')?;
        let port = port.parse::<u16>().ok()?;
        if user.is_empty() || host.is_empty() || host.contains('@') {
            return None;
        }
        Some(ExecutionEnvironment::remote(
            unescape_component(user),
            unescape_component(host),
            port,
        ))
    }
}

fn escape_component(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match ESCAPES.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, escape)) => escaped.push_str(escape),
            None => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of [`escape_component`]. A `%` that starts no known escape is kept
/// as is.
fn unescape_component(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('%') {
        unescaped.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ESCAPES.iter().find(|(_, escape)| rest.starts_with(escape)) {
            Some((reserved, escape)) => {
                unescaped.push(*reserved);
                rest = &rest[escape.len()..];
            }
            None => {
                unescaped.push('%');
                rest = &rest[1..];
            }
        }
    }
    unescaped.push_str(rest);
    unescaped
}
