//! Compact encoding of the remote server list.
//!
//! Servers are joined by `,`; each server's fields are joined by `|` in a
//! fixed order:
//!
//! ```text
//! hostKey | displayName | syncStrategyId | x11Flag | osFamily | cpuFamily | osVersion
//! ```
//!
//! Fields were appended over time, so older strings carry fewer of them;
//! anything missing from the end decodes as absent. Unknown tokens are
//! logged and treated as unknown, never failing the whole list.

use tracing::warn;

use crate::env::ExecutionEnvironment;
use crate::env::id::EnvironmentIdCodec;
use crate::error::CodecError;
use crate::host::{CpuFamily, HostProfile, OsFamily};
use crate::server::escape_display_name;

pub const RECORD_SEPARATOR: char = ',';
pub const FIELD_SEPARATOR: char = '|';

const TRUE_TOKEN: &str = "true";
const FALSE_TOKEN: &str = "false";

/// The persisted part of a remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedServer {
    pub env: ExecutionEnvironment,
    pub display_name: String,
    pub sync_strategy: Option<String>,
    pub x11_forwarding: bool,
    pub profile: HostProfile,
}

impl SavedServer {
    /// A saved entry with only the host key and name; everything else absent.
    pub fn new(env: ExecutionEnvironment, display_name: impl Into<String>) -> Self {
        Self {
            env,
            display_name: display_name.into(),
            sync_strategy: None,
            x11_forwarding: false,
            profile: HostProfile::default(),
        }
    }
}

/// Encodes and decodes the saved server list.
pub struct ServerListCodec<'a> {
    ids: &'a dyn EnvironmentIdCodec,
}

impl<'a> ServerListCodec<'a> {
    pub fn new(ids: &'a dyn EnvironmentIdCodec) -> Self {
        Self { ids }
    }

    /// Encode remote servers. Local entries are skipped.
    pub fn encode(&self, servers: &[SavedServer]) -> String {
        servers
            .iter()
            .filter(|server| server.env.is_remote())
            .map(|server| self.encode_server(server))
            .collect::<Vec<_>>()
            .join(&RECORD_SEPARATOR.to_string())
    }

    fn encode_server(&self, server: &SavedServer) -> String {
        let profile = &server.profile;
        let fields = [
            self.ids.to_unique_id(&server.env),
            escape_display_name(&server.display_name),
            server
                .sync_strategy
                .as_deref()
                .map(escape_display_name)
                .unwrap_or_default(),
            x11_token(server.x11_forwarding).to_string(),
            profile
                .os_family
                .map(|os| os.as_token().to_string())
                .unwrap_or_default(),
            profile
                .cpu_family
                .map(|cpu| cpu.as_token().to_string())
                .unwrap_or_default(),
            profile
                .os_version
                .as_deref()
                .map(escape_display_name)
                .unwrap_or_default(),
        ];
        fields.join(&FIELD_SEPARATOR.to_string())
    }

    /// Decode a saved list. Entries whose host key cannot be read are logged
    /// and dropped; the rest of the list still loads.
    pub fn decode(&self, encoded: &str) -> Vec<SavedServer> {
        encoded
            .split(RECORD_SEPARATOR)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).collect();
                match self.decode_fields(&fields) {
                    Ok(server) => Some(server),
                    Err(err) => {
                        warn!(entry, error = %err, "skipping saved server");
                        None
                    }
                }
            })
            .collect()
    }

    /// Decode one server from its split fields.
    ///
    /// # Panics
    ///
    /// An empty field list is a caller bug: splitting never yields one.
    pub fn decode_fields(&self, fields: &[&str]) -> Result<SavedServer, CodecError> {
        assert!(!fields.is_empty(), "{}", CodecError::EmptyRecord);

        let host_key = fields[0];
        let env = self
            .ids
            .from_unique_id(host_key)
            .filter(ExecutionEnvironment::is_remote)
            .ok_or_else(|| CodecError::UnknownHostKey(host_key.to_string()))?;

        let field = |index: usize| fields.get(index).copied().filter(|value| !value.is_empty());

        let display_name = field(1)
            .map(escape_display_name)
            .unwrap_or_else(|| escape_display_name(&env.to_string()));

        let x11_forwarding = match field(3) {
            None | Some(FALSE_TOKEN) => false,
            Some(TRUE_TOKEN) => true,
            Some(other) => {
                warn!(token = other, server = %env, "unknown x11 flag, assuming off");
                false
            }
        };

        let profile = HostProfile {
            os_family: field(4).and_then(|token| parse_token::<OsFamily>(token, &env)),
            cpu_family: field(5).and_then(|token| parse_token::<CpuFamily>(token, &env)),
            os_version: field(6).map(str::to_string),
        };

        Ok(SavedServer {
            display_name,
            sync_strategy: field(2).map(str::to_string),
            x11_forwarding,
            profile,
            env,
        })
    }
}

fn x11_token(enabled: bool) -> &'static str {
    if enabled { TRUE_TOKEN } else { FALSE_TOKEN }
}

fn parse_token<T>(token: &str, env: &ExecutionEnvironment) -> Option<T>
where
    T: std::str::FromStr<Err = CodecError>,
{
    match token.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(server = %env, error = %err, "ignoring saved host detail");
            None
        }
    }
}
