//! Row types mapped from the SQLite tables.

use rusqlite::Row;

/// One credential slot as stored.
#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub value_enc: Option<Vec<u8>>,
    pub created_at_unix_ms: u64,
    pub updated_at_unix_ms: Option<u64>,
}

impl CredentialRow {
    pub fn value_exists(&self) -> bool {
        self.value_enc.is_some()
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            value_enc: row.get("value_enc")?,
            created_at_unix_ms: row.get("created_at_unix_ms")?,
            updated_at_unix_ms: row.get("updated_at_unix_ms")?,
        })
    }
}

/// Lifecycle state derived from the `locked`/`revoked` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Unlocked,
    Locked,
    Revoked,
}

impl ProfileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileState::Unlocked => "unlocked",
            ProfileState::Locked => "locked",
            ProfileState::Revoked => "revoked",
        }
    }
}

/// One profile as stored. The key secret stays encrypted here; only
/// `airlock-profile` ever opens it.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub description: String,
    pub locked: bool,
    pub key_id: Option<String>,
    pub key_secret_enc: Option<Vec<u8>>,
    pub expires_at_unix_ms: Option<u64>,
    pub revoked: bool,
    pub network_allowlist: Option<Vec<String>>,
    pub created_at_unix_ms: u64,
    pub updated_at_unix_ms: Option<u64>,
    pub last_used_at_unix_ms: Option<u64>,
}

impl ProfileRow {
    pub fn state(&self) -> ProfileState {
        if self.revoked {
            ProfileState::Revoked
        } else if self.locked {
            ProfileState::Locked
        } else {
            ProfileState::Unlocked
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id: String = row.get("id")?;
        let raw_allowlist: Option<String> = row.get("network_allowlist")?;
        let network_allowlist = raw_allowlist
            .map(|encoded| {
                serde_json::from_str::<Vec<String>>(&encoded).map_err(|error| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(error),
                    )
                })
            })
            .transpose()?;
        Ok(Self {
            id,
            description: row.get("description")?,
            locked: row.get::<_, i64>("locked")? != 0,
            key_id: row.get("key_id")?,
            key_secret_enc: row.get("key_secret_enc")?,
            expires_at_unix_ms: row.get("expires_at_unix_ms")?,
            revoked: row.get::<_, i64>("revoked")? != 0,
            network_allowlist,
            created_at_unix_ms: row.get("created_at_unix_ms")?,
            updated_at_unix_ms: row.get("updated_at_unix_ms")?,
            last_used_at_unix_ms: row.get("last_used_at_unix_ms")?,
        })
    }
}

/// One execution record as stored. Non-terminal fields stay empty until the
/// dispatcher finalizes the row.
#[derive(Debug, Clone)]
pub struct ExecutionRow {
    pub id: String,
    pub profile_id: String,
    pub script: String,
    pub status: String,
    pub result_json: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub redacted: bool,
    pub created_at_unix_ms: u64,
    pub completed_at_unix_ms: Option<u64>,
}

impl ExecutionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            profile_id: row.get("profile_id")?,
            script: row.get("script")?,
            status: row.get("status")?,
            result_json: row.get("result_json")?,
            stdout: row.get("stdout")?,
            stderr: row.get("stderr")?,
            error: row.get("error")?,
            execution_time_ms: row.get("execution_time_ms")?,
            redacted: row.get::<_, i64>("redacted")? != 0,
            created_at_unix_ms: row.get("created_at_unix_ms")?,
            completed_at_unix_ms: row.get("completed_at_unix_ms")?,
        })
    }
}
