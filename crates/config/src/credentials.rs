use crate::error::{ErrorKind, Result};
use std::fmt;

/// Object store credentials, read only from the environment.
///
/// | Variable        | Meaning                                        |
/// |-----------------|------------------------------------------------|
/// | `STOW_AUTH_URL` | service endpoint                               |
/// | `STOW_IDENTITY` | access key id                                  |
/// | `STOW_SECRET`   | secret access key                              |
/// | `STOW_REGION`   | region                                         |
/// | `STOW_PROJECT`  | optional key prefix inside the container       |
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub identity: String,
    pub secret: String,
    pub region: String,
    pub project: Option<String>,
}

/// Unset, empty and whitespace-only all count as missing.
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Credentials {
    /// Read credentials from `STOW_*` environment variables.
    ///
    /// Values are taken verbatim (never parsed), and the call fails listing
    /// *every* missing required variable so they can all be fixed in one go.
    pub fn from_env() -> Result<Self> {
        match (var("STOW_AUTH_URL"), var("STOW_IDENTITY"), var("STOW_SECRET"), var("STOW_REGION")) {
            (Some(endpoint), Some(identity), Some(secret), Some(region)) => {
                Ok(Self { endpoint, identity, secret, region, project: var("STOW_PROJECT") })
            },
            (endpoint, identity, secret, region) => {
                let missing = [
                    ("STOW_AUTH_URL", endpoint.is_none()),
                    ("STOW_IDENTITY", identity.is_none()),
                    ("STOW_SECRET", secret.is_none()),
                    ("STOW_REGION", region.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then(|| name.to_string()))
                .collect();
                exn::bail!(ErrorKind::MissingVariables(missing))
            },
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("region", &self.region)
            .field("project", &self.project)
            .finish()
    }
}
