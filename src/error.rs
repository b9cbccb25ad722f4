use crate::module::CkanModule;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Result type for the resolver, registry and sanity checker.
pub type KrakenResult<T> = std::result::Result<T, Kraken>;

/// Expected, recoverable failure conditions.
///
/// Every failure the resolver or registry can produce is one of these
/// variants, so callers can match exhaustively and render a specific
/// message for each.
#[derive(Error, Debug, Clone)]
pub enum Kraken {
    #[error("Module not found: {identifier}{}", version_suffix(.version))]
    ModuleNotFound {
        identifier: String,
        version: Option<String>,
    },

    #[error("{}", too_many_provides_message(.requested, .candidates))]
    TooManyModsProvide {
        requested: String,
        candidates: Vec<CkanModule>,
    },

    #[error("{}", inconsistent_message(.inconsistencies))]
    Inconsistent { inconsistencies: Vec<String> },

    #[error("Bad metadata for {identifier}: {message}")]
    BadMetadata { identifier: String, message: String },

    #[error("{installing} wishes to install {path}, but this file is registered to {owner}")]
    FileExists {
        path: String,
        owner: String,
        installing: String,
    },

    #[error("Cancelled: {0}")]
    CancelledAction(String),
}

impl Kraken {
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Kraken::ModuleNotFound {
            identifier: identifier.into(),
            version: None,
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Kraken::Inconsistent {
            inconsistencies: vec![message.into()],
        }
    }

    pub fn bad_metadata(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Kraken::BadMetadata {
            identifier: identifier.into(),
            message: message.into(),
        }
    }
}

fn version_suffix(version: &Option<String>) -> String {
    match version {
        Some(v) => format!(" version {}", v),
        None => String::new(),
    }
}

fn too_many_provides_message(requested: &str, candidates: &[CkanModule]) -> String {
    let mut message = format!("Too many mods provide {}:\n", requested);
    for candidate in candidates {
        message.push_str(&format!("\n  * {}", candidate));
    }
    message
}

fn inconsistent_message(inconsistencies: &[String]) -> String {
    let mut message = String::from("The following inconsistencies were found:\n");
    for issue in inconsistencies {
        message.push_str(&format!("\n  * {}", issue));
    }
    message
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Kraken(#[from] Kraken),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{0} is not a valid game version")]
    BadGameVersion(String),

    #[error("Registry version {0} is not supported\n\n\
             Hint: This registry was written by a newer release.\n\
             Upgrade ckan, or move the registry file aside and run: ckan scan")]
    RegistryVersionNotSupported(u32),

    #[error("No game instance configured{}\n\n\
             Hint: Register the game directory first:\n\
                ckan instance add <name> <path> <game-version>",
             .0)]
    NoInstance(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The kraken behind this error, if it is one.
    pub fn as_kraken(&self) -> Option<&Kraken> {
        match self {
            Error::Kraken(k) => Some(k),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_not_found_message() {
        let err = Kraken::not_found("Kopernicus");
        assert_eq!(err.to_string(), "Module not found: Kopernicus");

        let err = Kraken::ModuleNotFound {
            identifier: "Kopernicus".to_string(),
            version: Some("1.2".to_string()),
        };
        assert_eq!(err.to_string(), "Module not found: Kopernicus version 1.2");
    }

    #[test]
    fn test_inconsistent_lists_every_issue() {
        let err = Kraken::Inconsistent {
            inconsistencies: vec!["A conflicts with B".to_string(), "C needs D".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("* A conflicts with B"));
        assert!(msg.contains("* C needs D"));
    }

    #[test]
    fn test_kraken_converts_into_error() {
        let err: Error = Kraken::CancelledAction("user declined".to_string()).into();
        assert!(matches!(
            err.as_kraken(),
            Some(Kraken::CancelledAction(reason)) if reason == "user declined"
        ));
    }
}
