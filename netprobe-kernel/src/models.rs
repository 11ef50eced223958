use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Outils de diagnostic exposés par l'API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Ping,
    Nmap,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ping, Tool::Nmap];

    pub fn label(self) -> &'static str {
        match self {
            Tool::Ping => "ping",
            Tool::Nmap => "nmap",
        }
    }

    /// Binaire lancé, résolu via PATH (même nom que le libellé de route)
    pub fn program(self) -> &'static str {
        self.label()
    }

    /// Flags fixes placés avant la cible (jamais dérivés de la requête)
    pub fn fixed_flags(self) -> &'static [&'static str] {
        match self {
            Tool::Ping => &["-c", "4"],
            Tool::Nmap => &["-F"],
        }
    }

    /// Libellé utilisé dans les messages d'erreur génériques
    pub fn activity(self) -> &'static str {
        match self {
            Tool::Ping => "ping",
            Tool::Nmap => "nmap scan",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(Tool::Ping),
            "nmap" => Ok(Tool::Nmap),
            other => Err(UnknownTool(other.to_string())),
        }
    }
}

/// Ligne d'historique persistée pour une exécution terminée.
/// `output` et `error` ne sont jamais renseignés ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: u64,
    pub hostname: String,
    pub output: Option<String>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Corps de réponse des routes /ping et /scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn output(hostname: &str, output: String) -> Self {
        Self { hostname: hostname.to_string(), output: Some(output), error: None }
    }

    pub fn error(hostname: &str, error: String) -> Self {
        Self { hostname: hostname.to_string(), output: None, error: Some(error) }
    }
}
