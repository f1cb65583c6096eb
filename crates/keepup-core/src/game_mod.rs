//! Game modification allow-list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A mod a managed server may run. Only these are accepted by `addServer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mod {
    Etjump,
    Etmain,
    Etpro,
    Jaymod,
    Silent,
    Shrubet,
    Etpub,
    Nitmod,
    Tjmod,
}

impl Mod {
    /// Every allowed mod, in display order.
    pub const ALL: [Mod; 9] = [
        Mod::Etjump,
        Mod::Etmain,
        Mod::Etpro,
        Mod::Jaymod,
        Mod::Silent,
        Mod::Shrubet,
        Mod::Etpub,
        Mod::Nitmod,
        Mod::Tjmod,
    ];

    /// The `fs_game` directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mod::Etjump => "etjump",
            Mod::Etmain => "etmain",
            Mod::Etpro => "etpro",
            Mod::Jaymod => "jaymod",
            Mod::Silent => "silent",
            Mod::Shrubet => "shrubet",
            Mod::Etpub => "etpub",
            Mod::Nitmod => "nitmod",
            Mod::Tjmod => "tjmod",
        }
    }

    /// Comma separated list of allowed mods, for error messages.
    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(Mod::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown mod: {s}"))
    }
}
