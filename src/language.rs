use serde::{Deserialize, Serialize};
use std::fmt;

/// Target language for every generation task. The code is what the user
/// supplies and what gets persisted; the display name is what gets embedded
/// in prompts sent to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "BR")]
    Br,
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "ES")]
    Es,
}

impl Language {
    /// Strict parse. Unknown codes return `None`; the translate operation
    /// treats that as a hard error.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "BR" => Some(Self::Br),
            "EN" => Some(Self::En),
            "ES" => Some(Self::Es),
            _ => None,
        }
    }

    /// Lenient parse for generation operations: unknown codes fall back to
    /// Brazilian Portuguese, the tool's default.
    pub fn parse_or_default(code: &str) -> Self {
        Self::parse(code).unwrap_or_default()
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Br => "BR",
            Self::En => "EN",
            Self::Es => "ES",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Br => "Brazilian Portuguese",
            Self::En => "English",
            Self::Es => "Spanish",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
