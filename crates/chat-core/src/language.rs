use serde::{Deserialize, Serialize};

pub const UNKNOWN_LANGUAGE_CODE: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatLanguage {
    #[default]
    English,
    Hindi,
    Hinglish,
}

impl ChatLanguage {
    /// Parses a caller-facing label; anything unrecognised replies in English.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("hindi") => Self::Hindi,
            Some(value) if value.eq_ignore_ascii_case("hinglish") => Self::Hinglish,
            _ => Self::English,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::Hinglish => "Hinglish",
        }
    }

    pub const fn provider_language_code(self) -> &'static str {
        match self {
            Self::English => "en-IN",
            Self::Hindi | Self::Hinglish => "hi-IN",
        }
    }
}

/// Maps a raw label straight to a speech provider code. Unlike
/// [`ChatLanguage::from_label`] this does not default to English.
pub fn provider_language_code_for_label(label: Option<&str>) -> &'static str {
    match label.map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("english") => "en-IN",
        Some(value)
            if value.eq_ignore_ascii_case("hindi") || value.eq_ignore_ascii_case("hinglish") =>
        {
            "hi-IN"
        }
        _ => UNKNOWN_LANGUAGE_CODE,
    }
}
