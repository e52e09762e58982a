use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP-47 style tag as the host reports it, e.g. `en-US` or `en_GB`.
    pub lang: String,
    pub is_default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>, is_default: bool) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            is_default,
        }
    }

    fn speaks(&self, language: &str) -> bool {
        let primary = self
            .lang
            .split(['-', '_'])
            .next()
            .unwrap_or_default();
        primary.eq_ignore_ascii_case(language)
    }

    fn is_enhanced(&self) -> bool {
        self.name.contains("Enhanced") || self.name.contains("Premium")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoicePreferences {
    /// Primary language subtag the session speaks, e.g. `en`.
    pub language: String,
    /// Voice names tried first, in order. Matched as substrings; all but
    /// the first must also speak `language`.
    pub preferred_names: Vec<String>,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            language: "en".into(),
            preferred_names: vec!["Samantha".into(), "Siri".into(), "Daniel".into()],
        }
    }
}

/// Best-effort voice choice. `None` only when `voices` is empty, in which
/// case the host default is used.
pub fn select_voice(voices: &[Voice], prefs: &VoicePreferences) -> Option<Voice> {
    let language = prefs.language.as_str();

    prefs
        .preferred_names
        .iter()
        .enumerate()
        .find_map(|(rank, name)| {
            // Only the top choice may come from another language.
            voices
                .iter()
                .find(|v| v.name.contains(name.as_str()) && (rank == 0 || v.speaks(language)))
        })
        .or_else(|| voices.iter().find(|v| v.is_enhanced() && v.speaks(language)))
        .or_else(|| voices.iter().find(|v| v.is_default && v.speaks(language)))
        .or_else(|| voices.iter().find(|v| v.speaks(language)))
        .or_else(|| voices.first())
        .cloned()
}
