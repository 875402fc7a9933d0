use serde::{Deserialize, Serialize};

use crate::{Result, TerminalError};

/// Asset class of a sample; decides how long preloading may wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Short incidental effect.
    #[default]
    Effect,
    /// Large thematic asset such as the mission theme.
    Theme,
}

/// Static playback configuration for one logical sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundDefinition {
    pub name: String,
    /// Sample reference handed to the sample bank, if the sound has one.
    #[serde(default)]
    pub sample: Option<String>,
    /// Base volume in `[0, 1]`.
    pub volume: f32,
    /// Skip the sample and always synthesize.
    #[serde(default)]
    pub prefer_synthesized: bool,
    #[serde(default)]
    pub class: AssetClass,
}

impl SoundDefinition {
    pub fn sampled(name: &str, volume: f32) -> Self {
        Self {
            name: name.to_string(),
            sample: Some(format!("audio/{name}.mp3")),
            volume: volume.clamp(0.0, 1.0),
            prefer_synthesized: false,
            class: AssetClass::Effect,
        }
    }

    pub fn synthesized(name: &str, volume: f32) -> Self {
        Self {
            prefer_synthesized: true,
            ..Self::sampled(name, volume)
        }
    }

    pub fn theme(mut self) -> Self {
        self.class = AssetClass::Theme;
        self
    }
}

/// Registry of every cataloged sound, defined once at startup.
///
/// Deserialized catalogs go through [`SoundCatalog::register`], so duplicate
/// names collapse and volumes are clamped exactly as for built-in ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SoundDefinition>", into = "Vec<SoundDefinition>")]
pub struct SoundCatalog {
    sounds: Vec<SoundDefinition>,
}

impl From<Vec<SoundDefinition>> for SoundCatalog {
    fn from(definitions: Vec<SoundDefinition>) -> Self {
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.register(definition);
        }
        catalog
    }
}

impl From<SoundCatalog> for Vec<SoundDefinition> {
    fn from(catalog: SoundCatalog) -> Self {
        catalog.sounds
    }
}

impl SoundCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shipped with the mission terminal.
    pub fn mission() -> Self {
        let mut catalog = Self::new();
        for definition in [
            SoundDefinition::sampled("power_on", 0.6),
            SoundDefinition::sampled("boot", 0.5),
            SoundDefinition::sampled("terminal", 0.4),
            SoundDefinition::synthesized("type", 0.15),
            SoundDefinition::sampled("beep", 0.3),
            SoundDefinition::sampled("click", 0.3),
            SoundDefinition::synthesized("hover", 0.1),
            SoundDefinition::sampled("access_granted", 0.6),
            SoundDefinition::sampled("access_denied", 0.6),
            SoundDefinition::sampled("alert", 0.5),
            SoundDefinition::sampled("data", 0.4),
            SoundDefinition::sampled("scan", 0.4),
            SoundDefinition::sampled("transition", 0.4),
            SoundDefinition::sampled("countdown", 0.5),
            SoundDefinition::synthesized("tick", 0.25),
            SoundDefinition::sampled("error", 0.5),
            SoundDefinition::sampled("success", 0.6),
            SoundDefinition::sampled("theme", 0.8).theme(),
        ] {
            catalog.register(definition);
        }
        catalog
    }

    /// Adds a definition, replacing any previous one with the same name.
    pub fn register(&mut self, mut definition: SoundDefinition) {
        definition.volume = definition.volume.clamp(0.0, 1.0);
        match self.sounds.iter_mut().find(|sound| sound.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.sounds.push(definition),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SoundDefinition> {
        self.sounds.iter().find(|sound| sound.name == name)
    }

    pub fn resolve(&self, name: &str) -> Result<&SoundDefinition> {
        self.get(name)
            .ok_or_else(|| TerminalError::UnknownSound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoundDefinition> {
        self.sounds.iter()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_sounds() {
        let catalog = SoundCatalog::mission();

        let beep = catalog.resolve("beep").unwrap();
        assert_eq!(beep.sample.as_deref(), Some("audio/beep.mp3"));
        assert!(!beep.prefer_synthesized);
        assert_eq!(catalog.resolve("theme").unwrap().class, AssetClass::Theme);
    }

    #[test]
    fn errors_on_missing_sounds() {
        let catalog = SoundCatalog::mission();

        let err = catalog.resolve("klaxon").unwrap_err();
        assert!(format!("{err}").contains("klaxon"));
    }

    #[test]
    fn register_replaces_and_clamps() {
        let mut catalog = SoundCatalog::new();
        catalog.register(SoundDefinition::sampled("beep", 0.3));
        catalog.register(SoundDefinition {
            volume: 4.0,
            ..SoundDefinition::synthesized("beep", 0.3)
        });

        assert_eq!(catalog.len(), 1);
        let beep = catalog.get("beep").unwrap();
        assert!(beep.prefer_synthesized);
        assert_eq!(beep.volume, 1.0);
    }

    #[test]
    fn definitions_parse_with_defaults() {
        let catalog: SoundCatalog = serde_json::from_str(
            r#"[{ "name": "hum", "volume": 0.2 }, { "name": "theme", "sample": "t.ogg", "volume": 0.9, "class": "theme" }]"#,
        )
        .unwrap();

        let hum = catalog.get("hum").unwrap();
        assert!(hum.sample.is_none());
        assert_eq!(hum.class, AssetClass::Effect);
        assert_eq!(catalog.get("theme").unwrap().class, AssetClass::Theme);
    }

    #[test]
    fn parsed_catalogs_are_clamped_and_deduplicated() {
        let catalog: SoundCatalog = serde_json::from_str(
            r#"[{ "name": "theme", "volume": 4.0 }, { "name": "hum", "volume": -1.0 }, { "name": "hum", "volume": 0.4 }]"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("theme").unwrap().volume, 1.0);
        assert_eq!(catalog.get("hum").unwrap().volume, 0.4);
    }
}
