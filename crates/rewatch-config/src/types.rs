use serde::{Deserialize, Serialize};

/// Module format the bundling engine renders a target in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CommonJS (`module.exports`)
    Cjs,
    /// ES module
    #[default]
    #[serde(alias = "esm")]
    Es,
    /// Self-executing function for `<script>` tags
    Iife,
    /// Universal module definition
    Umd,
    /// AMD (`define`)
    Amd,
    /// SystemJS
    System,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Cjs => "cjs",
            OutputFormat::Es => "es",
            OutputFormat::Iife => "iife",
            OutputFormat::Umd => "umd",
            OutputFormat::Amd => "amd",
            OutputFormat::System => "system",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source map generation mode.
///
/// Accepts the mode names as well as plain booleans: `true` means
/// [`SourceMapMode::External`], `false` means [`SourceMapMode::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "SourceMapSetting")]
pub enum SourceMapMode {
    /// No source maps
    #[default]
    None,
    /// Separate `.map` file referenced by a `sourceMappingURL` comment
    External,
    /// Map embedded in the code as a base64 data URL
    Inline,
    /// Separate `.map` file without a reference comment
    Hidden,
}

impl SourceMapMode {
    /// Whether any map is produced at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SourceMapMode::None)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceMapSetting {
    Flag(bool),
    Named(NamedSourceMap),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum NamedSourceMap {
    None,
    External,
    Inline,
    Hidden,
}

impl From<SourceMapSetting> for SourceMapMode {
    fn from(setting: SourceMapSetting) -> Self {
        match setting {
            SourceMapSetting::Flag(true) => SourceMapMode::External,
            SourceMapSetting::Flag(false) => SourceMapMode::None,
            SourceMapSetting::Named(NamedSourceMap::None) => SourceMapMode::None,
            SourceMapSetting::Named(NamedSourceMap::External) => SourceMapMode::External,
            SourceMapSetting::Named(NamedSourceMap::Inline) => SourceMapMode::Inline,
            SourceMapSetting::Named(NamedSourceMap::Hidden) => SourceMapMode::Hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_map_accepts_booleans() {
        let on: SourceMapMode = serde_json::from_value(json!(true)).unwrap();
        let off: SourceMapMode = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(on, SourceMapMode::External);
        assert_eq!(off, SourceMapMode::None);
    }

    #[test]
    fn source_map_accepts_names() {
        let inline: SourceMapMode = serde_json::from_value(json!("inline")).unwrap();
        assert_eq!(inline, SourceMapMode::Inline);
        assert!(serde_json::from_value::<SourceMapMode>(json!("sideways")).is_err());
    }

    #[test]
    fn source_map_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SourceMapMode::Hidden).unwrap(),
            json!("hidden")
        );
    }

    #[test]
    fn output_format_esm_alias() {
        let format: OutputFormat = serde_json::from_value(json!("esm")).unwrap();
        assert_eq!(format, OutputFormat::Es);
        assert_eq!(format.to_string(), "es");
    }
}
