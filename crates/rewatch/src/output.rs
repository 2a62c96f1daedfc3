//! Artifact serialization: in-memory rendering and on-disk writes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use futures::future::try_join_all;
use rewatch_config::{OutputTarget, SourceMapMode};

use crate::engine::{Artifact, RenderedChunk};
use crate::error::BuildError;
use crate::sourcemap;

/// Rendered files keyed by their configured destination.
pub type FileMap = BTreeMap<PathBuf, String>;

/// Which serialization modes are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputModes {
    pub in_memory: bool,
    pub write: bool,
}

/// Serialize `artifact` to every target concurrently.
///
/// Succeeds only if every target does. The returned map is empty unless
/// in-memory rendering is enabled.
pub async fn serialize(
    artifact: &dyn Artifact,
    targets: &[OutputTarget],
    modes: OutputModes,
) -> Result<FileMap, BuildError> {
    let outputs = try_join_all(
        targets
            .iter()
            .map(|target| serialize_target(artifact, target, modes)),
    )
    .await?;

    Ok(outputs.into_iter().flatten().collect())
}

async fn serialize_target(
    artifact: &dyn Artifact,
    target: &OutputTarget,
    modes: OutputModes,
) -> Result<Vec<(PathBuf, String)>, BuildError> {
    let mut files = Vec::new();
    if modes.in_memory {
        let chunk = artifact.render(target).await?;
        files = memory_entries(target, chunk)?;
    }
    if modes.write {
        artifact.write(target).await?;
    }
    Ok(files)
}

/// Entries a rendered chunk contributes to the in-memory file map.
///
/// Inline maps are appended to the code as a data URL. External maps get
/// their own `<dest>.map` entry and a comment pointing at it; hidden maps get
/// the entry without the comment.
pub fn memory_entries(
    target: &OutputTarget,
    chunk: RenderedChunk,
) -> Result<Vec<(PathBuf, String)>, BuildError> {
    let RenderedChunk { mut code, map } = chunk;
    let mode = target.source_map();

    let Some(map) = map.filter(|_| mode.is_enabled()) else {
        return Ok(vec![(target.dest.clone(), code)]);
    };

    let encoding_failed = |error: serde_json::Error| {
        BuildError::new(format!("Failed to encode source map: {error}"))
            .with_code("SOURCEMAP_ERROR")
    };

    match mode {
        SourceMapMode::Inline => {
            let url = sourcemap::to_url(&map).map_err(encoding_failed)?;
            code.push_str(&sourcemap::comment(&url));
            Ok(vec![(target.dest.clone(), code)])
        }
        SourceMapMode::External | SourceMapMode::Hidden => {
            let map_path = target.map_path();
            if mode == SourceMapMode::External {
                let file_name = map_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                code.push_str(&sourcemap::comment(&file_name));
            }
            let json = sourcemap::to_string(&map).map_err(encoding_failed)?;
            Ok(vec![(target.dest.clone(), code), (map_path, json)])
        }
        SourceMapMode::None => Ok(vec![(target.dest.clone(), code)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewatch_config::OutputFormat;
    use serde_json::json;

    fn chunk() -> RenderedChunk {
        RenderedChunk::new("var main = 42;\n").with_map(json!({ "version": 3, "mappings": "" }))
    }

    #[test]
    fn no_source_map_keeps_code_untouched() {
        let target = OutputTarget::new("dist/bundle.js", OutputFormat::Cjs);
        let entries = memory_entries(&target, chunk()).unwrap();
        assert_eq!(
            entries,
            vec![(PathBuf::from("dist/bundle.js"), "var main = 42;\n".to_string())]
        );
    }

    #[test]
    fn inline_map_is_appended_as_data_url() {
        let target = OutputTarget::new("dist/bundle.js", OutputFormat::Cjs)
            .with_source_map(SourceMapMode::Inline);
        let entries = memory_entries(&target, chunk()).unwrap();

        assert_eq!(entries.len(), 1);
        let code = &entries[0].1;
        assert!(code.contains(&format!(
            "\n//# sourceMappingURL={}",
            sourcemap::DATA_URL_PREFIX
        )));
    }

    #[test]
    fn external_map_gets_its_own_entry() {
        let target = OutputTarget::new("dist/bundle.js", OutputFormat::Cjs)
            .with_source_map(SourceMapMode::External);
        let entries = memory_entries(&target, chunk()).unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].1.ends_with("\n//# sourceMappingURL=bundle.js.map"));
        assert_eq!(entries[1].0, PathBuf::from("dist/bundle.js.map"));
        let map: serde_json::Value = serde_json::from_str(&entries[1].1).unwrap();
        assert_eq!(map["version"], 3);
    }

    #[test]
    fn hidden_map_has_no_comment() {
        let target = OutputTarget::new("dist/bundle.js", OutputFormat::Cjs)
            .with_source_map(SourceMapMode::Hidden);
        let entries = memory_entries(&target, chunk()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "var main = 42;\n");
    }

    #[test]
    fn missing_map_is_tolerated() {
        let target = OutputTarget::new("dist/bundle.js", OutputFormat::Cjs)
            .with_source_map(SourceMapMode::External);
        let entries = memory_entries(&target, RenderedChunk::new("x")).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
