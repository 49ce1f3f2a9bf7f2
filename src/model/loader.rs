//! Load model definitions from a directory of JSON files (one model per file).

use crate::error::ConfigError;
use crate::model::ModelDef;
use std::path::Path;

/// Read every `*.json` file in `dir` as a [`ModelDef`], ordered by file name.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<Vec<ModelDef>, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut models = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let def: ModelDef =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(model = %def.name, path = %path.display(), "loaded model definition");
        models.push(def);
    }
    Ok(models)
}
