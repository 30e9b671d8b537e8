use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::file_format::FileFormat;

pub type Result<T> = anyhow::Result<T>;

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> Result<String> {
    let text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned + 'static>(serialized: &str, format: FileFormat) -> Result<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads `path` and deserializes it in the format implied by its extension.
pub fn load_file<T: DeserializeOwned + 'static>(path: &Path) -> Result<T> {
    let format = FileFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    deserialize(&text, format)
}

/// Serializes `value` into `path` in the format implied by its extension.
pub fn save_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let format = FileFormat::from_path(path)?;
    std::fs::write(path, serialize(value, format)?)?;
    Ok(())
}
