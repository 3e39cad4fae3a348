//! config.yml 读写：默认值合并、带注释回写、字段校验。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    fn fields() -> &'static [FieldMeta];

    /// 合并完成后的语义校验；默认不做限制。
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Load `FILE_NAME` from `base_dir` (or the current directory), creating it
/// with defaults when absent.
///
/// User values are merged over `T::default()`, so an older file missing newer
/// keys still loads; in that case the file is rewritten with every key and its
/// comment so the user can see what was added.
pub fn load_or_create<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = match base_dir {
        Some(base) => base.join(T::FILE_NAME),
        None => PathBuf::from(T::FILE_NAME),
    };
    load_or_create_at(&path)
}

pub fn load_or_create_at<T: ConfigSpec>(path: &Path) -> Result<T, ConfigError> {
    ensure_parent(path)?;

    if !path.exists() {
        let default_config = T::default();
        write_with_comments(&default_config, path)?;
        return Ok(default_config);
    }

    let user_yaml = read_yaml(path)?;
    let missing = has_missing_fields::<T>(&user_yaml);

    let mut merged = serde_yaml::to_value(T::default())
        .map_err(|err| ConfigError::Validation(err.to_string()))?;
    merge_values(&mut merged, user_yaml);

    let config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;
    config.validate()?;

    if missing {
        write_with_comments(&config, path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let value =
        serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))?;
    let Value::Mapping(mapping) = value else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut lines = Vec::with_capacity(T::fields().len() * 2);
    for field in T::fields() {
        if !field.description.is_empty() {
            lines.push(format!("# {}", field.description.replace('\n', "\n# ")));
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let yaml_line = serde_yaml::to_string(&serde_yaml::Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        lines.push(yaml_line.trim_end().to_string());
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn has_missing_fields<T: ConfigSpec>(user_yaml: &Value) -> bool {
    let Value::Mapping(map) = user_yaml else {
        return true;
    };
    T::fields()
        .iter()
        .any(|field| !map.contains_key(Value::String(field.name.to_string())))
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                if let Some(dest_val) = dest.get_mut(&key) {
                    merge_values(dest_val, user_val);
                } else {
                    dest.insert(key, user_val);
                }
            }
        }
        // null 视为“未填写”，保留默认值
        (_, Value::Null) => {}
        (dest, other) => {
            *dest = other;
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        workers: usize,
        name: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                workers: 4,
                name: "default".to_string(),
            }
        }
    }

    impl ConfigSpec for Sample {
        const FILE_NAME: &'static str = "sample.yml";

        fn fields() -> &'static [FieldMeta] {
            static FIELDS: [FieldMeta; 2] = [
                FieldMeta {
                    name: "workers",
                    description: "worker count",
                },
                FieldMeta {
                    name: "name",
                    description: "",
                },
            ];
            &FIELDS
        }

        fn validate(&self) -> Result<(), ConfigError> {
            if self.workers == 0 {
                return Err(ConfigError::Validation("workers must be > 0".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn creates_file_with_defaults_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Sample = load_or_create(Some(dir.path())).unwrap();
        assert_eq!(cfg, Sample::default());

        let written = fs::read_to_string(dir.path().join("sample.yml")).unwrap();
        assert!(written.contains("# worker count"));
        assert!(written.contains("workers: 4"));
    }

    #[test]
    fn merges_partial_file_and_backfills_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yml");
        fs::write(&path, "workers: 9\n").unwrap();

        let cfg: Sample = load_or_create_at(&path).unwrap();
        assert_eq!(cfg.workers, 9);
        assert_eq!(cfg.name, "default");

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("name: default"));
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yml");
        fs::write(&path, "workers: 0\nname: x\n").unwrap();

        let err = load_or_create_at::<Sample>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn reports_broken_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yml");
        fs::write(&path, "workers: [unclosed\n").unwrap();

        let err = load_or_create_at::<Sample>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
