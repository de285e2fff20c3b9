//! Reading the documents named on the command line

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use url::Url;

const DEFAULT_ENTRY_POINT: &str = "main";

/// Where the CWL document lives and which process to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CwlLocation {
    pub source: String,
    pub entry_point: String,
}

impl CwlLocation {
    /// Split `app.cwl#entry` into the document and the entry point
    pub fn parse(location: &str) -> Self {
        match location.rsplit_once('#') {
            Some((source, entry_point)) if !entry_point.is_empty() => Self {
                source: source.to_string(),
                entry_point: entry_point.to_string(),
            },
            Some((source, _)) => Self {
                source: source.to_string(),
                entry_point: DEFAULT_ENTRY_POINT.to_string(),
            },
            None => Self {
                source: location.to_string(),
                entry_point: DEFAULT_ENTRY_POINT.to_string(),
            },
        }
    }

    fn remote(&self) -> Option<Url> {
        Url::parse(&self.source)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
    }

    /// Fetch or read the document and parse it as YAML
    pub async fn load(&self) -> Result<Value> {
        let content = match self.remote() {
            Some(url) => {
                info!("Fetching CWL from {}", url);
                reqwest::get(url.clone())
                    .await
                    .with_context(|| format!("Failed to fetch {}", url))?
                    .error_for_status()
                    .with_context(|| format!("Failed to fetch {}", url))?
                    .text()
                    .await?
            }
            None => std::fs::read_to_string(&self.source)
                .with_context(|| format!("Failed to read CWL document {}", self.source))?,
        };
        serde_yaml::from_str(&content)
            .with_context(|| format!("{} is not a YAML document", self.source))
    }
}

/// Parameters from a YAML file, or from `--name=value` pairs where repeated
/// names accumulate into a list
pub fn parse_params(args: &[String]) -> Result<Value> {
    let Some(first) = args.first() else {
        bail!("No parameters provided");
    };

    if !first.starts_with("--") {
        info!("Parameters provided in {}", first);
        return read_yaml(first);
    }

    let mut params: Map<String, Value> = Map::new();
    for arg in args {
        let (name, value) = arg
            .strip_prefix("--")
            .and_then(|pair| pair.split_once('='))
            .ok_or_else(|| anyhow!("Parameter '{}' is not of the form --name=value", arg))?;

        let entry = params
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(value.to_string()));
        }
    }
    Ok(Value::Object(params))
}

pub fn read_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// A flat YAML mapping with scalar values rendered as strings
pub fn read_string_map(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let raw: BTreeMap<String, serde_yaml::Value> = read_yaml(path)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => bail!("Value of '{}' is not a scalar: {:?}", key, other),
            };
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cwl_location() {
        assert_eq!(
            CwlLocation::parse("https://example.org/app.cwl#water-bodies"),
            CwlLocation {
                source: "https://example.org/app.cwl".to_string(),
                entry_point: "water-bodies".to_string(),
            }
        );
        assert_eq!(CwlLocation::parse("app.cwl").entry_point, "main");
        assert_eq!(CwlLocation::parse("app.cwl#").source, "app.cwl");
        assert!(CwlLocation::parse("https://example.org/app.cwl").remote().is_some());
        assert!(CwlLocation::parse("/tmp/app.cwl").remote().is_none());
    }

    #[test]
    fn test_inline_params_accumulate() {
        let args: Vec<String> = ["--message=hello", "--message=world", "--count=1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            parse_params(&args).unwrap(),
            json!({"message": ["hello", "world"], "count": ["1"]})
        );
    }

    #[test]
    fn test_params_errors() {
        assert!(parse_params(&[]).is_err());
        assert!(parse_params(&["--flag".to_string()]).is_err());
    }

    #[test]
    fn test_params_file_and_string_map() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.yml");
        std::fs::write(&params, "message: hello world!\n").unwrap();
        assert_eq!(
            parse_params(&[params.to_string_lossy().into_owned()]).unwrap(),
            json!({"message": "hello world!"})
        );

        let env = dir.path().join("env.yml");
        std::fs::write(&env, "A: one\nB: 2\nC: true\n").unwrap();
        let map = read_string_map(&env).unwrap();
        assert_eq!(map["B"], "2");
        assert_eq!(map["C"], "true");

        std::fs::write(&env, "A: [1, 2]\n").unwrap();
        assert!(read_string_map(&env).is_err());
    }

    #[tokio::test]
    async fn test_load_local_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.cwl");
        std::fs::write(&path, "cwlVersion: v1.2\nclass: Workflow\n").unwrap();

        let location = CwlLocation::parse(&format!("{}#main", path.display()));
        let cwl = location.load().await.unwrap();
        assert_eq!(cwl["class"], "Workflow");
    }
}
