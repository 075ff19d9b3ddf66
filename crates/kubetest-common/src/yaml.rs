//! YAML parsing utilities using yaml-rust2
//!
//! Configuration documents are parsed into `serde_json::Value` so typed
//! Kubernetes objects can be deserialized with their regular serde impls.

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

/// Error type for YAML parsing
#[derive(Debug, Clone)]
pub struct YamlError(String);

impl std::fmt::Display for YamlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for YamlError {}

/// Parse a multi-document YAML string into a Vec of serde_json::Values.
///
/// Each YAML document separated by `---` becomes a separate Value. Empty
/// documents come back as `Value::Null`; an empty input yields no documents.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    docs.into_iter().map(yaml_to_json).collect()
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, YamlError> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| YamlError(e.to_string()))?;
            Ok(Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(YamlError("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(YamlError("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(YamlError("bad YAML value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_doc_manifests() {
        let yaml = r#"
apiVersion: v1
kind: Service
metadata:
  name: web
---
apiVersion: v1
kind: Pod
metadata:
  name: web-0
  labels:
    app: web
"#;
        let docs = parse_yaml_multi(yaml).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Service");
        assert_eq!(docs[1]["metadata"]["labels"]["app"], "web");
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_yaml_multi("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_scalars() {
        let docs = parse_yaml_multi("replicas: 3\nratio: 1.5\nenabled: true\nvalue: null").unwrap();
        let doc = &docs[0];
        assert_eq!(doc["replicas"], 3);
        assert!((doc["ratio"].as_f64().unwrap() - 1.5).abs() < 0.0001);
        assert_eq!(doc["enabled"], true);
        assert!(doc["value"].is_null());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_yaml_multi("not: valid: yaml: {{").is_err());
    }

    #[test]
    fn test_deserialize_to_typed() {
        use serde::Deserialize;

        #[derive(Deserialize, Debug, PartialEq)]
        struct Settings {
            namespace: String,
            timeout: u64,
        }

        let docs = parse_yaml_multi("namespace: it\ntimeout: 42").unwrap();
        let settings: Settings = serde_json::from_value(docs[0].clone()).unwrap();
        assert_eq!(
            settings,
            Settings {
                namespace: "it".to_string(),
                timeout: 42
            }
        );
    }
}
