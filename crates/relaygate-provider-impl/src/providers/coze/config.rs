use serde_json::{Map, Value as JsonValue};

use relaygate_provider_core::{ProviderError, ProviderResult};

/// Key under which older channels stored the whole config as a JSON string.
const LEGACY_SETTINGS_KEY: &str = "other";

/// Channel settings for the JWT-authenticated workflow/bot upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CozeJwtConfig {
    pub client_id: String,
    pub public_key_id: String,
    pub private_key: String,
    pub space_id: Option<String>,
    pub default_bot_id: Option<String>,
    pub proxy_url: Option<String>,
}

/// Identity fields that decide whether a built OAuth client is reusable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientFingerprint {
    pub client_id: String,
    pub public_key_id: String,
    pub base_url: String,
}

impl CozeJwtConfig {
    pub fn from_settings(settings: &Map<String, JsonValue>) -> ProviderResult<Self> {
        let legacy = legacy_settings(settings)?;
        let field = |name: &str| -> Option<String> {
            string_field(settings, name).or_else(|| {
                legacy
                    .as_ref()
                    .and_then(|legacy| string_field(legacy, name))
            })
        };
        let required = |name: &'static str| -> ProviderResult<String> {
            field(name).ok_or_else(|| ProviderError::Config(format!("missing {name}")))
        };

        Ok(Self {
            client_id: required("client_id")?,
            public_key_id: required("public_key_id")?,
            private_key: required("private_key")?,
            space_id: field("space_id"),
            default_bot_id: field("default_bot_id"),
            proxy_url: field("proxy_url").or_else(|| field("proxy")),
        })
    }

    pub fn from_json_str(raw: &str) -> ProviderResult<Self> {
        let value: JsonValue = serde_json::from_str(raw)
            .map_err(|err| ProviderError::Config(format!("settings are not json: {err}")))?;
        match value {
            JsonValue::Object(settings) => Self::from_settings(&settings),
            _ => Err(ProviderError::Config(
                "settings must be a json object".to_string(),
            )),
        }
    }

    pub fn fingerprint(&self, base_url: &str) -> ClientFingerprint {
        ClientFingerprint {
            client_id: self.client_id.clone(),
            public_key_id: self.public_key_id.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn string_field(settings: &Map<String, JsonValue>, name: &str) -> Option<String> {
    settings
        .get(name)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn legacy_settings(settings: &Map<String, JsonValue>) -> ProviderResult<Option<Map<String, JsonValue>>> {
    match settings.get(LEGACY_SETTINGS_KEY) {
        Some(JsonValue::String(raw)) if !raw.trim().is_empty() => {
            match serde_json::from_str::<JsonValue>(raw) {
                Ok(JsonValue::Object(map)) => Ok(Some(map)),
                Ok(_) => Err(ProviderError::Config(format!(
                    "{LEGACY_SETTINGS_KEY} must hold a json object"
                ))),
                Err(err) => Err(ProviderError::Config(format!(
                    "{LEGACY_SETTINGS_KEY} is not json: {err}"
                ))),
            }
        }
        Some(JsonValue::Object(map)) => Ok(Some(map.clone())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn required_fields() {
        let cfg = CozeJwtConfig::from_settings(&settings(json!({
            "client_id": "cid",
            "public_key_id": "kid",
            "private_key": "pem",
            "default_bot_id": " ",
            "proxy": "socks5://127.0.0.1:1080"
        })))
        .unwrap();
        assert_eq!(cfg.client_id, "cid");
        assert_eq!(cfg.default_bot_id, None);
        assert_eq!(cfg.proxy_url.as_deref(), Some("socks5://127.0.0.1:1080"));

        let err = CozeJwtConfig::from_settings(&settings(json!({
            "client_id": "cid",
            "public_key_id": "",
            "private_key": "pem"
        })))
        .unwrap_err();
        assert_eq!(err, ProviderError::Config("missing public_key_id".to_string()));
    }

    #[test]
    fn legacy_string_form() {
        let inner = json!({
            "client_id": "cid",
            "public_key_id": "kid",
            "private_key": "pem",
            "space_id": "sp"
        })
        .to_string();
        let cfg = CozeJwtConfig::from_settings(&settings(json!({
            "other": inner,
            "proxy_url": "http://proxy:8080"
        })))
        .unwrap();
        assert_eq!(cfg.space_id.as_deref(), Some("sp"));
        assert_eq!(cfg.proxy_url.as_deref(), Some("http://proxy:8080"));
    }

    #[test]
    fn from_json_str_validates() {
        assert!(matches!(
            CozeJwtConfig::from_json_str("[]"),
            Err(ProviderError::Config(_))
        ));
        assert!(matches!(
            CozeJwtConfig::from_json_str("{\"client_id\":\"a\"}"),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn fingerprint_ignores_trailing_slash() {
        let cfg = CozeJwtConfig {
            client_id: "cid".to_string(),
            public_key_id: "kid".to_string(),
            private_key: "pem".to_string(),
            space_id: None,
            default_bot_id: None,
            proxy_url: None,
        };
        assert_eq!(
            cfg.fingerprint("https://api.coze.cn/"),
            cfg.fingerprint("https://api.coze.cn")
        );
    }
}
