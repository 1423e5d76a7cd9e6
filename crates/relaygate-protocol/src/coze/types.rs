use serde::{Deserialize, Serialize};

/// `{code, message}` pair used by upstream errors and stream `error` events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CozeError {
    #[serde(default)]
    pub code: i64,
    #[serde(default, alias = "msg")]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CozeUsage {
    #[serde(default)]
    pub token_count: i64,
    #[serde(default)]
    pub output_count: i64,
    #[serde(default)]
    pub input_count: i64,
}

/// Decode an opaque upstream payload into display text: a JSON string is
/// unwrapped, anything else is rendered as compact JSON.
pub fn payload_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
            /// Any value outside the recognized set.
            Unknown(String),
        }

        impl $name {
            pub fn parse(value: &str) -> Self {
                match value.trim() {
                    $($wire => Self::$variant,)+
                    other => Self::Unknown(other.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unknown(value) => value.as_str(),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::Unknown(String::new())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                Ok(Self::parse(&value))
            }
        }
    };
}

pub(crate) use status_enum;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_unwraps_strings_only() {
        assert_eq!(payload_text(&serde_json::json!("4")), "4");
        assert_eq!(payload_text(&serde_json::json!({"a": 1})), "{\"a\":1}");
        assert_eq!(payload_text(&serde_json::Value::Null), "");
    }
}
