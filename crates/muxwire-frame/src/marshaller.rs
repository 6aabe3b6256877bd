use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FrameError, Result};

/// Root element XML bodies are wrapped in.
pub const XML_ROOT: &str = "body";

/// Body encoding used by an endpoint.
///
/// Headers are always JSON; only the body goes through the marshaller. JSON is
/// always available. TOML, XML and YAML sit behind the cargo features of the
/// same name and report a marshal error when used without them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Marshaller {
    #[default]
    Json,
    Toml,
    Xml,
    Yaml,
}

impl Marshaller {
    pub fn name(self) -> &'static str {
        match self {
            Marshaller::Json => "json",
            Marshaller::Toml => "toml",
            Marshaller::Xml => "xml",
            Marshaller::Yaml => "yaml",
        }
    }

    /// Resolve a marshaller by name. `tml` and `yml` are accepted as aliases.
    ///
    /// Protobuf is recognised but has no built-in marshaller.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "json" => Ok(Marshaller::Json),
            "toml" | "tml" => Ok(Marshaller::Toml),
            "xml" => Ok(Marshaller::Xml),
            "yaml" | "yml" => Ok(Marshaller::Yaml),
            "protobuf" | "proto" => Err(FrameError::ExternalMarshaller("protobuf")),
            other => Err(FrameError::UnknownMarshaller(other.to_string())),
        }
    }

    /// Whether this encoding was compiled in.
    pub fn is_enabled(self) -> bool {
        match self {
            Marshaller::Json => true,
            Marshaller::Toml => cfg!(feature = "toml"),
            Marshaller::Xml => cfg!(feature = "xml"),
            Marshaller::Yaml => cfg!(feature = "yaml"),
        }
    }

    /// Encode a body value.
    pub fn marshal<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Marshaller::Json => serde_json::to_vec(value).map_err(|e| self.error(e)),
            #[cfg(feature = "toml")]
            Marshaller::Toml => toml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| self.error(e)),
            #[cfg(feature = "xml")]
            Marshaller::Xml => quick_xml::se::to_string_with_root(XML_ROOT, value)
                .map(String::into_bytes)
                .map_err(|e| self.error(e)),
            #[cfg(feature = "yaml")]
            Marshaller::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| self.error(e)),
            #[allow(unreachable_patterns)]
            _ => Err(self.disabled()),
        }
    }

    /// Decode a body value.
    pub fn unmarshal<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Marshaller::Json => serde_json::from_slice(bytes).map_err(|e| self.error(e)),
            #[cfg(feature = "toml")]
            Marshaller::Toml => toml::from_str(self.text(bytes)?).map_err(|e| self.error(e)),
            #[cfg(feature = "xml")]
            Marshaller::Xml => quick_xml::de::from_str(self.text(bytes)?).map_err(|e| self.error(e)),
            #[cfg(feature = "yaml")]
            Marshaller::Yaml => serde_yaml::from_slice(bytes).map_err(|e| self.error(e)),
            #[allow(unreachable_patterns)]
            _ => Err(self.disabled()),
        }
    }

    #[cfg(any(feature = "toml", feature = "xml"))]
    fn text(self, bytes: &[u8]) -> Result<&str> {
        std::str::from_utf8(bytes).map_err(|e| self.error(e))
    }

    fn disabled(self) -> FrameError {
        self.error(format!(
            "support not compiled in (enable the `{}` feature)",
            self.name()
        ))
    }

    fn error(self, reason: impl fmt::Display) -> FrameError {
        FrameError::Marshal {
            marshaller: self.name(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Marshaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Marshaller {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Login {
        username: String,
        attempts: u32,
    }

    fn login() -> Login {
        Login {
            username: "tcpx".into(),
            attempts: 2,
        }
    }

    #[test]
    fn resolves_names_and_aliases() {
        for (name, expected) in [
            ("json", Marshaller::Json),
            ("toml", Marshaller::Toml),
            ("tml", Marshaller::Toml),
            ("xml", Marshaller::Xml),
            ("yaml", Marshaller::Yaml),
            ("yml", Marshaller::Yaml),
        ] {
            assert_eq!(name.parse::<Marshaller>().unwrap(), expected);
        }
        let err = Marshaller::from_name("msgpack").unwrap_err();
        assert!(matches!(err, FrameError::UnknownMarshaller(n) if n == "msgpack"));
        let err = Marshaller::from_name("proto").unwrap_err();
        assert!(matches!(err, FrameError::ExternalMarshaller("protobuf")));
    }

    #[test]
    fn json_is_default_and_roundtrips() {
        let m = Marshaller::default();
        assert_eq!(m, Marshaller::Json);
        let bytes = m.marshal(&login()).unwrap();
        assert_eq!(bytes, br#"{"username":"tcpx","attempts":2}"#);
        assert_eq!(m.unmarshal::<Login>(&bytes).unwrap(), login());
    }

    #[test]
    fn json_decode_error_names_marshaller() {
        let err = Marshaller::Json.unmarshal::<Login>(b"{not json").unwrap_err();
        assert!(matches!(err, FrameError::Marshal { marshaller: "json", .. }));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_roundtrip() {
        let bytes = Marshaller::Toml.marshal(&login()).unwrap();
        assert_eq!(Marshaller::Toml.unmarshal::<Login>(&bytes).unwrap(), login());
    }

    #[cfg(feature = "xml")]
    #[test]
    fn xml_roundtrip() {
        let bytes = Marshaller::Xml.marshal(&login()).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("<body>"), "{text}");
        assert!(text.contains("<username>tcpx</username>"), "{text}");
        assert_eq!(Marshaller::Xml.unmarshal::<Login>(&bytes).unwrap(), login());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_roundtrip() {
        let bytes = Marshaller::Yaml.marshal(&login()).unwrap();
        assert_eq!(bytes, b"username: tcpx\nattempts: 2\n");
        assert_eq!(Marshaller::Yaml.unmarshal::<Login>(&bytes).unwrap(), login());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_decode_error_names_marshaller() {
        let err = Marshaller::Yaml.unmarshal::<Login>(b"username: [").unwrap_err();
        assert!(matches!(err, FrameError::Marshal { marshaller: "yaml", .. }));
    }

    #[test]
    fn disabled_features_are_errors() {
        for m in [Marshaller::Toml, Marshaller::Xml, Marshaller::Yaml] {
            if m.is_enabled() {
                continue;
            }
            let err = m.marshal(&login()).unwrap_err();
            assert!(matches!(err, FrameError::Marshal { marshaller, .. } if marshaller == m.name()));
            let err = m.unmarshal::<Login>(b"").unwrap_err();
            assert!(err.to_string().contains("not compiled in"));
        }
        assert!(Marshaller::Json.is_enabled());
    }
}
