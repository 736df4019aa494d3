//! Identity-provider descriptors.
//!
//! The default registry is embedded at compile time from `providers.json`.
//! Adding a provider or a localized keyword is a data change: the detector
//! iterates whatever the registry holds.

use crate::error::{ProbeError, ProbeResult};
use crate::model::ProviderId;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Raw JSON content of the default provider registry.
const PROVIDERS_JSON: &str = include_str!("providers.json");

/// Everything needed to recognise one provider.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Substrings matched against lowercased outbound request URLs.
    #[serde(default)]
    pub domains: Vec<String>,
    /// CSS selectors whose presence indicates a provider button.
    #[serde(default)]
    pub selectors: Vec<String>,
    /// Exact button labels, matched against interactive elements.
    #[serde(default)]
    pub button_labels: Vec<String>,
    /// Substrings matched against the lowercased page markup.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Lookup table keyed by provider id, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, ProviderDescriptor>,
}

impl ProviderRegistry {
    /// Parse a registry from its JSON form (`{"id": {domains, selectors, ...}}`).
    pub fn from_json(json: &str) -> ProbeResult<Self> {
        let raw: BTreeMap<String, ProviderDescriptor> = serde_json::from_str(json)
            .map_err(|e| ProbeError::Configuration(format!("invalid provider registry: {e}")))?;
        let providers = raw
            .into_iter()
            .map(|(id, mut descriptor)| {
                for keyword in descriptor.keywords.iter_mut() {
                    *keyword = keyword.to_lowercase();
                }
                for domain in descriptor.domains.iter_mut() {
                    *domain = domain.to_lowercase();
                }
                (ProviderId::new(id.to_lowercase()), descriptor)
            })
            .collect();
        Ok(Self { providers })
    }

    /// Load a replacement registry from a JSON file.
    pub fn from_path(path: &Path) -> ProbeResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Configuration(format!(
                "failed to read provider registry {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    /// The embedded default registry.
    pub fn builtin() -> &'static ProviderRegistry {
        static REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| Self::from_json(PROVIDERS_JSON).unwrap_or_default())
    }

    pub fn get(&self, id: &ProviderId) -> Option<&ProviderDescriptor> {
        self.providers.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProviderId, &ProviderDescriptor)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Add or replace one provider.
    pub fn insert(&mut self, id: ProviderId, descriptor: ProviderDescriptor) {
        self.providers.insert(id, descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_registry_covers_core_providers() {
        let registry = ProviderRegistry::builtin();
        for id in [
            "google",
            "facebook",
            "github",
            "kakao",
            "naver",
            "apple",
            "microsoft",
            "twitter",
        ] {
            let descriptor = registry
                .get(&ProviderId::new(id))
                .unwrap_or_else(|| panic!("missing provider {id}"));
            assert!(!descriptor.domains.is_empty(), "{id} has no domains");
            assert!(!descriptor.selectors.is_empty(), "{id} has no selectors");
            assert!(!descriptor.keywords.is_empty(), "{id} has no keywords");
        }
    }

    #[test]
    fn test_keywords_are_lowercased_on_load() {
        let registry = ProviderRegistry::from_json(
            r#"{"Acme": {"domains": ["SSO.Acme.com"], "keywords": ["Sign in with ACME"]}}"#,
        )
        .unwrap();
        let acme = registry.get(&ProviderId::new("acme")).unwrap();
        assert_eq!(acme.keywords, vec!["sign in with acme"]);
        assert_eq!(acme.domains, vec!["sso.acme.com"]);
        assert!(acme.selectors.is_empty());
    }

    #[test]
    fn test_localized_keywords_present() {
        let kakao = ProviderRegistry::builtin()
            .get(&ProviderId::new("kakao"))
            .unwrap();
        assert!(kakao.keywords.iter().any(|k| k.contains("카카오")));
    }

    #[test]
    fn test_from_path_reads_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"acme": {{"domains": ["sso.acme.com"]}}}}"#).unwrap();
        let registry = ProviderRegistry::from_path(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_registry_is_configuration_error() {
        let err = ProviderRegistry::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));

        let err = ProviderRegistry::from_path(Path::new("/nonexistent/providers.json"))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));
    }
}
