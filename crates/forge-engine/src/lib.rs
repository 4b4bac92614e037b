use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use forge_contracts::character::Character;
use forge_contracts::models::{ModelSelector, CAPABILITY_IMAGE, CAPABILITY_STRUCTURED};

mod dispatch;
mod dryrun;
mod error;
mod gemini;
pub mod prompts;

pub use dispatch::{Completion, CompletionValue, Dispatcher};
pub use dryrun::DryrunGenerator;
pub use error::GenerationError;
pub use gemini::GeminiGenerator;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

/// One backend able to produce every part of a card.
///
/// Calls are blocking and independent; implementations keep no state that one
/// call could corrupt for another.
pub trait CardGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn draft_character(&self, settings: &GenerationSettings)
        -> Result<Character, GenerationError>;

    /// Returns a `data:` URI; the character itself is left untouched.
    fn generate_portrait(
        &self,
        settings: &GenerationSettings,
        character: &Character,
    ) -> Result<String, GenerationError>;

    fn rewrite_backstory(
        &self,
        settings: &GenerationSettings,
        character: &Character,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub provider: String,
    pub text_model: String,
    pub image_model: String,
    pub temperature: f64,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub settings: GenerationSettings,
    pub warnings: Vec<String>,
}

impl GenerationSettings {
    /// Picks the text and image models for `provider`, falling back to the
    /// provider's defaults when a requested model is unknown or incapable.
    pub fn resolve(
        selector: &ModelSelector,
        provider: &str,
        text_model: Option<&str>,
        image_model: Option<&str>,
        request_timeout_s: f64,
    ) -> Result<ResolvedSettings> {
        if !request_timeout_s.is_finite() {
            bail!("request timeout must be a finite number of seconds, got {request_timeout_s}");
        }
        let text = selector
            .select_for_provider(provider, text_model, CAPABILITY_STRUCTURED)
            .map_err(|err| anyhow!(err))?;
        let image = selector
            .select_for_provider(provider, image_model, CAPABILITY_IMAGE)
            .map_err(|err| anyhow!(err))?;

        let mut warnings = Vec::new();
        // Only explain fallbacks the user asked for; silent defaults are expected.
        for selection in [&text, &image] {
            if selection.requested.is_some() {
                if let Some(reason) = selection.fallback_reason.as_ref() {
                    warnings.push(format!("{reason} Using '{}'.", selection.model.name));
                }
            }
        }

        Ok(ResolvedSettings {
            settings: GenerationSettings {
                provider: provider.to_string(),
                text_model: text.model.name,
                image_model: image.model.name,
                temperature: prompts::DRAFT_TEMPERATURE,
                request_timeout: Duration::from_secs_f64(request_timeout_s.clamp(1.0, 600.0)),
            },
            warnings,
        })
    }
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Arc<dyn CardGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G: CardGenerator + 'static>(&mut self, generator: G) {
        self.generators
            .insert(generator.name().to_string(), Arc::new(generator));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CardGenerator>> {
        self.generators.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn CardGenerator>, GenerationError> {
        self.get(name)
            .ok_or_else(|| GenerationError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }
}

pub fn default_generator_registry() -> GeneratorRegistry {
    let mut generators = GeneratorRegistry::new();
    generators.register(DryrunGenerator::new());
    generators.register(GeminiGenerator::new());
    generators
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use forge_contracts::models::ModelSelector;

    use super::{default_generator_registry, GenerationError, GenerationSettings};

    #[test]
    fn registry_knows_gemini_and_dryrun() {
        let registry = default_generator_registry();
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(matches!(
            registry.require("openai"),
            Err(GenerationError::UnknownProvider(name)) if name == "openai"
        ));
    }

    #[test]
    fn resolve_uses_provider_defaults_without_warnings() -> anyhow::Result<()> {
        let resolved =
            GenerationSettings::resolve(&ModelSelector::new(None), "gemini", None, None, 90.0)?;
        assert_eq!(resolved.settings.text_model, "gemini-3-flash-preview");
        assert_eq!(resolved.settings.image_model, "gemini-2.5-flash-image");
        assert_eq!(resolved.settings.temperature, 1.1);
        assert_eq!(resolved.settings.request_timeout, Duration::from_secs(90));
        assert!(resolved.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn resolve_warns_when_requested_model_falls_back() -> anyhow::Result<()> {
        let resolved = GenerationSettings::resolve(
            &ModelSelector::new(None),
            "dryrun",
            Some("gemini-2.5-flash"),
            Some("dryrun-image-1"),
            0.0,
        )?;
        assert_eq!(resolved.settings.text_model, "dryrun-text-1");
        assert_eq!(resolved.settings.image_model, "dryrun-image-1");
        assert_eq!(resolved.settings.request_timeout, Duration::from_secs(1));
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("'gemini-2.5-flash' unavailable"));
        Ok(())
    }

    #[test]
    fn resolve_rejects_non_finite_timeouts() {
        for timeout in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = GenerationSettings::resolve(
                &ModelSelector::new(None),
                "gemini",
                None,
                None,
                timeout,
            )
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
            assert!(
                err.starts_with("request timeout must be a finite number of seconds"),
                "unexpected error for {timeout}: {err}"
            );
        }
    }

    #[test]
    fn resolve_clamps_finite_timeouts() -> anyhow::Result<()> {
        let resolved =
            GenerationSettings::resolve(&ModelSelector::new(None), "gemini", None, None, 1e9)?;
        assert_eq!(resolved.settings.request_timeout, Duration::from_secs(600));
        Ok(())
    }

    #[test]
    fn resolve_rejects_unknown_provider() {
        let err = GenerationSettings::resolve(&ModelSelector::new(None), "openai", None, None, 90.0)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(
            err,
            "No models available for capability 'structured' from provider 'openai'."
        );
    }
}
