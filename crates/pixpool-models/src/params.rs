//! Rendering parameters for text-to-image generation.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Default character reference weight when none is given.
pub const DEFAULT_CREF_WEIGHT: u32 = 100;

/// Optional rendering parameters attached to a generate request.
///
/// Each field maps to one provider prompt flag. Zero / empty values mean the
/// flag is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    /// Aspect ratio such as `16:9`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    pub seed: i64,
    pub stylize: u32,
    pub chaos: u32,
    /// Image prompt weight, only rendered when reference images are present
    pub image_weight: f32,
    pub raw: bool,
    pub quality: f32,
    pub tile: bool,
    /// Character reference image url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cref: Option<String>,
    pub cref_weight: u32,
    /// Style reference image url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sref: Option<String>,
    /// Model flag, e.g. `--v 6.1` or `--niji 6`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerateParams {
    /// Render the flags that are not already present in `prompt`.
    ///
    /// The result starts with a space when non-empty so it can be appended
    /// directly to the prompt.
    pub fn to_flags(&self, prompt: &str, has_images: bool) -> String {
        let mut out = String::new();
        let has = |flag: &str| prompt.contains(flag);

        if let Some(ar) = non_empty(&self.aspect_ratio) {
            if !has("--ar") && !has("--aspect") {
                let _ = write!(out, " --ar {ar}");
            }
        }
        if self.seed > 0 && !has("--seed") {
            let _ = write!(out, " --seed {}", self.seed);
        }
        if self.stylize > 0 && !has("--s ") && !has("--stylize") {
            let _ = write!(out, " --s {}", self.stylize);
        }
        if self.chaos > 0 && !has("--c ") && !has("--chaos") {
            let _ = write!(out, " --c {}", self.chaos);
        }
        if has_images && self.image_weight > 0.0 && !has("--iw") {
            let _ = write!(out, " --iw {:.2}", self.image_weight);
        }
        if self.raw && !has("--style") {
            out.push_str(" --style raw");
        }
        if self.quality > 0.0 && !has("--q") {
            let _ = write!(out, " --q {:.2}", self.quality);
        }
        if self.tile && !has("--tile") {
            out.push_str(" --tile");
        }
        if let Some(cref) = non_empty(&self.cref) {
            if !has("--cref") {
                let weight = if self.cref_weight > 0 {
                    self.cref_weight
                } else {
                    DEFAULT_CREF_WEIGHT
                };
                let _ = write!(out, " --cref {cref} --cw {weight}");
            }
        }
        if let Some(sref) = non_empty(&self.sref) {
            if !has("--sref") {
                let _ = write!(out, " --sref {sref}");
            }
        }
        if let Some(model) = non_empty(&self.model) {
            if !has("--v") && !has("--niji") {
                let _ = write!(out, " {model}");
            }
        }
        out
    }

    /// The prompt with all missing flags appended.
    pub fn apply(&self, prompt: &str, has_images: bool) -> String {
        let mut full = prompt.trim().to_string();
        full.push_str(&self.to_flags(&full, has_images));
        full
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_params_render_nothing() {
        assert_eq!(GenerateParams::default().to_flags("a cat", false), "");
    }

    #[test]
    fn test_renders_flags_in_order() {
        let params = GenerateParams {
            aspect_ratio: Some("16:9".into()),
            seed: 7,
            stylize: 250,
            raw: true,
            model: Some("--v 6.1".into()),
            ..Default::default()
        };
        assert_eq!(
            params.apply("a cat", false),
            "a cat --ar 16:9 --seed 7 --s 250 --style raw --v 6.1"
        );
    }

    #[test]
    fn test_existing_flags_are_not_duplicated() {
        let params = GenerateParams {
            aspect_ratio: Some("16:9".into()),
            seed: 7,
            model: Some("--v 6.1".into()),
            ..Default::default()
        };
        assert_eq!(params.to_flags("a cat --ar 1:1 --niji 6", false), " --seed 7");
    }

    #[test]
    fn test_image_weight_needs_images() {
        let params = GenerateParams {
            image_weight: 0.5,
            ..Default::default()
        };
        assert_eq!(params.to_flags("x", false), "");
        assert_eq!(params.to_flags("x", true), " --iw 0.50");
    }

    #[test]
    fn test_cref_weight_defaults_to_100() {
        let params = GenerateParams {
            cref: Some("https://img/a.png".into()),
            ..Default::default()
        };
        assert_eq!(params.to_flags("x", false), " --cref https://img/a.png --cw 100");
    }
}
