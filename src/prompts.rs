//! Developer instructions sent to the text collaborator.
//!
//! A [`PromptSet`] is built once at startup from the built-in templates plus
//! optional `<name>.hbs` overrides, then shared by every executor.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

/// The prompts the pipeline knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Blog,
    Seo,
    Visual,
    Social,
    Amplify,
}

impl PromptKind {
    pub const ALL: [PromptKind; 5] = [
        PromptKind::Blog,
        PromptKind::Seo,
        PromptKind::Visual,
        PromptKind::Social,
        PromptKind::Amplify,
    ];

    /// Template name, also the override file stem
    pub fn key(self) -> &'static str {
        match self {
            PromptKind::Blog => "blog",
            PromptKind::Seo => "seo",
            PromptKind::Visual => "visual",
            PromptKind::Social => "social",
            PromptKind::Amplify => "amplify",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            PromptKind::Blog => BLOG_PROMPT,
            PromptKind::Seo => SEO_PROMPT,
            PromptKind::Visual => VISUAL_PROMPT,
            PromptKind::Social => SOCIAL_PROMPT,
            PromptKind::Amplify => AMPLIFY_PROMPT,
        }
    }
}

const BLOG_PROMPT: &str = "You are a content marketer. Write a complete blog post in Markdown \
for the topic given by the user. Start with a single `#` title, use `##` section headings and \
short paragraphs. Follow the content brief closely.";

const SEO_PROMPT: &str = "You are an SEO specialist. Reply with only a JSON object with the keys \
\"metaTitle\" (at most 160 characters), \"metaDescription\" (at most 320 characters) and \
\"keywords\" (an array of at most {{max_keywords}} keywords, each one to three words).";

const VISUAL_PROMPT: &str = "You are an art director. Reply with only a JSON array of image \
descriptions. Each element must have the string fields \"Image Name\", \"Caption Plan\", \
\"Target Audience\", \"Keywords\" and \"Platform\".";

const SOCIAL_PROMPT: &str = "You are a social media manager. Write one post per platform for the \
blog excerpt given by the user. Put each post under its own tag line: \
{{#each platforms}}[{{this}}] {{/each}}";

const AMPLIFY_PROMPT: &str = "You are a content strategist. Reply with only a JSON array of \
{{count}} blog topic ideas for the keyword given by the user. Each element must have the string \
fields \"title\", \"contentBrief\" and \"visualBrief\".";

/// Compiled prompt templates
pub struct PromptSet {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for PromptSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptSet").finish_non_exhaustive()
    }
}

impl PromptSet {
    /// Built-in prompts only
    pub fn builtin() -> Result<Self> {
        Self::load(None)
    }

    /// Built-in prompts, replaced by `<dir>/<name>.hbs` where such a file exists
    pub fn load(override_dir: Option<&Path>) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::no_escape);

        for kind in PromptKind::ALL {
            let override_file = override_dir.map(|dir| dir.join(format!("{}.hbs", kind.key())));
            let template = match override_file {
                Some(path) if path.exists() => {
                    tracing::info!(prompt = kind.key(), path = %path.display(), "using prompt override");
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read prompt {}", path.display()))?
                }
                _ => kind.builtin().to_string(),
            };
            registry
                .register_template_string(kind.key(), template)
                .with_context(|| format!("Invalid prompt template '{}'", kind.key()))?;
        }

        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, kind: PromptKind, data: &T) -> Result<String> {
        self.registry
            .render(kind.key(), data)
            .with_context(|| format!("Failed to render prompt '{}'", kind.key()))
    }
}
