//! Settings injection.
//!
//! Settings are reusable world-building documents (characters, places, style
//! notes) grouped by category. Before a run, the enabled ones are rendered into
//! a single text block that workflows reference as `{{settings}}`.
//!
//! Each category may have an injection prompt, a minijinja template rendered
//! with:
//! ```text
//! category  the category name
//! settings  list of { name, content }
//! content   the settings joined as "name: content" lines
//! ```

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
  pub category: String,
  pub name: String,
  pub content: String,
  #[serde(default = "enabled_by_default")]
  pub enabled: bool,
}

/// Injection template for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingPrompt {
  pub category: String,
  pub prompt_template: String,
  #[serde(default = "enabled_by_default")]
  pub enabled: bool,
}

fn enabled_by_default() -> bool {
  true
}

#[derive(Debug, Error)]
#[error("failed to render '{category}' settings: {message}")]
pub struct SettingsError {
  pub category: String,
  pub message: String,
}

/// Renders selected settings into injectable text.
pub trait SettingsRenderer: Send + Sync {
  fn render(&self, settings: &[Setting], prompts: &[SettingPrompt])
  -> Result<String, SettingsError>;
}

/// [`SettingsRenderer`] backed by minijinja templates.
#[derive(Debug, Default)]
pub struct TemplateSettingsRenderer {
  env: Environment<'static>,
}

#[derive(Serialize)]
struct SettingEntry<'a> {
  name: &'a str,
  content: &'a str,
}

impl TemplateSettingsRenderer {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SettingsRenderer for TemplateSettingsRenderer {
  fn render(
    &self,
    settings: &[Setting],
    prompts: &[SettingPrompt],
  ) -> Result<String, SettingsError> {
    // Categories in first-seen order.
    let mut categories: Vec<&str> = Vec::new();
    for setting in settings.iter().filter(|s| s.enabled) {
      if !categories.contains(&setting.category.as_str()) {
        categories.push(&setting.category);
      }
    }

    let mut sections = Vec::with_capacity(categories.len());
    for category in categories {
      let entries: Vec<SettingEntry<'_>> = settings
        .iter()
        .filter(|s| s.enabled && s.category == category)
        .map(|s| SettingEntry {
          name: &s.name,
          content: &s.content,
        })
        .collect();
      let content = entries
        .iter()
        .map(|e| format!("{}: {}", e.name, e.content))
        .collect::<Vec<_>>()
        .join("\n");

      let template = prompts
        .iter()
        .find(|p| p.enabled && p.category == category)
        .map(|p| p.prompt_template.as_str());

      let section = match template {
        Some(template) => self
          .env
          .render_str(
            template,
            context! { category => category, settings => entries, content => content },
          )
          .map_err(|e| SettingsError {
            category: category.to_string(),
            message: e.to_string(),
          })?,
        None => format!("【{category}】\n{content}"),
      };
      sections.push(section.trim().to_string());
    }

    Ok(sections.join("\n\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn make_setting(category: &str, name: &str, content: &str) -> Setting {
    Setting {
      category: category.to_string(),
      name: name.to_string(),
      content: content.to_string(),
      enabled: true,
    }
  }

  #[test]
  fn test_render_with_template() {
    let settings = vec![
      make_setting("character", "Mira", "a cartographer"),
      make_setting("place", "Vell", "a harbor town"),
      make_setting("character", "Oren", "her brother"),
    ];
    let prompts = vec![SettingPrompt {
      category: "character".to_string(),
      prompt_template: "Characters:\n{% for s in settings %}- {{ s.name }} ({{ s.content }})\n{% endfor %}"
        .to_string(),
      enabled: true,
    }];

    let rendered = TemplateSettingsRenderer::new()
      .render(&settings, &prompts)
      .unwrap();

    assert_eq!(
      rendered,
      "Characters:\n- Mira (a cartographer)\n- Oren (her brother)\n\n【place】\nVell: a harbor town"
    );
  }

  #[test]
  fn test_disabled_entries_are_skipped() {
    let mut hidden = make_setting("place", "Vell", "a harbor town");
    hidden.enabled = false;
    let settings = vec![make_setting("style", "Tone", "wry"), hidden];
    let prompts = vec![SettingPrompt {
      category: "style".to_string(),
      prompt_template: "ignored {{ content }}".to_string(),
      enabled: false,
    }];

    let rendered = TemplateSettingsRenderer::new()
      .render(&settings, &prompts)
      .unwrap();
    assert_eq!(rendered, "【style】\nTone: wry");
  }

  #[test]
  fn test_content_variable() {
    let settings = vec![make_setting("style", "Tone", "wry")];
    let prompts = vec![SettingPrompt {
      category: "style".to_string(),
      prompt_template: "{{ category }} => {{ content }}".to_string(),
      enabled: true,
    }];

    let rendered = TemplateSettingsRenderer::new()
      .render(&settings, &prompts)
      .unwrap();
    assert_eq!(rendered, "style => Tone: wry");
  }

  #[test]
  fn test_template_error() {
    let settings = vec![make_setting("style", "Tone", "wry")];
    let prompts = vec![SettingPrompt {
      category: "style".to_string(),
      prompt_template: "{% for %}".to_string(),
      enabled: true,
    }];

    let err = TemplateSettingsRenderer::new()
      .render(&settings, &prompts)
      .unwrap_err();
    assert_eq!(err.category, "style");
  }
}
