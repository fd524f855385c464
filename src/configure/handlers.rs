// src/configure/handlers.rs

//! Single-file configuration handlers
//!
//! Used when no preset directory exists for an emulator. Each handler copies
//! one preset file into the user config area and tags it with a
//! content-specific block. A handler that fails to parse its input is not an
//! error: the applier falls back to a verbatim copy.

use crate::error::{Error, Result};
use std::path::Path;

/// Content the enrichment block describes
#[derive(Debug, Clone, Copy)]
pub struct ContentTag<'a> {
    pub content_id: &'a str,
    pub title: &'a str,
    pub platform: &'a str,
}

/// One configuration file format
pub trait ConfigHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extensions this handler accepts, without the dot
    fn extensions(&self) -> &'static [&'static str];

    /// Produce the enriched file contents
    fn enrich(&self, original: &str, tag: &ContentTag<'_>) -> Result<String>;

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions().contains(&ext.as_str()))
    }
}

/// Section name written into INI files
const INI_SECTION: &str = "gamestage";
/// Marker lines delimiting the block in cfg/conf files
const BLOCK_BEGIN: &str = "# >>> gamestage";
const BLOCK_END: &str = "# <<< gamestage";
/// Key holding the block in JSON files
const JSON_KEY: &str = "gamestage";

/// INI files: replaces or appends a `[gamestage]` section
pub struct IniHandler;

impl ConfigHandler for IniHandler {
    fn name(&self) -> &'static str {
        "ini"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ini"]
    }

    fn enrich(&self, original: &str, tag: &ContentTag<'_>) -> Result<String> {
        let mut out = String::with_capacity(original.len() + 128);
        let mut skipping = false;
        for line in original.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                if !trimmed.ends_with(']') {
                    return Err(Error::Configuration(format!("Malformed INI section: {trimmed}")));
                }
                skipping = trimmed[1..trimmed.len() - 1].trim().eq_ignore_ascii_case(INI_SECTION);
            }
            if !skipping {
                out.push_str(line);
                out.push('\n');
            }
        }
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(&format!(
            "[{INI_SECTION}]\ncontent_id={}\ntitle={}\nplatform={}\n",
            tag.content_id, tag.title, tag.platform
        ));
        Ok(out)
    }
}

/// JSON files: sets a top-level `"gamestage"` object
pub struct JsonHandler;

impl ConfigHandler for JsonHandler {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn enrich(&self, original: &str, tag: &ContentTag<'_>) -> Result<String> {
        let mut value: serde_json::Value = serde_json::from_str(original)?;
        let object = value.as_object_mut().ok_or_else(|| {
            Error::Configuration("JSON preset is not an object".to_string())
        })?;
        object.insert(
            JSON_KEY.to_string(),
            serde_json::json!({
                "content_id": tag.content_id,
                "title": tag.title,
                "platform": tag.platform,
            }),
        );
        let mut text = serde_json::to_string_pretty(&value)?;
        text.push('\n');
        Ok(text)
    }
}

/// `key = value` files (cfg/conf): replaces or appends a marked block
pub struct KeyValueHandler;

impl ConfigHandler for KeyValueHandler {
    fn name(&self) -> &'static str {
        "cfg"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cfg", "conf"]
    }

    fn enrich(&self, original: &str, tag: &ContentTag<'_>) -> Result<String> {
        let mut out = String::with_capacity(original.len() + 128);
        let mut in_block = false;
        for line in original.lines() {
            match line.trim() {
                BLOCK_BEGIN => in_block = true,
                BLOCK_END => in_block = false,
                _ if !in_block => {
                    out.push_str(line);
                    out.push('\n');
                }
                _ => {}
            }
        }
        if in_block {
            return Err(Error::Configuration("Unterminated gamestage block".to_string()));
        }
        out.push_str(&format!(
            "{BLOCK_BEGIN}\ngamestage_content_id = \"{}\"\ngamestage_title = \"{}\"\ngamestage_platform = \"{}\"\n{BLOCK_END}\n",
            tag.content_id,
            tag.title.replace('"', "\\\""),
            tag.platform
        ));
        Ok(out)
    }
}

/// Handlers in lookup order
pub fn default_handlers() -> Vec<Box<dyn ConfigHandler>> {
    vec![
        Box::new(IniHandler),
        Box::new(JsonHandler),
        Box::new(KeyValueHandler),
    ]
}
