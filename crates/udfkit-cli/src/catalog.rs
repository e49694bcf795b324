//! Rendering of the function catalogue

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use udfkit_registry::FunctionDoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    Json,
    Yaml,
    Markdown,
}

impl FromStr for CatalogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <CatalogFormat as ValueEnum>::from_str(s, true)
    }
}

pub fn render(
    docs: &[FunctionDoc],
    format: CatalogFormat,
    include_aliases: bool,
) -> anyhow::Result<String> {
    let docs: Vec<FunctionDoc> = docs
        .iter()
        .cloned()
        .map(|mut doc| {
            if !include_aliases {
                doc.aliases.clear();
            }
            doc
        })
        .collect();

    Ok(match format {
        CatalogFormat::Json => serde_json::to_string_pretty(&docs)?,
        CatalogFormat::Yaml => serde_yaml::to_string(&docs)?,
        CatalogFormat::Markdown => to_markdown(&docs),
    })
}

/// Format catalogue as markdown
fn to_markdown(docs: &[FunctionDoc]) -> String {
    let mut md = String::new();

    md.push_str("# Function Catalogue\n\n");
    md.push_str(&format!("**Functions:** {}\n\n", docs.len()));

    for doc in docs {
        md.push_str(&format!("## `{}`\n\n", doc.name));
        if !doc.aliases.is_empty() {
            let aliases: Vec<String> = doc.aliases.iter().map(|a| format!("`{}`", a)).collect();
            md.push_str(&format!("**Aliases:** {}\n\n", aliases.join(", ")));
        }
        if let Some(text) = &doc.doc {
            md.push_str(text);
            md.push_str("\n\n");
        }

        md.push_str("| Kind | Arguments | Returns | Symbol |\n");
        md.push_str("|------|-----------|---------|--------|\n");
        for sig in &doc.signatures {
            md.push_str(&format!(
                "| {} | `{}` | {} | {} |\n",
                sig.kind,
                sig.args,
                sig.returns.as_deref().unwrap_or("inferred"),
                sig.symbol
                    .as_deref()
                    .map(|s| format!("`{}`", s))
                    .unwrap_or_default(),
            ));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use udfkit_registry::default_library;

    fn ceil(docs: &[FunctionDoc]) -> &FunctionDoc {
        docs.iter().find(|d| d.name == "ceil").unwrap()
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("yaml".parse::<CatalogFormat>(), Ok(CatalogFormat::Yaml));
        assert_eq!("Markdown".parse::<CatalogFormat>(), Ok(CatalogFormat::Markdown));
        assert!("xml".parse::<CatalogFormat>().is_err());
    }

    #[test]
    fn test_markdown_lists_signatures() {
        let docs = default_library().describe();
        assert!(!ceil(&docs).aliases.is_empty());
        let md = render(&docs, CatalogFormat::Markdown, true).unwrap();
        assert!(md.starts_with("# Function Catalogue"));
        assert!(md.contains("## `ceil`"));
        assert!(md.contains("**Aliases:** `ceiling`"));
        assert!(md.contains("`ceil.double`"));
    }

    #[test]
    fn test_aliases_can_be_left_out() {
        let docs = default_library().describe();
        let json = render(&docs, CatalogFormat::Json, false).unwrap();
        let parsed: Vec<FunctionDoc> = serde_json::from_str(&json).unwrap();
        assert!(ceil(&parsed).aliases.is_empty());

        let yaml = render(&docs, CatalogFormat::Yaml, true).unwrap();
        assert!(yaml.contains("ceiling"));
    }
}
