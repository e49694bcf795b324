//! Function table keyed by canonical name

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use udfkit_ir::TypeAttr;

use crate::error::RegistryError;
use crate::signature::{format_arg_types, Signature};
use crate::variant::{FunctionVariant, Variant, VariantKind};

/// Bound on alias chains, so a cycle cannot hang lookups
const MAX_ALIAS_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub name: String,
    pub doc: Option<String>,
    pub variants: Vec<FunctionVariant>,
}

/// Catalogue entry for one function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub signatures: Vec<SignatureDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDoc {
    pub kind: VariantKind,
    pub args: String,
    /// Fixed output type; inferred kinds have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// The registry of every UDF and UDAF variant.
///
/// Built once, then only read: resolution never mutates it.
#[derive(Debug, Default)]
pub struct UdfLibrary {
    functions: IndexMap<String, FunctionEntry>,
    aliases: IndexMap<String, String>,
}

impl UdfLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variant under `name`. Fails if `name` already has a
    /// structurally identical signature.
    pub fn insert(
        &mut self,
        name: &str,
        signature: Signature,
        variant: Variant,
    ) -> Result<(), RegistryError> {
        let name = name.to_ascii_lowercase();
        if self.aliases.contains_key(&name) {
            return Err(RegistryError::RegistrationConflict {
                name,
                signature: signature.to_string(),
            });
        }
        let entry = self
            .functions
            .entry(name.clone())
            .or_insert_with(|| FunctionEntry {
                name: name.clone(),
                doc: None,
                variants: Vec::new(),
            });
        if entry.variants.iter().any(|v| v.signature == signature) {
            return Err(RegistryError::RegistrationConflict {
                name,
                signature: signature.to_string(),
            });
        }
        debug!(
            function = %name,
            signature = %signature,
            kind = %variant.kind(),
            "registered udf variant"
        );
        entry.variants.push(FunctionVariant { signature, variant });
        Ok(())
    }

    /// Makes `alias` resolve to `target`. Aliases of aliases resolve to the
    /// final function.
    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<(), RegistryError> {
        let alias = alias.to_ascii_lowercase();
        let resolved = self.canonical_name(target);
        if !self.functions.contains_key(&resolved) {
            return Err(RegistryError::UnknownAlias {
                alias,
                target: target.to_string(),
            });
        }
        if self.functions.contains_key(&alias) || self.aliases.contains_key(&alias) {
            return Err(RegistryError::RegistrationConflict {
                name: alias,
                signature: "alias".to_string(),
            });
        }
        debug!(alias = %alias, target = %resolved, "registered alias");
        self.aliases.insert(alias, resolved);
        Ok(())
    }

    pub fn set_doc(&mut self, name: &str, doc: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let entry = self
            .functions
            .entry(name.clone())
            .or_insert_with(|| FunctionEntry {
                name,
                doc: None,
                variants: Vec::new(),
            });
        entry.doc = Some(doc.into());
    }

    /// Lower-cased name with aliases followed
    pub fn canonical_name(&self, name: &str) -> String {
        let mut name = name.to_ascii_lowercase();
        for _ in 0..MAX_ALIAS_DEPTH {
            match self.aliases.get(&name) {
                Some(target) => name = target.clone(),
                None => break,
            }
        }
        name
    }

    pub fn find(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(&self.canonical_name(name))
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.functions.values()
    }

    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let name = self.canonical_name(name);
        self.aliases
            .iter()
            .filter(|(_, target)| **target == name)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Number of registered functions, aliases excluded
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Best matching variant for the argument types.
    ///
    /// Never falls back to a weaker variant: no match is `NotFound`, and a
    /// tie between distinct variants at the best score is `Ambiguous`.
    pub fn lookup(&self, name: &str, args: &[TypeAttr]) -> Result<&FunctionVariant, RegistryError> {
        let canonical = self.canonical_name(name);
        let not_found = || RegistryError::NotFound {
            name: canonical.clone(),
            args: format_arg_types(args),
        };
        let entry = self.functions.get(&canonical).ok_or_else(not_found)?;

        let mut best_score = 0;
        let mut best: Vec<&FunctionVariant> = Vec::new();
        for variant in &entry.variants {
            let Some(score) = variant.signature.score(args) else {
                continue;
            };
            if best.is_empty() || score > best_score {
                best_score = score;
                best.clear();
                best.push(variant);
            } else if score == best_score {
                best.push(variant);
            }
        }

        match best.as_slice() {
            [] => Err(not_found()),
            [only] => Ok(*only),
            many => {
                let candidates: Vec<String> =
                    many.iter().map(|v| format!("({})", v.signature)).collect();
                Err(RegistryError::Ambiguous {
                    name: canonical.clone(),
                    args: format_arg_types(args),
                    candidates: candidates.join(" "),
                })
            }
        }
    }

    pub fn describe(&self) -> Vec<FunctionDoc> {
        self.functions
            .values()
            .map(|entry| FunctionDoc {
                name: entry.name.clone(),
                aliases: self.aliases_of(&entry.name),
                doc: entry.doc.clone(),
                signatures: entry
                    .variants
                    .iter()
                    .map(|v| SignatureDoc {
                        kind: v.variant.kind(),
                        args: v.signature.to_string(),
                        returns: match &v.variant {
                            Variant::External(def) => Some(def.returns.to_string()),
                            Variant::Aggregate(def) => Some(def.output.to_string()),
                            _ => None,
                        },
                        symbol: v.variant.symbol().map(str::to_string),
                    })
                    .collect(),
            })
            .collect()
    }
}
