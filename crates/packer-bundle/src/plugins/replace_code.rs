use async_trait::async_trait;
use packer_core::{BuildContext, PackerError, Plugin, Result};
use regex::Regex;
use tracing::debug;

/// Regex substitutions over freshly written scripts in the output root.
#[derive(Debug, Clone)]
pub struct ReplaceCode {
    rules: Vec<(Regex, String)>,
}

impl ReplaceCode {
    /// `rules` are `(pattern, replacement)` pairs applied in order. Replacements may use
    /// `$1`-style group references.
    pub fn new<I, P, R>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, replacement)| {
                Regex::new(pattern.as_ref())
                    .map(|re| (re, replacement.into()))
                    .map_err(|e| PackerError::Plugin {
                        name: "replace-code".to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn apply_to(&self, code: &str) -> String {
        let mut out = code.to_string();
        for (re, replacement) in &self.rules {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }
}

#[async_trait]
impl Plugin for ReplaceCode {
    fn name(&self) -> &str {
        "replace-code"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        for id in ctx.stage.to_vec() {
            let node = ctx.cache.node(id);
            if !node.is_updated() || node.extension() != "js" || !ctx.in_dest_folder(id) {
                continue;
            }
            let code = ctx.cache.read_text(id, false)?;
            let replaced = self.apply_to(&code);
            if *replaced != *code {
                debug!("Rewrote {}", ctx.relative_to_dest(id));
                ctx.cache.set_content(id, replaced);
            }
        }
        Ok(())
    }
}
