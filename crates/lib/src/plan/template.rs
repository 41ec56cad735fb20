//! Header-template rendering.
//!
//! A header template (`foo.in.hpp`) is not compiled; it is rendered with
//! parameter substitution into a real header under the codegen tree, which
//! the owning library's compile rules have on their include path.
//!
//! Placeholders are written `@{key}`; `@@{` escapes a literal `@{`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::source::SourceFile;

/// Values available to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
  pub package: String,
  pub version: String,
  pub library: String,
  pub qual_name: String,
}

impl TemplateContext {
  fn lookup(&self, key: &str) -> Option<&str> {
    match key {
      "package" => Some(&self.package),
      "version" => Some(&self.version),
      "library" => Some(&self.library),
      "qual_name" => Some(&self.qual_name),
      _ => None,
    }
  }
}

/// Errors rendering a header template.
#[derive(Debug, Error)]
pub enum RenderError {
  #[error("cannot read template {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("unclosed placeholder in {path}")]
  Unclosed { path: PathBuf },

  #[error("unknown placeholder '@{{{key}}}' in {path}")]
  UnknownKey { key: String, path: PathBuf },
}

/// Plan to render one header template into the codegen include tree.
#[derive(Debug, Clone)]
pub struct RenderTemplatePlan {
  pub source: SourceFile,
  /// The codegen include directory the rendered header lands in.
  pub out_dir: PathBuf,
}

impl RenderTemplatePlan {
  /// Path of the rendered header: the template's relative path with the
  /// `.in` marker removed (`sub/config.in.hpp` → `sub/config.hpp`).
  pub fn output_path(&self) -> PathBuf {
    let rel = &self.source.relative;
    let ext = rel.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = rel
      .file_stem()
      .map(|s| Path::new(s).file_stem().unwrap_or(s).to_string_lossy().into_owned())
      .unwrap_or_default();
    let mut path = self.out_dir.join(rel);
    path.set_file_name(format!("{stem}.{ext}"));
    path
  }

  /// Read the template and substitute placeholders.
  pub fn render(&self, ctx: &TemplateContext) -> Result<String, RenderError> {
    let content = std::fs::read_to_string(&self.source.path).map_err(|e| RenderError::Io {
      path: self.source.path.clone(),
      source: e,
    })?;
    substitute(&content, ctx, &self.source.path)
  }
}

/// Substitute `@{key}` placeholders in `input` from `ctx`.
pub fn substitute(input: &str, ctx: &TemplateContext, origin: &Path) -> Result<String, RenderError> {
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(idx) = rest.find("@{") {
    if idx >= 1 && rest.as_bytes()[idx - 1] == b'@' {
      // "@@{" is a literal "@{".
      out.push_str(&rest[..idx - 1]);
      out.push_str("@{");
      rest = &rest[idx + 2..];
      continue;
    }
    out.push_str(&rest[..idx]);
    let after = &rest[idx + 2..];
    let Some(end) = after.find('}') else {
      return Err(RenderError::Unclosed {
        path: origin.to_path_buf(),
      });
    };
    let key = &after[..end];
    let value = ctx.lookup(key).ok_or_else(|| RenderError::UnknownKey {
      key: key.to_string(),
      path: origin.to_path_buf(),
    })?;
    out.push_str(value);
    rest = &after[end + 1..];
  }
  out.push_str(rest);
  Ok(out)
}
