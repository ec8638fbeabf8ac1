//! Placeholder parsing and substitution for build step arguments.
//!
//! Formula procedures reference values that only exist once a plan is being
//! executed: the install prefix of the formula itself, the prefixes of its
//! already-built dependencies, the path of a compiler. Those references are
//! written as placeholders and substituted right before a step runs.
//!
//! # Placeholder Formats
//!
//! - `$${prefix}`, `$${name}`, `$${version}`, `$${workdir}` - the formula being built
//! - `$${options}` - the tool arguments materialized from the resolved options
//! - `$${dep:<name>:<output>}` - `prefix`, `opt`, `version`, `bin`, `include`
//!   or `lib` of a dependency
//! - `$${compiler:<lang>}` - path of the `c`, `cxx` or `fortran` compiler
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so `$HOME` or `$FC` in an
//! argument reach the tool untouched.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use formulary_lib::placeholder::{parse, DepOutput, Placeholder, Segment};
//!
//! let segments = parse("-DOCE_DIR=$${dep:oce:prefix}/lib").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("-DOCE_DIR=".to_string()),
//!     Segment::Placeholder(Placeholder::Dep { name: "oce".to_string(), output: DepOutput::Prefix }),
//!     Segment::Literal("/lib".to_string()),
//! ]);
//! ```

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// A value describing the formula currently being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
  Prefix,
  Name,
  Version,
  Workdir,
  Options,
}

/// A value describing a dependency of the formula being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepOutput {
  Prefix,
  Opt,
  Version,
  Bin,
  Include,
  Lib,
}

impl DepOutput {
  fn parse(s: &str) -> Option<Self> {
    match s {
      "prefix" => Some(Self::Prefix),
      "opt" => Some(Self::Opt),
      "version" => Some(Self::Version),
      "bin" => Some(Self::Bin),
      "include" => Some(Self::Include),
      "lib" => Some(Self::Lib),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Prefix => "prefix",
      Self::Opt => "opt",
      Self::Version => "version",
      Self::Bin => "bin",
      Self::Include => "include",
      Self::Lib => "lib",
    }
  }
}

impl fmt::Display for DepOutput {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  Var(Var),
  Dep { name: String, output: DepOutput },
  Compiler(String),
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: {0}")]
  Unknown(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("dependency '{name}' is not built and not installed")]
  UnresolvedDep { name: String },

  #[error("cannot resolve {language} compiler: {message}")]
  UnresolvedCompiler { language: String, message: String },
}

/// Supplies values for placeholders while a step is being materialized.
pub trait Resolver {
  fn resolve_var(&self, var: Var) -> Result<Cow<'_, str>, PlaceholderError>;

  fn resolve_dep(&self, name: &str, output: DepOutput) -> Result<Cow<'_, str>, PlaceholderError>;

  fn resolve_compiler(&self, language: &str) -> Result<Cow<'_, str>, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed, unknown or malformed.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' || !matches!(chars.peek(), Some((_, '$'))) {
      literal.push(ch);
      continue;
    }
    chars.next();

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        if matches!(chars.peek(), Some((_, '{'))) {
          chars.next();
          literal.push_str("$${");
        } else {
          literal.push_str("$$$");
        }
      }
      Some((_, '{')) => {
        chars.next();
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut content = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          content.push(c);
        }
        if !closed {
          return Err(PlaceholderError::Unclosed(pos));
        }

        segments.push(Segment::Placeholder(parse_placeholder_content(&content)?));
      }
      _ => literal.push_str("$$"),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  let var = match content {
    "prefix" => Some(Var::Prefix),
    "name" => Some(Var::Name),
    "version" => Some(Var::Version),
    "workdir" => Some(Var::Workdir),
    "options" => Some(Var::Options),
    _ => None,
  };
  if let Some(var) = var {
    return Ok(Placeholder::Var(var));
  }

  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Unknown(content.to_string()))?;

  match kind {
    "dep" => {
      let (name, output) = rest
        .split_once(':')
        .ok_or_else(|| PlaceholderError::Malformed(format!("dep placeholder missing output: '{content}'")))?;
      if name.is_empty() {
        return Err(PlaceholderError::Malformed(format!("dep placeholder missing name: '{content}'")));
      }
      let output = DepOutput::parse(output)
        .ok_or_else(|| PlaceholderError::Malformed(format!("unknown dep output '{output}' in '{content}'")))?;
      Ok(Placeholder::Dep {
        name: name.to_string(),
        output,
      })
    }
    "compiler" if !rest.is_empty() => Ok(Placeholder::Compiler(rest.to_string())),
    "compiler" => Err(PlaceholderError::Malformed(format!("compiler placeholder missing language: '{content}'"))),
    _ => Err(PlaceholderError::Unknown(kind.to_string())),
  }
}

/// Parse and substitute in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => {
        let value = match p {
          Placeholder::Var(var) => resolver.resolve_var(*var)?,
          Placeholder::Dep { name, output } => resolver.resolve_dep(name, *output)?,
          Placeholder::Compiler(language) => resolver.resolve_compiler(language)?,
        };
        result.push_str(&value);
      }
    }
  }

  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  struct TestResolver {
    prefix: String,
    deps: HashMap<String, String>,
  }

  impl TestResolver {
    fn new(prefix: &str) -> Self {
      Self {
        prefix: prefix.to_string(),
        deps: HashMap::new(),
      }
    }

    fn with_dep(mut self, name: &str, prefix: &str) -> Self {
      self.deps.insert(name.to_string(), prefix.to_string());
      self
    }
  }

  impl Resolver for TestResolver {
    fn resolve_var(&self, var: Var) -> Result<Cow<'_, str>, PlaceholderError> {
      Ok(match var {
        Var::Prefix => Cow::Borrowed(self.prefix.as_str()),
        Var::Name => Cow::Borrowed("freecad"),
        Var::Version => Cow::Borrowed("0.15.4671"),
        Var::Workdir => Cow::Borrowed("/tmp/build/freecad-0.15.4671"),
        Var::Options => Cow::Borrowed("-DA=ON -DB=OFF"),
      })
    }

    fn resolve_dep(&self, name: &str, output: DepOutput) -> Result<Cow<'_, str>, PlaceholderError> {
      let prefix = self.deps.get(name).ok_or_else(|| PlaceholderError::UnresolvedDep {
        name: name.to_string(),
      })?;
      Ok(match output {
        DepOutput::Prefix | DepOutput::Opt => Cow::Borrowed(prefix.as_str()),
        other => Cow::Owned(format!("{}/{}", prefix, other)),
      })
    }

    fn resolve_compiler(&self, language: &str) -> Result<Cow<'_, str>, PlaceholderError> {
      match language {
        "fortran" => Ok(Cow::Borrowed("/usr/bin/gfortran")),
        other => Err(PlaceholderError::UnresolvedCompiler {
          language: other.to_string(),
          message: "not installed".to_string(),
        }),
      }
    }
  }

  #[test]
  fn install_prefix_argument() {
    let resolver = TestResolver::new("/prefix/Cellar/freecad/0.15.4671");
    let result = substitute("-DCMAKE_INSTALL_PREFIX=$${prefix}", &resolver).unwrap();
    assert_eq!(result, "-DCMAKE_INSTALL_PREFIX=/prefix/Cellar/freecad/0.15.4671");
  }

  #[test]
  fn dependency_outputs() {
    let resolver = TestResolver::new("/p").with_dep("freetype", "/p/Cellar/freetype/2.5.5");
    let result = substitute("-DFREETYPE_INCLUDE_DIRS=$${dep:freetype:include}/freetype2/", &resolver).unwrap();
    assert_eq!(result, "-DFREETYPE_INCLUDE_DIRS=/p/Cellar/freetype/2.5.5/include/freetype2/");
  }

  #[test]
  fn adjacent_placeholders() {
    let resolver = TestResolver::new("/p");
    let result = substitute("$${name}-$${version}", &resolver).unwrap();
    assert_eq!(result, "freecad-0.15.4671");
  }

  #[test]
  fn compiler_placeholder() {
    let resolver = TestResolver::new("/p");
    assert_eq!(substitute("$${compiler:fortran}", &resolver).unwrap(), "/usr/bin/gfortran");
    assert!(matches!(
      substitute("$${compiler:cxx}", &resolver),
      Err(PlaceholderError::UnresolvedCompiler { .. })
    ));
  }

  #[test]
  fn shell_variables_pass_through() {
    let resolver = TestResolver::new("/p");
    let result = substitute("-L$FC_DIR -lgfortran $$HOME", &resolver).unwrap();
    assert_eq!(result, "-L$FC_DIR -lgfortran $$HOME");
  }

  #[test]
  fn escape_placeholder_syntax() {
    let resolver = TestResolver::new("/p");
    assert_eq!(substitute("literal $$${prefix}", &resolver).unwrap(), "literal $${prefix}");
  }

  #[test]
  fn unresolved_dependency() {
    let resolver = TestResolver::new("/p");
    let err = substitute("$${dep:oce:prefix}", &resolver).unwrap_err();
    assert_eq!(err, PlaceholderError::UnresolvedDep { name: "oce".to_string() });
  }

  #[test]
  fn parse_errors() {
    assert_eq!(parse("$${prefix").unwrap_err(), PlaceholderError::Unclosed(0));
    assert!(matches!(parse("$${out}"), Err(PlaceholderError::Unknown(_))));
    assert!(matches!(parse("$${dep:oce}"), Err(PlaceholderError::Malformed(_))));
    assert!(matches!(parse("$${dep:oce:headers}"), Err(PlaceholderError::Malformed(_))));
    assert!(matches!(parse("$${compiler:}"), Err(PlaceholderError::Malformed(_))));
    assert!(matches!(parse("$${build:abc:out}"), Err(PlaceholderError::Unknown(_))));
  }

  #[test]
  fn empty_input() {
    assert!(parse("").unwrap().is_empty());
  }
}
