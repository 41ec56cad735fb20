//! Shell-style tokenization and quoting.
//!
//! Dependency listings emitted by Make-style compilers use shell quoting for
//! paths with spaces, and the executor uses the quoted-joined form of an argv
//! as the identity of a compilation command. Both directions live here.

use std::borrow::Cow;

/// Split a string using POSIX-ish shell tokenization rules.
///
/// Supported: whitespace separation, single quotes (literal), double quotes
/// (with `\"`, `\\`, `\$`, and `` \` `` escapes), and bare backslash escapes.
/// Unterminated quotes consume the rest of the input rather than erroring;
/// callers treat the result as best-effort.
pub fn split(input: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut current = String::new();
  let mut in_token = false;
  let mut chars = input.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      c if c.is_whitespace() => {
        if in_token {
          tokens.push(std::mem::take(&mut current));
          in_token = false;
        }
      }
      '\'' => {
        in_token = true;
        for c in chars.by_ref() {
          if c == '\'' {
            break;
          }
          current.push(c);
        }
      }
      '"' => {
        in_token = true;
        while let Some(c) = chars.next() {
          match c {
            '"' => break,
            '\\' => match chars.peek() {
              Some(&next) if matches!(next, '"' | '\\' | '$' | '`') => {
                current.push(next);
                chars.next();
              }
              _ => current.push('\\'),
            },
            _ => current.push(c),
          }
        }
      }
      '\\' => {
        in_token = true;
        if let Some(next) = chars.next() {
          current.push(next);
        }
      }
      _ => {
        in_token = true;
        current.push(c);
      }
    }
  }

  if in_token {
    tokens.push(current);
  }
  tokens
}

/// Quote a single argument so that [`split`] recovers it verbatim.
pub fn quote(arg: &str) -> Cow<'_, str> {
  if arg.is_empty() {
    return Cow::Borrowed("''");
  }
  let safe = arg
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | '+' | ':' | '@' | ',' | '%'));
  if safe {
    return Cow::Borrowed(arg);
  }
  let mut quoted = String::with_capacity(arg.len() + 2);
  quoted.push('\'');
  for c in arg.chars() {
    if c == '\'' {
      // Close, escape the quote, reopen.
      quoted.push_str("'\\''");
    } else {
      quoted.push(c);
    }
  }
  quoted.push('\'');
  Cow::Owned(quoted)
}

/// Join an argv into a single command string with stable quoting.
///
/// The result is deterministic for a given argv, which makes it usable as a
/// cache key for the metadata store.
pub fn join<I, S>(args: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut out = String::new();
  for (idx, arg) in args.into_iter().enumerate() {
    if idx > 0 {
      out.push(' ');
    }
    out.push_str(&quote(arg.as_ref()));
  }
  out
}
