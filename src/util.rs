//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings. Cuts on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_fills_all_occurrences() {
    assert_eq!(fill_template("{a}-{b}-{a}", &[("a", "1"), ("b", "2")]), "1-2-1");
  }

  #[test]
  fn truncation_respects_utf8() {
    let s = "世界观测验";
    let t = trunc_for_log(s, 4);
    assert!(t.starts_with("世"));
    assert!(t.ends_with("(15 bytes total)"));
  }
}
