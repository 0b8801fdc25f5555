//! Pure pattern substitution for plugin templates.
//!
//! Grounded on `original_source/lib/irccd/subst.h`/`subst.c`: `#{key}`
//! keyword lookups, `${VAR}` environment lookups, `@{attrs}` IRC color/style
//! attributes, `!{cmd}` shell execution, and `%`-prefixed strftime tokens,
//! each independently gated by a flag (the original's `irc_subst_flags`)
//! since env and shell substitution are dangerous to enable unconditionally.

use std::collections::HashMap;
use std::process::Command;

use chrono::{DateTime, Utc};

/// Which substitution kinds are enabled, mirroring `enum irc_subst_flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubstFlags(u32);

impl SubstFlags {
    pub const DATE: SubstFlags = SubstFlags(1 << 0);
    pub const KEYWORDS: SubstFlags = SubstFlags(1 << 1);
    pub const ENV: SubstFlags = SubstFlags(1 << 2);
    pub const SHELL: SubstFlags = SubstFlags(1 << 3);
    pub const IRC_ATTRS: SubstFlags = SubstFlags(1 << 4);

    pub fn contains(self, other: SubstFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SubstFlags {
    type Output = SubstFlags;

    fn bitor(self, rhs: SubstFlags) -> SubstFlags {
        SubstFlags(self.0 | rhs.0)
    }
}

pub struct SubstContext<'a> {
    pub flags: SubstFlags,
    pub time: DateTime<Utc>,
    pub keywords: &'a HashMap<String, String>,
}

/// Expand `#{}`/`${}`/`@{}`/`!{}` placeholders and `%`-strftime tokens in
/// `pattern` according to `ctx.flags`. Unknown keywords and disabled
/// substitution kinds are left verbatim rather than erroring, matching the
/// original's best-effort behavior.
pub fn subst(pattern: &str, ctx: &SubstContext) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while !rest.is_empty() {
        let kind = [
            ('#', SubstFlags::KEYWORDS),
            ('$', SubstFlags::ENV),
            ('@', SubstFlags::IRC_ATTRS),
            ('!', SubstFlags::SHELL),
        ]
        .into_iter()
        .find(|&(marker, flag)| ctx.flags.contains(flag) && rest.starts_with(marker) && rest[1..].starts_with('{'));

        if let Some((marker, _)) = kind {
            if let Some((body, tail)) = take_braced(&rest[1..]) {
                match marker {
                    '#' => out.push_str(ctx.keywords.get(body).map(String::as_str).unwrap_or("")),
                    '$' => out.push_str(&std::env::var(body).unwrap_or_default()),
                    '@' => out.push_str(&irc_attrs(body)),
                    '!' => out.push_str(&run_shell(body)),
                    _ => unreachable!(),
                }
                rest = tail;
                continue;
            }
        }

        if rest.starts_with('%') && ctx.flags.contains(SubstFlags::DATE) {
            let mut chars = rest[1..].chars();
            if let Some(spec) = chars.next() {
                out.push_str(&strftime_one(spec, ctx.time));
                rest = chars.as_str();
                continue;
            }
        }

        let mut chars = rest.chars();
        let c = chars.next().expect("rest is non-empty");
        out.push(c);
        rest = chars.as_str();
    }

    out
}

fn take_braced(s: &str) -> Option<(&str, &str)> {
    let rest = s.strip_prefix('{')?;
    let close = rest.find('}')?;
    Some((&rest[..close], &rest[close + 1..]))
}

fn irc_attrs(spec: &str) -> String {
    // `fg,bg` numeric pairs map to mIRC color codes (\x03NN,MM).
    if let Some((fg, bg)) = spec.split_once(',') {
        format!("\x03{fg},{bg}")
    } else if !spec.is_empty() {
        format!("\x03{spec}")
    } else {
        "\x0f".to_string()
    }
}

fn run_shell(cmd: &str) -> String {
    match Command::new("/bin/sh").arg("-c").arg(cmd).output() {
        Ok(output) => String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        Err(_) => String::new(),
    }
}

fn strftime_one(spec: char, time: DateTime<Utc>) -> String {
    time.format(&format!("%{spec}")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_keyword() {
        let mut keywords = HashMap::new();
        keywords.insert("target".to_string(), "#test".to_string());
        let ctx = SubstContext {
            flags: SubstFlags::KEYWORDS,
            time: Utc::now(),
            keywords: &keywords,
        };
        assert_eq!(subst("hello #{target}!", &ctx), "hello #test!");
    }

    #[test]
    fn leaves_unknown_keyword_empty_and_disabled_kinds_verbatim() {
        let keywords = HashMap::new();
        let ctx = SubstContext {
            flags: SubstFlags::KEYWORDS,
            time: Utc::now(),
            keywords: &keywords,
        };
        assert_eq!(subst("#{missing}", &ctx), "");
        assert_eq!(subst("${HOME}", &ctx), "${HOME}");
    }

    #[test]
    fn env_substitution_requires_flag() {
        std::env::set_var("IRCCD_TEST_VAR", "value");
        let keywords = HashMap::new();
        let ctx = SubstContext {
            flags: SubstFlags::ENV,
            time: Utc::now(),
            keywords: &keywords,
        };
        assert_eq!(subst("${IRCCD_TEST_VAR}", &ctx), "value");
    }
}
