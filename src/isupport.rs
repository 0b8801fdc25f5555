//! ISUPPORT (numeric 005) derived server metadata.
//!
//! Grounded on `irc_server_modes_parse`/`irc_server_handle_support` in
//! `original_source/lib/irccd/server.c`: tolerant parsing that logs and
//! keeps the previous table on a malformed `PREFIX` value rather than
//! panicking (spec.md §9: "ISUPPORT PREFIX table... tolerant... do not
//! panic").

use tracing::warn;

/// The `(modes)symbols` mapping advertised via `PREFIX=`.
///
/// The bit assigned to a mode is its index in this table, matching the
/// original's `1 << i` scheme in `irc_server_handle_mode`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    entries: Vec<(char, char)>,
}

impl PrefixTable {
    /// Parse a `(ov)@+`-shaped PREFIX value. On a malformed value (mismatched
    /// lengths, missing parens) logs a warning and leaves `self` unchanged.
    pub fn parse(&mut self, value: &str) {
        let Some(rest) = value.strip_prefix('(') else {
            warn!("broken support prefix string: {value:?}");
            return;
        };
        let Some(close) = rest.find(')') else {
            warn!("broken support prefix string: {value:?}");
            return;
        };
        let modes = &rest[..close];
        let syms = &rest[close + 1..];

        if modes.chars().count() != syms.chars().count() {
            warn!("broken support prefix string: {value:?}");
            return;
        }

        self.entries = modes.chars().zip(syms.chars()).collect();
    }

    /// Bit position assigned to `mode`, if known.
    pub fn bit_for_mode(&self, mode: char) -> Option<u32> {
        self.entries.iter().position(|&(m, _)| m == mode).map(|i| i as u32)
    }

    fn bit_for_symbol(&self, symbol: char) -> Option<u32> {
        self.entries.iter().position(|&(_, s)| s == symbol).map(|i| i as u32)
    }

    /// Repeatedly strip leading mode-prefix symbols from `token`, returning
    /// the residue nickname and the accumulated mode bitset.
    ///
    /// Grounded on `irc_server_strip`, generalized per spec.md §4.2 ("Mode
    /// prefix stripping... repeatedly consume any leading character").
    pub fn strip<'a>(&self, token: &'a str) -> (&'a str, u32) {
        let mut bits = 0u32;
        let mut rest = token;
        while let Some(c) = rest.chars().next() {
            match self.bit_for_symbol(c) {
                Some(bit) => {
                    bits |= 1 << bit;
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }
        (rest, bits)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Server-advertised limits and capabilities gathered from numeric 005.
#[derive(Debug, Clone, Default)]
pub struct ServerLimits {
    pub chantypes: Option<String>,
    pub charset: Option<String>,
    pub casemapping: Option<String>,
    pub channel_max: u32,
    pub nickname_max: u32,
    pub topic_max: u32,
    pub away_max: u32,
    pub kick_max: u32,
    pub prefixes: PrefixTable,
}

impl ServerLimits {
    /// Parse `KEY=VALUE` tokens out of a 005 line's argument vector, skipping
    /// the leading nickname and the trailing human-readable "are supported"
    /// message, matching `irc_server_handle_support`.
    pub fn apply_isupport(&mut self, args: &[String]) {
        for arg in args.iter().skip(1) {
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };

            match key {
                "PREFIX" => self.prefixes.parse(value),
                "CHANTYPES" => self.chantypes = Some(value.to_string()),
                "CHANNELLEN" => self.channel_max = value.parse().unwrap_or(self.channel_max),
                "NICKLEN" => self.nickname_max = value.parse().unwrap_or(self.nickname_max),
                "TOPICLEN" => self.topic_max = value.parse().unwrap_or(self.topic_max),
                "AWAYLEN" => self.away_max = value.parse().unwrap_or(self.away_max),
                "KICKLEN" => self.kick_max = value.parse().unwrap_or(self.kick_max),
                "CHARSET" => self.charset = Some(value.to_string()),
                "CASEMAPPING" => self.casemapping = Some(value.to_string()),
                _ => {}
            }
        }
    }
}
