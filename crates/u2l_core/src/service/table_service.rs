//! Lookup table generation from the expanded fact set.
//!
//! # Responsibility
//! - Build the LaTeX→Unicode, ASCII, Unicode-restricted, bibtex and
//!   diacritic tables consumed by the downstream converter.
//!
//! # Invariants
//! - Tables are derived from atomic facts, never from compacted
//!   declarations.
//! - Permutation keys never overwrite an entry declared on its own.
//! - A brace-wrapped bibtex entry never carries `commandspacer`.

use crate::model::fact::{Direction, Fact, Mode};
use crate::model::table::{
    CharEntry, DiacriticCommand, DiacriticTable, LatexTarget, Table, Tables,
};
use crate::repo::fact_repo::{FactListQuery, FactRepository, FactTable, RepoResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

static BARE_COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[0-9A-Za-z]+$").expect("valid bare command regex"));
static TRAILING_COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\[0-9A-Za-z]+(?:\{\})?$").expect("valid trailing command regex")
});
static SINGLE_ACCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:\\[`'^~"=.][A-Za-z]|\\\^\\[ij]|\\[kr]\{[A-Za-z]\})$"#)
        .expect("valid single accent regex")
});
static LIGATURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\\(L|O|AE|AA|DH|DJ|OE|SS|TH|NG)(?:\{\})?$").expect("valid ligature regex")
});
static ACCENT_ARGUMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\\([A-Za-z])\{([A-Za-z0-9])\}$").expect("valid accent argument regex")
});

/// Keys kept in the Unicode-restricted table.
pub const UNICODE_ALLOW_LIST: &[char] = &[
    '\u{00A0}', '\u{180E}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}', '\u{2004}',
    '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{200B}',
    '\u{202F}', '\u{205F}', '\u{3000}', '\u{FEFF}', '<', '>', '\\', '#', '$', '%', '&', '^',
    '_', '{', '}', '~',
];

/// Table builder facade over the fact store.
pub struct TableService<R: FactRepository> {
    repo: R,
}

impl<R: FactRepository> TableService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds every table from the current fact set.
    pub fn build(&self) -> RepoResult<Tables> {
        let started_at = Instant::now();
        info!("event=tables_build module=tables status=start");

        let forward = self.facts(FactTable::Forward)?;
        let reverse = self.facts(FactTable::Reverse)?;
        let tables = build_tables(&forward, &reverse);

        info!(
            "event=tables_build module=tables status=ok latex={} ascii={} unicode={} bibtex={} commands={} duration_ms={}",
            tables.latex.len(),
            tables.ascii.len(),
            tables.unicode.len(),
            tables.bibtex.len(),
            tables.diacritics.commands.len(),
            started_at.elapsed().as_millis()
        );
        Ok(tables)
    }

    fn facts(&self, table: FactTable) -> RepoResult<Vec<Fact>> {
        Ok(self
            .repo
            .list_facts(&FactListQuery {
                table: Some(table),
                ..FactListQuery::default()
            })?
            .into_iter()
            .map(|stored| stored.fact)
            .collect())
    }
}

/// Builds every table from forward (`unicode→mode`) and reverse
/// (`tex→unicode`) facts.
pub fn build_tables(forward: &[Fact], reverse: &[Fact]) -> Tables {
    let (latex, commands) = latex_table(reverse);
    let ascii = ascii_table(forward);
    let unicode = unicode_table(&ascii);
    let bibtex = bibtex_table(&ascii, &diacritic_markers(forward));
    let (tolatex, tounicode) = diacritic_maps(forward);

    Tables {
        latex,
        ascii,
        unicode,
        bibtex,
        diacritics: DiacriticTable {
            commands: commands.into_iter().collect(),
            tolatex,
            tounicode,
        },
    }
}

/// LaTeX→Unicode table plus the command names of combining diacritics.
pub fn latex_table(reverse: &[Fact]) -> (Table<LatexTarget>, BTreeSet<String>) {
    let mut table = Table::new();
    let mut commands = BTreeSet::new();
    for fact in reverse {
        if fact.direction != Direction::TexToUnicode {
            continue;
        }
        let target = if fact.metadata.combiningdiacritic {
            commands.insert(command_name(&fact.markup));
            LatexTarget::Combining {
                combiningdiacritic: fact.codepoint.clone(),
            }
        } else {
            LatexTarget::Codepoint(fact.codepoint.clone())
        };
        table.insert(fact.markup.clone(), target);
    }
    (table, commands)
}

/// ASCII table: one merged entry per code point, plus permutation keys for
/// combining diacritics.
pub fn ascii_table(forward: &[Fact]) -> Table<CharEntry> {
    let mut table: Table<CharEntry> = Table::new();
    for fact in forward {
        let Direction::UnicodeTo(mode) = fact.direction else {
            continue;
        };
        let entry = table.entry(fact.codepoint.clone()).or_default();

        let mut markup = fact.markup.clone();
        if BARE_COMMAND_RE.is_match(&markup) {
            markup.push_str("{}");
            if mode == Mode::Text {
                entry.commandspacer = true;
            }
        }
        match mode {
            Mode::Text => entry.text = Some(markup),
            Mode::Math => entry.math = Some(markup),
        }

        merge_packages(&mut entry.textpackages, &fact.metadata.textpackages);
        merge_packages(&mut entry.mathpackages, &fact.metadata.mathpackages);
        entry.space |= fact.metadata.space;
        entry.combiningdiacritic |= fact.metadata.combiningdiacritic;
    }

    let mut aliases: BTreeMap<String, CharEntry> = BTreeMap::new();
    for (codepoint, entry) in &table {
        if !entry.combiningdiacritic {
            continue;
        }
        for permutation in permutations(codepoint) {
            if !table.contains_key(&permutation) {
                aliases
                    .entry(permutation)
                    .or_insert_with(|| entry.clone());
            }
        }
    }
    table.extend(aliases);
    table
}

/// Subset of the ASCII table for characters that need escaping even in a
/// Unicode-capable target.
pub fn unicode_table(ascii: &Table<CharEntry>) -> Table<CharEntry> {
    ascii
        .iter()
        .filter(|(codepoint, _)| is_allow_listed(codepoint))
        .map(|(codepoint, entry)| (codepoint.clone(), entry.clone()))
        .collect()
}

fn is_allow_listed(codepoint: &str) -> bool {
    let mut chars = codepoint.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => UNICODE_ALLOW_LIST.contains(&ch),
        _ => false,
    }
}

/// Characters that follow `\` in single-character combining commands.
pub fn diacritic_markers(forward: &[Fact]) -> BTreeSet<char> {
    forward
        .iter()
        .filter(|fact| {
            matches!(fact.direction, Direction::UnicodeTo(_)) && fact.metadata.combiningdiacritic
        })
        .filter_map(|fact| {
            let mut chars = fact.markup.chars();
            match (chars.next(), chars.next(), chars.next()) {
                (Some('\\'), Some(marker), None) => Some(marker),
                _ => None,
            }
        })
        .collect()
}

/// Bibtex creator-name table: text-mode ASCII entries with name-safe
/// bracing.
pub fn bibtex_table(ascii: &Table<CharEntry>, markers: &BTreeSet<char>) -> Table<CharEntry> {
    ascii
        .iter()
        .filter_map(|(codepoint, entry)| {
            let text = entry.text.as_deref()?;
            let mut name_entry = CharEntry {
                text: Some(bibtex_text(text, entry.combiningdiacritic, markers)),
                textpackages: entry.textpackages.clone(),
                space: entry.space,
                combiningdiacritic: entry.combiningdiacritic,
                ..CharEntry::default()
            };
            name_entry.commandspacer = !entry.combiningdiacritic
                && !is_braced(name_entry.text.as_deref().unwrap_or_default())
                && TRAILING_COMMAND_RE.is_match(text);
            Some((codepoint.clone(), name_entry))
        })
        .collect()
}

fn bibtex_text(text: &str, combining: bool, markers: &BTreeSet<char>) -> String {
    let bare = text.strip_suffix("{}").unwrap_or(text);
    if SINGLE_ACCENT_RE.is_match(bare) {
        return format!("{{{{{bare}}}}}");
    }
    if let Some(captures) = LIGATURE_RE.captures(text) {
        return format!("{{{{\\{}}}}}", &captures[1]);
    }
    if let Some(captures) = ACCENT_ARGUMENT_RE.captures(text) {
        return format!("{{{{\\{} {}}}}}", &captures[1], &captures[2]);
    }
    if !combining && !is_braced(text) && has_diacritic_command(text, markers) {
        return format!("{{{{{text}}}}}");
    }
    text.to_string()
}

fn is_braced(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('{') && text.ends_with('}')
}

fn has_diacritic_command(text: &str, markers: &BTreeSet<char>) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.peek() {
                if markers.contains(next) {
                    return true;
                }
            }
        }
    }
    false
}

type DiacriticMaps = (Table<DiacriticCommand>, Table<String>);

/// Side tables mapping combining code points to commands and back.
///
/// Math facts are applied first so text-mode commands take precedence.
pub fn diacritic_maps(forward: &[Fact]) -> DiacriticMaps {
    let mut tolatex = Table::new();
    let mut tounicode = Table::new();
    for pass in [Mode::Math, Mode::Text] {
        for fact in forward {
            if fact.direction != Direction::UnicodeTo(pass)
                || !fact.metadata.combiningdiacritic
                || !fact.markup.starts_with('\\')
            {
                continue;
            }
            let command = fact.markup[1..].replace("{}", "");
            tounicode.insert(command.clone(), fact.codepoint.clone());
            for permutation in permutations(&fact.codepoint) {
                tolatex.insert(
                    permutation,
                    DiacriticCommand {
                        mode: pass,
                        command: command.clone(),
                    },
                );
            }
        }
    }
    (tolatex, tounicode)
}

fn command_name(markup: &str) -> String {
    let name = markup.strip_prefix('\\').unwrap_or(markup);
    name.strip_suffix("{}").unwrap_or(name).to_string()
}

fn merge_packages(target: &mut Vec<String>, packages: &[String]) {
    if packages.is_empty() {
        return;
    }
    let merged: BTreeSet<String> = target.drain(..).chain(packages.iter().cloned()).collect();
    target.extend(merged);
}

/// Every distinct ordering of the characters of `value`, sorted.
pub fn permutations(value: &str) -> BTreeSet<String> {
    fn permute(prefix: &mut String, rest: &[char], out: &mut BTreeSet<String>) {
        if rest.is_empty() {
            out.insert(prefix.clone());
            return;
        }
        for index in 0..rest.len() {
            let mut remaining = rest.to_vec();
            let ch = remaining.remove(index);
            prefix.push(ch);
            permute(prefix, &remaining, out);
            prefix.pop();
        }
    }

    let chars: Vec<char> = value.chars().collect();
    let mut out = BTreeSet::new();
    permute(&mut String::new(), &chars, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::{ascii_table, bibtex_table, diacritic_markers, latex_table, permutations};
    use crate::model::fact::{Direction, Fact, Metadata, Mode};
    use crate::model::table::LatexTarget;

    fn fact(codepoint: &str, direction: Direction, markup: &str) -> Fact {
        Fact::new(codepoint, direction, markup, Metadata::default())
    }

    fn combining() -> Metadata {
        Metadata {
            combiningdiacritic: true,
            ..Metadata::default()
        }
    }

    #[test]
    fn permutations_are_distinct() {
        let found: Vec<String> = permutations("aab").into_iter().collect();
        assert_eq!(found, vec!["aab", "aba", "baa"]);
    }

    #[test]
    fn bare_commands_gain_delimiter_and_text_spacer() {
        let table = ascii_table(&[
            fact("§", Direction::UnicodeTo(Mode::Text), "\\S"),
            fact("§", Direction::UnicodeTo(Mode::Math), "\\S"),
            fact("é", Direction::UnicodeTo(Mode::Text), "\\'e"),
        ]);
        let section = &table["§"];
        assert_eq!(section.text.as_deref(), Some("\\S{}"));
        assert_eq!(section.math.as_deref(), Some("\\S{}"));
        assert!(section.commandspacer);
        assert!(!table["é"].commandspacer);
    }

    #[test]
    fn combining_reverse_facts_register_commands() {
        let (table, commands) = latex_table(&[
            Fact::new("\u{301}", Direction::TexToUnicode, "\\'", combining()),
            fact("é", Direction::TexToUnicode, "\\'e"),
        ]);
        assert_eq!(
            table["\\'"],
            LatexTarget::Combining {
                combiningdiacritic: "\u{301}".to_string()
            }
        );
        assert_eq!(table["\\'e"], LatexTarget::Codepoint("é".to_string()));
        assert!(commands.contains("'"));
    }

    #[test]
    fn bibtex_braces_accents_and_ligatures() {
        let forward = vec![
            Fact::new("\u{301}", Direction::UnicodeTo(Mode::Text), "\\'", combining()),
            fact("é", Direction::UnicodeTo(Mode::Text), "\\'e"),
            fact("ø", Direction::UnicodeTo(Mode::Text), "\\o"),
            fact("ḱ", Direction::UnicodeTo(Mode::Text), "\\'{k}"),
            fact("ǩ", Direction::UnicodeTo(Mode::Text), "\\v{k}"),
            fact("†", Direction::UnicodeTo(Mode::Text), "\\dag"),
            fact("∑", Direction::UnicodeTo(Mode::Math), "\\sum"),
        ];
        let ascii = ascii_table(&forward);
        let bibtex = bibtex_table(&ascii, &diacritic_markers(&forward));

        assert_eq!(bibtex["é"].text.as_deref(), Some("{{\\'e}}"));
        assert_eq!(bibtex["ø"].text.as_deref(), Some("{{\\o}}"));
        assert!(!bibtex["ø"].commandspacer);
        assert_eq!(bibtex["ḱ"].text.as_deref(), Some("{{\\'{k}}}"));
        assert_eq!(bibtex["ǩ"].text.as_deref(), Some("{{\\v k}}"));
        assert_eq!(bibtex["†"].text.as_deref(), Some("\\dag{}"));
        assert!(bibtex["†"].commandspacer);
        assert_eq!(bibtex["\u{301}"].text.as_deref(), Some("\\'"));
        assert!(!bibtex.contains_key("∑"));
    }
}
